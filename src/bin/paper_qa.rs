//! Paper QA binary entry point.
//!
//! Finds a paper on arXiv, downloads its PDF, indexes the text page by page and
//! then answers questions about it in an interactive conversation. Answers cite
//! the page numbers of the passages they were generated from.
//!
//! # Examples
//!
//! Look up a paper by arXiv id:
//! ```bash
//! paper-qa --arxiv-id 1706.03762
//! ```
//!
//! Keyword search, three most recent matches, hosted embeddings:
//! ```bash
//! paper-qa --keywords "ti: attention, au: vaswani" --max-results 3 --embedding-provider open-ai
//! ```
//!
//! Without `--arxiv-id` or `--keywords` the query is asked for interactively.

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use comfy_table::{presets::UTF8_FULL, Attribute, Cell, ContentArrangement, Table};
use indicatif::{ProgressBar, ProgressStyle};
use paper_qa::{
    answer::{ChatAnswerGenerator, ChatConfig, DEFAULT_CHAT_MODEL},
    arxiv::{parse_query_fields, ArxivClient, ArxivPaper},
    embedding::{
        fastembed::{parse_model_name, FastEmbedProvider},
        openai::{OpenAIEmbedding, DEFAULT_BASE_URL},
        EmbeddingProvider, EmbeddingResult,
    },
    models::{DEFAULT_BATCH_SIZE, DEFAULT_NEIGHBOR_COUNT, DEFAULT_WORD_LENGTH},
    provider::{pdf::PdfTextExtractor, PageSource},
    Chunk, CorpusIndex, RetrievalConfig, RetrievalSession,
};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Wrapper enum for embedding providers to allow dynamic dispatch
enum DynamicEmbeddingProvider {
    FastEmbed(FastEmbedProvider),
    OpenAI(OpenAIEmbedding),
}

#[async_trait::async_trait]
impl EmbeddingProvider for DynamicEmbeddingProvider {
    async fn embed(&self, text: &str) -> EmbeddingResult<Vec<f32>> {
        match self {
            DynamicEmbeddingProvider::FastEmbed(p) => p.embed(text).await,
            DynamicEmbeddingProvider::OpenAI(p) => p.embed(text).await,
        }
    }

    async fn embed_batch(&self, texts: &[&str]) -> EmbeddingResult<Vec<Vec<f32>>> {
        match self {
            DynamicEmbeddingProvider::FastEmbed(p) => p.embed_batch(texts).await,
            DynamicEmbeddingProvider::OpenAI(p) => p.embed_batch(texts).await,
        }
    }

    fn dimension(&self) -> usize {
        match self {
            DynamicEmbeddingProvider::FastEmbed(p) => p.dimension(),
            DynamicEmbeddingProvider::OpenAI(p) => p.dimension(),
        }
    }

    fn model_name(&self) -> &str {
        match self {
            DynamicEmbeddingProvider::FastEmbed(p) => p.model_name(),
            DynamicEmbeddingProvider::OpenAI(p) => p.model_name(),
        }
    }
}

/// Embedding provider type
#[derive(Debug, Clone, ValueEnum)]
enum EmbeddingProviderType {
    /// FastEmbed local embedding provider (default, no API required)
    FastEmbed,
    /// OpenAI-compatible embedding API (uses the LLM credentials)
    OpenAI,
}

/// Ask questions about an arXiv paper
#[derive(Parser, Debug)]
#[command(
    name = "paper-qa",
    version,
    about = "Ask questions about an arXiv paper using semantic retrieval over its pages",
    long_about = "Look up a paper on arXiv, download its PDF and answer questions about it. \
                  Each answer is generated by a chat model from the passages nearest to the \
                  question and cites their page numbers.

EXAMPLES:
  By arXiv id:
    paper-qa --arxiv-id 1706.03762

  By keywords (arXiv field prefixes: ti, au, abs, cat, all):
    paper-qa --keywords \"ti: attention, au: vaswani\" --max-results 3

  Skip the front matter and use larger chunks:
    paper-qa --arxiv-id 1512.03385 --start-page 2 --word-length 200"
)]
struct Args {
    /// arXiv identifier of the paper, e.g. 1706.03762
    #[arg(long, value_name = "ID", conflicts_with = "keywords")]
    arxiv_id: Option<String>,

    /// Keyword query in "key: value, key: value" form
    #[arg(long, value_name = "QUERY")]
    keywords: Option<String>,

    /// Maximum number of papers to fetch
    #[arg(long, value_name = "N", default_value = "1")]
    max_results: usize,

    /// Directory PDFs are downloaded into
    #[arg(long, value_name = "DIR", default_value = "download")]
    download_dir: PathBuf,

    /// Maximum words per chunk
    #[arg(long, value_name = "N", default_value_t = DEFAULT_WORD_LENGTH)]
    word_length: usize,

    /// First page of the PDF to index (1-based)
    #[arg(long, value_name = "PAGE", default_value = "1")]
    start_page: usize,

    /// Number of passages retrieved per question
    #[arg(long, value_name = "N", default_value_t = DEFAULT_NEIGHBOR_COUNT)]
    neighbors: usize,

    /// Number of chunks per embedding batch
    #[arg(long, value_name = "N", default_value_t = DEFAULT_BATCH_SIZE)]
    batch_size: usize,

    /// Embedding provider to use
    #[arg(long, value_enum, default_value = "fast-embed")]
    embedding_provider: EmbeddingProviderType,

    /// Specific embedding model name (provider-dependent, optional)
    #[arg(long, value_name = "MODEL")]
    embedding_model: Option<String>,

    /// FastEmbed model cache directory (only used with FastEmbed provider)
    #[arg(long, value_name = "DIR")]
    cache_dir: Option<PathBuf>,

    /// Logging verbosity level
    #[arg(long, default_value = "warn", value_name = "LEVEL")]
    log_level: String,

    /// API key for the chat model (prompted for if unset)
    #[arg(long, env = "LLM_API_KEY", hide_env_values = true, value_name = "KEY")]
    llm_api_key: Option<String>,

    /// API root of the OpenAI-compatible chat endpoint (prompted for if unset)
    #[arg(long, env = "LLM_BASE_URL", value_name = "URL")]
    llm_base_url: Option<String>,

    /// Chat model name
    #[arg(long, env = "LLM_MODEL", value_name = "MODEL", default_value = DEFAULT_CHAT_MODEL)]
    llm_model: String,
}

impl Args {
    /// Reject numeric flags that would make every question fail.
    fn validate(&self) -> Result<()> {
        if self.max_results == 0 {
            anyhow::bail!("--max-results must be at least 1");
        }
        if self.word_length == 0 {
            anyhow::bail!("--word-length must be at least 1");
        }
        if self.start_page == 0 {
            anyhow::bail!("--start-page is 1-based and must be at least 1");
        }
        if self.neighbors == 0 {
            anyhow::bail!("--neighbors must be at least 1");
        }
        if self.batch_size == 0 {
            anyhow::bail!("--batch-size must be at least 1");
        }
        Ok(())
    }

    fn retrieval_config(&self) -> RetrievalConfig {
        RetrievalConfig {
            word_length: self.word_length,
            start_page: self.start_page,
            neighbor_count: self.neighbors,
            batch_size: self.batch_size,
        }
    }
}

/// Setup logging with the specified level
fn setup_logging(log_level: &str) {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(log_level)),
        )
        .init();
}

/// Read one trimmed line from the user.
fn prompt(rl: &mut DefaultEditor, message: &str) -> Result<String> {
    let line = rl
        .readline(message)
        .with_context(|| "Failed to read input")?;
    Ok(line.trim().to_string())
}

/// Fill in missing chat credentials by asking the user.
fn resolve_chat_config(args: &Args, rl: &mut DefaultEditor) -> Result<ChatConfig> {
    let api_key = match &args.llm_api_key {
        Some(key) if !key.is_empty() => key.clone(),
        _ => prompt(rl, "LLM API key: ")?,
    };
    if api_key.is_empty() {
        anyhow::bail!(
            "An API key is required for answer generation.\n\
             Pass --llm-api-key or set LLM_API_KEY."
        );
    }

    let base_url = match &args.llm_base_url {
        Some(url) if !url.is_empty() => url.clone(),
        _ => {
            let url = prompt(rl, &format!("LLM base URL [{}]: ", DEFAULT_BASE_URL))?;
            if url.is_empty() {
                DEFAULT_BASE_URL.to_string()
            } else {
                url
            }
        }
    };

    info!("Chat endpoint: {} (model={})", base_url, args.llm_model);
    Ok(ChatConfig::new(api_key, base_url).with_model(args.llm_model.clone()))
}

/// Create the embedding provider selected on the command line
fn create_embedding_provider(args: &Args, chat: &ChatConfig) -> Result<DynamicEmbeddingProvider> {
    match args.embedding_provider {
        EmbeddingProviderType::FastEmbed => {
            info!("Initializing FastEmbed provider");

            let model = match &args.embedding_model {
                Some(name) => Some(parse_model_name(name).with_context(|| {
                    format!("Unknown FastEmbed model: '{}'", name)
                })?),
                None => None,
            };

            let cache_dir = args.cache_dir.clone().unwrap_or_else(|| {
                dirs::cache_dir()
                    .map(|p| p.join("fastembed"))
                    .unwrap_or_else(|| PathBuf::from(".cache/fastembed"))
            });
            debug!("Using cache directory: {}", cache_dir.display());

            let provider = FastEmbedProvider::new(model, Some(cache_dir))
                .context("Failed to initialize FastEmbed provider")?;
            Ok(DynamicEmbeddingProvider::FastEmbed(provider))
        }
        EmbeddingProviderType::OpenAI => {
            info!("Initializing OpenAI-compatible embedding provider");
            let provider = OpenAIEmbedding::new(
                chat.api_key.clone(),
                args.embedding_model.clone(),
                Some(chat.base_url.clone()),
            );
            Ok(DynamicEmbeddingProvider::OpenAI(provider))
        }
    }
}

/// Query arXiv using the command-line query, or ask for one.
async fn find_papers(client: &ArxivClient, args: &Args, rl: &mut DefaultEditor) -> Result<Vec<ArxivPaper>> {
    let (arxiv_id, keywords, max_results) = match (&args.arxiv_id, &args.keywords) {
        (Some(id), _) => (Some(id.clone()), None, args.max_results),
        (None, Some(query)) => (None, Some(query.clone()), args.max_results),
        (None, None) => {
            let query_type = prompt(rl, "Query by keywords or by ID? (type 'keywords' or 'id_list'): ")?
                .to_lowercase();
            let (arxiv_id, keywords) = match query_type.as_str() {
                "keywords" => (None, Some(prompt(rl, "Please input your query: ")?)),
                "id_list" | "id" => (Some(prompt(rl, "Please input the arXiv ID: ")?), None),
                other => anyhow::bail!("Invalid query type '{}': expected 'keywords' or 'id_list'", other),
            };
            let max_results = prompt(rl, "Please input the maximum number of results: ")?
                .parse::<usize>()
                .context("Maximum number of results must be a positive integer")?;
            (arxiv_id, keywords, max_results)
        }
    };

    let papers = match (arxiv_id, keywords) {
        (Some(id), _) => client.query_by_id_list(&[id], max_results).await,
        (None, Some(query)) => {
            let fields = parse_query_fields(&query)
                .with_context(|| format!("Failed to parse keyword query: '{}'", query))?;
            client.combined_query(&fields, max_results).await
        }
        (None, None) => Vec::new(),
    };

    Ok(papers)
}

/// Truncate to `max` characters, marking the cut with an ellipsis.
fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() > max {
        let head: String = text.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", head)
    } else {
        text.to_string()
    }
}

/// Format arXiv results as a pretty table
fn format_papers_table(papers: &[ArxivPaper]) -> String {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);

    table.set_header(vec![
        Cell::new("#").add_attribute(Attribute::Bold),
        Cell::new("arXiv ID").add_attribute(Attribute::Bold),
        Cell::new("Title").add_attribute(Attribute::Bold),
        Cell::new("Authors").add_attribute(Attribute::Bold),
        Cell::new("Published").add_attribute(Attribute::Bold),
    ]);

    for (idx, paper) in papers.iter().enumerate() {
        let published = paper.published.get(..10).unwrap_or(&paper.published);
        table.add_row(vec![
            Cell::new(idx + 1),
            Cell::new(paper.short_id()),
            Cell::new(truncate(&paper.title, 60)),
            Cell::new(truncate(&paper.authors.join(", "), 40)),
            Cell::new(published),
        ]);
    }

    table.to_string()
}

/// Format the chunks behind the last answer
fn format_sources_table(chunks: &[Chunk]) -> String {
    if chunks.is_empty() {
        return "No sources for the last question.".to_string();
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);

    table.set_header(vec![
        Cell::new("Rank").add_attribute(Attribute::Bold),
        Cell::new("Page").add_attribute(Attribute::Bold),
        Cell::new("Passage").add_attribute(Attribute::Bold),
    ]);

    for (idx, chunk) in chunks.iter().enumerate() {
        table.add_row(vec![
            Cell::new(idx + 1),
            Cell::new(chunk.page_number()),
            Cell::new(truncate(chunk.content(), 160)),
        ]);
    }

    table.to_string()
}

fn create_spinner(message: String) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.cyan} [{elapsed_precise}] {msg}")
            .expect("Invalid spinner template"),
    );
    spinner.set_message(message);
    spinner.enable_steady_tick(Duration::from_millis(120));
    spinner
}

fn print_help() {
    println!("Commands:");
    println!("  <question>       - Ask a question about the paper");
    println!("  /sources         - Show the passages behind the last answer");
    println!("  /help            - Show this help");
    println!("  quit, exit       - Finish the conversation");
    println!("  Ctrl+D or Ctrl+C - Finish the conversation");
}

/// Run the question/answer loop for one paper
async fn run_conversation<E: EmbeddingProvider>(
    session: &RetrievalSession<'_, E, ChatAnswerGenerator>,
    rl: &mut DefaultEditor,
) -> Result<()> {
    println!("You can start asking questions now. (type 'quit' or 'exit' to finish the conversation)");
    print_help();
    println!();

    let mut last_sources: Vec<Chunk> = Vec::new();

    loop {
        match rl.readline("Question> ") {
            Ok(line) => {
                let line = line.trim();

                if line.is_empty() {
                    continue;
                }

                rl.add_history_entry(line).ok();

                match line.to_lowercase().as_str() {
                    "quit" | "exit" => break,
                    "/help" => print_help(),
                    "/sources" => println!("{}", format_sources_table(&last_sources)),
                    _ if line.starts_with('/') => {
                        eprintln!("Unknown command: {}. Type /help for available commands.", line)
                    }
                    _ => {
                        let start = Instant::now();
                        let (answer, sources) = session.ask_with_sources(line).await;
                        debug!("Answered in {:.2}s", start.elapsed().as_secs_f64());

                        println!("Answer: {}\n", answer);
                        last_sources = sources;
                    }
                }
            }
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
            Err(err) => {
                error!("Error reading input: {}", err);
                break;
            }
        }
    }

    Ok(())
}

/// Download, index and discuss one paper
async fn process_paper<E: EmbeddingProvider>(
    paper: &ArxivPaper,
    client: &ArxivClient,
    index: &mut CorpusIndex<E>,
    chat: &ChatConfig,
    config: RetrievalConfig,
    download_dir: &Path,
    rl: &mut DefaultEditor,
) -> Result<()> {
    println!("The paper you are looking for is:");
    println!("Title: {}", paper.title);
    println!("PDF URL: {}", paper.pdf_link());

    let path = client
        .download_pdf(paper, download_dir)
        .await
        .with_context(|| format!("Failed to download PDF for {}", paper.short_id()))?;
    println!("PDF file: {}\n", path.display());

    let pdf = PdfTextExtractor::open(&path)
        .await
        .with_context(|| format!("Failed to extract text from {}", path.display()))?;

    let generator = ChatAnswerGenerator::new(chat.clone());
    let mut session = RetrievalSession::new(index, generator, config);

    let spinner = create_spinner(format!("Embedding {} pages...", pdf.page_count()));
    let loaded = session.load_document(&pdf).await;
    spinner.finish_and_clear();

    let chunk_count = loaded.with_context(|| format!("Failed to index {}", path.display()))?;
    println!(
        "Indexed {} chunks with {} (retrieving {} per question)\n",
        chunk_count,
        session.index().provider().model_name(),
        session.index().neighbor_count()
    );

    run_conversation(&session, rl).await
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    // Setup logging
    setup_logging(&args.log_level);

    args.validate()?;

    let mut rl = DefaultEditor::new()
        .with_context(|| "Failed to create readline editor")?;

    let client = ArxivClient::default();
    let papers = find_papers(&client, &args, &mut rl).await?;
    if papers.is_empty() {
        println!("No papers found.");
        return Ok(());
    }
    println!("{}", format_papers_table(&papers));

    let chat = resolve_chat_config(&args, &mut rl)?;
    let provider = create_embedding_provider(&args, &chat)?;
    info!(
        "Embedding provider initialized: model={}, dimension={}",
        provider.model_name(),
        provider.dimension()
    );

    let mut index = CorpusIndex::new(provider);
    let config = args.retrieval_config();

    for paper in &papers {
        if let Err(e) = process_paper(paper, &client, &mut index, &chat, config, &args.download_dir, &mut rl).await {
            error!("Skipping {}: {:#}", paper.short_id(), e);
            eprintln!("Error: {:#}", e);
        }
    }

    println!("Goodbye!");
    Ok(())
}

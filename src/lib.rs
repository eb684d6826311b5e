//! arXiv Paper QA - question answering over a single research paper.
//!
//! This library provides the core of the paper QA tool: it finds a paper on
//! arXiv, extracts the text of its PDF page by page, and answers questions
//! from the passages nearest to each question.
//!
//! # Architecture
//!
//! The system is organized into several key modules:
//!
//! - **models**: Core data structures (Chunk, RetrievalConfig)
//! - **chunking**: Splitting page text into fixed-size word windows
//! - **embedding**: Text embedding generation (local fastembed or hosted API)
//! - **index**: Exact nearest-neighbor search over embedded chunks
//! - **provider**: Page text sources, including PDF extraction
//! - **answer**: Prompt construction and chat-model answer generation
//! - **arxiv**: arXiv API queries and PDF download
//! - **session**: Ties the pieces together for one document
//!
//! # Workflow
//!
//! 1. Look the paper up on arXiv by id or keywords and download its PDF
//! 2. Extract and normalize the text of every page
//! 3. Chunk pages into windows tagged with their page number
//! 4. Embed the chunks and fit the corpus index
//! 5. For each question, retrieve the nearest chunks and ask the chat model
//!    for an answer citing page numbers
//!
//! # Example
//!
//! ```ignore
//! use paper_qa::{
//!     answer::{ChatAnswerGenerator, ChatConfig},
//!     embedding::fastembed::FastEmbedProvider,
//!     provider::pdf::PdfTextExtractor,
//!     CorpusIndex, RetrievalConfig, RetrievalSession,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut index = CorpusIndex::new(FastEmbedProvider::new(None, None)?);
//!     let generator = ChatAnswerGenerator::new(ChatConfig::new(api_key, base_url));
//!     let mut session = RetrievalSession::new(&mut index, generator, RetrievalConfig::default());
//!
//!     let pdf = PdfTextExtractor::open("download/1706.03762v7.pdf").await?;
//!     session.load_document(&pdf).await?;
//!
//!     println!("{}", session.ask("How many attention heads are used?").await);
//!     Ok(())
//! }
//! ```

pub mod answer;
pub mod arxiv;
pub mod chunking;
pub mod embedding;
pub mod index;
pub mod models;
pub mod provider;
pub mod session;

// Re-export commonly used types at the crate root
pub use answer::AnswerGenerator;
pub use embedding::EmbeddingProvider;
pub use index::CorpusIndex;
pub use models::{Chunk, PageText, RetrievalConfig};
pub use provider::PageSource;
pub use session::RetrievalSession;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default embedding model name for the hosted embedding API
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";

/// Default embedding dimension for text-embedding-3-small
pub const DEFAULT_EMBEDDING_DIMENSION: usize = 1536;

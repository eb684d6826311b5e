//! Retrieval session orchestration.
//!
//! A session ties the pieces together for one document: pages are chunked and
//! fitted into a [`CorpusIndex`], then each question is answered from the
//! nearest chunks by an [`AnswerGenerator`].
//!
//! The index is borrowed, not owned, so the caller controls its lifetime and
//! can keep using it after the session ends.
//!
//! ```ignore
//! let mut index = CorpusIndex::new(FastEmbedProvider::new(None, None)?);
//! let generator = ChatAnswerGenerator::new(ChatConfig::new(api_key, base_url));
//! let mut session = RetrievalSession::new(&mut index, generator, RetrievalConfig::default());
//!
//! let extractor = PdfTextExtractor::open("download/1706.03762v7.pdf").await?;
//! session.load_document(&extractor).await?;
//! println!("{}", session.ask("What is multi-head attention?").await);
//! ```

use thiserror::Error;
use tracing::{info, warn};

use crate::answer::AnswerGenerator;
use crate::chunking::{chunk_pages, ChunkError};
use crate::embedding::EmbeddingProvider;
use crate::index::{CorpusIndex, IndexError};
use crate::models::{Chunk, PageText, RetrievalConfig};
use crate::provider::{PageSource, ProviderError};

/// Errors that can occur while loading a document into a session.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Chunking arguments were invalid
    #[error("Chunking failed: {0}")]
    Chunking(#[from] ChunkError),

    /// Page text could not be read
    #[error("Page source error: {0}")]
    Provider(#[from] ProviderError),

    /// Fitting or searching the index failed
    #[error("Index error: {0}")]
    Index(#[from] IndexError),
}

/// Result type for session operations.
pub type SessionResult<T> = Result<T, SessionError>;

/// Question answering over one fitted document.
pub struct RetrievalSession<'a, E, G>
where
    E: EmbeddingProvider,
    G: AnswerGenerator,
{
    index: &'a mut CorpusIndex<E>,
    generator: G,
    config: RetrievalConfig,
}

impl<'a, E, G> RetrievalSession<'a, E, G>
where
    E: EmbeddingProvider,
    G: AnswerGenerator,
{
    /// Create a session over `index`, answering with `generator`.
    pub fn new(index: &'a mut CorpusIndex<E>, generator: G, config: RetrievalConfig) -> Self {
        Self {
            index,
            generator,
            config,
        }
    }

    /// Configuration used for chunking and fitting.
    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    /// The index this session fits and queries.
    pub fn index(&self) -> &CorpusIndex<E> {
        self.index
    }

    /// The generator answers are produced with.
    pub fn generator(&self) -> &G {
        &self.generator
    }

    /// Chunk `pages` and fit them as the current corpus.
    ///
    /// `pages[0]` is treated as page `config.start_page`.
    ///
    /// # Returns
    /// Number of chunks fitted
    ///
    /// # Errors
    /// Returns `SessionError::Chunking` for an invalid word length and
    /// `SessionError::Index` if embedding the chunks fails
    pub async fn load_pages(&mut self, pages: &[PageText]) -> SessionResult<usize> {
        let chunks = chunk_pages(pages, self.config.word_length, self.config.start_page)?;
        let count = chunks.len();

        self.index
            .fit(chunks, self.config.neighbor_count, self.config.batch_size)
            .await?;

        info!("Corpus loaded: {} pages, {} chunks", pages.len(), count);
        Ok(count)
    }

    /// Read pages `config.start_page..` from `source` and load them.
    ///
    /// # Errors
    /// Returns `SessionError::Provider` if the start page is outside the
    /// document, plus any error from [`load_pages`](Self::load_pages)
    pub async fn load_document<S>(&mut self, source: &S) -> SessionResult<usize>
    where
        S: PageSource + ?Sized,
    {
        info!("Loading corpus from {}", source.name());
        let pages = source.get_pages(self.config.start_page, None).await?;
        self.load_pages(&pages).await
    }

    /// Nearest chunks for `question`, nearest first.
    ///
    /// # Errors
    /// Returns `SessionError::Index` if nothing is fitted or the question
    /// cannot be embedded
    pub async fn retrieve(&self, question: &str) -> SessionResult<Vec<Chunk>> {
        Ok(self.index.search(question).await?)
    }

    /// Answer `question` from the fitted document.
    ///
    /// Never fails: retrieval errors become a `"Search Error: ..."` answer and
    /// generator errors come back in whatever form the generator reports them.
    pub async fn ask(&self, question: &str) -> String {
        self.ask_with_sources(question).await.0
    }

    /// Like [`ask`](Self::ask), also returning the chunks the answer was
    /// generated from (empty when retrieval failed).
    pub async fn ask_with_sources(&self, question: &str) -> (String, Vec<Chunk>) {
        match self.index.search(question).await {
            Ok(chunks) => {
                let answer = self.generator.generate(question, &chunks).await;
                (answer, chunks)
            }
            Err(e) => {
                warn!("Retrieval failed for question '{}': {}", question, e);
                (format!("Search Error: {}", e), Vec::new())
            }
        }
    }
}

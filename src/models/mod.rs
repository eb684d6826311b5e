//! Core data models for the paper question-answering system.
//!
//! This module contains the value types shared by the chunker, the corpus index
//! and the retrieval session: page text, page-tagged chunks and the retrieval
//! configuration.

use serde::{Deserialize, Serialize};

/// Whitespace-normalized text of a single source page.
pub type PageText = String;

/// Default maximum number of words per chunk.
pub const DEFAULT_WORD_LENGTH: usize = 150;

/// Default number of neighbors returned by a search.
pub const DEFAULT_NEIGHBOR_COUNT: usize = 5;

/// Default number of texts sent to the embedding provider per call.
pub const DEFAULT_BATCH_SIZE: usize = 1000;

/// A page-tagged, word-bounded text fragment used as a retrieval unit.
///
/// The `text` field always has the form `[Page no. N] "content"`. Downstream
/// prompt citation relies on this exact literal, so chunks are only built
/// through [`Chunk::new`] and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Chunk {
    /// Page the chunk is attributed to (1-based, offset by the start page)
    page_number: usize,

    /// Tagged text: `[Page no. N] "content"`
    text: String,
}

impl Chunk {
    /// Create a chunk from its page number and unprefixed content.
    ///
    /// # Example
    /// ```
    /// use paper_qa::Chunk;
    ///
    /// let chunk = Chunk::new(3, "attention is all you need");
    /// assert_eq!(chunk.text(), "[Page no. 3] \"attention is all you need\"");
    /// ```
    pub fn new(page_number: usize, content: &str) -> Self {
        Self {
            page_number,
            text: format!("[Page no. {}] \"{}\"", page_number, content),
        }
    }

    /// Page number this chunk is attributed to.
    pub fn page_number(&self) -> usize {
        self.page_number
    }

    /// The full tagged text, as embedded and handed to the prompt.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// The content without the page tag and surrounding quotes.
    ///
    /// Returns `""` if the text does not carry the expected tag.
    pub fn content(&self) -> &str {
        let prefix = format!("[Page no. {}] \"", self.page_number);
        self.text
            .strip_prefix(prefix.as_str())
            .and_then(|rest| rest.strip_suffix('"'))
            .unwrap_or("")
    }

    /// Number of space-separated words in the content.
    pub fn word_count(&self) -> usize {
        self.content().split(' ').filter(|w| !w.is_empty()).count()
    }
}

impl std::fmt::Display for Chunk {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.text)
    }
}

/// Tunables for chunking and retrieval.
///
/// Shared between the CLI and the retrieval session so both use the same
/// defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Maximum words per chunk
    pub word_length: usize,

    /// Page number of the first page handed to the chunker (1-based)
    pub start_page: usize,

    /// Number of nearest chunks returned per question
    pub neighbor_count: usize,

    /// Texts per embedding-provider call while fitting
    pub batch_size: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            word_length: DEFAULT_WORD_LENGTH,
            start_page: 1,
            neighbor_count: DEFAULT_NEIGHBOR_COUNT,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

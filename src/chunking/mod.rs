//! Page-aware text chunking.
//!
//! Splits per-page text into word-bounded chunks tagged with their page number.
//! Each page is walked in fixed windows of `word_length` words. A short final
//! window is not emitted on its own: its words are carried into the next page
//! and chunked there. The last page has nothing to carry into, so its tail is
//! always emitted.
//!
//! ```
//! use paper_qa::chunking::chunk_pages;
//!
//! let pages = vec!["a b c d e".to_string(), "f g".to_string()];
//! let chunks = chunk_pages(&pages, 2, 1).unwrap();
//! let texts: Vec<&str> = chunks.iter().map(|c| c.text()).collect();
//! assert_eq!(
//!     texts,
//!     vec![
//!         "[Page no. 1] \"a b\"",
//!         "[Page no. 1] \"c d\"",
//!         "[Page no. 2] \"e f\"",
//!         "[Page no. 2] \"g\"",
//!     ]
//! );
//! ```

use thiserror::Error;
use tracing::debug;

use crate::models::{Chunk, PageText};

/// Errors that can occur while chunking.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChunkError {
    /// A caller passed an argument outside its contract
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

/// Result type for chunking operations.
pub type ChunkResult<T> = Result<T, ChunkError>;

/// Split pages into page-tagged chunks of at most `word_length` words.
///
/// Pages are split on single spaces, so empty tokens produced by the split are
/// kept and an empty page yields one empty word. `start_page` is the page
/// number assigned to the first element of `pages`.
///
/// # Errors
/// Returns `ChunkError::InvalidArgument` if `word_length` is zero.
pub fn chunk_pages(
    pages: &[PageText],
    word_length: usize,
    start_page: usize,
) -> ChunkResult<Vec<Chunk>> {
    if word_length == 0 {
        return Err(ChunkError::InvalidArgument(
            "word_length must be a positive integer".to_string(),
        ));
    }

    let mut chunks = Vec::new();
    let mut carry: Vec<&str> = Vec::new();

    for (idx, page) in pages.iter().enumerate() {
        let is_last_page = idx + 1 == pages.len();
        let mut words = std::mem::take(&mut carry);
        words.extend(page.split(' '));

        carry = chunk_page(
            &words,
            idx + start_page,
            word_length,
            is_last_page,
            &mut chunks,
        );
    }

    debug!(
        "Chunked {} pages into {} chunks (word_length={})",
        pages.len(),
        chunks.len(),
        word_length
    );

    Ok(chunks)
}

/// Chunk one page's words, returning the short tail to carry into the next page.
fn chunk_page<'a>(
    words: &[&'a str],
    page_number: usize,
    word_length: usize,
    is_last_page: bool,
    out: &mut Vec<Chunk>,
) -> Vec<&'a str> {
    for start in (0..words.len()).step_by(word_length) {
        let end = (start + word_length).min(words.len());
        let window = &words[start..end];

        let is_final_window = start + word_length > words.len();
        if is_final_window && window.len() < word_length && !is_last_page {
            return window.to_vec();
        }

        let joined = window.join(" ");
        out.push(Chunk::new(page_number, joined.trim()));
    }

    Vec::new()
}

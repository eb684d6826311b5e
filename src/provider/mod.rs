//! Page text providers.
//!
//! This module defines the interface for sourcing per-page text from a
//! document, and includes a PDF implementation.
//!
//! The `PageSource` trait keeps the retrieval session independent of how page
//! text is obtained (PDF extraction, pre-extracted text, tests).

use async_trait::async_trait;
use thiserror::Error;

use crate::models::PageText;

pub mod pdf;

/// Errors that can occur when reading pages from a source.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Failed to read from the data source
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// The document does not exist
    #[error("File not found: {0}")]
    NotFound(String),

    /// The document is not of a supported type
    #[error("Invalid file: {0}")]
    InvalidFile(String),

    /// Failed to extract text from the document
    #[error("Extraction error: {0}")]
    ExtractionError(String),

    /// Requested page range lies outside the document
    #[error("Invalid page range: {0}")]
    InvalidRange(String),
}

/// Result type for provider operations.
pub type ProviderResult<T> = Result<T, ProviderError>;

/// Check that `start..=end` is a valid 1-based page range for a document of
/// `total` pages, returning the resolved end page.
///
/// # Errors
/// Returns `ProviderError::InvalidRange` unless `1 <= start <= total` and
/// `1 <= end <= total` (`end` defaults to `total`).
pub fn validate_range(start: usize, end: Option<usize>, total: usize) -> ProviderResult<usize> {
    if start < 1 || start > total {
        return Err(ProviderError::InvalidRange(format!(
            "start page must be between 1 and {} (got {})",
            total, start
        )));
    }

    let end = end.unwrap_or(total);
    if end < 1 || end > total {
        return Err(ProviderError::InvalidRange(format!(
            "end page must be between 1 and {} (got {})",
            total, end
        )));
    }

    Ok(end)
}

/// Trait for sources of page-level document text.
///
/// Pages are 1-based. Each returned string is one page, already normalized
/// to single spaces.
#[async_trait]
pub trait PageSource: Send + Sync {
    /// Total number of pages in the document.
    fn page_count(&self) -> usize;

    /// Return pages `start_page..=end_page` (`end_page` defaults to the last page).
    ///
    /// A `start_page` past `end_page` yields no pages.
    ///
    /// # Errors
    /// Returns `ProviderError::InvalidRange` if either bound is outside the document
    async fn get_pages(&self, start_page: usize, end_page: Option<usize>) -> ProviderResult<Vec<PageText>>;

    /// Human-readable name of the source, for logging.
    fn name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_range() {
        assert_eq!(validate_range(1, None, 10).unwrap(), 10);
        assert_eq!(validate_range(3, Some(5), 10).unwrap(), 5);
        assert_eq!(validate_range(10, Some(10), 10).unwrap(), 10);
    }

    #[test]
    fn test_validate_range_rejects_out_of_bounds() {
        assert!(matches!(validate_range(0, None, 10), Err(ProviderError::InvalidRange(_))));
        assert!(matches!(validate_range(11, None, 10), Err(ProviderError::InvalidRange(_))));
        assert!(matches!(validate_range(1, Some(0), 10), Err(ProviderError::InvalidRange(_))));
        assert!(matches!(validate_range(1, Some(11), 10), Err(ProviderError::InvalidRange(_))));
        assert!(matches!(validate_range(1, None, 0), Err(ProviderError::InvalidRange(_))));
    }
}

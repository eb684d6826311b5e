//! Embedding provider abstraction and implementations.
//!
//! This module defines the interface for turning text into fixed-dimension
//! vectors and provides a local (fastembed) and a hosted (OpenAI-compatible)
//! implementation.
//!
//! The abstraction lets the corpus index swap embedding models without
//! changing how chunks are fitted or queried.

pub mod fastembed;
pub mod openai;

use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;

/// Errors that can occur during embedding operations.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    /// Network or API communication error
    #[error("API request failed: {0}")]
    ApiError(String),

    /// Invalid input text (e.g., empty, too long)
    #[error("Invalid input text: {0}")]
    InvalidInput(String),

    /// Configuration error (e.g., missing API key)
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Provider returned a different number of vectors than texts sent
    #[error("Provider returned {actual} embeddings for {expected} texts")]
    CountMismatch { expected: usize, actual: usize },

    /// Other unexpected errors
    #[error("Unexpected error: {0}")]
    Other(String),
}

/// Result type for embedding operations.
pub type EmbeddingResult<T> = Result<T, EmbeddingError>;

/// Trait for text embedding providers.
///
/// Implementations must be deterministic for a given model version and must
/// return vectors in the same order as the input texts.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate an embedding vector for the given text.
    ///
    /// # Errors
    /// Returns `EmbeddingError` if the embedding generation fails
    async fn embed(&self, text: &str) -> EmbeddingResult<Vec<f32>>;

    /// Generate embeddings for multiple texts in a single call.
    ///
    /// # Returns
    /// A vector of embedding vectors, in the same order as the input texts
    ///
    /// # Errors
    /// Returns `EmbeddingError` if any embedding generation fails
    async fn embed_batch(&self, texts: &[&str]) -> EmbeddingResult<Vec<Vec<f32>>>;

    /// Number of dimensions in the vectors produced by this provider.
    fn dimension(&self) -> usize;

    /// Model identifier (e.g., "text-embedding-3-small").
    fn model_name(&self) -> &str;
}

/// Embed `texts` in consecutive slices of at most `batch_size` texts.
///
/// Results are concatenated in input order, so row `i` of the output always
/// belongs to `texts[i]` regardless of the batch size.
///
/// # Errors
/// Returns `EmbeddingError::InvalidInput` if `batch_size` is zero,
/// `EmbeddingError::CountMismatch` if the provider drops or adds rows, and
/// any error the provider itself reports.
pub async fn embed_in_batches<E>(
    provider: &E,
    texts: &[&str],
    batch_size: usize,
) -> EmbeddingResult<Vec<Vec<f32>>>
where
    E: EmbeddingProvider + ?Sized,
{
    if batch_size == 0 {
        return Err(EmbeddingError::InvalidInput(
            "batch size must be a positive integer".to_string(),
        ));
    }

    let mut embeddings = Vec::with_capacity(texts.len());
    for (batch_idx, batch) in texts.chunks(batch_size).enumerate() {
        debug!("Embedding batch {} ({} texts)", batch_idx, batch.len());
        let rows = provider.embed_batch(batch).await?;
        if rows.len() != batch.len() {
            return Err(EmbeddingError::CountMismatch {
                expected: batch.len(),
                actual: rows.len(),
            });
        }
        embeddings.extend(rows);
    }

    Ok(embeddings)
}

#[cfg(test)]
pub(crate) mod testing {
    //! Deterministic embedding provider shared by unit tests across modules.

    use super::*;
    use std::sync::Mutex;

    /// Embeds text as a small bag-of-letters histogram, so similar strings land close together.
    pub(crate) struct MockEmbeddingProvider {
        dimension: usize,
        should_fail: bool,
        batch_calls: Mutex<Vec<usize>>,
    }

    impl MockEmbeddingProvider {
        pub(crate) fn new() -> Self {
            Self {
                dimension: 26,
                should_fail: false,
                batch_calls: Mutex::new(Vec::new()),
            }
        }

        pub(crate) fn with_failure() -> Self {
            Self {
                should_fail: true,
                ..Self::new()
            }
        }

        pub(crate) fn batch_calls(&self) -> Vec<usize> {
            self.batch_calls.lock().unwrap().clone()
        }

        pub(crate) fn vector_for(&self, text: &str) -> Vec<f32> {
            let mut embedding = vec![0.0; self.dimension];
            for c in text.chars().filter(|c| c.is_ascii_alphabetic()) {
                let slot = (c.to_ascii_lowercase() as u8 - b'a') as usize;
                embedding[slot] += 1.0;
            }
            embedding
        }
    }

    #[async_trait]
    impl EmbeddingProvider for MockEmbeddingProvider {
        async fn embed(&self, text: &str) -> EmbeddingResult<Vec<f32>> {
            if self.should_fail {
                return Err(EmbeddingError::ApiError("Mock embedding failure".to_string()));
            }
            Ok(self.vector_for(text))
        }

        async fn embed_batch(&self, texts: &[&str]) -> EmbeddingResult<Vec<Vec<f32>>> {
            self.batch_calls.lock().unwrap().push(texts.len());
            let mut results = Vec::new();
            for text in texts {
                results.push(self.embed(text).await?);
            }
            Ok(results)
        }

        fn dimension(&self) -> usize {
            self.dimension
        }

        fn model_name(&self) -> &str {
            "mock-letters"
        }
    }
}

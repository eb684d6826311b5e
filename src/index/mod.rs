//! Exact nearest-neighbor index over chunk embeddings.
//!
//! The index owns one corpus at a time: `fit` embeds a chunk sequence and
//! replaces whatever was fitted before, `search` embeds a question and returns
//! the closest chunks by Euclidean distance. Search is brute force, which is
//! plenty for the few hundred chunks a single paper produces.
//!
//! # Usage
//!
//! ```rust,no_run
//! use paper_qa::chunking::chunk_pages;
//! use paper_qa::embedding::fastembed::FastEmbedProvider;
//! use paper_qa::index::CorpusIndex;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let pages = vec!["We propose a new network architecture".to_string()];
//! let chunks = chunk_pages(&pages, 150, 1)?;
//!
//! let mut index = CorpusIndex::new(FastEmbedProvider::new(None, None)?);
//! index.fit(chunks, 5, 1000).await?;
//!
//! for chunk in index.search("what architecture is proposed?").await? {
//!     println!("{}", chunk);
//! }
//! # Ok(())
//! # }
//! ```

use thiserror::Error;
use tracing::{debug, info};

use crate::embedding::{embed_in_batches, EmbeddingError, EmbeddingProvider};
use crate::models::Chunk;

/// Errors that can occur while fitting or querying the index.
#[derive(Debug, Error)]
pub enum IndexError {
    /// `search` was called before any `fit`
    #[error("Index has not been fitted yet")]
    NotFitted,

    /// The fitted corpus is empty, so there is nothing to return
    #[error("Index was fitted with no chunks; nothing to search")]
    InsufficientData,

    /// Vectors of different lengths were mixed
    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Embedding generation failed
    #[error("Embedding error: {0}")]
    Embedding(#[from] EmbeddingError),
}

/// Result type for index operations.
pub type IndexResult<T> = Result<T, IndexError>;

/// A single search hit.
#[derive(Debug, Clone, PartialEq)]
pub struct Neighbor<'a> {
    /// Position of the chunk in the fitted sequence
    pub index: usize,

    /// Euclidean distance between the query and the chunk embedding
    pub distance: f32,

    /// The matched chunk
    pub chunk: &'a Chunk,
}

/// State produced by one successful `fit`.
#[derive(Debug)]
struct FittedCorpus {
    chunks: Vec<Chunk>,
    embeddings: Vec<Vec<f32>>,
    neighbor_count: usize,
}

/// Euclidean distance between two vectors of equal length.
///
/// # Panics
/// Panics if the vectors have different lengths
pub fn euclidean_distance(a: &[f32], b: &[f32]) -> f32 {
    assert_eq!(a.len(), b.len(), "Vectors must have the same length");

    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f32>()
        .sqrt()
}

/// Brute-force nearest-neighbor index over one fitted corpus.
///
/// `fit` takes `&mut self` and `search` takes `&self`, so a refit can never
/// overlap a query on the same index.
pub struct CorpusIndex<E>
where
    E: EmbeddingProvider,
{
    /// Embedding provider used for both chunks and queries
    embedding_provider: E,

    /// `None` until the first `fit`
    corpus: Option<FittedCorpus>,
}

impl<E> CorpusIndex<E>
where
    E: EmbeddingProvider,
{
    /// Create an empty, unfitted index.
    pub fn new(embedding_provider: E) -> Self {
        Self {
            embedding_provider,
            corpus: None,
        }
    }

    /// The embedding provider backing this index.
    pub fn provider(&self) -> &E {
        &self.embedding_provider
    }

    /// Embed `chunks` and make them the searchable corpus.
    ///
    /// The neighbor count is clamped to the number of chunks. On error the
    /// previously fitted corpus, if any, is left in place.
    ///
    /// # Arguments
    /// * `chunks` - Chunks to index, in retrieval-index order
    /// * `neighbor_count` - Number of neighbors each search returns
    /// * `batch_size` - Maximum texts per embedding-provider call
    ///
    /// # Errors
    /// Returns `IndexError::Embedding` if embedding fails and
    /// `IndexError::DimensionMismatch` if the provider returns ragged vectors
    pub async fn fit(
        &mut self,
        chunks: Vec<Chunk>,
        neighbor_count: usize,
        batch_size: usize,
    ) -> IndexResult<()> {
        let texts: Vec<&str> = chunks.iter().map(Chunk::text).collect();
        let embeddings = embed_in_batches(&self.embedding_provider, &texts, batch_size).await?;

        if let Some(first) = embeddings.first() {
            let expected = first.len();
            if let Some(row) = embeddings.iter().find(|row| row.len() != expected) {
                return Err(IndexError::DimensionMismatch {
                    expected,
                    actual: row.len(),
                });
            }
        }

        let neighbor_count = neighbor_count.min(embeddings.len());
        info!(
            "Fitted corpus: {} chunks, {} neighbors per query",
            chunks.len(),
            neighbor_count
        );

        self.corpus = Some(FittedCorpus {
            chunks,
            embeddings,
            neighbor_count,
        });

        Ok(())
    }

    /// Return the nearest chunks to `query`, nearest first.
    ///
    /// # Errors
    /// Returns `IndexError::NotFitted` before the first `fit`,
    /// `IndexError::InsufficientData` if the corpus is empty, and
    /// embedding or dimension errors for the query vector
    pub async fn search(&self, query: &str) -> IndexResult<Vec<Chunk>> {
        let neighbors = self.search_with_distances(query).await?;
        Ok(neighbors.into_iter().map(|n| n.chunk.clone()).collect())
    }

    /// Like [`search`](Self::search) but returns positions in the fitted sequence.
    pub async fn search_indices(&self, query: &str) -> IndexResult<Vec<usize>> {
        let neighbors = self.search_with_distances(query).await?;
        Ok(neighbors.into_iter().map(|n| n.index).collect())
    }

    /// Return the nearest neighbors with their distances, nearest first.
    ///
    /// Ties are broken by position in the fitted sequence.
    pub async fn search_with_distances(&self, query: &str) -> IndexResult<Vec<Neighbor<'_>>> {
        let corpus = self.corpus.as_ref().ok_or(IndexError::NotFitted)?;
        if corpus.neighbor_count == 0 {
            return Err(IndexError::InsufficientData);
        }

        let query_embedding = self.embedding_provider.embed(query).await?;
        let expected = corpus.embeddings[0].len();
        if query_embedding.len() != expected {
            return Err(IndexError::DimensionMismatch {
                expected,
                actual: query_embedding.len(),
            });
        }

        let mut scored: Vec<(usize, f32)> = corpus
            .embeddings
            .iter()
            .map(|row| euclidean_distance(&query_embedding, row))
            .enumerate()
            .collect();

        // Stable sort keeps insertion order between equal distances.
        scored.sort_by(|a, b| a.1.total_cmp(&b.1));
        scored.truncate(corpus.neighbor_count);

        debug!("Query matched chunks {:?}", scored.iter().map(|s| s.0).collect::<Vec<_>>());

        Ok(scored
            .into_iter()
            .map(|(index, distance)| Neighbor {
                index,
                distance,
                chunk: &corpus.chunks[index],
            })
            .collect())
    }

    /// Whether `fit` has completed at least once.
    pub fn is_fitted(&self) -> bool {
        self.corpus.is_some()
    }

    /// Number of fitted chunks (zero when unfitted).
    pub fn len(&self) -> usize {
        self.corpus.as_ref().map_or(0, |c| c.chunks.len())
    }

    /// Whether the index holds no chunks.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Neighbors returned per search (zero when unfitted).
    pub fn neighbor_count(&self) -> usize {
        self.corpus.as_ref().map_or(0, |c| c.neighbor_count)
    }

    /// The fitted chunks, in fit order.
    pub fn chunks(&self) -> &[Chunk] {
        self.corpus
            .as_ref()
            .map(|c| c.chunks.as_slice())
            .unwrap_or_default()
    }

    /// The embedding matrix, one row per fitted chunk.
    pub fn embeddings(&self) -> &[Vec<f32>] {
        self.corpus
            .as_ref()
            .map(|c| c.embeddings.as_slice())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::testing::MockEmbeddingProvider;
    use crate::embedding::EmbeddingResult;
    use async_trait::async_trait;
    use std::collections::HashMap;

    /// Provider that looks vectors up in a fixed table keyed by text.
    struct TableProvider {
        table: HashMap<String, Vec<f32>>,
    }

    impl TableProvider {
        fn new(entries: &[(&str, Vec<f32>)]) -> Self {
            Self {
                table: entries
                    .iter()
                    .map(|(text, vector)| (text.to_string(), vector.clone()))
                    .collect(),
            }
        }
    }

    #[async_trait]
    impl EmbeddingProvider for TableProvider {
        async fn embed(&self, text: &str) -> EmbeddingResult<Vec<f32>> {
            self.table
                .get(text)
                .cloned()
                .ok_or_else(|| EmbeddingError::InvalidInput(format!("unknown text: {}", text)))
        }

        async fn embed_batch(&self, texts: &[&str]) -> EmbeddingResult<Vec<Vec<f32>>> {
            let mut rows = Vec::new();
            for text in texts {
                rows.push(self.embed(text).await?);
            }
            Ok(rows)
        }

        fn dimension(&self) -> usize {
            2
        }

        fn model_name(&self) -> &str {
            "table"
        }
    }

    fn chunk(page: usize, content: &str) -> Chunk {
        Chunk::new(page, content)
    }

    fn table_index(points: &[(&str, [f32; 2])], query: [f32; 2]) -> (CorpusIndex<TableProvider>, Vec<Chunk>) {
        let chunks: Vec<Chunk> = points.iter().map(|(c, _)| chunk(1, c)).collect();
        let provider = {
            let mut entries: Vec<(&str, Vec<f32>)> = chunks
                .iter()
                .zip(points.iter())
                .map(|(c, (_, v))| (c.text(), v.to_vec()))
                .collect();
            entries.push(("query", query.to_vec()));
            TableProvider::new(&entries)
        };
        (CorpusIndex::new(provider), chunks)
    }

    #[test]
    fn test_euclidean_distance() {
        assert!((euclidean_distance(&[0.0, 0.0], &[3.0, 4.0]) - 5.0).abs() < 1e-6);
        assert_eq!(euclidean_distance(&[1.0, 2.0], &[1.0, 2.0]), 0.0);
    }

    #[tokio::test]
    async fn test_search_before_fit_fails() {
        let index = CorpusIndex::new(MockEmbeddingProvider::new());
        assert!(!index.is_fitted());
        assert!(matches!(index.search("anything").await, Err(IndexError::NotFitted)));
        assert!(matches!(index.search_indices("anything").await, Err(IndexError::NotFitted)));
    }

    #[tokio::test]
    async fn test_fit_keeps_chunks_and_embeddings_aligned() {
        let mut index = CorpusIndex::new(MockEmbeddingProvider::new());
        let chunks = vec![chunk(1, "alpha"), chunk(1, "beta"), chunk(2, "gamma")];

        index.fit(chunks.clone(), 5, 1000).await.unwrap();

        assert!(index.is_fitted());
        assert_eq!(index.len(), 3);
        assert_eq!(index.embeddings().len(), index.chunks().len());
        assert_eq!(index.chunks(), chunks.as_slice());
        assert_eq!(index.neighbor_count(), 3);
    }

    #[tokio::test]
    async fn test_neighbor_count_is_not_clamped_when_corpus_is_large() {
        let mut index = CorpusIndex::new(MockEmbeddingProvider::new());
        let chunks: Vec<Chunk> = (0..10).map(|i| chunk(1, &format!("c{}", i))).collect();

        index.fit(chunks, 4, 3).await.unwrap();

        assert_eq!(index.neighbor_count(), 4);
        assert_eq!(index.provider().batch_calls(), vec![3, 3, 3, 1]);
        assert_eq!(index.search("c").await.unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_results_ordered_by_ascending_distance() {
        let (mut index, chunks) = table_index(
            &[("far", [10.0, 0.0]), ("near", [1.0, 0.0]), ("mid", [0.0, 4.0])],
            [0.0, 0.0],
        );
        index.fit(chunks.clone(), 3, 1000).await.unwrap();

        let neighbors = index.search_with_distances("query").await.unwrap();
        let order: Vec<usize> = neighbors.iter().map(|n| n.index).collect();
        assert_eq!(order, vec![1, 2, 0]);
        assert!((neighbors[0].distance - 1.0).abs() < 1e-6);
        assert!((neighbors[2].distance - 10.0).abs() < 1e-6);

        let found = index.search("query").await.unwrap();
        assert_eq!(found, vec![chunks[1].clone(), chunks[2].clone(), chunks[0].clone()]);
    }

    #[tokio::test]
    async fn test_identical_embeddings_keep_insertion_order() {
        let (mut index, chunks) = table_index(
            &[("x", [5.0, 5.0]), ("first twin", [1.0, 1.0]), ("second twin", [1.0, 1.0])],
            [0.0, 0.0],
        );
        index.fit(chunks, 2, 1000).await.unwrap();

        assert_eq!(index.search_indices("query").await.unwrap(), vec![1, 2]);
    }

    #[tokio::test]
    async fn test_empty_fit_then_search_fails_cleanly() {
        let mut index = CorpusIndex::new(MockEmbeddingProvider::new());
        index.fit(Vec::new(), 5, 1000).await.unwrap();

        assert!(index.is_fitted());
        assert!(index.is_empty());
        assert_eq!(index.neighbor_count(), 0);
        assert!(matches!(index.search("q").await, Err(IndexError::InsufficientData)));
    }

    #[tokio::test]
    async fn test_refit_replaces_previous_corpus() {
        let mut index = CorpusIndex::new(MockEmbeddingProvider::new());
        index.fit(vec![chunk(1, "old"), chunk(1, "older")], 5, 1000).await.unwrap();
        index.fit(vec![chunk(7, "new")], 5, 1000).await.unwrap();

        assert_eq!(index.len(), 1);
        assert_eq!(index.neighbor_count(), 1);
        let found = index.search("new").await.unwrap();
        assert_eq!(found[0].page_number(), 7);
    }

    #[tokio::test]
    async fn test_failed_fit_leaves_previous_corpus() {
        let (mut index, chunks) = table_index(&[("kept", [0.0, 1.0])], [0.0, 0.0]);
        index.fit(chunks, 5, 1000).await.unwrap();

        // The table has no vector for this chunk, so embedding fails.
        let result = index.fit(vec![chunk(2, "unknown")], 5, 1000).await;

        assert!(matches!(result, Err(IndexError::Embedding(_))));
        assert_eq!(index.len(), 1);
        assert_eq!(index.chunks()[0].content(), "kept");
    }

    #[tokio::test]
    async fn test_query_dimension_mismatch() {
        let chunks = vec![chunk(1, "a")];
        let provider = TableProvider::new(&[(chunks[0].text(), vec![1.0, 0.0]), ("query", vec![1.0])]);
        let mut index = CorpusIndex::new(provider);
        index.fit(chunks, 1, 1000).await.unwrap();

        assert!(matches!(
            index.search("query").await,
            Err(IndexError::DimensionMismatch { expected: 2, actual: 1 })
        ));
    }

    #[tokio::test]
    async fn test_ragged_embeddings_rejected_at_fit() {
        let chunks = vec![chunk(1, "a"), chunk(1, "b")];
        let provider = TableProvider::new(&[
            (chunks[0].text(), vec![1.0, 0.0]),
            (chunks[1].text(), vec![1.0, 0.0, 0.0]),
        ]);
        let mut index = CorpusIndex::new(provider);

        assert!(matches!(
            index.fit(chunks, 1, 1000).await,
            Err(IndexError::DimensionMismatch { expected: 2, actual: 3 })
        ));
        assert!(!index.is_fitted());
    }

    #[tokio::test]
    async fn test_fit_embedding_error_propagates() {
        let mut index = CorpusIndex::new(MockEmbeddingProvider::with_failure());
        assert!(matches!(
            index.fit(vec![chunk(1, "a")], 5, 1000).await,
            Err(IndexError::Embedding(EmbeddingError::ApiError(_)))
        ));
    }
}

//! OpenAI-compatible embedding provider.
//!
//! Calls `POST {base_url}/embeddings`, which is served by OpenAI and by most
//! self-hosted gateways that mimic its API.

use super::{EmbeddingError, EmbeddingProvider, EmbeddingResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Default API root for the hosted OpenAI service.
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// OpenAI embedding provider configuration.
#[derive(Debug, Clone)]
pub struct OpenAIEmbedding {
    client: reqwest::Client,

    /// API key sent as a bearer token
    api_key: String,

    /// API root, without a trailing slash
    base_url: String,

    /// Model identifier (e.g., "text-embedding-3-small")
    model: String,

    /// Expected dimension of the embedding vectors
    embedding_dimension: usize,
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [&'a str],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingRow>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingRow {
    index: usize,
    embedding: Vec<f32>,
}

impl OpenAIEmbedding {
    /// Create a new OpenAI embedding provider.
    ///
    /// # Arguments
    /// * `api_key` - API key
    /// * `model` - Model name (defaults to "text-embedding-3-small" if None)
    /// * `base_url` - API root (defaults to [`DEFAULT_BASE_URL`] if None)
    pub fn new(api_key: String, model: Option<String>, base_url: Option<String>) -> Self {
        let model = model.unwrap_or_else(|| crate::DEFAULT_EMBEDDING_MODEL.to_string());
        let embedding_dimension = match model.as_str() {
            "text-embedding-3-large" => 3072,
            _ => crate::DEFAULT_EMBEDDING_DIMENSION,
        };
        let base_url = base_url
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
            .trim_end_matches('/')
            .to_string();

        Self {
            client: reqwest::Client::new(),
            api_key,
            base_url,
            model,
            embedding_dimension,
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/embeddings", self.base_url)
    }
}

/// Put response rows back into request order and check none are missing.
fn into_ordered_rows(mut rows: Vec<EmbeddingRow>, expected: usize) -> EmbeddingResult<Vec<Vec<f32>>> {
    if rows.len() != expected {
        return Err(EmbeddingError::CountMismatch {
            expected,
            actual: rows.len(),
        });
    }
    rows.sort_by_key(|row| row.index);
    if rows.iter().enumerate().any(|(i, row)| row.index != i) {
        return Err(EmbeddingError::Other(
            "Embedding response has duplicate or out-of-range indices".to_string(),
        ));
    }
    Ok(rows.into_iter().map(|row| row.embedding).collect())
}

#[async_trait]
impl EmbeddingProvider for OpenAIEmbedding {
    async fn embed(&self, text: &str) -> EmbeddingResult<Vec<f32>> {
        self.embed_batch(&[text])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| EmbeddingError::Other("No embedding generated".to_string()))
    }

    async fn embed_batch(&self, texts: &[&str]) -> EmbeddingResult<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }
        if self.api_key.is_empty() {
            return Err(EmbeddingError::ConfigError("API key is empty".to_string()));
        }

        let url = self.endpoint();
        debug!("Embedding request to {} ({} texts)", url, texts.len());

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&EmbeddingRequest {
                model: &self.model,
                input: texts,
            })
            .send()
            .await
            .map_err(|e| EmbeddingError::ApiError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EmbeddingError::ApiError(format!("{}: {}", status, body)));
        }

        let parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| EmbeddingError::Other(format!("Failed to parse embedding response: {}", e)))?;

        into_ordered_rows(parsed.data, texts.len())
    }

    fn dimension(&self) -> usize {
        self.embedding_dimension
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let provider = OpenAIEmbedding::new("key".to_string(), None, None);
        assert_eq!(provider.model_name(), "text-embedding-3-small");
        assert_eq!(provider.dimension(), 1536);
        assert_eq!(provider.endpoint(), "https://api.openai.com/v1/embeddings");
    }

    #[test]
    fn test_large_model_and_custom_base_url() {
        let provider = OpenAIEmbedding::new(
            "key".to_string(),
            Some("text-embedding-3-large".to_string()),
            Some("http://localhost:8080/v1/".to_string()),
        );
        assert_eq!(provider.dimension(), 3072);
        assert_eq!(provider.endpoint(), "http://localhost:8080/v1/embeddings");
    }

    #[test]
    fn test_response_rows_are_reordered_by_index() {
        let body = r#"{"data":[
            {"index":1,"embedding":[0.0,1.0]},
            {"index":0,"embedding":[1.0,0.0]}
        ],"model":"m"}"#;
        let parsed: EmbeddingResponse = serde_json::from_str(body).unwrap();

        let rows = into_ordered_rows(parsed.data, 2).unwrap();
        assert_eq!(rows, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
    }

    #[test]
    fn test_missing_rows_are_rejected() {
        let rows = vec![EmbeddingRow {
            index: 0,
            embedding: vec![1.0],
        }];
        assert!(matches!(
            into_ordered_rows(rows, 2),
            Err(EmbeddingError::CountMismatch { expected: 2, actual: 1 })
        ));
    }

    #[test]
    fn test_duplicate_indices_are_rejected() {
        let rows = vec![
            EmbeddingRow { index: 0, embedding: vec![1.0] },
            EmbeddingRow { index: 0, embedding: vec![2.0] },
        ];
        assert!(matches!(into_ordered_rows(rows, 2), Err(EmbeddingError::Other(_))));
    }

    #[tokio::test]
    async fn test_empty_batch_skips_request() {
        let provider = OpenAIEmbedding::new(String::new(), None, None);
        assert!(provider.embed_batch(&[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_empty_api_key_is_a_config_error() {
        let provider = OpenAIEmbedding::new(String::new(), None, None);
        let result = provider.embed("hello").await;
        assert!(matches!(result, Err(EmbeddingError::ConfigError(_))));
    }
}

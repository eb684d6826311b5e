//! Answer generation from retrieved chunks.
//!
//! Builds the citation prompt from the nearest chunks and the user's question
//! and sends it to a hosted chat model. Generation never fails from the
//! caller's point of view: provider errors come back as an `"API Error: ..."`
//! answer string.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::models::Chunk;

/// Sampling temperature for answer generation.
pub const DEFAULT_TEMPERATURE: f32 = 0.7;

/// Upper bound on generated tokens.
pub const DEFAULT_MAX_TOKENS: u32 = 4096;

/// Default chat model name.
pub const DEFAULT_CHAT_MODEL: &str = "gpt-4o-mini";

const INSTRUCTIONS: &str = "Instructions: Compose a comprehensive reply to the query using the search results given. \
Cite each reference using [ Page Number] notation (every result has this number at the beginning). \
Citation should be done at the end of each sentence. If the search results mention multiple subjects \
with the same name, create separate answers for each. Only include information found in the results and \
don't add any additional information. Make sure the answer is correct and don't output false content. \
If the text does not relate to the query, simply state 'Text Not Found in PDF'. Ignore outlier \
search results which has nothing to do with the question. Only answer what is asked. The \
answer should be short and concise. Answer step-by-step. ";

/// Errors reported by a chat backend.
#[derive(Debug, Error)]
pub enum ChatError {
    /// Request could not be sent or the body could not be read
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The API answered with a non-success status
    #[error("API returned {status}: {body}")]
    Status { status: u16, body: String },

    /// The response did not contain a message
    #[error("Failed to parse response: {0}")]
    Parse(String),

    /// Missing credentials or endpoint
    #[error("Chat provider not configured: {0}")]
    NotConfigured(String),
}

/// Build the prompt sent to the chat model.
///
/// Every chunk is listed verbatim, so the `[Page no. N]` tags reach the model
/// and can be cited back.
pub fn compose_prompt(question: &str, chunks: &[Chunk]) -> String {
    let mut prompt = String::from("search results:\n\n");
    for chunk in chunks {
        prompt.push_str(chunk.text());
        prompt.push_str("\n\n");
    }
    prompt.push_str(INSTRUCTIONS);
    prompt.push_str(&format!("\n\nQuery: {}\nAnswer: ", question));
    prompt
}

/// Turns a question and its supporting chunks into an answer.
///
/// Implementations report failures inside the returned string instead of
/// returning an error.
#[async_trait]
pub trait AnswerGenerator: Send + Sync {
    /// Produce an answer for `question` grounded in `context_chunks`.
    async fn generate(&self, question: &str, context_chunks: &[Chunk]) -> String;
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    content: Option<String>,
}

/// Connection settings for an OpenAI-compatible chat endpoint.
#[derive(Debug, Clone)]
pub struct ChatConfig {
    /// Bearer token
    pub api_key: String,

    /// API root, e.g. `https://api.openai.com/v1`
    pub base_url: String,

    /// Model name sent with each request
    pub model: String,

    /// Sampling temperature
    pub temperature: f32,

    /// Maximum tokens to generate
    pub max_tokens: u32,
}

impl ChatConfig {
    /// Settings with the default model, temperature and token limit.
    pub fn new(api_key: String, base_url: String) -> Self {
        Self {
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: DEFAULT_CHAT_MODEL.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }

    /// Override the model name.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }
}

/// Answer generator backed by an OpenAI-compatible `/chat/completions` endpoint.
pub struct ChatAnswerGenerator {
    client: reqwest::Client,
    config: ChatConfig,
}

impl ChatAnswerGenerator {
    /// Create a generator for the given endpoint.
    pub fn new(config: ChatConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    /// Send `prompt` as a single user message and return the reply text.
    ///
    /// # Errors
    /// Returns `ChatError` on transport failure, non-success status or a reply
    /// without content
    pub async fn complete(&self, prompt: &str) -> Result<String, ChatError> {
        if self.config.api_key.is_empty() {
            return Err(ChatError::NotConfigured("API key is empty".to_string()));
        }

        let url = format!("{}/chat/completions", self.config.base_url);
        let body = ChatRequest {
            model: &self.config.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
        };

        debug!("Chat request to {} (model={})", url, self.config.model);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ChatError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ChatResponse = response.json().await?;
        extract_reply(parsed)
    }
}

fn extract_reply(response: ChatResponse) -> Result<String, ChatError> {
    response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .ok_or_else(|| ChatError::Parse("missing choices[0].message.content".to_string()))
}

#[async_trait]
impl AnswerGenerator for ChatAnswerGenerator {
    async fn generate(&self, question: &str, context_chunks: &[Chunk]) -> String {
        let prompt = compose_prompt(question, context_chunks);
        match self.complete(&prompt).await {
            Ok(answer) => answer,
            Err(e) => {
                warn!("Chat completion failed: {}", e);
                format!("API Error: {}", e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compose_prompt_layout() {
        let chunks = vec![Chunk::new(1, "alpha"), Chunk::new(3, "beta")];
        let prompt = compose_prompt("What is beta?", &chunks);

        assert!(prompt.starts_with(
            "search results:\n\n[Page no. 1] \"alpha\"\n\n[Page no. 3] \"beta\"\n\nInstructions: "
        ));
        assert!(prompt.ends_with("Answer step-by-step. \n\nQuery: What is beta?\nAnswer: "));
        assert!(prompt.contains("'Text Not Found in PDF'"));
    }

    #[test]
    fn test_compose_prompt_without_chunks() {
        let prompt = compose_prompt("q", &[]);
        assert!(prompt.starts_with("search results:\n\nInstructions: "));
    }

    #[test]
    fn test_extract_reply() {
        let body = r#"{"choices":[{"index":0,"message":{"role":"assistant","content":"It is a letter [Page no. 3]."}}]}"#;
        let parsed: ChatResponse = serde_json::from_str(body).unwrap();
        assert_eq!(extract_reply(parsed).unwrap(), "It is a letter [Page no. 3].");
    }

    #[test]
    fn test_extract_reply_without_choices() {
        let parsed: ChatResponse = serde_json::from_str(r#"{"choices":[]}"#).unwrap();
        assert!(matches!(extract_reply(parsed), Err(ChatError::Parse(_))));
    }

    #[test]
    fn test_chat_config_trims_base_url() {
        let config = ChatConfig::new("k".to_string(), "http://localhost:1234/v1/".to_string())
            .with_model("local-model");
        assert_eq!(config.base_url, "http://localhost:1234/v1");
        assert_eq!(config.model, "local-model");
        assert_eq!(config.max_tokens, 4096);
    }

    #[tokio::test]
    async fn test_generate_reports_errors_as_text() {
        let generator = ChatAnswerGenerator::new(ChatConfig::new(
            String::new(),
            "http://127.0.0.1:9".to_string(),
        ));
        let answer = generator.generate("q", &[Chunk::new(1, "x")]).await;
        assert_eq!(answer, "API Error: Chat provider not configured: API key is empty");
    }
}

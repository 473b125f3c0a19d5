//! LLM client for chat completion and embeddings
//!
//! Talks to an OpenAI-compatible HTTP endpoint (LM Studio, llama.cpp server,
//! vLLM). Chat requests are validated and checked against the token budget
//! before they leave the process. Every failure is logged and surfaces as
//! `None` to the caller; nothing at this layer retries.

pub mod json;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

use crate::config::Config;

pub use json::extract_json;

/// Tokens added to every estimate, the character ratio being approximate
pub const TOKEN_ESTIMATE_MARGIN: i64 = 50;

/// Configuration for LLM client
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// Chat completion endpoint URL
    pub chat_url: String,

    /// Chat model name
    pub chat_model: String,

    /// Embedding endpoint URL
    pub embedding_url: String,

    /// Embedding model name
    pub embedding_model: String,

    /// Token budget of a single chat request
    pub max_tokens: i64,

    /// Approximate tokens per 100 characters of prompt text
    pub tokens_per_100_characters: i64,

    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            chat_url: "http://localhost:1234/v1/chat/completions".to_string(),
            chat_model: "local-model".to_string(),
            embedding_url: "http://localhost:1234/v1/embeddings".to_string(),
            embedding_model: "local-embedding".to_string(),
            max_tokens: 4096,
            tokens_per_100_characters: 25,
            timeout_secs: 120,
        }
    }
}

impl LlmConfig {
    /// Build from the loaded configuration
    pub fn from_config(config: &Config) -> Self {
        Self {
            chat_url: config.llm_chat_url.clone(),
            chat_model: config.llm_chat_model.clone(),
            embedding_url: config.llm_embedding_url.clone(),
            embedding_model: config.llm_embedding_model.clone(),
            max_tokens: config.llm_max_tokens,
            tokens_per_100_characters: config.llm_tokens_per_100_characters,
            timeout_secs: config.http_timeout_secs,
        }
    }

    /// Estimated tokens for `chars` characters of prompt, margin included
    pub fn estimate_tokens(&self, chars: usize) -> i64 {
        let scaled = chars as i64 * self.tokens_per_100_characters;
        // ceiling division on non-negative operands
        (scaled + 99) / 100 + TOKEN_ESTIMATE_MARGIN
    }
}

/// Errors raised while talking to the LLM endpoints
#[derive(Error, Debug)]
pub enum LlmError {
    #[error("Validation error: {0}")]
    InvalidMessages(String),

    #[error(
        "Cannot process since the number of tokens surpasses the limit established in the configuration file. Query Tokens: {estimated}, LLM Token Limit: {limit}"
    )]
    TokenBudget { estimated: i64, limit: i64 },

    #[error("Request error: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Request error: {status} - {body}")]
    Status { status: u16, body: String },

    #[error("Validation error: {0}")]
    InvalidResponse(String),
}

/// Chat role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One chat message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// Chat and embedding operations used by the pipeline
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Chat completion; `None` on any failure
    async fn chat(&self, messages: &[ChatMessage]) -> Option<String>;

    /// Embedding of `text`; `None` on any failure
    async fn embed(&self, text: &str) -> Option<Vec<f32>>;
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: u8,
    max_tokens: i64,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
}

/// HTTP client for the chat and embedding endpoints
#[derive(Debug, Clone)]
pub struct LlmClient {
    client: Client,
    config: LlmConfig,
}

impl LlmClient {
    /// Create a new LLM client
    pub fn new(config: LlmConfig) -> Result<Self, LlmError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self { client, config })
    }

    pub fn config(&self) -> &LlmConfig {
        &self.config
    }

    /// Reject message lists without a system and a user entry, or over budget
    pub fn validate(&self, messages: &[ChatMessage]) -> Result<(), LlmError> {
        if !messages.iter().any(|m| m.role == Role::System) {
            return Err(LlmError::InvalidMessages(
                "messages must contain at least one message with role 'system'".to_string(),
            ));
        }
        if !messages.iter().any(|m| m.role == Role::User) {
            return Err(LlmError::InvalidMessages(
                "messages must contain at least one message with role 'user'".to_string(),
            ));
        }

        let chars: usize = messages.iter().map(|m| m.content.chars().count()).sum();
        let estimated = self.config.estimate_tokens(chars);
        if estimated > self.config.max_tokens {
            return Err(LlmError::TokenBudget {
                estimated,
                limit: self.config.max_tokens,
            });
        }
        Ok(())
    }

    /// Chat completion, errors included
    pub async fn try_chat(&self, messages: &[ChatMessage]) -> Result<String, LlmError> {
        self.validate(messages)?;

        let request = ChatRequest {
            model: &self.config.chat_model,
            messages,
            temperature: 0,
            max_tokens: -1,
            stream: false,
        };
        let body = self.post(&self.config.chat_url, &request).await?;
        parse_chat_response(&body)
    }

    /// Embedding, errors included
    pub async fn try_embed(&self, text: &str) -> Result<Vec<f32>, LlmError> {
        if text.is_empty() {
            tracing::warn!("Text to embed is empty string");
        }

        let request = EmbeddingRequest {
            model: &self.config.embedding_model,
            input: text,
        };
        let body = self.post(&self.config.embedding_url, &request).await?;
        parse_embedding_response(&body)
    }

    async fn post<T: Serialize + ?Sized>(&self, url: &str, request: &T) -> Result<Value, LlmError> {
        let response = self.client.post(url).json(request).send().await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Status { status, body });
        }

        Ok(response.json().await?)
    }
}

#[async_trait]
impl LanguageModel for LlmClient {
    async fn chat(&self, messages: &[ChatMessage]) -> Option<String> {
        match self.try_chat(messages).await {
            Ok(content) => Some(content),
            Err(e) => {
                tracing::error!("{e}");
                None
            }
        }
    }

    async fn embed(&self, text: &str) -> Option<Vec<f32>> {
        match self.try_embed(text).await {
            Ok(vector) => Some(vector),
            Err(e) => {
                tracing::error!("{e}");
                None
            }
        }
    }
}

/// `choices[0].message.content` of a chat response
pub fn parse_chat_response(body: &Value) -> Result<String, LlmError> {
    let choices = body
        .get("choices")
        .ok_or_else(|| invalid("Response didn't include the block 'choices'"))?
        .as_array()
        .ok_or_else(|| invalid("Response didn't include message list"))?;
    let first = choices
        .first()
        .ok_or_else(|| invalid("Response replied with empty message list"))?;
    let message = first
        .get("message")
        .ok_or_else(|| invalid("Response didn't include the block 'message'"))?;

    message
        .get("content")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| invalid("Response didn't include the block 'content'"))
}

/// `data[0].embedding` of an embedding response
pub fn parse_embedding_response(body: &Value) -> Result<Vec<f32>, LlmError> {
    let data = body
        .get("data")
        .ok_or_else(|| invalid("Response didn't include the block 'data'"))?
        .as_array()
        .ok_or_else(|| invalid("Response didn't include message list"))?;
    let first = data
        .first()
        .ok_or_else(|| invalid("Response replied with empty message list"))?;
    let embedding = first
        .get("embedding")
        .and_then(Value::as_array)
        .ok_or_else(|| invalid("Response didn't include the block 'embedding'"))?;

    embedding
        .iter()
        .map(|v| v.as_f64().map(|f| f as f32))
        .collect::<Option<Vec<f32>>>()
        .ok_or_else(|| invalid("Embedding contains non-numeric values"))
}

fn invalid(msg: &str) -> LlmError {
    LlmError::InvalidResponse(msg.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn client(max_tokens: i64) -> LlmClient {
        LlmClient::new(LlmConfig {
            max_tokens,
            tokens_per_100_characters: 30,
            ..LlmConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn test_estimate_tokens_rounds_up() {
        let config = LlmConfig {
            tokens_per_100_characters: 30,
            ..LlmConfig::default()
        };
        assert_eq!(config.estimate_tokens(0), 50);
        assert_eq!(config.estimate_tokens(100), 80);
        assert_eq!(config.estimate_tokens(101), 81);
        assert_eq!(config.estimate_tokens(1), 51);
    }

    #[test]
    fn test_validate_requires_system_and_user() {
        let c = client(1000);
        let err = c.validate(&[ChatMessage::user("hi")]).unwrap_err();
        assert!(err.to_string().contains("role 'system'"));

        let err = c.validate(&[ChatMessage::system("be brief")]).unwrap_err();
        assert!(err.to_string().contains("role 'user'"));

        assert!(c
            .validate(&[ChatMessage::system("be brief"), ChatMessage::user("hi")])
            .is_ok());
    }

    #[test]
    fn test_validate_token_budget() {
        let c = client(80);
        let msgs = [ChatMessage::system("x".repeat(50)), ChatMessage::user("y".repeat(50))];
        assert!(c.validate(&msgs).is_ok());

        let msgs = [ChatMessage::system("x".repeat(50)), ChatMessage::user("y".repeat(51))];
        assert!(matches!(
            c.validate(&msgs),
            Err(LlmError::TokenBudget { estimated: 81, limit: 80 })
        ));
    }

    #[test]
    fn test_chat_request_shape() {
        let msgs = [ChatMessage::system("s"), ChatMessage::user("u")];
        let request = ChatRequest {
            model: "m",
            messages: &msgs,
            temperature: 0,
            max_tokens: -1,
            stream: false,
        };
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({
                "model": "m",
                "messages": [{"role": "system", "content": "s"}, {"role": "user", "content": "u"}],
                "temperature": 0,
                "max_tokens": -1,
                "stream": false
            })
        );
    }

    #[test]
    fn test_parse_chat_response() {
        let body = json!({"choices": [{"message": {"role": "assistant", "content": "hello"}}]});
        assert_eq!(parse_chat_response(&body).unwrap(), "hello");

        let err = parse_chat_response(&json!({"choices": []})).unwrap_err();
        assert!(err.to_string().contains("empty message list"));

        let err = parse_chat_response(&json!({"id": 1})).unwrap_err();
        assert!(err.to_string().contains("'choices'"));
    }

    #[test]
    fn test_parse_embedding_response() {
        let body = json!({"data": [{"embedding": [0.5, -1.0, 2]}]});
        assert_eq!(parse_embedding_response(&body).unwrap(), vec![0.5, -1.0, 2.0]);

        let err = parse_embedding_response(&json!({"data": [{"index": 0}]})).unwrap_err();
        assert!(err.to_string().contains("'embedding'"));
    }
}

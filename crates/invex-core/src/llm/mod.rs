//! Language model completion service.

mod openai;

pub use openai::OpenAiClient;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::CompletionError;
use crate::models::config::LlmConfig;

/// Chat message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Role: "system", "user", "assistant"
    pub role: String,

    /// Message content
    pub content: String,
}

impl Message {
    /// Create a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// Chat completion request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletionRequest {
    /// Model to use (e.g., "gpt-4o").
    pub model: String,

    /// Conversation messages.
    pub messages: Vec<Message>,

    /// Maximum tokens in the completion.
    pub max_tokens: u32,

    /// Number of choices to generate.
    pub n: u32,

    /// Sampling temperature.
    pub temperature: f32,
}

impl CompletionRequest {
    /// Single-prompt request with the generation settings from `config`.
    pub fn from_prompt(prompt: impl Into<String>, config: &LlmConfig) -> Self {
        Self {
            model: config.model.clone(),
            messages: vec![Message::user(prompt)],
            max_tokens: config.max_tokens,
            n: 1,
            temperature: config.temperature,
        }
    }

    /// Text of the first user message.
    pub fn prompt(&self) -> &str {
        self.messages
            .iter()
            .find(|m| m.role == "user")
            .map(|m| m.content.as_str())
            .unwrap_or_default()
    }
}

/// A service that turns a prompt into a text completion.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Return the content of the first completion choice.
    async fn complete(&self, request: &CompletionRequest) -> Result<String, CompletionError>;
}

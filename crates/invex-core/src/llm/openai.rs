//! OpenAI-compatible chat completions client.

use std::time::Instant;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, warn};

use super::{CompletionClient, CompletionRequest};
use crate::error::CompletionError;
use crate::models::config::LlmConfig;

/// Client for `POST {base_url}/chat/completions`.
#[derive(Clone)]
pub struct OpenAiClient {
    http_client: Client,
    api_key: String,
    base_url: String,
    timeout_secs: u64,
}

#[derive(Debug, Deserialize)]
struct ChatResponseRaw {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

impl OpenAiClient {
    /// Create a client from the language model configuration.
    ///
    /// Fails when no API key is configured.
    pub fn from_config(config: &LlmConfig) -> Result<Self, CompletionError> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| CompletionError::Config("OPENAI_API_KEY not set".into()))?;

        let http_client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| CompletionError::Config(e.to_string()))?;

        Ok(Self {
            http_client,
            api_key,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            timeout_secs: config.timeout_secs,
        })
    }

    /// Base URL requests are sent to.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn map_send_error(&self, e: reqwest::Error) -> CompletionError {
        if e.is_timeout() {
            CompletionError::Timeout(self.timeout_secs)
        } else {
            CompletionError::Network(e.to_string())
        }
    }
}

#[async_trait]
impl CompletionClient for OpenAiClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, CompletionError> {
        let start = Instant::now();

        let response = self
            .http_client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| {
                warn!(error = %e, "Completion request failed");
                self.map_send_error(e)
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = %status, error = %body, "Completion API error");
            return Err(CompletionError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let body = response.text().await.map_err(|e| self.map_send_error(e))?;
        let content = parse_chat_response(&body)?;

        debug!(
            model = %request.model,
            duration_ms = start.elapsed().as_millis(),
            chars = content.len(),
            "Chat completion"
        );

        Ok(content)
    }
}

/// Content of the first choice of a chat completion body.
fn parse_chat_response(body: &str) -> Result<String, CompletionError> {
    let raw: ChatResponseRaw =
        serde_json::from_str(body).map_err(|e| CompletionError::Parse(e.to_string()))?;

    raw.choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .ok_or(CompletionError::Empty)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn config() -> LlmConfig {
        LlmConfig {
            api_key: Some("sk-test".to_string()),
            ..LlmConfig::default()
        }
    }

    #[test]
    fn test_request_body() {
        let request = CompletionRequest::from_prompt("Texte", &config());
        let body = serde_json::to_value(&request).unwrap();

        assert_eq!(
            body,
            json!({
                "model": "gpt-4o",
                "messages": [{"role": "user", "content": "Texte"}],
                "max_tokens": 500,
                "n": 1,
                "temperature": 0.0
            })
        );
    }

    #[test]
    fn test_parse_chat_response() {
        let body = r#"{"choices":[{"index":0,"message":{"role":"assistant","content":"{\"Devise\":\"EUR\"}"}}]}"#;
        assert_eq!(parse_chat_response(body).unwrap(), r#"{"Devise":"EUR"}"#);
    }

    #[test]
    fn test_parse_chat_response_without_choices() {
        assert!(matches!(
            parse_chat_response(r#"{"choices":[]}"#),
            Err(CompletionError::Empty)
        ));
        assert!(matches!(
            parse_chat_response("<html>bad gateway</html>"),
            Err(CompletionError::Parse(_))
        ));
    }

    #[test]
    fn test_missing_api_key() {
        let result = OpenAiClient::from_config(&LlmConfig::default());
        assert!(matches!(result, Err(CompletionError::Config(_))));
    }

    #[test]
    fn test_base_url_trailing_slash() {
        let config = LlmConfig {
            base_url: "http://localhost:8080/v1/".to_string(),
            ..config()
        };
        let client = OpenAiClient::from_config(&config).unwrap();
        assert_eq!(client.base_url(), "http://localhost:8080/v1");
    }

    #[tokio::test]
    async fn test_unreachable_service_is_an_error() {
        let config = LlmConfig {
            base_url: "http://127.0.0.1:1/v1".to_string(),
            timeout_secs: 5,
            ..config()
        };
        let client = OpenAiClient::from_config(&config).unwrap();
        let request = CompletionRequest::from_prompt("Texte", &config);

        let result = client.complete(&request).await;
        assert!(matches!(
            result,
            Err(CompletionError::Network(_)) | Err(CompletionError::Timeout(_))
        ));
    }
}

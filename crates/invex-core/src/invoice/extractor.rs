//! Language-model-backed invoice field extraction.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, warn};

use super::parser::parse_response;
use super::prompt::build_prompt;
use crate::error::FieldError;
use crate::llm::{CompletionClient, CompletionRequest};
use crate::models::config::LlmConfig;
use crate::models::invoice::InvoiceRecord;

/// Extracts structured invoice fields from document text.
#[derive(Clone)]
pub struct FieldExtractor {
    client: Arc<dyn CompletionClient>,
    config: LlmConfig,
}

impl FieldExtractor {
    /// Create an extractor using `client` with the generation settings in `config`.
    pub fn new(client: Arc<dyn CompletionClient>, config: LlmConfig) -> Self {
        Self { client, config }
    }

    /// Build the completion request for `text`.
    pub fn request_for(&self, text: &str) -> CompletionRequest {
        CompletionRequest::from_prompt(build_prompt(text, self.config.max_input_chars), &self.config)
    }

    /// Ask the model for the invoice fields in `text`.
    pub async fn extract(&self, text: &str) -> Result<InvoiceRecord, FieldError> {
        let start = Instant::now();
        let request = self.request_for(text);

        let content = self.client.complete(&request).await.inspect_err(|e| {
            warn!("Error extracting information from text: {}", e);
        })?;

        let record = parse_response(&content).inspect_err(|e| {
            warn!("Could not parse model response: {}", e);
            debug!("Unparseable response: {}", content);
        })?;

        let missing = record.missing_fields();
        if !missing.is_empty() {
            debug!(
                "Response lacks {} of the requested fields: {:?}",
                missing.len(),
                missing.iter().map(|f| f.key()).collect::<Vec<_>>()
            );
        }

        for field in record.malformed_list_fields() {
            warn!("Field '{}' is not a list, keeping it as returned", field.key());
        }

        debug!(
            "Extracted {} fields in {}ms",
            record.len(),
            start.elapsed().as_millis()
        );
        Ok(record)
    }
}

//! Configuration structures for the extraction pipeline.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::InvexError;
use crate::pdf::DEFAULT_RENDER_DPI;

/// Main configuration for the invex pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct InvexConfig {
    /// PDF processing configuration.
    pub pdf: PdfConfig,

    /// OCR configuration.
    pub ocr: OcrConfig,

    /// Language model configuration.
    pub llm: LlmConfig,

    /// Input/output locations and batch limits.
    pub pipeline: PipelineConfig,

    /// Upload service configuration.
    pub server: ServerConfig,
}

/// PDF processing configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PdfConfig {
    /// Maximum pages to read (0 = unlimited).
    pub max_pages: usize,

    /// Resolution for page rasterization ahead of OCR.
    pub render_dpi: u32,
}

impl Default for PdfConfig {
    fn default() -> Self {
        Self {
            max_pages: 0,
            render_dpi: DEFAULT_RENDER_DPI,
        }
    }
}

/// OCR engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrConfig {
    /// Enable the OCR fallback for PDFs without a text layer.
    pub enabled: bool,

    /// Directory containing model files.
    pub model_dir: PathBuf,

    /// Text detection model file name.
    pub detection_model: String,

    /// Text recognition model file name.
    pub recognition_model: String,

    /// Character dictionary file name.
    pub dictionary: String,

    /// Keep `[UNK]` markers in recognized text instead of blanking them.
    pub keep_unk: bool,

    /// Upper bound for text acquisition of one document, in seconds.
    pub timeout_secs: u64,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            model_dir: PathBuf::from("models"),
            detection_model: "det.onnx".to_string(),
            recognition_model: "latin_rec.onnx".to_string(),
            dictionary: "latin_dict.txt".to_string(),
            keep_unk: false,
            timeout_secs: 120,
        }
    }
}

impl OcrConfig {
    /// Acquisition timeout as a duration.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// True when all model files are present in `model_dir`.
    pub fn models_present(&self) -> bool {
        [&self.detection_model, &self.recognition_model, &self.dictionary]
            .iter()
            .all(|name| self.model_dir.join(name).exists())
    }
}

/// Language model configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Base URL of an OpenAI-compatible API.
    pub base_url: String,

    /// API key. Usually supplied through `OPENAI_API_KEY` rather than the file.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Model identifier.
    pub model: String,

    /// Maximum tokens in the completion.
    pub max_tokens: u32,

    /// Sampling temperature.
    pub temperature: f32,

    /// Request timeout in seconds.
    pub timeout_secs: u64,

    /// Maximum number of document characters embedded in the prompt.
    pub max_input_chars: usize,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            api_key: None,
            model: "gpt-4o".to_string(),
            max_tokens: 500,
            temperature: 0.0,
            timeout_secs: 60,
            max_input_chars: 24_000,
        }
    }
}

impl LlmConfig {
    /// Request timeout as a duration.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Input/output locations and batch limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Folder scanned by the batch command.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invoice_dir: Option<PathBuf>,

    /// Folder receiving XML files and the summary workbook.
    pub output_dir: PathBuf,

    /// Maximum number of PDFs processed per batch.
    pub batch_limit: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            invoice_dir: None,
            output_dir: PathBuf::from("output"),
            batch_limit: 20,
        }
    }
}

/// Upload service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Socket address to listen on.
    pub bind: String,

    /// Directory where uploads are stored while being processed.
    pub upload_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:5000".to_string(),
            upload_dir: PathBuf::from("uploads"),
        }
    }
}

impl InvexConfig {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self, InvexError> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content)
            .map_err(|e| InvexError::Config(format!("{}: {}", path.display(), e)))
    }

    /// Save configuration to a JSON file.
    pub fn save(&self, path: &Path) -> Result<(), InvexError> {
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| InvexError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Apply overrides from environment variables.
    ///
    /// Recognised: `OPENAI_API_KEY`, `OPENAI_BASE_URL`, `INVOICE_FOLDER`,
    /// `OUTPUT_FOLDER`.
    pub fn apply_env(&mut self) {
        self.apply_vars(|key| std::env::var(key).ok());
    }

    fn apply_vars(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(key) = get("OPENAI_API_KEY") {
            self.llm.api_key = Some(key);
        }
        if let Some(url) = get("OPENAI_BASE_URL") {
            self.llm.base_url = url;
        }
        if let Some(dir) = get("INVOICE_FOLDER") {
            self.pipeline.invoice_dir = Some(PathBuf::from(dir));
        }
        if let Some(dir) = get("OUTPUT_FOLDER") {
            self.pipeline.output_dir = PathBuf::from(dir);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults_match_extraction_contract() {
        let config = InvexConfig::default();
        assert_eq!(config.llm.model, "gpt-4o");
        assert_eq!(config.llm.max_tokens, 500);
        assert_eq!(config.llm.temperature, 0.0);
        assert_eq!(config.pipeline.batch_limit, 20);
        assert_eq!(config.server.bind, "0.0.0.0:5000");
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: InvexConfig =
            serde_json::from_str(r#"{"llm": {"model": "gpt-4o-mini"}}"#).unwrap();
        assert_eq!(config.llm.model, "gpt-4o-mini");
        assert_eq!(config.llm.max_tokens, 500);
        assert_eq!(config.ocr.detection_model, "det.onnx");
        assert_eq!(config.pdf.render_dpi, 200);
    }

    #[test]
    fn test_file_errors() {
        let dir = tempfile::tempdir().unwrap();

        let missing = InvexConfig::from_file(&dir.path().join("absent.json"));
        assert!(matches!(missing, Err(InvexError::Io(_))));

        let broken = dir.path().join("broken.json");
        std::fs::write(&broken, "{ not json").unwrap();
        assert!(matches!(
            InvexConfig::from_file(&broken),
            Err(InvexError::Config(_))
        ));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = InvexConfig::default();
        config.apply_vars(|key| match key {
            "OPENAI_API_KEY" => Some("sk-test".to_string()),
            "INVOICE_FOLDER" => Some("invoices".to_string()),
            "OUTPUT_FOLDER" => Some("out".to_string()),
            "OPENAI_BASE_URL" => Some("  ".to_string()),
            _ => None,
        });

        assert_eq!(config.llm.api_key.as_deref(), Some("sk-test"));
        assert_eq!(config.pipeline.invoice_dir, Some(PathBuf::from("invoices")));
        assert_eq!(config.pipeline.output_dir, PathBuf::from("out"));
        assert_eq!(config.llm.base_url, "https://api.openai.com/v1");
    }
}

//! Error types for the invex-core library.

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for the invex library.
#[derive(Error, Debug)]
pub enum InvexError {
    /// Language model client could not be built.
    #[error("completion error: {0}")]
    Completion(#[from] CompletionError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

/// Errors related to PDF processing.
#[derive(Error, Debug)]
pub enum PdfError {
    /// Failed to read the PDF file.
    #[error("failed to read PDF: {0}")]
    Read(#[from] std::io::Error),

    /// Failed to open/parse the PDF file.
    #[error("failed to parse PDF: {0}")]
    Parse(String),

    /// Failed to extract text from PDF.
    #[error("failed to extract text: {0}")]
    TextExtraction(String),

    /// Failed to extract page images from PDF.
    #[error("failed to extract images: {0}")]
    ImageExtraction(String),

    /// Page rasterization is unavailable or failed.
    #[error("failed to render pages: {0}")]
    Render(String),

    /// The PDF is encrypted and cannot be processed.
    #[error("PDF is encrypted")]
    Encrypted,

    /// The PDF is empty or has no pages.
    #[error("PDF has no pages")]
    NoPages,
}

/// Errors related to OCR processing.
#[derive(Error, Debug)]
pub enum OcrError {
    /// Failed to load OCR models.
    #[error("failed to load model: {0}")]
    ModelLoad(String),

    /// Text recognition failed.
    #[error("text recognition failed: {0}")]
    Recognition(String),

    /// No OCR engine is configured.
    #[error("no OCR engine available")]
    Unavailable,
}

/// Why no text could be acquired from a document.
#[derive(Error, Debug)]
pub enum AcquireError {
    /// The document file could not be read.
    #[error("failed to read document: {0}")]
    Read(#[from] std::io::Error),

    /// Neither the text layer nor OCR produced any text.
    #[error("no text obtained (text layer: {direct}; OCR: {recognition})")]
    NoText { direct: String, recognition: String },

    /// Acquisition exceeded its time budget.
    #[error("text acquisition timed out after {0}s")]
    Timeout(u64),

    /// The blocking acquisition task panicked or was cancelled.
    #[error("text acquisition task failed: {0}")]
    Task(String),
}

/// Errors from the language model completion service.
#[derive(Error, Debug)]
pub enum CompletionError {
    /// Missing API key or invalid settings.
    #[error("configuration error: {0}")]
    Config(String),

    /// Connection failed.
    #[error("network error: {0}")]
    Network(String),

    /// The request did not complete in time.
    #[error("request timed out after {0}s")]
    Timeout(u64),

    /// Non-2xx response.
    #[error("API error ({status}): {body}")]
    Api { status: u16, body: String },

    /// Response body could not be decoded.
    #[error("invalid response: {0}")]
    Parse(String),

    /// The service returned no completion choice.
    #[error("no completion returned")]
    Empty,
}

/// Errors related to structured field extraction.
#[derive(Error, Debug)]
pub enum FieldError {
    /// The completion call failed.
    #[error(transparent)]
    Completion(#[from] CompletionError),

    /// The response contained no parseable JSON.
    #[error("response is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    /// The response JSON is not an object.
    #[error("response JSON is not an object")]
    NotAnObject,

    /// The response object has no fields.
    #[error("no invoice data found")]
    NoData,
}

/// Errors writing output artifacts.
#[derive(Error, Debug)]
pub enum OutputError {
    /// I/O error while writing.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// XML serialization failed.
    #[error("XML error: {0}")]
    Xml(String),

    /// XLSX serialization failed.
    #[error("XLSX error: {0}")]
    Xlsx(#[from] rust_xlsxwriter::XlsxError),
}

/// Per-document and batch pipeline failures.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// No text could be obtained from the document.
    #[error("Failed to extract text from {}", path.display())]
    NoTextExtracted { path: PathBuf, reason: String },

    /// The language model produced no usable record.
    #[error("Failed to extract information from {}", path.display())]
    FieldExtractionFailed {
        path: PathBuf,
        #[source]
        source: FieldError,
    },

    /// Writing an artifact failed.
    #[error("failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: OutputError,
    },

    /// The input directory could not be listed.
    #[error("failed to read directory {}: {source}", path.display())]
    ListDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl PipelineError {
    /// Name of the stage that failed.
    pub fn stage(&self) -> &'static str {
        match self {
            Self::NoTextExtracted { .. } => "text",
            Self::FieldExtractionFailed { .. } => "fields",
            Self::Write { .. } => "write",
            Self::ListDirectory { .. } => "list",
        }
    }
}

/// Result type for the invex library.
pub type Result<T> = std::result::Result<T, InvexError>;

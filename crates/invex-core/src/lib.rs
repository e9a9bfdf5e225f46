//! Core library for invoice extraction.
//!
//! This crate provides:
//! - Text acquisition from PDFs (text layer first, OCR on page images as fallback)
//! - Invoice field extraction through an OpenAI-compatible chat completions API
//! - Per-invoice XML documents and an XLSX summary workbook
//! - A pipeline driving single documents and directories of documents

pub mod acquire;
pub mod error;
pub mod invoice;
pub mod llm;
pub mod models;
pub mod ocr;
pub mod output;
pub mod pdf;
pub mod pipeline;

pub use acquire::{ExtractedText, TextAcquirer, TextSource};
pub use error::{InvexError, PipelineError, Result};
pub use invoice::FieldExtractor;
pub use llm::{CompletionClient, CompletionRequest, OpenAiClient};
pub use models::config::InvexConfig;
pub use models::invoice::{BatchSummary, InvoiceField, InvoiceRecord, SOURCE_FILE_KEY};
pub use ocr::TextRecognizer;
#[cfg(feature = "native")]
pub use ocr::PureOcrEngine;
pub use output::{ArtifactWriter, SUMMARY_FILE_NAME};
pub use pdf::{DocumentReader, PdfExtractor};
pub use pipeline::{BatchReport, InvoicePipeline, ProcessedInvoice, SkippedDocument};

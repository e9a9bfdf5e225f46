//! Document and batch processing.
//!
//! One pipeline instance drives both entry points: a single PDF produces an
//! XML document plus a one-row summary, a directory produces one XML per
//! successful PDF plus a single summary for the batch.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::acquire::{ExtractedText, TextAcquirer, TextSource};
use crate::error::{AcquireError, InvexError, PipelineError};
use crate::invoice::FieldExtractor;
use crate::llm::OpenAiClient;
use crate::models::config::InvexConfig;
use crate::models::invoice::{BatchSummary, InvoiceRecord};
use crate::output::{ArtifactWriter, document_path, document_stem, summary_path};

/// Default number of documents taken from a directory.
pub const DEFAULT_BATCH_LIMIT: usize = 20;

const DEFAULT_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(120);

/// Result of processing one document.
#[derive(Debug, Clone)]
pub struct ProcessedInvoice {
    /// Extracted fields, including the source file name.
    pub record: InvoiceRecord,
    /// How the document text was obtained.
    pub source: TextSource,
    /// Written XML document.
    pub xml_path: PathBuf,
    /// Written summary workbook.
    pub summary_path: PathBuf,
}

/// A document left out of a batch.
#[derive(Debug)]
pub struct SkippedDocument {
    pub path: PathBuf,
    pub error: PipelineError,
}

/// Result of processing a directory.
#[derive(Debug, Default)]
pub struct BatchReport {
    /// Records of the successful documents, in processing order.
    pub summary: BatchSummary,
    /// Documents that failed at some stage, in processing order.
    pub skipped: Vec<SkippedDocument>,
    /// Summary workbook, if any record was extracted.
    pub summary_path: Option<PathBuf>,
}

impl BatchReport {
    /// Number of documents attempted.
    pub fn attempted(&self) -> usize {
        self.summary.len() + self.skipped.len()
    }
}

/// Invoice extraction pipeline.
pub struct InvoicePipeline {
    acquirer: Arc<TextAcquirer>,
    extractor: FieldExtractor,
    writer: ArtifactWriter,
    acquire_timeout: Duration,
    batch_limit: usize,
    summary_lock: Mutex<()>,
}

impl InvoicePipeline {
    /// Create a pipeline with default limits.
    pub fn new(acquirer: TextAcquirer, extractor: FieldExtractor) -> Self {
        Self {
            acquirer: Arc::new(acquirer),
            extractor,
            writer: ArtifactWriter::new(),
            acquire_timeout: DEFAULT_ACQUIRE_TIMEOUT,
            batch_limit: DEFAULT_BATCH_LIMIT,
            summary_lock: Mutex::new(()),
        }
    }

    /// Build the production pipeline: PDF reader with OCR fallback and the
    /// OpenAI chat completions client.
    pub fn from_config(config: &InvexConfig) -> Result<Self, InvexError> {
        let client = OpenAiClient::from_config(&config.llm)?;
        let extractor = FieldExtractor::new(Arc::new(client), config.llm.clone());

        Ok(Self::new(TextAcquirer::from_config(config), extractor)
            .with_acquire_timeout(config.ocr.timeout())
            .with_batch_limit(config.pipeline.batch_limit))
    }

    /// Set the time budget for text acquisition of one document.
    ///
    /// A blocking call already in progress (text layer parsing or one OCR
    /// page) runs to completion after the deadline; the remaining OCR pages
    /// are skipped.
    pub fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    /// Set how many documents a directory run takes.
    pub fn with_batch_limit(mut self, limit: usize) -> Self {
        self.batch_limit = limit;
        self
    }

    /// Process a single PDF: extract its fields, write `<stem>.xml` and a
    /// one-row `invoices_summary.xlsx` into `output_dir`.
    pub async fn process_document(
        &self,
        path: &Path,
        output_dir: &Path,
    ) -> Result<ProcessedInvoice, PipelineError> {
        let (record, source) = self.extract_record(path).await?;

        let xml_path = document_path(output_dir, path);
        self.writer
            .write_document(&record, &xml_path)
            .map_err(|source| PipelineError::Write {
                path: xml_path.clone(),
                source,
            })?;

        let summary_path = self.write_summary(std::slice::from_ref(&record), output_dir).await?;
        info!("Processed {} into {}", path.display(), xml_path.display());

        Ok(ProcessedInvoice {
            record,
            source,
            xml_path,
            summary_path,
        })
    }

    /// Process the PDFs of `dir` in file name order, up to the batch limit.
    ///
    /// Failing documents are logged and reported as skipped. One summary is
    /// written for all successful documents.
    pub async fn process_directory(
        &self,
        dir: &Path,
        output_dir: &Path,
    ) -> Result<BatchReport, PipelineError> {
        let start = Instant::now();
        let files = list_pdf_files(dir, self.batch_limit)?;
        info!("Processing {} PDF files from {}", files.len(), dir.display());

        let mut report = BatchReport::default();
        for path in files {
            match self.process_batch_document(&path, output_dir).await {
                Ok(record) => report.summary.push(record),
                Err(error) => {
                    warn!("Skipping {}: {}", path.display(), error);
                    report.skipped.push(SkippedDocument { path, error });
                }
            }
        }

        if report.summary.is_empty() {
            info!("No information extracted from PDF files in {}", dir.display());
        } else {
            let path = self.write_summary(report.summary.records(), output_dir).await?;
            report.summary_path = Some(path);
        }

        info!(
            "Batch finished: {} extracted, {} skipped in {}ms",
            report.summary.len(),
            report.skipped.len(),
            start.elapsed().as_millis()
        );
        Ok(report)
    }

    async fn process_batch_document(
        &self,
        path: &Path,
        output_dir: &Path,
    ) -> Result<InvoiceRecord, PipelineError> {
        let (record, _) = self.extract_record(path).await?;

        let xml_path = document_path(output_dir, path);
        self.writer
            .write_document(&record, &xml_path)
            .map_err(|source| PipelineError::Write {
                path: xml_path,
                source,
            })?;

        Ok(record)
    }

    /// Text acquisition, field extraction and source file tagging.
    async fn extract_record(
        &self,
        path: &Path,
    ) -> Result<(InvoiceRecord, TextSource), PipelineError> {
        debug!("Processing {}", path.display());

        let text = self
            .acquire_text(path)
            .await
            .map_err(|e| PipelineError::NoTextExtracted {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;
        debug!("Obtained {} characters ({:?})", text.text.len(), text.source);

        let mut record = self.extractor.extract(&text.text).await.map_err(|source| {
            PipelineError::FieldExtractionFailed {
                path: path.to_path_buf(),
                source,
            }
        })?;

        record.set_source_file(document_stem(path));
        Ok((record, text.source))
    }

    async fn acquire_text(&self, path: &Path) -> Result<ExtractedText, AcquireError> {
        let acquirer = Arc::clone(&self.acquirer);
        let cancel = Arc::new(AtomicBool::new(false));
        let task_cancel = Arc::clone(&cancel);
        let owned = path.to_path_buf();
        let task = tokio::task::spawn_blocking(move || {
            acquirer.acquire_cancellable(&owned, &task_cancel)
        });

        match tokio::time::timeout(self.acquire_timeout, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => Err(AcquireError::Task(e.to_string())),
            Err(_) => {
                cancel.store(true, Ordering::Relaxed);
                warn!(
                    "Text acquisition for {} exceeded {:?}",
                    path.display(),
                    self.acquire_timeout
                );
                Err(AcquireError::Timeout(self.acquire_timeout.as_secs()))
            }
        }
    }

    async fn write_summary(
        &self,
        records: &[InvoiceRecord],
        output_dir: &Path,
    ) -> Result<PathBuf, PipelineError> {
        let path = summary_path(output_dir);
        let _guard = self.summary_lock.lock().await;

        self.writer
            .write_summary(records, &path)
            .map_err(|source| PipelineError::Write {
                path: path.clone(),
                source,
            })?;
        Ok(path)
    }
}

/// True if `path` has a `.pdf` extension, in any case.
pub fn is_pdf_path(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"))
}

/// PDF files directly inside `dir`, sorted by file name, at most `limit`.
pub fn list_pdf_files(dir: &Path, limit: usize) -> Result<Vec<PathBuf>, PipelineError> {
    let entries = fs::read_dir(dir).map_err(|source| PipelineError::ListDirectory {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && is_pdf_path(path))
        .collect();
    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));

    if files.len() > limit {
        info!(
            "Found {} PDF files in {}, processing the first {}",
            files.len(),
            dir.display(),
            limit
        );
        files.truncate(limit);
    }
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{CompletionError, FieldError};
    use crate::llm::{CompletionClient, CompletionRequest};
    use crate::models::config::LlmConfig;
    use crate::output::read_sheet;
    use crate::pdf::{DocumentReader, Result as PdfResult};
    use async_trait::async_trait;
    use image::DynamicImage;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use crate::error::OcrError;
    use crate::ocr::TextRecognizer;
    use std::sync::Mutex as StdMutex;
    use std::sync::atomic::AtomicUsize;

    const TEXT_MARKER: &str = "Texte de la facture:\n";

    /// Treats the file bytes as the text layer and records what it read.
    /// Renders `pages` blank page images.
    #[derive(Clone, Default)]
    struct PlainTextReader {
        seen: Arc<StdMutex<Vec<String>>>,
        delay: Option<Duration>,
        pages: u32,
    }

    impl DocumentReader for PlainTextReader {
        fn page_texts(&self, data: &[u8]) -> PdfResult<Vec<String>> {
            if let Some(delay) = self.delay {
                std::thread::sleep(delay);
            }
            let text = String::from_utf8_lossy(data).into_owned();
            self.seen.lock().unwrap().push(text.clone());
            Ok(vec![text])
        }

        fn page_images(&self, _data: &[u8]) -> PdfResult<Vec<DynamicImage>> {
            Ok((0..self.pages).map(|_| DynamicImage::new_luma8(8, 8)).collect())
        }
    }

    /// Counts the pages it is asked to read.
    struct CountingRecognizer {
        calls: Arc<AtomicUsize>,
    }

    impl TextRecognizer for CountingRecognizer {
        fn recognize(&self, _image: &DynamicImage) -> Result<String, OcrError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok("FACTURE".to_string())
        }
    }

    /// Answers with a reply computed from the invoice text in the prompt.
    struct EchoClient {
        reply: fn(&str) -> Result<String, CompletionError>,
    }

    #[async_trait]
    impl CompletionClient for EchoClient {
        async fn complete(&self, request: &CompletionRequest) -> Result<String, CompletionError> {
            let prompt = request.prompt();
            let text = prompt
                .find(TEXT_MARKER)
                .map(|i| prompt[i + TEXT_MARKER.len()..].trim())
                .unwrap_or_default();
            (self.reply)(text)
        }
    }

    fn numbered_reply(text: &str) -> Result<String, CompletionError> {
        if text.contains("ILLISIBLE") {
            return Ok("Désolé, je ne peux pas lire cette facture.".to_string());
        }
        Ok(json!({"Type de document": "facture", "Numéro de document": text}).to_string())
    }

    fn fixed_reply(_text: &str) -> Result<String, CompletionError> {
        Ok(r#"Voici les informations: {"Type de document": "facture", "Devise": "EUR"}"#.to_string())
    }

    fn pipeline(reader: PlainTextReader, reply: fn(&str) -> Result<String, CompletionError>) -> InvoicePipeline {
        let extractor = FieldExtractor::new(Arc::new(EchoClient { reply }), LlmConfig::default());
        InvoicePipeline::new(TextAcquirer::new(reader), extractor)
    }

    struct Workspace {
        _dir: tempfile::TempDir,
        input: PathBuf,
        output: PathBuf,
    }

    fn workspace(files: &[(&str, &str)]) -> Workspace {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in");
        let output = dir.path().join("out");
        fs::create_dir(&input).unwrap();
        fs::create_dir(&output).unwrap();
        for (name, content) in files {
            fs::write(input.join(name), content).unwrap();
        }
        Workspace {
            _dir: dir,
            input,
            output,
        }
    }

    #[tokio::test]
    async fn test_single_document_outputs() {
        let ws = workspace(&[("facture-001.pdf", "FACTURE 001\nTotal 121,00 EUR")]);
        let pipeline = pipeline(PlainTextReader::default(), fixed_reply);

        let processed = pipeline
            .process_document(&ws.input.join("facture-001.pdf"), &ws.output)
            .await
            .unwrap();

        assert_eq!(processed.source, TextSource::Direct);
        assert_eq!(processed.record.source_file(), Some("facture-001"));
        assert_eq!(processed.xml_path, ws.output.join("facture-001.xml"));
        assert_eq!(processed.summary_path, ws.output.join("invoices_summary.xlsx"));

        let xml = fs::read_to_string(&processed.xml_path).unwrap();
        assert!(xml.contains("<Type_de_document>facture</Type_de_document>"));
        assert!(xml.contains("<Fichier>facture-001</Fichier>"));

        assert_eq!(
            read_sheet(&processed.summary_path),
            vec![
                vec!["Type de document", "Devise", "Fichier"],
                vec!["facture", "EUR", "facture-001"],
            ]
        );
    }

    #[tokio::test]
    async fn test_successive_documents_overwrite_summary() {
        let ws = workspace(&[("a.pdf", "FACTURE A"), ("b.pdf", "FACTURE B")]);
        let pipeline = pipeline(PlainTextReader::default(), numbered_reply);

        pipeline.process_document(&ws.input.join("a.pdf"), &ws.output).await.unwrap();
        let second = pipeline.process_document(&ws.input.join("b.pdf"), &ws.output).await.unwrap();

        assert_eq!(
            read_sheet(&second.summary_path),
            vec![
                vec!["Type de document", "Numéro de document", "Fichier"],
                vec!["facture", "FACTURE B", "b"],
            ]
        );
        assert!(ws.output.join("a.xml").exists());
        assert!(ws.output.join("b.xml").exists());
    }

    #[tokio::test]
    async fn test_document_without_text() {
        let ws = workspace(&[("scan.pdf", "  \n ")]);
        let pipeline = pipeline(PlainTextReader::default(), fixed_reply);
        let path = ws.input.join("scan.pdf");

        let err = pipeline.process_document(&path, &ws.output).await.unwrap_err();

        assert_eq!(err.stage(), "text");
        assert_eq!(err.to_string(), format!("Failed to extract text from {}", path.display()));
        assert!(!ws.output.join("scan.xml").exists());
        assert!(!ws.output.join("invoices_summary.xlsx").exists());
    }

    #[tokio::test]
    async fn test_document_with_unusable_response() {
        let ws = workspace(&[("illisible.pdf", "ILLISIBLE")]);
        let pipeline = pipeline(PlainTextReader::default(), numbered_reply);
        let path = ws.input.join("illisible.pdf");

        let err = pipeline.process_document(&path, &ws.output).await.unwrap_err();

        assert!(matches!(
            err,
            PipelineError::FieldExtractionFailed {
                source: FieldError::InvalidJson(_),
                ..
            }
        ));
        assert_eq!(
            err.to_string(),
            format!("Failed to extract information from {}", path.display())
        );
        assert!(!ws.output.join("illisible.xml").exists());
    }

    #[tokio::test]
    async fn test_service_failure_is_reported() {
        let ws = workspace(&[("a.pdf", "FACTURE A")]);
        let pipeline = pipeline(PlainTextReader::default(), |_| {
            Err(CompletionError::Api {
                status: 500,
                body: "internal error".to_string(),
            })
        });

        let err = pipeline
            .process_document(&ws.input.join("a.pdf"), &ws.output)
            .await
            .unwrap_err();
        assert_eq!(err.stage(), "fields");
    }

    #[tokio::test]
    async fn test_missing_output_directory_is_a_write_error() {
        let ws = workspace(&[("a.pdf", "FACTURE A")]);
        let pipeline = pipeline(PlainTextReader::default(), fixed_reply);

        let err = pipeline
            .process_document(&ws.input.join("a.pdf"), &ws.output.join("missing"))
            .await
            .unwrap_err();
        assert_eq!(err.stage(), "write");
    }

    #[tokio::test]
    async fn test_slow_acquisition_times_out() {
        let ws = workspace(&[("a.pdf", "FACTURE A")]);
        let reader = PlainTextReader {
            delay: Some(Duration::from_millis(500)),
            ..Default::default()
        };
        let pipeline =
            pipeline(reader, fixed_reply).with_acquire_timeout(Duration::from_millis(20));

        match pipeline.process_document(&ws.input.join("a.pdf"), &ws.output).await {
            Err(PipelineError::NoTextExtracted { reason, .. }) => {
                assert!(reason.contains("timed out"), "unexpected reason: {}", reason);
            }
            other => panic!("expected NoTextExtracted, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_timeout_cancels_remaining_ocr_pages() {
        let ws = workspace(&[("scan.pdf", "  ")]);
        let reader = PlainTextReader {
            delay: Some(Duration::from_millis(200)),
            pages: 4,
            ..Default::default()
        };
        let calls = Arc::new(AtomicUsize::new(0));
        let acquirer = TextAcquirer::new(reader).with_recognizer(CountingRecognizer {
            calls: Arc::clone(&calls),
        });
        let extractor =
            FieldExtractor::new(Arc::new(EchoClient { reply: fixed_reply }), LlmConfig::default());
        let pipeline = InvoicePipeline::new(acquirer, extractor)
            .with_acquire_timeout(Duration::from_millis(20));

        let err = pipeline
            .process_document(&ws.input.join("scan.pdf"), &ws.output)
            .await
            .unwrap_err();
        assert_eq!(err.stage(), "text");

        // Let the abandoned blocking task finish its text layer read.
        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_batch_skips_failing_document() {
        let ws = workspace(&[
            ("a.pdf", "FACTURE A"),
            ("b.pdf", "ILLISIBLE"),
            ("c.pdf", "FACTURE C"),
        ]);
        let pipeline = pipeline(PlainTextReader::default(), numbered_reply);

        let report = pipeline.process_directory(&ws.input, &ws.output).await.unwrap();

        let files: Vec<_> = report.summary.records().iter().map(|r| r.source_file()).collect();
        assert_eq!(files, vec![Some("a"), Some("c")]);
        assert_eq!(report.attempted(), 3);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].path, ws.input.join("b.pdf"));
        assert_eq!(report.skipped[0].error.stage(), "fields");

        assert!(ws.output.join("a.xml").exists());
        assert!(!ws.output.join("b.xml").exists());
        assert!(ws.output.join("c.xml").exists());

        let summary = report.summary_path.unwrap();
        assert_eq!(
            read_sheet(&summary),
            vec![
                vec!["Type de document", "Numéro de document", "Fichier"],
                vec!["facture", "FACTURE A", "a"],
                vec!["facture", "FACTURE C", "c"],
            ]
        );
    }

    #[tokio::test]
    async fn test_batch_takes_first_twenty_files() {
        let mut files: Vec<(String, String)> = (1..=20)
            .map(|i| (format!("{:02}.pdf", i), format!("FACTURE {:02}", i)))
            .collect();
        files.push(("00.PDF".to_string(), "FACTURE 00".to_string()));
        files.push(("notes.txt".to_string(), "FACTURE NOTES".to_string()));
        let refs: Vec<(&str, &str)> = files.iter().map(|(n, c)| (n.as_str(), c.as_str())).collect();
        let ws = workspace(&refs);

        let reader = PlainTextReader::default();
        let seen = reader.seen.clone();
        let pipeline = pipeline(reader, numbered_reply);

        let report = pipeline.process_directory(&ws.input, &ws.output).await.unwrap();

        assert_eq!(report.summary.len(), 20);
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 20);
        assert_eq!(seen.first().map(String::as_str), Some("FACTURE 00"));
        assert_eq!(seen.last().map(String::as_str), Some("FACTURE 19"));
        assert!(!seen.iter().any(|t| t == "FACTURE 20" || t == "FACTURE NOTES"));
        assert!(!ws.output.join("20.xml").exists());
    }

    #[tokio::test]
    async fn test_batch_with_nothing_extracted() {
        let ws = workspace(&[("a.pdf", ""), ("b.pdf", "ILLISIBLE")]);
        let pipeline = pipeline(PlainTextReader::default(), numbered_reply);

        let report = pipeline.process_directory(&ws.input, &ws.output).await.unwrap();

        assert!(report.summary.is_empty());
        assert_eq!(report.skipped.len(), 2);
        assert_eq!(report.summary_path, None);
        assert!(!ws.output.join("invoices_summary.xlsx").exists());
    }

    #[tokio::test]
    async fn test_batch_on_missing_directory() {
        let ws = workspace(&[]);
        let pipeline = pipeline(PlainTextReader::default(), fixed_reply);

        let err = pipeline
            .process_directory(&ws.input.join("missing"), &ws.output)
            .await
            .unwrap_err();
        assert_eq!(err.stage(), "list");
    }

    #[test]
    fn test_is_pdf_path() {
        assert!(is_pdf_path(Path::new("a.pdf")));
        assert!(is_pdf_path(Path::new("/x/B.PDF")));
        assert!(!is_pdf_path(Path::new("a.pdf.txt")));
        assert!(!is_pdf_path(Path::new("pdf")));
    }
}

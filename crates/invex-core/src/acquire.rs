//! Text acquisition: PDF text layer first, OCR on page images as fallback.

use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::error::{AcquireError, OcrError, PdfError};
use crate::models::config::InvexConfig;
use crate::ocr::TextRecognizer;
use crate::pdf::{DocumentReader, PdfExtractor};

const PAGE_SEPARATOR: &str = "\n\n";
const CANCELLED: &str = "cancelled";

/// How the text of a document was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextSource {
    /// Embedded PDF text layer.
    Direct,
    /// OCR on page images.
    Recognition,
}

/// Non-blank text acquired from a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedText {
    /// Page texts joined in page order.
    pub text: String,
    /// Strategy that produced the text.
    pub source: TextSource,
}

/// Obtains raw text from PDF documents.
///
/// OCR only runs when the text layer is blank or unreadable.
pub struct TextAcquirer {
    reader: Box<dyn DocumentReader>,
    recognizer: Option<Box<dyn TextRecognizer>>,
}

// Shared through `Arc` with blocking tasks and the HTTP service state.
const _: fn() = || {
    fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<TextAcquirer>();
};

impl TextAcquirer {
    /// Create an acquirer with no OCR fallback.
    pub fn new(reader: impl DocumentReader + 'static) -> Self {
        Self {
            reader: Box::new(reader),
            recognizer: None,
        }
    }

    /// Set the OCR engine used for the fallback.
    pub fn with_recognizer(mut self, recognizer: impl TextRecognizer + 'static) -> Self {
        self.recognizer = Some(Box::new(recognizer));
        self
    }

    /// Build the default acquirer: lopdf/pdf-extract reader (with PDFium page
    /// rendering when available) plus the pure-onnx-ocr engine when its model
    /// files are available.
    pub fn from_config(config: &InvexConfig) -> Self {
        let reader = PdfExtractor::new()
            .with_max_pages(config.pdf.max_pages)
            .with_render_dpi(config.pdf.render_dpi);
        let acquirer = Self::new(reader);

        if !config.ocr.enabled {
            debug!("OCR fallback disabled by configuration");
            return acquirer;
        }

        if !config.ocr.models_present() {
            warn!(
                "OCR models not found in {}, scanned PDFs will yield no text",
                config.ocr.model_dir.display()
            );
            return acquirer;
        }

        #[cfg(feature = "native")]
        {
            match crate::ocr::PureOcrEngine::from_config(&config.ocr) {
                Ok(engine) => return acquirer.with_recognizer(engine),
                Err(e) => warn!("OCR engine unavailable: {}", e),
            }
        }

        acquirer
    }

    /// True if an OCR engine is configured.
    pub fn has_recognizer(&self) -> bool {
        self.recognizer.is_some()
    }

    /// Acquire text from a PDF file.
    pub fn acquire(&self, path: &Path) -> Result<ExtractedText, AcquireError> {
        self.acquire_cancellable(path, &AtomicBool::new(false))
    }

    /// Acquire text from a PDF file, giving up once `cancel` is set.
    ///
    /// The flag is checked before OCR starts and between OCR pages.
    pub fn acquire_cancellable(
        &self,
        path: &Path,
        cancel: &AtomicBool,
    ) -> Result<ExtractedText, AcquireError> {
        let data = fs::read(path)?;
        debug!("Read {} bytes from {}", data.len(), path.display());
        self.acquire_bytes_cancellable(&data, cancel)
    }

    /// Acquire text from in-memory PDF bytes.
    pub fn acquire_bytes(&self, data: &[u8]) -> Result<ExtractedText, AcquireError> {
        self.acquire_bytes_cancellable(data, &AtomicBool::new(false))
    }

    fn acquire_bytes_cancellable(
        &self,
        data: &[u8],
        cancel: &AtomicBool,
    ) -> Result<ExtractedText, AcquireError> {
        let direct = match self.direct_text(data) {
            Ok(text) if !text.trim().is_empty() => {
                return Ok(ExtractedText {
                    text,
                    source: TextSource::Direct,
                });
            }
            Ok(_) => "blank".to_string(),
            Err(e) => {
                warn!("Error extracting text layer: {}", e);
                e.to_string()
            }
        };

        info!("No text layer found, using OCR");
        let start = Instant::now();

        let recognition = match self.recognized_text(data, cancel) {
            Ok(text) if !text.trim().is_empty() => {
                debug!("OCR completed in {}ms", start.elapsed().as_millis());
                return Ok(ExtractedText {
                    text,
                    source: TextSource::Recognition,
                });
            }
            Ok(_) => "blank".to_string(),
            Err(e) => {
                warn!("Error extracting text with OCR: {}", e);
                e
            }
        };

        Err(AcquireError::NoText { direct, recognition })
    }

    fn direct_text(&self, data: &[u8]) -> Result<String, PdfError> {
        let pages = self.reader.page_texts(data)?;
        Ok(join_pages(pages))
    }

    fn recognized_text(&self, data: &[u8], cancel: &AtomicBool) -> Result<String, String> {
        let recognizer = self
            .recognizer
            .as_ref()
            .ok_or_else(|| OcrError::Unavailable.to_string())?;

        if cancel.load(Ordering::Relaxed) {
            return Err(CANCELLED.to_string());
        }
        let images = self.reader.page_images(data).map_err(|e| e.to_string())?;

        let mut pages = Vec::with_capacity(images.len());
        let mut last_error = None;
        for (i, image) in images.iter().enumerate() {
            if cancel.load(Ordering::Relaxed) {
                debug!("OCR cancelled after {} of {} pages", i, images.len());
                return Err(CANCELLED.to_string());
            }
            match recognizer.recognize(image) {
                Ok(text) => pages.push(text),
                Err(e) => {
                    warn!("OCR failed for page {}: {}", i + 1, e);
                    last_error = Some(e);
                }
            }
        }

        match (pages.is_empty(), last_error) {
            (true, Some(e)) => Err(e.to_string()),
            _ => Ok(join_pages(pages)),
        }
    }
}

fn join_pages(pages: Vec<String>) -> String {
    pages
        .into_iter()
        .filter(|p| !p.trim().is_empty())
        .collect::<Vec<_>>()
        .join(PAGE_SEPARATOR)
}

//! PDF processing module.

mod extractor;
#[cfg(feature = "pdfium")]
mod render;

pub use extractor::PdfExtractor;

use crate::error::PdfError;
use image::DynamicImage;

/// Resolution used when rasterizing pages for OCR.
pub const DEFAULT_RENDER_DPI: u32 = 200;

/// Result type for PDF operations.
pub type Result<T> = std::result::Result<T, PdfError>;

/// Source of per-page content for a PDF document.
///
/// Both methods return pages in document order.
pub trait DocumentReader: Send + Sync {
    /// Text layer of every page.
    fn page_texts(&self, data: &[u8]) -> Result<Vec<String>>;

    /// One image per page, for OCR. Pages with no usable image are omitted.
    fn page_images(&self, data: &[u8]) -> Result<Vec<DynamicImage>>;
}

#[cfg(test)]
pub(crate) use extractor::tests as extractor_tests;

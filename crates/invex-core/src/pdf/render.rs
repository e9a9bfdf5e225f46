//! Page rasterization via PDFium.
//!
//! `pdfium-render` binds to the PDFium shared library at runtime. The
//! upstream `Pdfium` handle is `!Send`, so a fresh binding is made for each
//! document; the OS caches the library load.

use image::DynamicImage;
use pdfium_render::prelude::*;
use tracing::{debug, warn};

use super::Result;
use crate::error::PdfError;

/// Largest rendered width or height.
const MAX_DIMENSION_PX: u32 = 4096;

const POINTS_PER_INCH: f32 = 72.0;

/// Bind to the PDFium library.
///
/// Looks at `PDFIUM_DYNAMIC_LIB_PATH`, then next to the running executable,
/// then the system library path.
fn load_pdfium() -> Result<Pdfium> {
    if let Ok(path) = std::env::var("PDFIUM_DYNAMIC_LIB_PATH") {
        let bindings = Pdfium::bind_to_library(&path).map_err(|e| {
            PdfError::Render(format!("failed to load PDFium from {}: {}", path, e))
        })?;
        return Ok(Pdfium::new(bindings));
    }

    if let Some(exe_dir) = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.to_path_buf()))
    {
        let lib_path =
            Pdfium::pdfium_platform_library_name_at_path(exe_dir.to_string_lossy().as_ref());
        if let Ok(bindings) = Pdfium::bind_to_library(&lib_path) {
            debug!("Loaded PDFium from {}", exe_dir.display());
            return Ok(Pdfium::new(bindings));
        }
    }

    let bindings = Pdfium::bind_to_system_library().map_err(|e| {
        PdfError::Render(format!(
            "PDFium library not found, set PDFIUM_DYNAMIC_LIB_PATH: {}",
            e
        ))
    })?;
    Ok(Pdfium::new(bindings))
}

/// Pixel size for a page at `dpi`, capped at `MAX_DIMENSION_PX` with the
/// aspect ratio kept.
fn render_dimensions(width_points: f32, height_points: f32, dpi: u32) -> (u32, u32) {
    let scale = dpi as f32 / POINTS_PER_INCH;
    let raw_w = (width_points * scale).max(1.0);
    let raw_h = (height_points * scale).max(1.0);

    let largest = raw_w.max(raw_h);
    if largest > MAX_DIMENSION_PX as f32 {
        let ratio = MAX_DIMENSION_PX as f32 / largest;
        (
            ((raw_w * ratio) as u32).clamp(1, MAX_DIMENSION_PX),
            ((raw_h * ratio) as u32).clamp(1, MAX_DIMENSION_PX),
        )
    } else {
        (raw_w as u32, raw_h as u32)
    }
}

fn map_load_error(e: PdfiumError) -> PdfError {
    let msg = e.to_string();
    let lower = msg.to_lowercase();
    if lower.contains("password") || lower.contains("encrypt") {
        PdfError::Encrypted
    } else {
        PdfError::Parse(msg)
    }
}

/// Rasterize the first `limit` pages of a document, in page order.
pub(crate) fn render_pages(data: &[u8], dpi: u32, limit: usize) -> Result<Vec<DynamicImage>> {
    let pdfium = load_pdfium()?;
    let document = pdfium
        .load_pdf_from_byte_slice(data, None)
        .map_err(map_load_error)?;

    let mut images = Vec::new();
    for (index, page) in document.pages().iter().enumerate().take(limit) {
        let (width, height) = render_dimensions(page.width().value, page.height().value, dpi);
        let config = PdfRenderConfig::new()
            .set_target_width(width as i32)
            .set_maximum_height(height as i32);

        match page.render_with_config(&config) {
            Ok(bitmap) => images.push(bitmap.as_image()),
            Err(e) => warn!("Failed to render page {}: {}", index + 1, e),
        }
    }

    debug!("Rendered {} pages at {} dpi", images.len(), dpi);
    Ok(images)
}

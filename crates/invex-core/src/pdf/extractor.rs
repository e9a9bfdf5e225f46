//! PDF text and page image extraction using lopdf and pdf-extract.

use std::borrow::Cow;
use std::panic::{self, AssertUnwindSafe};

use image::{DynamicImage, GrayImage, RgbImage};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};
use tracing::{debug, trace};

use super::{DEFAULT_RENDER_DPI, DocumentReader, Result};
use crate::error::PdfError;

/// Nesting limit when following form XObjects.
const MAX_FORM_DEPTH: usize = 8;

/// PDF reader backed by lopdf (structure, images) and pdf-extract (text).
///
/// Page images are rasterized with PDFium when the `pdfium` feature is on and
/// the library can be loaded; otherwise the embedded image XObjects of each
/// page are decoded.
#[derive(Debug, Clone)]
pub struct PdfExtractor {
    max_pages: usize,
    #[cfg_attr(not(feature = "pdfium"), allow(dead_code))]
    render_dpi: u32,
}

impl Default for PdfExtractor {
    fn default() -> Self {
        Self {
            max_pages: 0,
            render_dpi: DEFAULT_RENDER_DPI,
        }
    }
}

impl PdfExtractor {
    /// Create an extractor reading every page.
    pub fn new() -> Self {
        Self::default()
    }

    /// Limit the number of pages read (0 = unlimited).
    pub fn with_max_pages(mut self, max_pages: usize) -> Self {
        self.max_pages = max_pages;
        self
    }

    /// Resolution used when rasterizing pages.
    pub fn with_render_dpi(mut self, dpi: u32) -> Self {
        self.render_dpi = dpi.max(1);
        self
    }

    fn page_limit(&self, page_count: usize) -> usize {
        if self.max_pages == 0 {
            page_count
        } else {
            page_count.min(self.max_pages)
        }
    }

    /// Parse the document, decrypting PDFs protected by an empty password.
    ///
    /// Returns the document and the bytes pdf-extract should read.
    fn load<'a>(&self, data: &'a [u8]) -> Result<(Document, Cow<'a, [u8]>)> {
        let mut doc = Document::load_mem(data).map_err(|e| PdfError::Parse(e.to_string()))?;

        let bytes = if doc.is_encrypted() {
            if doc.decrypt("").is_err() {
                return Err(PdfError::Encrypted);
            }
            debug!("Decrypted PDF with empty password");

            let mut decrypted = Vec::new();
            doc.save_to(&mut decrypted)
                .map_err(|e| PdfError::Parse(format!("failed to save decrypted PDF: {}", e)))?;
            Cow::Owned(decrypted)
        } else {
            Cow::Borrowed(data)
        };

        if doc.get_pages().is_empty() {
            return Err(PdfError::NoPages);
        }

        Ok((doc, bytes))
    }

    /// Largest decodable image drawn on each page, in page order.
    fn embedded_page_images(&self, data: &[u8]) -> Result<Vec<DynamicImage>> {
        let (doc, _) = self.load(data)?;
        let pages = doc.get_pages();
        let limit = self.page_limit(pages.len());

        let mut images = Vec::with_capacity(limit);
        for (page_num, page_id) in pages.iter().take(limit) {
            let mut found = Vec::new();
            if let Some(resources) = page_resources(&doc, *page_id) {
                collect_images(&doc, &resources, 0, &mut found);
            }

            // A scanned page normally carries one full-page image; keep the largest.
            let largest = found
                .into_iter()
                .max_by_key(|img| u64::from(img.width()) * u64::from(img.height()));

            match largest {
                Some(img) => {
                    trace!("Page {}: {}x{} image", page_num, img.width(), img.height());
                    images.push(img);
                }
                None => debug!("No decodable image on page {}", page_num),
            }
        }

        if images.is_empty() {
            return Err(PdfError::ImageExtraction("no images found in PDF".to_string()));
        }

        debug!("Decoded {} embedded page images", images.len());
        Ok(images)
    }
}

impl DocumentReader for PdfExtractor {
    fn page_texts(&self, data: &[u8]) -> Result<Vec<String>> {
        let (doc, bytes) = self.load(data)?;
        let limit = self.page_limit(doc.get_pages().len());

        // pdf-extract panics on some malformed content streams.
        let extracted = panic::catch_unwind(AssertUnwindSafe(|| {
            pdf_extract::extract_text_from_mem_by_pages(&bytes)
        }))
        .map_err(|_| PdfError::TextExtraction("text extractor panicked".to_string()))?
        .map_err(|e| PdfError::TextExtraction(e.to_string()))?;

        let mut pages = extracted;
        pages.truncate(limit);

        debug!(
            "Extracted {} chars of text from {} pages",
            pages.iter().map(String::len).sum::<usize>(),
            pages.len()
        );
        Ok(pages)
    }

    fn page_images(&self, data: &[u8]) -> Result<Vec<DynamicImage>> {
        #[cfg(feature = "pdfium")]
        {
            let limit = if self.max_pages == 0 {
                usize::MAX
            } else {
                self.max_pages
            };
            match super::render::render_pages(data, self.render_dpi, limit) {
                Ok(images) if !images.is_empty() => return Ok(images),
                Ok(_) => debug!("PDFium rendered no pages, decoding embedded images"),
                Err(e) => debug!("{}, decoding embedded images", e),
            }
        }

        self.embedded_page_images(data)
    }
}

/// Resources dictionary for a page, following inheritance through `Parent`.
fn page_resources(doc: &Document, node_id: ObjectId) -> Option<Dictionary> {
    let Ok(Object::Dictionary(dict)) = doc.get_object(node_id) else {
        return None;
    };

    if let Ok(resources) = dict.get(b"Resources") {
        if let Ok((_, Object::Dictionary(res_dict))) = doc.dereference(resources) {
            return Some(res_dict.clone());
        }
    }

    match dict.get(b"Parent") {
        Ok(Object::Reference(parent_id)) => page_resources(doc, *parent_id),
        _ => None,
    }
}

/// Decode the image XObjects in `resources`, descending into form XObjects.
fn collect_images(
    doc: &Document,
    resources: &Dictionary,
    depth: usize,
    out: &mut Vec<DynamicImage>,
) {
    if depth > MAX_FORM_DEPTH {
        return;
    }
    let Ok(xobjects) = resources.get(b"XObject") else {
        return;
    };
    let Ok((_, Object::Dictionary(xobj_dict))) = doc.dereference(xobjects) else {
        return;
    };

    for (_, obj_ref) in xobj_dict.iter() {
        let Ok((_, Object::Stream(stream))) = doc.dereference(obj_ref) else {
            continue;
        };
        match stream.dict.get(b"Subtype").and_then(Object::as_name) {
            Ok(b"Image") => out.extend(decode_image(doc, stream)),
            Ok(b"Form") => {
                let form_resources = stream
                    .dict
                    .get(b"Resources")
                    .ok()
                    .and_then(|r| doc.dereference(r).ok())
                    .and_then(|(_, r)| r.as_dict().ok().cloned());
                if let Some(form_resources) = form_resources {
                    collect_images(doc, &form_resources, depth + 1, out);
                }
            }
            _ => {}
        }
    }
}

/// Color space of an image XObject.
#[derive(Debug, Clone, PartialEq)]
enum ColorSpace {
    Gray,
    Rgb,
    Cmyk,
    /// Palette of base-space entries.
    Indexed { base: Box<ColorSpace>, palette: Vec<u8> },
}

impl ColorSpace {
    fn components(&self) -> usize {
        match self {
            ColorSpace::Gray | ColorSpace::Indexed { .. } => 1,
            ColorSpace::Rgb => 3,
            ColorSpace::Cmyk => 4,
        }
    }

    fn resolve(doc: &Document, obj: &Object) -> Option<Self> {
        let obj = match obj {
            Object::Reference(id) => doc.get_object(*id).ok()?,
            other => other,
        };

        match obj {
            Object::Name(name) => Self::from_name(name),
            Object::Array(items) => {
                let family = items.first()?.as_name().ok()?;
                match family {
                    b"Indexed" | b"I" => {
                        let base = Self::resolve(doc, items.get(1)?)?;
                        let lookup = match items.get(3)? {
                            Object::Reference(id) => doc.get_object(*id).ok()?,
                            other => other,
                        };
                        let palette = match lookup {
                            Object::String(bytes, _) => bytes.clone(),
                            Object::Stream(stream) => stream
                                .decompressed_content()
                                .unwrap_or_else(|_| stream.content.clone()),
                            _ => return None,
                        };
                        Some(ColorSpace::Indexed {
                            base: Box::new(base),
                            palette,
                        })
                    }
                    b"ICCBased" => {
                        let profile = match items.get(1)? {
                            Object::Reference(id) => doc.get_object(*id).ok()?,
                            other => other,
                        };
                        let n = profile.as_stream().ok()?.dict.get(b"N").ok()?.as_i64().ok()?;
                        match n {
                            1 => Some(ColorSpace::Gray),
                            3 => Some(ColorSpace::Rgb),
                            4 => Some(ColorSpace::Cmyk),
                            _ => None,
                        }
                    }
                    b"CalGray" => Some(ColorSpace::Gray),
                    b"CalRGB" => Some(ColorSpace::Rgb),
                    _ => None,
                }
            }
            _ => None,
        }
    }

    fn from_name(name: &[u8]) -> Option<Self> {
        match name {
            b"DeviceGray" | b"G" | b"CalGray" => Some(ColorSpace::Gray),
            b"DeviceRGB" | b"RGB" | b"CalRGB" => Some(ColorSpace::Rgb),
            b"DeviceCMYK" | b"CMYK" => Some(ColorSpace::Cmyk),
            _ => None,
        }
    }

    /// RGB value of one base-space color given as 8-bit components.
    fn to_rgb(&self, components: &[u8]) -> [u8; 3] {
        match (self, components) {
            (ColorSpace::Gray, [g, ..]) => [*g, *g, *g],
            (ColorSpace::Rgb, [r, g, b, ..]) => [*r, *g, *b],
            (ColorSpace::Cmyk, [c, m, y, k, ..]) => cmyk_to_rgb(*c, *m, *y, *k),
            _ => [0, 0, 0],
        }
    }
}

fn cmyk_to_rgb(c: u8, m: u8, y: u8, k: u8) -> [u8; 3] {
    let white = 255 - u16::from(k);
    let channel = |v: u8| ((255 - u16::from(v)) * white / 255) as u8;
    [channel(c), channel(m), channel(y)]
}

/// Split packed samples into one byte per sample. Rows start on a byte
/// boundary. Values stay unscaled.
fn unpack_samples(
    data: &[u8],
    width: usize,
    height: usize,
    per_pixel: usize,
    bits: u8,
) -> Option<Vec<u8>> {
    let per_row = width * per_pixel;
    let row_bytes = (per_row * usize::from(bits)).div_ceil(8);
    if data.len() < row_bytes * height {
        return None;
    }

    let mut samples = Vec::with_capacity(per_row * height);
    for row in data.chunks(row_bytes).take(height) {
        match bits {
            8 => samples.extend_from_slice(&row[..per_row]),
            16 => samples.extend(row.chunks(2).take(per_row).map(|pair| pair[0])),
            1 | 2 | 4 => {
                let mask = (1u8 << bits) - 1;
                let per_byte = 8 / usize::from(bits);
                for i in 0..per_row {
                    let byte = row[i / per_byte];
                    let shift = 8 - usize::from(bits) * (i % per_byte + 1);
                    samples.push((byte >> shift) & mask);
                }
            }
            _ => return None,
        }
    }
    Some(samples)
}

/// True when the `Decode` array maps samples inversely, as in `[1 0]`.
fn decode_inverted(dict: &Dictionary) -> bool {
    let Ok(Object::Array(range)) = dict.get(b"Decode") else {
        return false;
    };
    let number = |o: &Object| o.as_float().ok().or_else(|| o.as_i64().ok().map(|v| v as f32));
    matches!(
        (range.first().and_then(number), range.get(1).and_then(number)),
        (Some(lo), Some(hi)) if lo > hi
    )
}

/// Decode an image XObject stream.
///
/// Handles JPEG, and raw samples of 1 to 16 bits in gray, RGB, CMYK or
/// indexed color. CCITT, JBIG2 and JPEG 2000 data are left to the renderer.
fn decode_image(doc: &Document, stream: &Stream) -> Option<DynamicImage> {
    let dict = &stream.dict;

    let width = u32::try_from(dict.get(b"Width").ok()?.as_i64().ok()?).ok()?;
    let height = u32::try_from(dict.get(b"Height").ok()?.as_i64().ok()?).ok()?;

    let filter = dict.get(b"Filter").ok().and_then(|f| match f {
        Object::Name(name) => Some(name.as_slice()),
        Object::Array(arr) => arr.last().and_then(|o| o.as_name().ok()),
        _ => None,
    });

    match filter {
        Some(b"DCTDecode") | Some(b"DCT") => {
            return image::load_from_memory_with_format(&stream.content, image::ImageFormat::Jpeg)
                .ok();
        }
        Some(b"JPXDecode") | Some(b"CCITTFaxDecode") | Some(b"CCF") | Some(b"JBIG2Decode") => {
            trace!("Unsupported image filter {:?}", filter.map(String::from_utf8_lossy));
            return None;
        }
        _ => {}
    }

    let data = stream
        .decompressed_content()
        .unwrap_or_else(|_| stream.content.clone());

    let is_mask = matches!(dict.get(b"ImageMask"), Ok(Object::Boolean(true)));
    let (color_space, bits) = if is_mask {
        (ColorSpace::Gray, 1)
    } else {
        let color_space = match dict.get(b"ColorSpace") {
            Ok(obj) => ColorSpace::resolve(doc, obj)?,
            Err(_) => ColorSpace::Rgb,
        };
        let bits = dict
            .get(b"BitsPerComponent")
            .ok()
            .and_then(|o| o.as_i64().ok())
            .and_then(|b| u8::try_from(b).ok())
            .unwrap_or(8);
        (color_space, bits)
    };

    let (w, h) = (width as usize, height as usize);
    let Some(samples) = unpack_samples(&data, w, h, color_space.components(), bits) else {
        trace!(
            "Could not decode image: data_len={}, bits={}, colorspace={:?}",
            data.len(),
            bits,
            color_space
        );
        return None;
    };

    let max = if bits >= 8 { 255u16 } else { (1u16 << bits) - 1 };
    let scale = |v: u8| (u16::from(v) * 255 / max) as u8;
    let inverted = decode_inverted(dict);

    match &color_space {
        ColorSpace::Gray => {
            let pixels = samples
                .into_iter()
                .map(|v| if inverted { 255 - scale(v) } else { scale(v) })
                .collect();
            GrayImage::from_raw(width, height, pixels).map(DynamicImage::ImageLuma8)
        }
        ColorSpace::Rgb => {
            let pixels = samples.into_iter().map(scale).collect();
            RgbImage::from_raw(width, height, pixels).map(DynamicImage::ImageRgb8)
        }
        ColorSpace::Cmyk => {
            let pixels = samples
                .chunks(4)
                .flat_map(|c| cmyk_to_rgb(scale(c[0]), scale(c[1]), scale(c[2]), scale(c[3])))
                .collect();
            RgbImage::from_raw(width, height, pixels).map(DynamicImage::ImageRgb8)
        }
        ColorSpace::Indexed { base, palette } => {
            let n = base.components();
            let pixels = samples
                .into_iter()
                .flat_map(|index| {
                    let at = usize::from(index) * n;
                    palette
                        .get(at..at + n)
                        .map(|entry| base.to_rgb(entry))
                        .unwrap_or([0, 0, 0])
                })
                .collect();
            RgbImage::from_raw(width, height, pixels).map(DynamicImage::ImageRgb8)
        }
    }
}

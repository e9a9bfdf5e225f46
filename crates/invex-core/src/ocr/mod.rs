//! OCR fallback for PDFs without a text layer.

#[cfg(feature = "native")]
mod pure_engine;

#[cfg(feature = "native")]
pub use pure_engine::PureOcrEngine;

use image::DynamicImage;

use crate::error::OcrError;

/// Optical character recognition over a single page image.
pub trait TextRecognizer: Send + Sync {
    /// Recognize the text on one page image, in reading order.
    fn recognize(&self, image: &DynamicImage) -> Result<String, OcrError>;
}

/// A detected text box with its coordinates and content.
#[derive(Debug, Clone)]
pub(crate) struct TextBox {
    /// Axis-aligned bounds (min_x, min_y, max_x, max_y).
    pub rect: (f32, f32, f32, f32),
    /// Recognized text content.
    pub text: String,
}

/// Sort boxes top-to-bottom, then left-to-right within a 20px row band,
/// and join their text with newlines.
pub(crate) fn join_in_reading_order(mut boxes: Vec<TextBox>) -> String {
    boxes.sort_by(|a, b| {
        let row_a = (a.rect.1 / 20.0) as i32;
        let row_b = (b.rect.1 / 20.0) as i32;
        row_a
            .cmp(&row_b)
            .then_with(|| a.rect.0.partial_cmp(&b.rect.0).unwrap_or(std::cmp::Ordering::Equal))
    });

    boxes
        .iter()
        .map(|b| b.text.as_str())
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn text_box(x: f32, y: f32, text: &str) -> TextBox {
        TextBox {
            rect: (x, y, x + 50.0, y + 10.0),
            text: text.to_string(),
        }
    }

    #[test]
    fn test_reading_order() {
        let boxes = vec![
            text_box(300.0, 102.0, "EUR"),
            text_box(10.0, 40.0, "FACTURE"),
            text_box(10.0, 100.0, "Total"),
            text_box(150.0, 45.0, "N° 2024-001"),
        ];

        assert_eq!(
            join_in_reading_order(boxes),
            "FACTURE\nN° 2024-001\nTotal\nEUR"
        );
    }
}

//! Pure Rust OCR engine wrapper using `pure-onnx-ocr`.

use std::sync::Mutex;
use std::time::Instant;

use image::{DynamicImage, GenericImageView};
use tracing::{debug, info};

use crate::error::OcrError;
use crate::models::config::OcrConfig;

use super::{TextBox, TextRecognizer, join_in_reading_order};

/// OCR engine backed by `pure-onnx-ocr` (PaddleOCR models, no external runtime).
///
/// The underlying engine caches inference plans in `RefCell`s, so calls are
/// serialized through a mutex.
pub struct PureOcrEngine {
    engine: Mutex<pure_onnx_ocr::engine::OcrEngine>,
    keep_unk: bool,
}

impl PureOcrEngine {
    /// Create an engine from the model files named in the configuration.
    pub fn from_config(config: &OcrConfig) -> Result<Self, OcrError> {
        let model_dir = &config.model_dir;

        let engine = pure_onnx_ocr::engine::OcrEngineBuilder::new()
            .det_model_path(&model_dir.join(&config.detection_model))
            .rec_model_path(&model_dir.join(&config.recognition_model))
            .dictionary_path(&model_dir.join(&config.dictionary))
            .build()
            .map_err(|e| OcrError::ModelLoad(format!("pure-onnx-ocr: {}", e)))?;

        info!("Loaded pure-onnx-ocr engine from {}", model_dir.display());

        Ok(Self {
            engine: Mutex::new(engine),
            keep_unk: config.keep_unk,
        })
    }
}

impl TextRecognizer for PureOcrEngine {
    fn recognize(&self, image: &DynamicImage) -> Result<String, OcrError> {
        let start = Instant::now();
        let (width, height) = image.dimensions();

        let results = {
            let engine = self
                .engine
                .lock()
                .map_err(|_| OcrError::Recognition("OCR engine lock poisoned".to_string()))?;
            engine
                .run_from_image(image)
                .map_err(|e| OcrError::Recognition(format!("pure-onnx-ocr: {}", e)))?
        };

        let boxes: Vec<TextBox> = results
            .iter()
            .map(|r| TextBox {
                rect: polygon_rect(&r.bounding_box),
                text: if self.keep_unk {
                    r.text.clone()
                } else {
                    r.text.replace("[UNK]", " ")
                },
            })
            .collect();

        debug!(
            "OCR on {}x{} image: {} text regions in {}ms",
            width,
            height,
            boxes.len(),
            start.elapsed().as_millis()
        );

        Ok(join_in_reading_order(boxes))
    }
}

/// Axis-aligned bounds of a detection polygon.
fn polygon_rect(polygon: &pure_onnx_ocr::Polygon<f64>) -> (f32, f32, f32, f32) {
    let mut rect = (f32::INFINITY, f32::INFINITY, f32::NEG_INFINITY, f32::NEG_INFINITY);
    for coord in polygon.exterior().coords() {
        let (x, y) = (coord.x as f32, coord.y as f32);
        rect.0 = rect.0.min(x);
        rect.1 = rect.1.min(y);
        rect.2 = rect.2.max(x);
        rect.3 = rect.3.max(y);
    }
    rect
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn missing_models_config() -> (tempfile::TempDir, OcrConfig) {
        let dir = tempfile::tempdir().unwrap();
        let config = OcrConfig {
            model_dir: dir.path().join("absent"),
            ..OcrConfig::default()
        };
        (dir, config)
    }

    #[test]
    fn test_missing_models_is_load_error() {
        let (_dir, config) = missing_models_config();

        let engine: Result<Box<dyn TextRecognizer>, OcrError> =
            PureOcrEngine::from_config(&config).map(|e| Box::new(e) as Box<dyn TextRecognizer>);

        assert!(matches!(engine, Err(OcrError::ModelLoad(_))));
    }

    #[test]
    fn test_engine_is_shareable_recognizer() {
        fn assert_recognizer<T: TextRecognizer + Send + Sync + 'static>() {}
        assert_recognizer::<PureOcrEngine>();
    }

    #[test]
    fn test_polygon_rect_bounds() {
        let polygon = pure_onnx_ocr::Polygon::new(
            vec![(10.0, 20.0), (60.0, 18.0), (62.0, 40.0), (8.0, 42.0)].into(),
            vec![],
        );

        assert_eq!(polygon_rect(&polygon), (8.0, 18.0, 62.0, 42.0));
    }
}

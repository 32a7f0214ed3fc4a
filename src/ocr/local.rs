use super::{EncodedImage, LabelReader, parse_label_fields};
use crate::error::QaError;
use crate::models::LabelFields;
use async_trait::async_trait;
use image::DynamicImage;
use ocrs::{ImageSource, OcrEngine, OcrEngineParams};
use rten::Model;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// Offline label reader running the `ocrs` engine on each crop.
///
/// It has no notion of the prompt: it reads `Field: value` lines straight
/// off the label text.
#[derive(Clone)]
pub struct LocalLabelReader {
    engine: Arc<OcrEngine>,
}

impl LocalLabelReader {
    /// Load the detection and recognition models from `~/.cache/ocrs`
    pub fn from_default_cache() -> Result<Self, QaError> {
        let home_dir = std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .map_err(|_| QaError::Config("cannot locate home directory for OCR models".into()))?;
        Self::from_dir(&Path::new(&home_dir).join(".cache/ocrs"))
    }

    pub fn from_dir(cache_dir: &Path) -> Result<Self, QaError> {
        // Check if models exist
        let detection_model_path = cache_dir.join("text-detection.rten");
        let recognition_model_path = cache_dir.join("text-recognition.rten");

        if !detection_model_path.exists() || !recognition_model_path.exists() {
            return Err(QaError::Config(format!(
                "OCR models not found, expected {} and {}",
                detection_model_path.display(),
                recognition_model_path.display()
            )));
        }

        // Load models
        let detection_model = load_model(&detection_model_path)?;
        let recognition_model = load_model(&recognition_model_path)?;

        // Create engine
        let engine = OcrEngine::new(OcrEngineParams {
            detection_model: Some(detection_model),
            recognition_model: Some(recognition_model),
            ..Default::default()
        })
        .map_err(|e| QaError::Config(format!("cannot initialise OCR engine: {e}")))?;

        Ok(Self {
            engine: Arc::new(engine),
        })
    }
}

fn load_model(path: &Path) -> Result<Model, QaError> {
    Model::load_file(path)
        .map_err(|e| QaError::Config(format!("cannot load {}: {e}", path.display())))
}

/// Run detection and recognition on one crop
fn read_text(engine: &OcrEngine, image: &DynamicImage) -> Result<String, QaError> {
    // Convert to RGB8 format for OCR
    let img = image.to_rgb8();
    let source = ImageSource::from_bytes(img.as_raw(), img.dimensions())
        .map_err(|e| QaError::OcrFormat(e.to_string()))?;
    let input = engine
        .prepare_input(source)
        .map_err(|e| QaError::OcrFormat(e.to_string()))?;
    engine
        .get_text(&input)
        .map_err(|e| QaError::OcrFormat(e.to_string()))
}

#[async_trait]
impl LabelReader for LocalLabelReader {
    fn name(&self) -> &str {
        "ocrs"
    }

    async fn extract(&self, images: &[EncodedImage], _prompt: &str) -> Result<LabelFields, QaError> {
        // Decode on this task, recognise on the blocking pool
        let decoded = images
            .iter()
            .map(|img| img.decode().map(|d| (img.view, d)))
            .collect::<Result<Vec<_>, _>>()?;
        let engine = Arc::clone(&self.engine);

        let text = tokio::task::spawn_blocking(move || -> Result<String, QaError> {
            let mut text = String::new();
            for (view, image) in decoded {
                let chunk = read_text(&engine, &image)?;
                debug!(%view, chars = chunk.len(), "read label text");
                text.push_str(chunk.trim());
                text.push('\n');
            }
            Ok(text)
        })
        .await
        .map_err(|e| QaError::OcrFormat(format!("OCR task failed: {e}")))??;

        parse_label_fields(&text)
    }
}

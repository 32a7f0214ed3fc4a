use async_trait::async_trait;
use bottleqa::detection::{Classification, Classifier, Detector, ProductType, ProductTypeRouter};
use bottleqa::models::{BoundingBox, LabelField, LabelFields, RawDetection};
use bottleqa::ocr::{EncodedImage, LabelReader};
use bottleqa::{QaError, QaPipeline, SessionImages, View};
use image::{DynamicImage, ImageBuffer, Rgb};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Creates a 100x100 solid test image.
pub fn create_test_image(shade: u8) -> DynamicImage {
    DynamicImage::ImageRgb8(ImageBuffer::from_fn(100, 100, |x, y| {
        Rgb([shade, (x % 256) as u8, (y % 256) as u8])
    }))
}

/// All six views, each a distinct synthetic image.
pub fn six_images() -> SessionImages {
    View::ALL
        .iter()
        .enumerate()
        .fold(SessionImages::new(), |images, (i, view)| {
            images.with(*view, create_test_image(40 * i as u8))
        })
}

pub fn raw(class_name: &str, confidence: f32) -> RawDetection {
    RawDetection::new(class_name, confidence, BoundingBox::new(10.0, 10.0, 60.0, 60.0))
}

pub fn label_box(confidence: f32) -> RawDetection {
    RawDetection::new("Label", confidence, BoundingBox::new(20.0, 30.0, 80.0, 90.0))
}

/// A detector that replays fixed output, or fails every call.
pub struct ScriptedDetector {
    name: String,
    result: Result<Vec<RawDetection>, String>,
    calls: AtomicUsize,
}

impl ScriptedDetector {
    pub fn returning(name: &str, boxes: Vec<RawDetection>) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            result: Ok(boxes),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn failing(name: &str, reason: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            result: Err(reason.to_string()),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Detector for ScriptedDetector {
    fn name(&self) -> &str {
        &self.name
    }

    async fn invoke(&self, _image: &DynamicImage) -> Result<Vec<RawDetection>, QaError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.result
            .clone()
            .map_err(|reason| QaError::model(&self.name, reason))
    }
}

/// A detector that answers per image shade, so top and bottom can differ.
pub struct ViewKeyedDetector {
    pub top: Result<Vec<RawDetection>, String>,
    pub bottom: Result<Vec<RawDetection>, String>,
    pub top_image: DynamicImage,
}

#[async_trait]
impl Detector for ViewKeyedDetector {
    fn name(&self) -> &str {
        "top-bottom"
    }

    async fn invoke(&self, image: &DynamicImage) -> Result<Vec<RawDetection>, QaError> {
        let result = if image.as_bytes() == self.top_image.as_bytes() {
            &self.top
        } else {
            &self.bottom
        };
        result.clone().map_err(|reason| QaError::model("top-bottom", reason))
    }
}

/// A classifier that always predicts the same label.
pub struct ScriptedClassifier(pub String);

#[async_trait]
impl Classifier for ScriptedClassifier {
    fn name(&self) -> &str {
        "scripted-classifier"
    }

    async fn classify(&self, _image: &DynamicImage) -> Result<Vec<Classification>, QaError> {
        Ok(vec![
            Classification {
                class_name: "other".to_string(),
                confidence: 0.05,
            },
            Classification {
                class_name: self.0.clone(),
                confidence: 0.91,
            },
        ])
    }
}

/// A classifier whose endpoint is down.
pub struct FailingClassifier;

#[async_trait]
impl Classifier for FailingClassifier {
    fn name(&self) -> &str {
        "failing-classifier"
    }

    async fn classify(&self, _image: &DynamicImage) -> Result<Vec<Classification>, QaError> {
        Err(QaError::model(self.name(), "service unavailable"))
    }
}

/// A classifier that never answers within any reasonable timeout.
pub struct StalledClassifier;

#[async_trait]
impl Classifier for StalledClassifier {
    fn name(&self) -> &str {
        "stalled-classifier"
    }

    async fn classify(&self, _image: &DynamicImage) -> Result<Vec<Classification>, QaError> {
        tokio::time::sleep(std::time::Duration::from_secs(3600)).await;
        Ok(Vec::new())
    }
}

/// A label reader that returns fixed fields and records which views it saw.
pub struct ScriptedLabelReader {
    fields: LabelFields,
    pub seen: Mutex<Vec<View>>,
}

impl ScriptedLabelReader {
    pub fn new(fields: LabelFields) -> Arc<Self> {
        Arc::new(Self {
            fields,
            seen: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl LabelReader for ScriptedLabelReader {
    fn name(&self) -> &str {
        "scripted-reader"
    }

    async fn extract(&self, images: &[EncodedImage], _prompt: &str) -> Result<LabelFields, QaError> {
        self.seen
            .lock()
            .unwrap()
            .extend(images.iter().map(|img| img.view));
        Ok(self.fields.clone())
    }
}

/// Five label fields, one of them the medicinal ingredients block.
pub fn sample_label_fields() -> LabelFields {
    vec![
        LabelField::new("Product Name", "Daily Immune Support"),
        LabelField::new("NPN", "80012345"),
        LabelField::new("Medicinal Ingredients", "Vitamin C 500mg; Zinc 10mg"),
        LabelField::new("Recommended Dose", "1 capsule daily"),
        LabelField::new("Expiry", "2027-04"),
    ]
}

/// Top/bottom output where every built-in check passes.
pub fn clean_top() -> Vec<RawDetection> {
    vec![raw("Cap", 0.95)]
}

pub fn clean_bottom() -> Vec<RawDetection> {
    vec![raw("Batch Code", 0.88)]
}

pub fn clean_side() -> Vec<RawDetection> {
    vec![raw("Fill Level", 0.9), label_box(0.93)]
}

/// A pipeline wired entirely with scripted models.
pub fn scripted_pipeline(
    top_bottom: Arc<dyn Detector>,
    product_label: &str,
    side: Arc<dyn Detector>,
    reader: Arc<dyn LabelReader>,
) -> QaPipeline {
    pipeline_with_classifier(
        top_bottom,
        Arc::new(ScriptedClassifier(product_label.to_string())),
        side,
        reader,
    )
}

pub fn pipeline_with_classifier(
    top_bottom: Arc<dyn Detector>,
    classifier: Arc<dyn Classifier>,
    side: Arc<dyn Detector>,
    reader: Arc<dyn LabelReader>,
) -> QaPipeline {
    let router = ProductTypeRouter::new()
        .with_classifier(classifier)
        .with_side_detector(ProductType::PillBottle, side.clone())
        .with_side_detector(ProductType::DropperBottle, side);

    QaPipeline::new()
        .with_top_bottom_detector(top_bottom)
        .with_router(router)
        .with_label_reader(reader)
}

pub mod annotate;
pub mod http;
pub mod router;
pub mod views;

pub use router::{ProductType, ProductTypeRouter, Routing, SideDetectorSelection, normalize_product_label};
pub use views::{
    AnalysisStatus, BOTTOM_THRESHOLD, LabelCropPolicy, SIDE_THRESHOLD, SideAnalyzer, TOP_THRESHOLD, ViewAnalysis,
    ViewAnalyzer, select_label_box,
};

use crate::error::QaError;
use crate::models::{Detection, RawDetection};
use async_trait::async_trait;
use image::{DynamicImage, RgbImage};
use std::time::Duration;
use tracing::debug;

/// An object-detection model. Implementations are loaded once and shared
/// read-only across sessions.
#[async_trait]
pub trait Detector: Send + Sync {
    /// Name used in notices and logs.
    fn name(&self) -> &str;

    /// Run the model on `image`, returning every box it produced.
    async fn invoke(&self, image: &DynamicImage) -> Result<Vec<RawDetection>, QaError>;
}

/// One class prediction from an image classifier.
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub class_name: String,
    pub confidence: f32,
}

#[async_trait]
pub trait Classifier: Send + Sync {
    fn name(&self) -> &str;

    async fn classify(&self, image: &DynamicImage) -> Result<Vec<Classification>, QaError>;
}

/// Result of one detector invocation.
///
/// A failed invocation carries no detections and no overlay, so callers can
/// treat the view as "no data" and keep going.
#[derive(Debug)]
pub struct DetectionOutcome {
    /// Detections strictly above the threshold.
    pub detections: Vec<Detection>,
    /// Every box, unfiltered, in model output order.
    pub raw: Vec<RawDetection>,
    pub annotated: Option<RgbImage>,
    pub error: Option<QaError>,
}

impl DetectionOutcome {
    pub fn failed(error: QaError) -> Self {
        Self {
            detections: Vec::new(),
            raw: Vec::new(),
            annotated: None,
            error: Some(error),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Invoke `detector` on `image` and keep detections above `threshold`.
///
/// The call is bounded by `timeout`; timeouts and malformed model output
/// come back as a failed outcome rather than an `Err`.
pub async fn detect(
    image: &DynamicImage,
    detector: &dyn Detector,
    threshold: f32,
    timeout: Duration,
) -> DetectionOutcome {
    let raw = match tokio::time::timeout(timeout, detector.invoke(image)).await {
        Ok(Ok(raw)) => raw,
        Ok(Err(e)) => return DetectionOutcome::failed(e),
        Err(_) => {
            return DetectionOutcome::failed(QaError::Timeout {
                operation: format!("model `{}`", detector.name()),
                seconds: timeout.as_secs(),
            });
        }
    };

    if let Err(e) = validate_output(detector.name(), &raw) {
        return DetectionOutcome::failed(e);
    }

    let detections: Vec<Detection> = raw
        .iter()
        .filter(|d| d.confidence > threshold)
        .map(|d| Detection {
            class_name: d.class_name.clone(),
            confidence: d.confidence,
        })
        .collect();

    debug!(
        model = detector.name(),
        boxes = raw.len(),
        kept = detections.len(),
        threshold,
        "detector returned"
    );

    let annotated = annotate::render_overlay(image, &raw, threshold);

    DetectionOutcome {
        detections,
        raw,
        annotated: Some(annotated),
        error: None,
    }
}

fn validate_output(model: &str, raw: &[RawDetection]) -> Result<(), QaError> {
    for (i, d) in raw.iter().enumerate() {
        if d.class_name.trim().is_empty() {
            return Err(QaError::model(model, format!("box {i} has no class name")));
        }
        if !(0.0..=1.0).contains(&d.confidence) {
            return Err(QaError::model(
                model,
                format!("box {i} confidence {} outside [0, 1]", d.confidence),
            ));
        }
        if !d.bbox.is_well_formed() {
            return Err(QaError::model(model, format!("box {i} has invalid coordinates")));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::BoundingBox;
    use image::{ImageBuffer, Rgb};

    struct Fixed(Vec<RawDetection>);

    #[async_trait]
    impl Detector for Fixed {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn invoke(&self, _image: &DynamicImage) -> Result<Vec<RawDetection>, QaError> {
            Ok(self.0.clone())
        }
    }

    struct Stalled;

    #[async_trait]
    impl Detector for Stalled {
        fn name(&self) -> &str {
            "stalled"
        }

        async fn invoke(&self, _image: &DynamicImage) -> Result<Vec<RawDetection>, QaError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(Vec::new())
        }
    }

    fn image() -> DynamicImage {
        DynamicImage::ImageRgb8(ImageBuffer::from_fn(64, 64, |_, _| Rgb([200u8, 200, 200])))
    }

    #[tokio::test]
    async fn keeps_only_detections_above_threshold() {
        let detector = Fixed(vec![
            RawDetection::new("Cap", 0.92, BoundingBox::new(1.0, 1.0, 20.0, 20.0)),
            RawDetection::new("Broken Seal", 0.80, BoundingBox::new(5.0, 5.0, 10.0, 10.0)),
        ]);

        let outcome = detect(&image(), &detector, 0.8, Duration::from_secs(5)).await;

        assert!(outcome.is_success());
        assert_eq!(outcome.raw.len(), 2);
        assert_eq!(outcome.detections.len(), 1);
        assert_eq!(outcome.detections[0].class_name, "Cap");
        assert!(outcome.annotated.is_some());
    }

    #[tokio::test]
    async fn malformed_output_degrades_to_failure() {
        let detector = Fixed(vec![RawDetection::new(
            "Cap",
            1.7,
            BoundingBox::new(1.0, 1.0, 20.0, 20.0),
        )]);

        let outcome = detect(&image(), &detector, 0.8, Duration::from_secs(5)).await;

        assert!(matches!(outcome.error, Some(QaError::ModelInvocation { .. })));
        assert!(outcome.detections.is_empty());
        assert!(outcome.annotated.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_model_times_out() {
        let outcome = detect(&image(), &Stalled, 0.7, Duration::from_secs(30)).await;
        assert!(matches!(outcome.error, Some(QaError::Timeout { seconds: 30, .. })));
    }
}

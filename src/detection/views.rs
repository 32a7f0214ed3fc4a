//! Per-view analyzers built on [`detect`](super::detect).
//!
//! Each analyzer takes the session's [`ViewDetections`] by value and hands
//! back the updated state together with a [`ViewAnalysis`] describing what
//! happened to that view.

use super::{DetectionOutcome, Detector, detect};
use crate::error::QaError;
use crate::models::{Detection, RawDetection, View, ViewDetections, ViewMap};
use crate::pipeline::PipelineContext;
use image::{DynamicImage, RgbImage};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Detections on the top view must score above this.
pub const TOP_THRESHOLD: f32 = 0.8;
/// Detections on the four side views must score above this.
pub const SIDE_THRESHOLD: f32 = 0.7;
/// Detections on the bottom view must score above this.
pub const BOTTOM_THRESHOLD: f32 = 0.6;

/// Which box to crop when several classes carry the label marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LabelCropPolicy {
    /// The last matching box in model output order.
    #[default]
    LastMatch,
    /// The matching box with the highest confidence; ties go to the earlier box.
    HighestConfidence,
}

#[derive(Debug)]
pub enum AnalysisStatus {
    Succeeded,
    /// No image or no detector; the view was never analysed.
    Skipped(String),
    Failed(QaError),
}

/// What happened to one view.
#[derive(Debug)]
pub struct ViewAnalysis {
    pub view: View,
    pub status: AnalysisStatus,
    pub detections: Vec<Detection>,
    pub annotated: Option<RgbImage>,
    /// Side views only: the label region, when a label box was found.
    pub label_crop: Option<DynamicImage>,
}

impl ViewAnalysis {
    pub fn skipped(view: View, reason: impl Into<String>) -> Self {
        Self {
            view,
            status: AnalysisStatus::Skipped(reason.into()),
            detections: Vec::new(),
            annotated: None,
            label_crop: None,
        }
    }

    pub fn succeeded(&self) -> bool {
        matches!(self.status, AnalysisStatus::Succeeded)
    }

    fn from_outcome(view: View, outcome: DetectionOutcome) -> Self {
        let status = match outcome.error {
            None => AnalysisStatus::Succeeded,
            Some(e) => AnalysisStatus::Failed(e),
        };
        Self {
            view,
            status,
            detections: outcome.detections,
            annotated: outcome.annotated,
            label_crop: None,
        }
    }
}

/// Top or bottom view analyzer.
#[derive(Debug, Clone, Copy)]
pub struct ViewAnalyzer {
    pub view: View,
    pub threshold: f32,
}

impl ViewAnalyzer {
    pub fn top() -> Self {
        Self {
            view: View::Top,
            threshold: TOP_THRESHOLD,
        }
    }

    pub fn bottom() -> Self {
        Self {
            view: View::Bottom,
            threshold: BOTTOM_THRESHOLD,
        }
    }

    pub async fn analyze(
        &self,
        image: &DynamicImage,
        detector: &dyn Detector,
        detections: ViewDetections,
        context: &PipelineContext,
    ) -> (ViewDetections, ViewAnalysis) {
        let outcome = detect(image, detector, self.threshold, context.model_timeout).await;
        record(self.view, outcome, detections, context)
    }
}

/// Side view analyzer: detection plus label crop extraction.
#[derive(Debug, Clone)]
pub struct SideAnalyzer {
    pub threshold: f32,
    pub crop_policy: LabelCropPolicy,
    pub label_marker: String,
}

impl SideAnalyzer {
    pub fn new(crop_policy: LabelCropPolicy, label_marker: impl Into<String>) -> Self {
        Self {
            threshold: SIDE_THRESHOLD,
            crop_policy,
            label_marker: label_marker.into(),
        }
    }

    /// Analyse one side view. `detector` is `None` when no side model was
    /// selected, in which case the view is reported as skipped.
    pub async fn analyze(
        &self,
        image: &DynamicImage,
        view: View,
        detector: Option<&dyn Detector>,
        detections: ViewDetections,
        context: &PipelineContext,
    ) -> (ViewDetections, ViewAnalysis) {
        let Some(detector) = detector else {
            warn!(%view, "no side detector selected, view left unanalysed");
            return (
                detections,
                ViewAnalysis::skipped(view, "no side-view detector available"),
            );
        };

        let outcome = detect(image, detector, self.threshold, context.model_timeout).await;
        let label_box = select_label_box(&outcome.raw, &self.label_marker, self.crop_policy)
            .map(|d| d.bbox);

        let (detections, mut analysis) = record(view, outcome, detections, context);
        analysis.label_crop = label_box.and_then(|b| b.crop(image));

        if analysis.succeeded() && analysis.label_crop.is_none() && context.verbose {
            info!(%view, "no label region detected");
        }

        (detections, analysis)
    }
}

/// Pick the label box among unfiltered detections according to `policy`.
pub fn select_label_box<'a>(
    raw: &'a [RawDetection],
    marker: &str,
    policy: LabelCropPolicy,
) -> Option<&'a RawDetection> {
    let candidates = raw.iter().filter(|d| d.class_name.contains(marker));
    match policy {
        LabelCropPolicy::LastMatch => candidates.last(),
        LabelCropPolicy::HighestConfidence => {
            candidates.fold(None, |best: Option<&RawDetection>, d| match best {
                Some(b) if b.confidence >= d.confidence => Some(b),
                _ => Some(d),
            })
        }
    }
}

fn record(
    view: View,
    outcome: DetectionOutcome,
    detections: ViewDetections,
    context: &PipelineContext,
) -> (ViewDetections, ViewAnalysis) {
    let analysis = ViewAnalysis::from_outcome(view, outcome);

    let detections = match &analysis.status {
        AnalysisStatus::Succeeded => {
            if context.verbose {
                info!(%view, kept = analysis.detections.len(), "analysed view");
            }
            detections.with_view(view, ViewMap::from_detections(&analysis.detections))
        }
        AnalysisStatus::Failed(e) => {
            warn!(%view, error = %e, "view analysis failed");
            detections
        }
        AnalysisStatus::Skipped(_) => detections,
    };

    (detections, analysis)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::BoundingBox;

    fn boxes() -> Vec<RawDetection> {
        vec![
            RawDetection::new("Front Label", 0.95, BoundingBox::new(0.0, 0.0, 10.0, 10.0)),
            RawDetection::new("Cap", 0.99, BoundingBox::new(1.0, 1.0, 2.0, 2.0)),
            RawDetection::new("Damaged Label", 0.40, BoundingBox::new(5.0, 5.0, 9.0, 9.0)),
        ]
    }

    #[test]
    fn analyzers_use_fixed_thresholds() {
        assert_eq!(ViewAnalyzer::top().threshold, 0.8);
        assert_eq!(ViewAnalyzer::bottom().threshold, 0.6);
        assert_eq!(SideAnalyzer::new(LabelCropPolicy::LastMatch, "Label").threshold, 0.7);
    }

    #[test]
    fn last_match_takes_final_label_box() {
        let raw = boxes();
        let chosen = select_label_box(&raw, "Label", LabelCropPolicy::LastMatch).unwrap();
        assert_eq!(chosen.class_name, "Damaged Label");
    }

    #[test]
    fn highest_confidence_takes_best_label_box() {
        let raw = boxes();
        let chosen = select_label_box(&raw, "Label", LabelCropPolicy::HighestConfidence).unwrap();
        assert_eq!(chosen.class_name, "Front Label");
    }

    #[test]
    fn no_label_box_is_none() {
        let raw = vec![RawDetection::new("Cap", 0.99, BoundingBox::new(1.0, 1.0, 2.0, 2.0))];
        assert!(select_label_box(&raw, "Label", LabelCropPolicy::LastMatch).is_none());
        assert!(select_label_box(&raw, "Label", LabelCropPolicy::HighestConfidence).is_none());
    }
}

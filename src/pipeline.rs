//! Session orchestrator.
//!
//! One call to [`QaPipeline::run`] processes the six images of one product.
//! Every stage receives the state produced by the previous one and returns
//! the updated state; nothing is shared between sessions except the loaded
//! models.

use crate::config::{OcrBackend, QaConfig};
use crate::detection::http::{HttpClassifier, HttpDetector};
use crate::detection::{
    AnalysisStatus, Detector, LabelCropPolicy, ProductType, ProductTypeRouter, SideAnalyzer,
    ViewAnalysis, ViewAnalyzer,
};
use crate::error::{Notice, QaError, Stage};
use crate::ingredients::{IngredientExtraction, extract_ingredients};
use crate::input::SessionImages;
use crate::models::{CheckValue, Checklist, ChecklistTable, Detection, LabelFields, View, ViewDetections};
use crate::ocr::{LABEL_PROMPT, LabelReader, LocalLabelReader, VisionLabelReader, encode_label_crops};
use crate::reconcile::reconcile;
use crate::report::{ExportGate, Report, ReportMeta, assemble};
use crate::rules::{PRODUCT_TYPE_CHECK, RuleTable};
use image::DynamicImage;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use time::OffsetDateTime;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Context available to every stage.
#[derive(Debug, Clone)]
pub struct PipelineContext {
    pub verbose: bool,
    /// Upper bound for each detector or classifier call.
    pub model_timeout: Duration,
}

impl Default for PipelineContext {
    fn default() -> Self {
        Self {
            verbose: false,
            model_timeout: Duration::from_secs(30),
        }
    }
}

/// Everything one session produced.
#[derive(Debug)]
pub struct SessionOutcome {
    pub session_id: Uuid,
    pub started_at: OffsetDateTime,
    pub product: Option<ProductType>,
    /// One entry per view, in analysis order.
    pub analyses: Vec<ViewAnalysis>,
    pub detections: ViewDetections,
    pub checklist: Checklist,
    pub table: ChecklistTable,
    /// Required classes absent from analysed views
    pub missing: Vec<QaError>,
    /// Label fields as the reader returned them, before ingredient filtering.
    pub raw_labels: LabelFields,
    pub ingredients: IngredientExtraction,
    pub report: Report,
    pub export: ExportGate,
    pub notices: Vec<Notice>,
}

impl SessionOutcome {
    pub fn meta(&self) -> ReportMeta {
        let product_type = match self.checklist.get(PRODUCT_TYPE_CHECK) {
            Some(CheckValue::Text(name)) => Some(name.clone()),
            _ => None,
        };
        ReportMeta {
            session_id: self.session_id,
            generated_at: self.started_at,
            product_type,
        }
    }

    pub fn analysis(&self, view: View) -> Option<&ViewAnalysis> {
        self.analyses.iter().find(|a| a.view == view)
    }

    /// Write each view's annotated overlay and label crop into `dir`.
    ///
    /// Files are named `<view>-annotated.png` and `<view>-label.png`; views
    /// without an overlay or crop are left out. Returns the written paths.
    pub fn save_images(&self, dir: &Path) -> Result<Vec<PathBuf>, QaError> {
        std::fs::create_dir_all(dir)?;
        let mut written = Vec::new();
        for analysis in &self.analyses {
            let stem = analysis.view.name().to_lowercase();
            if let Some(annotated) = &analysis.annotated {
                let path = dir.join(format!("{stem}-annotated.png"));
                annotated.save(&path)?;
                written.push(path);
            }
            if let Some(crop) = &analysis.label_crop {
                let path = dir.join(format!("{stem}-label.png"));
                crop.save(&path)?;
                written.push(path);
            }
        }
        debug!(dir = %dir.display(), files = written.len(), "view images saved");
        Ok(written)
    }

    /// Serializable view of the outcome, without images.
    pub fn summary(&self) -> SessionSummary<'_> {
        SessionSummary {
            session_id: self.session_id,
            started_at: self.started_at,
            product: self.product,
            views: self
                .analyses
                .iter()
                .map(|a| ViewSummary {
                    view: a.view,
                    status: match &a.status {
                        AnalysisStatus::Succeeded => "succeeded".to_string(),
                        AnalysisStatus::Skipped(reason) => format!("skipped: {reason}"),
                        AnalysisStatus::Failed(e) => format!("failed: {e}"),
                    },
                    detections: &a.detections,
                    label_crop: a.label_crop.is_some(),
                })
                .collect(),
            detections: &self.detections,
            report: &self.report,
            export: &self.export,
            notices: &self.notices,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SessionSummary<'a> {
    pub session_id: Uuid,
    #[serde(with = "time::serde::rfc3339")]
    pub started_at: OffsetDateTime,
    pub product: Option<ProductType>,
    pub views: Vec<ViewSummary<'a>>,
    pub detections: &'a ViewDetections,
    pub report: &'a Report,
    pub export: &'a ExportGate,
    pub notices: &'a [Notice],
}

#[derive(Debug, Serialize)]
pub struct ViewSummary<'a> {
    pub view: View,
    pub status: String,
    pub detections: &'a [Detection],
    pub label_crop: bool,
}

/// Composable pipeline builder
pub struct QaPipeline {
    context: PipelineContext,
    top_bottom: Option<Arc<dyn Detector>>,
    router: ProductTypeRouter,
    crop_policy: LabelCropPolicy,
    label_marker: String,
    label_reader: Option<Arc<dyn LabelReader>>,
    /// Why no label reader is available, reported on every run.
    reader_unavailable: Option<String>,
    ocr_timeout: Duration,
    rules: RuleTable,
}

impl Default for QaPipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl QaPipeline {
    /// Create a pipeline with no models attached
    pub fn new() -> Self {
        Self {
            context: PipelineContext::default(),
            top_bottom: None,
            router: ProductTypeRouter::new(),
            crop_policy: LabelCropPolicy::default(),
            label_marker: "Label".to_string(),
            label_reader: None,
            reader_unavailable: None,
            ocr_timeout: Duration::from_secs(120),
            rules: RuleTable::builtin(),
        }
    }

    /// Wire HTTP model clients and the label reader from configuration.
    ///
    /// A label reader that cannot be built is not fatal: OCR is reported as
    /// unavailable on each run instead.
    pub fn from_config(config: &QaConfig, client: reqwest::Client) -> Result<Self, QaError> {
        let mut pipeline = Self::new()
            .with_model_timeout(config.model_timeout())
            .with_label_crop(config.label_crop_policy, &config.label_marker)
            .with_ocr_timeout(config.ocr.timeout())
            .with_rules(config.rule_table()?);

        if let Some(url) = &config.models.top_bottom {
            pipeline = pipeline.with_top_bottom_detector(Arc::new(HttpDetector::new(
                "top-bottom",
                url,
                client.clone(),
            )));
        }

        let mut router = ProductTypeRouter::new();
        if let Some(url) = &config.models.classifier {
            router = router.with_classifier(Arc::new(HttpClassifier::new(
                "product-type",
                url,
                client.clone(),
            )));
        }
        for (product, url) in &config.models.side {
            let name = format!("side-{}", product.display_name().to_lowercase().replace(' ', "-"));
            router = router.with_side_detector(*product, Arc::new(HttpDetector::new(name, url, client.clone())));
        }
        if let Some(url) = &config.models.side_generic {
            router = router.with_generic_detector(
                Arc::new(HttpDetector::new("side-generic", url, client.clone())),
                config.fallback_to_generic_side,
            );
        }
        pipeline = pipeline.with_router(router);

        let reader: Result<Option<Arc<dyn LabelReader>>, QaError> = match config.ocr.backend {
            OcrBackend::Vision => VisionLabelReader::from_config(&config.ocr, client)
                .map(|r| Some(Arc::new(r) as Arc<dyn LabelReader>)),
            OcrBackend::Local => LocalLabelReader::from_default_cache()
                .map(|r| Some(Arc::new(r) as Arc<dyn LabelReader>)),
            OcrBackend::None => Ok(None),
        };
        pipeline = match reader {
            Ok(Some(reader)) => pipeline.with_label_reader(reader),
            Ok(None) => pipeline.without_label_reader("OCR disabled by configuration"),
            Err(e) => {
                warn!(error = %e, "label reader unavailable");
                pipeline.without_label_reader(e.to_string())
            }
        };

        Ok(pipeline)
    }

    /// Enable verbose output
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.context.verbose = verbose;
        self
    }

    pub fn with_model_timeout(mut self, timeout: Duration) -> Self {
        self.context.model_timeout = timeout;
        self
    }

    pub fn with_ocr_timeout(mut self, timeout: Duration) -> Self {
        self.ocr_timeout = timeout;
        self
    }

    /// Detector shared by the top and bottom views.
    pub fn with_top_bottom_detector(mut self, detector: Arc<dyn Detector>) -> Self {
        self.top_bottom = Some(detector);
        self
    }

    pub fn with_router(mut self, router: ProductTypeRouter) -> Self {
        self.router = router;
        self
    }

    pub fn with_label_crop(mut self, policy: LabelCropPolicy, marker: impl Into<String>) -> Self {
        self.crop_policy = policy;
        self.label_marker = marker.into();
        self
    }

    pub fn with_label_reader(mut self, reader: Arc<dyn LabelReader>) -> Self {
        self.label_reader = Some(reader);
        self.reader_unavailable = None;
        self
    }

    pub fn without_label_reader(mut self, reason: impl Into<String>) -> Self {
        self.label_reader = None;
        self.reader_unavailable = Some(reason.into());
        self
    }

    pub fn with_rules(mut self, rules: RuleTable) -> Self {
        self.rules = rules;
        self
    }

    /// Run one session
    ///
    /// Input, model, classifier and OCR failures degrade to notices. Only a
    /// rule table problem returns `Err`.
    pub async fn run(&self, images: SessionImages) -> Result<SessionOutcome, QaError> {
        let session_id = Uuid::new_v4();
        let started_at = OffsetDateTime::now_utc();
        let start = Instant::now();
        info!(%session_id, images = images.len(), "session started");

        let mut notices = images.notices().to_vec();
        let mut analyses = Vec::new();
        let mut detections = ViewDetections::new();

        // Top/bottom
        for analyzer in [ViewAnalyzer::top(), ViewAnalyzer::bottom()] {
            let view = analyzer.view;
            let analysis = match (images.get(view), self.top_bottom.as_deref()) {
                (Some(image), Some(detector)) => {
                    let (next, analysis) = analyzer
                        .analyze(image, detector, detections, &self.context)
                        .await;
                    detections = next;
                    analysis
                }
                (None, _) => ViewAnalysis::skipped(view, "no image supplied"),
                (Some(_), None) => ViewAnalysis::skipped(view, "no top/bottom detector configured"),
            };
            push_analysis_notice(&mut notices, &analysis);
            analyses.push(analysis);
        }

        // Classify
        let routing = self
            .router
            .route(images.get(View::Front), Checklist::new(), self.context.model_timeout)
            .await;
        if let Some(e) = &routing.error {
            notices.push(Notice::from_error(Stage::ProductType, Some(View::Front), e));
        }
        debug!(selection = ?routing.selection, "side detector selected");

        // Sides
        let side = SideAnalyzer::new(self.crop_policy, self.label_marker.clone());
        let mut crops: BTreeMap<View, DynamicImage> = BTreeMap::new();
        for view in View::SIDES {
            let analysis = match images.get(view) {
                Some(image) => {
                    let (next, analysis) = side
                        .analyze(image, view, routing.selection.detector(), detections, &self.context)
                        .await;
                    detections = next;
                    analysis
                }
                None => ViewAnalysis::skipped(view, "no image supplied"),
            };
            if let Some(crop) = &analysis.label_crop {
                crops.insert(view, crop.clone());
            }
            push_analysis_notice(&mut notices, &analysis);
            analyses.push(analysis);
        }

        // Reconcile
        let reconciled = reconcile(detections, routing.checklist, &self.rules)?;
        info!(
            rows = reconciled.table.len(),
            missing = reconciled.missing.len(),
            "checklist reconciled"
        );

        // OCR
        let raw_labels = self.read_labels(&crops, &mut notices).await;

        // Ingredients
        let ingredients = extract_ingredients(raw_labels.clone());
        for e in &ingredients.skipped {
            notices.push(Notice::from_error(Stage::Ingredients, None, e));
        }
        if !ingredients.declared && !raw_labels.is_empty() {
            notices.push(Notice::new(
                Stage::Ingredients,
                None,
                "label does not declare medicinal ingredients",
            ));
        }

        // Report
        let report = assemble(&reconciled.table, &ingredients.fields, &ingredients.table);
        let export = ExportGate::evaluate(&images, &analyses);
        if let Some(reason) = &export.reason {
            warn!(%reason, "report export disabled");
            notices.push(Notice::new(Stage::Export, None, format!("export disabled: {reason}")));
        }

        info!(
            %session_id,
            notices = notices.len(),
            export = export.enabled,
            elapsed_ms = %start.elapsed().as_millis(),
            "session complete"
        );

        Ok(SessionOutcome {
            session_id,
            started_at,
            product: routing.product,
            analyses,
            detections: reconciled.detections,
            checklist: reconciled.checklist,
            table: reconciled.table,
            missing: reconciled.missing,
            raw_labels,
            ingredients,
            report,
            export,
            notices,
        })
    }

    async fn read_labels(&self, crops: &BTreeMap<View, DynamicImage>, notices: &mut Vec<Notice>) -> LabelFields {
        let Some(reader) = self.label_reader.as_deref() else {
            let reason = self
                .reader_unavailable
                .clone()
                .unwrap_or_else(|| "no label reader configured".to_string());
            notices.push(Notice::new(Stage::Ocr, None, reason));
            return LabelFields::new();
        };

        if crops.is_empty() {
            notices.push(Notice::new(Stage::Ocr, None, "no label region found on any side view"));
            return LabelFields::new();
        }

        let encoded = match encode_label_crops(crops) {
            Ok(encoded) => encoded,
            Err(e) => {
                warn!(error = %e, "cannot encode label crops");
                notices.push(Notice::from_error(Stage::Ocr, None, &e));
                return LabelFields::new();
            }
        };

        let result = match tokio::time::timeout(self.ocr_timeout, reader.extract(&encoded, LABEL_PROMPT)).await {
            Ok(result) => result,
            Err(_) => Err(QaError::Timeout {
                operation: format!("label reader `{}`", reader.name()),
                seconds: self.ocr_timeout.as_secs(),
            }),
        };

        match result {
            Ok(fields) => {
                info!(reader = reader.name(), crops = encoded.len(), fields = fields.len(), "labels read");
                fields
            }
            Err(e) => {
                warn!(error = %e, "label extraction failed");
                notices.push(Notice::from_error(Stage::Ocr, None, &e));
                LabelFields::new()
            }
        }
    }
}

fn push_analysis_notice(notices: &mut Vec<Notice>, analysis: &ViewAnalysis) {
    match &analysis.status {
        AnalysisStatus::Succeeded => {}
        AnalysisStatus::Skipped(reason) => {
            notices.push(Notice::new(Stage::Detection, Some(analysis.view), format!("skipped: {reason}")));
        }
        AnalysisStatus::Failed(e) => {
            notices.push(Notice::from_error(Stage::Detection, Some(analysis.view), e));
        }
    }
}

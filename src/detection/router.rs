//! Product-type routing: classify the front view, then pick the side-view
//! detector used for all four side views.

use super::{Classification, Classifier, Detector};
use crate::error::QaError;
use crate::models::{CheckStatus, CheckValue, Checklist};
use crate::rules::PRODUCT_TYPE_CHECK;
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Bottle sub-types with a specialised side-view detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductType {
    #[serde(alias = "dropper_botle")]
    DropperBottle,
    #[serde(alias = "powder_botle")]
    PowderBottle,
    #[serde(alias = "pill_botle")]
    PillBottle,
    #[serde(alias = "liquid_botle")]
    LiquidBottle,
}

impl ProductType {
    /// Map a raw classifier label such as `pill_botle` onto a product type.
    pub fn from_label(raw: &str) -> Option<Self> {
        let key = raw
            .trim()
            .to_ascii_lowercase()
            .replace([' ', '-'], "_")
            .replace("botle", "bottle");
        match key.as_str() {
            "dropper_bottle" => Some(ProductType::DropperBottle),
            "powder_bottle" => Some(ProductType::PowderBottle),
            "pill_bottle" => Some(ProductType::PillBottle),
            "liquid_bottle" => Some(ProductType::LiquidBottle),
            _ => None,
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            ProductType::DropperBottle => "Dropper Bottle",
            ProductType::PowderBottle => "Powder Bottle",
            ProductType::PillBottle => "Pill Bottle",
            ProductType::LiquidBottle => "Liquid Bottle",
        }
    }
}

impl fmt::Display for ProductType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Cosmetic normalisation of a classifier label for the checklist:
/// title case, underscores to spaces, `Botle` corrected to `Bottle`.
pub fn normalize_product_label(raw: &str) -> String {
    raw.split(|c: char| c == '_' || c.is_whitespace())
        .filter(|w| !w.is_empty())
        .map(title_case)
        .collect::<Vec<_>>()
        .join(" ")
        .replace("Botle", "Bottle")
}

fn title_case(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

/// The side-view detector chosen for a session.
#[derive(Clone)]
pub enum SideDetectorSelection {
    Specialized {
        product: ProductType,
        detector: Arc<dyn Detector>,
    },
    /// Generic side model, used only when fallback is enabled.
    Generic { detector: Arc<dyn Detector> },
    /// No side detector: all four side views are left unanalysed.
    Unavailable { reason: String },
}

impl SideDetectorSelection {
    pub fn detector(&self) -> Option<&dyn Detector> {
        match self {
            SideDetectorSelection::Specialized { detector, .. }
            | SideDetectorSelection::Generic { detector } => Some(detector.as_ref()),
            SideDetectorSelection::Unavailable { .. } => None,
        }
    }
}

impl fmt::Debug for SideDetectorSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SideDetectorSelection::Specialized { product, detector } => f
                .debug_struct("Specialized")
                .field("product", product)
                .field("detector", &detector.name())
                .finish(),
            SideDetectorSelection::Generic { detector } => f
                .debug_struct("Generic")
                .field("detector", &detector.name())
                .finish(),
            SideDetectorSelection::Unavailable { reason } => f
                .debug_struct("Unavailable")
                .field("reason", reason)
                .finish(),
        }
    }
}

/// Result of routing: the seeded checklist, the selection and any degradation.
#[derive(Debug)]
pub struct Routing {
    pub checklist: Checklist,
    pub product: Option<ProductType>,
    pub selection: SideDetectorSelection,
    pub error: Option<QaError>,
}

#[derive(Clone, Default)]
pub struct ProductTypeRouter {
    classifier: Option<Arc<dyn Classifier>>,
    side_detectors: BTreeMap<ProductType, Arc<dyn Detector>>,
    generic: Option<Arc<dyn Detector>>,
    fallback_to_generic: bool,
}

impl ProductTypeRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_classifier(mut self, classifier: Arc<dyn Classifier>) -> Self {
        self.classifier = Some(classifier);
        self
    }

    pub fn with_side_detector(mut self, product: ProductType, detector: Arc<dyn Detector>) -> Self {
        self.side_detectors.insert(product, detector);
        self
    }

    pub fn with_generic_detector(mut self, detector: Arc<dyn Detector>, fallback: bool) -> Self {
        self.generic = Some(detector);
        self.fallback_to_generic = fallback;
        self
    }

    /// Classify `front` and record the product type under "Product Type".
    ///
    /// The checklist is returned with the entry set; it is `Unknown` when
    /// classification could not run.
    pub async fn route(
        &self,
        front: Option<&DynamicImage>,
        mut checklist: Checklist,
        timeout: Duration,
    ) -> Routing {
        let label = match self.classify(front, timeout).await {
            Ok(label) => label,
            Err(e) => {
                warn!(error = %e, "product type classification failed");
                checklist.set(PRODUCT_TYPE_CHECK, CheckValue::Status(CheckStatus::Unknown));
                return Routing {
                    checklist,
                    product: None,
                    selection: self.unavailable(e.to_string()),
                    error: Some(e),
                };
            }
        };

        checklist.set(PRODUCT_TYPE_CHECK, CheckValue::Text(normalize_product_label(&label)));

        let Some(product) = ProductType::from_label(&label) else {
            let error = QaError::UnrecognizedProductType(label);
            warn!(error = %error, "no specialised side detector");
            return Routing {
                checklist,
                product: None,
                selection: self.unavailable(error.to_string()),
                error: Some(error),
            };
        };

        info!(%product, "classified product type");

        let (selection, error) = match self.side_detectors.get(&product) {
            Some(detector) => (
                SideDetectorSelection::Specialized {
                    product,
                    detector: Arc::clone(detector),
                },
                None,
            ),
            None => {
                let error = QaError::Config(format!("no side detector configured for {product}"));
                (self.unavailable(error.to_string()), Some(error))
            }
        };

        Routing {
            checklist,
            product: Some(product),
            selection,
            error,
        }
    }

    async fn classify(&self, front: Option<&DynamicImage>, timeout: Duration) -> Result<String, QaError> {
        let classifier = self
            .classifier
            .as_ref()
            .ok_or_else(|| QaError::Config("no product type classifier configured".into()))?;
        let front = front.ok_or_else(|| QaError::model(classifier.name(), "no front view image"))?;

        let predictions = tokio::time::timeout(timeout, classifier.classify(front))
            .await
            .map_err(|_| QaError::Timeout {
                operation: format!("classifier `{}`", classifier.name()),
                seconds: timeout.as_secs(),
            })??;

        top1(&predictions)
            .map(|c| c.class_name.clone())
            .ok_or_else(|| QaError::model(classifier.name(), "no usable prediction"))
    }

    fn unavailable(&self, reason: String) -> SideDetectorSelection {
        match (&self.generic, self.fallback_to_generic) {
            (Some(detector), true) => SideDetectorSelection::Generic {
                detector: Arc::clone(detector),
            },
            _ => SideDetectorSelection::Unavailable { reason },
        }
    }
}

/// Highest-confidence prediction with a usable class name; ties keep the first.
fn top1(predictions: &[Classification]) -> Option<&Classification> {
    predictions
        .iter()
        .filter(|c| !c.class_name.trim().is_empty() && c.confidence.is_finite())
        .fold(None, |best: Option<&Classification>, c| match best {
            Some(b) if b.confidence >= c.confidence => Some(b),
            _ => Some(c),
        })
}

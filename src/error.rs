use crate::models::View;
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Errors raised by pipeline stages and their external collaborators.
#[derive(Error, Debug)]
pub enum QaError {
    /// A detector or classifier threw or returned unusable output.
    #[error("model `{model}` invocation failed: {reason}")]
    ModelInvocation { model: String, reason: String },

    /// An expected class was absent from a view's detections.
    #[error("no `{class_name}` detected in {view} view")]
    MissingDetection { view: View, class_name: String },

    /// The classifier returned a product type with no specialised side detector.
    #[error("unrecognized product type `{0}`")]
    UnrecognizedProductType(String),

    /// Label text did not parse into field/value pairs.
    #[error("label text is not a field/value table: {0}")]
    OcrFormat(String),

    /// A medicinal-ingredients line could not be split into name and quantity.
    #[error("cannot parse ingredient line `{0}`")]
    IngredientParse(String),

    /// The reconciler rule table is malformed. Always fatal to the run.
    #[error("invalid rule table: {0}")]
    RuleTable(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("{operation} timed out after {seconds}s")]
    Timeout { operation: String, seconds: u64 },

    #[error("report rendering failed: {0}")]
    Render(String),

    #[error("image error")]
    Image(#[from] image::ImageError),

    #[error("i/o error")]
    Io(#[from] std::io::Error),

    #[error("http error")]
    Http(#[from] reqwest::Error),
}

impl QaError {
    pub fn model(model: impl Into<String>, reason: impl fmt::Display) -> Self {
        QaError::ModelInvocation {
            model: model.into(),
            reason: reason.to_string(),
        }
    }
}

/// Pipeline stage a notice was raised from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Stage {
    Input,
    Detection,
    ProductType,
    Ocr,
    Ingredients,
    Export,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Input => "input",
            Stage::Detection => "detection",
            Stage::ProductType => "product type",
            Stage::Ocr => "ocr",
            Stage::Ingredients => "ingredients",
            Stage::Export => "export",
        };
        f.write_str(name)
    }
}

/// A visible, non-fatal degradation surfaced to the operator.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notice {
    pub stage: Stage,
    pub view: Option<View>,
    pub message: String,
}

impl Notice {
    pub fn new(stage: Stage, view: Option<View>, message: impl Into<String>) -> Self {
        Self {
            stage,
            view,
            message: message.into(),
        }
    }

    pub fn from_error(stage: Stage, view: Option<View>, error: &QaError) -> Self {
        Self::new(stage, view, error_chain(error))
    }
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.view {
            Some(view) => write!(f, "[{}:{}] {}", self.stage, view, self.message),
            None => write!(f, "[{}] {}", self.stage, self.message),
        }
    }
}

/// Render an error and its sources on one line.
pub fn error_chain(error: &dyn std::error::Error) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

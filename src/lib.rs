pub mod config;
pub mod detection;
pub mod error;
pub mod ingredients;
pub mod input;
pub mod models;
pub mod ocr;
pub mod pipeline;
pub mod reconcile;
pub mod report;
pub mod rules;

pub use config::QaConfig;
pub use error::{Notice, QaError, Stage};
pub use input::SessionImages;
pub use models::{CheckStatus, CheckValue, Checklist, ChecklistTable, View, ViewDetections, ViewMap};
pub use pipeline::{PipelineContext, QaPipeline, SessionOutcome};
pub use reconcile::{Reconciliation, reconcile};
pub use report::{ExportGate, PdfRenderer, Report, ReportRenderer};
pub use rules::{Rule, RuleTable};

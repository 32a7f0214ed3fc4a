//! Report assembly and export gating.

pub mod pdf;

pub use pdf::PdfRenderer;

use crate::detection::ViewAnalysis;
use crate::error::QaError;
use crate::input::SessionImages;
use crate::models::{ChecklistTable, IngredientTable, LabelField, View};
use serde::Serialize;
use time::OffsetDateTime;
use uuid::Uuid;

pub const CHECKLIST_SECTION: &str = "QA Checklist";
pub const LABEL_SECTION: &str = "Label Information";
pub const INGREDIENT_SECTION: &str = "Medicinal Ingredients";

/// One named two-column table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportSection {
    pub name: String,
    pub columns: [String; 2],
    pub rows: Vec<(String, String)>,
}

impl ReportSection {
    fn new(name: &str, columns: [&str; 2], rows: Vec<(String, String)>) -> Self {
        Self {
            name: name.to_string(),
            columns: columns.map(str::to_string),
            rows,
        }
    }
}

/// The final artifact handed to a renderer. Sections are always present,
/// in checklist, label, ingredient order, even when empty.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Report {
    pub sections: Vec<ReportSection>,
}

impl Report {
    pub fn section(&self, name: &str) -> Option<&ReportSection> {
        self.sections.iter().find(|s| s.name == name)
    }
}

/// Merge the three tables into one report, keeping each source's row order.
pub fn assemble(
    checklist: &ChecklistTable,
    labels: &[LabelField],
    ingredients: &IngredientTable,
) -> Report {
    Report {
        sections: vec![
            ReportSection::new(
                CHECKLIST_SECTION,
                ChecklistTable::COLUMNS,
                checklist
                    .rows
                    .iter()
                    .map(|r| (r.check.clone(), r.status.clone()))
                    .collect(),
            ),
            ReportSection::new(
                LABEL_SECTION,
                ["Label", "Value"],
                labels
                    .iter()
                    .map(|f| (f.label.clone(), f.value.clone()))
                    .collect(),
            ),
            ReportSection::new(
                INGREDIENT_SECTION,
                ["Medicinal Ingredient", "Quantity"],
                ingredients.rows.clone(),
            ),
        ],
    }
}

/// Session details printed alongside the report.
#[derive(Debug, Clone, Serialize)]
pub struct ReportMeta {
    pub session_id: Uuid,
    #[serde(with = "time::serde::rfc3339")]
    pub generated_at: OffsetDateTime,
    pub product_type: Option<String>,
}

/// Turns a report into a downloadable document.
pub trait ReportRenderer {
    fn file_name(&self) -> &str;

    fn mime_type(&self) -> &str;

    fn render(&self, report: &Report, meta: &ReportMeta) -> Result<Vec<u8>, QaError>;
}

/// Whether the report may be exported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExportGate {
    pub enabled: bool,
    pub reason: Option<String>,
}

impl ExportGate {
    /// Export needs a successful top analysis, a supplied bottom image and
    /// at least one successful side analysis. A failed bottom analysis only
    /// turns its checks Unknown.
    pub fn evaluate(images: &SessionImages, analyses: &[ViewAnalysis]) -> Self {
        let succeeded = |view: View| analyses.iter().any(|a| a.view == view && a.succeeded());

        let reason = if !succeeded(View::Top) {
            Some("top view was not analysed")
        } else if !images.contains(View::Bottom) {
            Some("bottom view image was not supplied")
        } else if !analyses.iter().any(|a| a.view.is_side() && a.succeeded()) {
            Some("no side view was analysed")
        } else {
            None
        };

        Self {
            enabled: reason.is_none(),
            reason: reason.map(str::to_string),
        }
    }
}

use super::{Report, ReportMeta, ReportRenderer, ReportSection};
use crate::error::QaError;
use printpdf::{BuiltinFont, IndirectFontRef, Mm, PdfDocument, PdfDocumentReference, PdfLayerReference};
use time::format_description::well_known::Rfc3339;

const PAGE_WIDTH: f32 = 210.0;
const PAGE_HEIGHT: f32 = 297.0;
const MARGIN: f32 = 18.0;
const KEY_X: f32 = 20.0;
const VALUE_X: f32 = 95.0;
const LINE_HEIGHT: f32 = 5.5;
const KEY_WRAP: usize = 38;
const VALUE_WRAP: usize = 58;

/// Renders the report as an A4 PDF with one two-column table per section.
#[derive(Debug, Clone, Default)]
pub struct PdfRenderer;

impl ReportRenderer for PdfRenderer {
    fn file_name(&self) -> &str {
        "QA-Checklist.pdf"
    }

    fn mime_type(&self) -> &str {
        "application/pdf"
    }

    fn render(&self, report: &Report, meta: &ReportMeta) -> Result<Vec<u8>, QaError> {
        let (doc, page, layer) =
            PdfDocument::new("QA Checklist", Mm(PAGE_WIDTH), Mm(PAGE_HEIGHT), "Layer 1");
        let regular = doc
            .add_builtin_font(BuiltinFont::Helvetica)
            .map_err(|e| QaError::Render(e.to_string()))?;
        let bold = doc
            .add_builtin_font(BuiltinFont::HelveticaBold)
            .map_err(|e| QaError::Render(e.to_string()))?;

        let mut writer = PageWriter {
            doc: &doc,
            layer: doc.get_page(page).get_layer(layer),
            y: PAGE_HEIGHT - MARGIN,
        };

        writer.line("QA Checklist", 18.0, KEY_X, &bold);
        writer.advance(4.0);

        let generated = meta
            .generated_at
            .format(&Rfc3339)
            .map_err(|e| QaError::Render(e.to_string()))?;
        writer.line(&format!("Session: {}", meta.session_id), 9.0, KEY_X, &regular);
        writer.line(&format!("Generated: {generated}"), 9.0, KEY_X, &regular);
        if let Some(product) = &meta.product_type {
            writer.line(&format!("Product type: {product}"), 9.0, KEY_X, &regular);
        }

        for section in &report.sections {
            writer.advance(LINE_HEIGHT);
            write_section(&mut writer, section, &regular, &bold);
        }

        drop(writer);
        doc.save_to_bytes().map_err(|e| QaError::Render(e.to_string()))
    }
}

fn write_section(
    writer: &mut PageWriter<'_>,
    section: &ReportSection,
    regular: &IndirectFontRef,
    bold: &IndirectFontRef,
) {
    writer.ensure_room(LINE_HEIGHT * 4.0);
    writer.line(&section.name, 13.0, KEY_X, bold);
    writer.advance(1.0);
    writer.row(&section.columns[0], &section.columns[1], bold);

    if section.rows.is_empty() {
        writer.line("(none)", 10.0, KEY_X, regular);
        return;
    }
    for (key, value) in &section.rows {
        writer.row(key, value, regular);
    }
}

struct PageWriter<'a> {
    doc: &'a PdfDocumentReference,
    layer: PdfLayerReference,
    y: f32,
}

impl PageWriter<'_> {
    fn ensure_room(&mut self, height: f32) {
        if self.y - height < MARGIN {
            let (page, layer) = self.doc.add_page(Mm(PAGE_WIDTH), Mm(PAGE_HEIGHT), "Layer 1");
            self.layer = self.doc.get_page(page).get_layer(layer);
            self.y = PAGE_HEIGHT - MARGIN;
        }
    }

    fn advance(&mut self, height: f32) {
        self.y -= height;
    }

    fn line(&mut self, text: &str, size: f32, x: f32, font: &IndirectFontRef) {
        self.ensure_room(LINE_HEIGHT);
        self.layer
            .use_text(printable(text), size, Mm(x), Mm(self.y), font);
        self.advance(size * 0.35 + 2.0);
    }

    /// A table row; long cells wrap onto following lines.
    fn row(&mut self, key: &str, value: &str, font: &IndirectFontRef) {
        let keys = wrap(key, KEY_WRAP);
        let values = wrap(value, VALUE_WRAP);
        let lines = keys.len().max(values.len()).max(1);

        for i in 0..lines {
            self.ensure_room(LINE_HEIGHT);
            if let Some(k) = keys.get(i) {
                self.layer.use_text(printable(k), 10.0, Mm(KEY_X), Mm(self.y), font);
            }
            if let Some(v) = values.get(i) {
                self.layer.use_text(printable(v), 10.0, Mm(VALUE_X), Mm(self.y), font);
            }
            self.advance(LINE_HEIGHT);
        }
    }
}

/// Greedy word wrap; explicit newlines are kept.
fn wrap(text: &str, width: usize) -> Vec<String> {
    let mut lines = Vec::new();
    for paragraph in text.lines() {
        let mut current = String::new();
        for word in paragraph.split_whitespace() {
            if !current.is_empty() && current.chars().count() + 1 + word.chars().count() > width {
                lines.push(std::mem::take(&mut current));
            }
            if !current.is_empty() {
                current.push(' ');
            }
            current.push_str(word);
        }
        if !current.is_empty() {
            lines.push(current);
        }
    }
    lines
}

/// The built-in fonts only cover Latin-1.
fn printable(text: &str) -> String {
    text.chars()
        .map(|c| if (c as u32) < 0x100 && !c.is_control() { c } else { '?' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ChecklistRow, ChecklistTable, IngredientTable, LabelField};
    use crate::report::assemble;
    use time::OffsetDateTime;
    use uuid::Uuid;

    #[test]
    fn wraps_long_values() {
        let lines = wrap("take one capsule twice daily with food", 15);
        assert_eq!(lines, ["take one", "capsule twice", "daily with food"]);
        assert_eq!(wrap("a\nb", 10), ["a", "b"]);
    }

    #[test]
    fn renders_pdf_bytes() {
        let checklist = ChecklistTable {
            rows: vec![ChecklistRow {
                check: "Cap Present".into(),
                status: "Pass".into(),
            }],
        };
        let labels: Vec<LabelField> = (0..80)
            .map(|i| LabelField::new(format!("field {i}"), "value"))
            .collect();
        let report = assemble(&checklist, &labels, &IngredientTable::default());
        let meta = ReportMeta {
            session_id: Uuid::new_v4(),
            generated_at: OffsetDateTime::UNIX_EPOCH,
            product_type: Some("Pill Bottle".into()),
        };

        let bytes = PdfRenderer.render(&report, &meta).unwrap();
        assert!(bytes.starts_with(b"%PDF"));
    }
}

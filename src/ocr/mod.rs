//! Label OCR boundary: crop encoding, the [`LabelReader`] trait and parsing
//! of the reader's text into ordered field/value pairs.

pub mod local;
pub mod vision;

pub use local::LocalLabelReader;
pub use vision::VisionLabelReader;

use crate::error::QaError;
use crate::input::encode_png;
use crate::models::{LabelField, LabelFields, View};
use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use image::DynamicImage;
use serde_json::Value;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;

/// Instruction sent with the label crops.
pub const LABEL_PROMPT: &str = "\
You are reading the printed labels of a bottled natural health product. \
The images are crops of the same product's label taken from different sides. \
Extract every labelled field you can read (for example product name, NPN, lot number, \
expiry date, recommended dose, directions, cautions, non-medicinal ingredients). \
Put all medicinal ingredients into a single field named \"medicinal ingredients\" whose \
value lists one ingredient per line as `<ingredient name> <quantity with unit>`. \
Answer with a JSON array only, each element shaped {\"label\": \"...\", \"value\": \"...\"}. \
Do not repeat a field and do not invent values.";

/// A label crop in transport encoding.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedImage {
    pub view: View,
    pub mime_type: &'static str,
    pub base64: String,
}

impl EncodedImage {
    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.base64)
    }

    pub fn decode(&self) -> Result<DynamicImage, QaError> {
        let bytes = BASE64_STANDARD
            .decode(&self.base64)
            .map_err(|e| QaError::OcrFormat(format!("{} crop is not base64: {e}", self.view)))?;
        Ok(image::load_from_memory(&bytes)?)
    }
}

/// PNG + base64 encode the available crops in Left, Right, Front, Back order.
pub fn encode_label_crops(crops: &BTreeMap<View, DynamicImage>) -> Result<Vec<EncodedImage>, QaError> {
    View::SIDES
        .iter()
        .filter_map(|view| crops.get(view).map(|img| (*view, img)))
        .map(|(view, img)| {
            Ok(EncodedImage {
                view,
                mime_type: "image/png",
                base64: BASE64_STANDARD.encode(encode_png(img)?),
            })
        })
        .collect()
}

/// Turns label crops into field/value pairs in one batched call.
#[async_trait]
pub trait LabelReader: Send + Sync {
    fn name(&self) -> &str;

    async fn extract(&self, images: &[EncodedImage], prompt: &str) -> Result<LabelFields, QaError>;
}

/// Parse reader output into ordered field/value pairs.
///
/// Accepts a JSON array of `{label, value}` objects or `[label, value]`
/// pairs, a JSON object, or plain `Field: value` lines (markdown table rows
/// too). Lines without a separator continue the previous field's value.
pub fn parse_label_fields(text: &str) -> Result<LabelFields, QaError> {
    let body = strip_code_fence(text);

    let fields = match serde_json::from_str::<Value>(body) {
        Ok(value) => fields_from_json(&value),
        Err(_) => fields_from_lines(body),
    };

    if fields.is_empty() {
        let preview: String = body.chars().take(80).collect();
        return Err(QaError::OcrFormat(format!("no field/value pairs in `{preview}`")));
    }
    Ok(fields)
}

/// Strip a markdown fence and its optional language tag. The fence may sit
/// on the same line as the body.
fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let tag_end = rest
        .find(|c: char| !is_fence_tag_char(c))
        .unwrap_or(rest.len());
    let after_tag = &rest[tag_end..];
    let body = if after_tag.is_empty() || after_tag.starts_with(|c: char| c.is_whitespace() || c == '[' || c == '{') {
        after_tag
    } else {
        rest
    };
    let body = body.trim();
    body.strip_suffix("```").unwrap_or(body).trim()
}

fn is_fence_tag_char(c: char) -> bool {
    c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '+'
}

fn fields_from_json(value: &Value) -> LabelFields {
    match value {
        Value::Array(items) => items.iter().filter_map(field_from_item).collect(),
        Value::Object(map) => {
            if let Some(inner @ Value::Array(_)) = map.get("fields") {
                return fields_from_json(inner);
            }
            map.iter()
                .map(|(k, v)| LabelField::new(k.trim(), json_text(v)))
                .collect()
        }
        _ => Vec::new(),
    }
}

fn field_from_item(item: &Value) -> Option<LabelField> {
    let field = match item {
        Value::Object(map) => {
            let label = ["label", "Label", "field", "name"]
                .iter()
                .find_map(|k| map.get(*k))?;
            let value = ["value", "Value", "text"].iter().find_map(|k| map.get(*k))?;
            Some(LabelField::new(json_text(label).trim(), json_text(value)))
        }
        Value::Array(pair) if pair.len() == 2 => {
            Some(LabelField::new(json_text(&pair[0]).trim(), json_text(&pair[1])))
        }
        _ => None,
    };
    field.filter(|f| !f.label.is_empty())
}

fn json_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        Value::Array(items) => items.iter().map(json_text).collect::<Vec<_>>().join("\n"),
        other => other.to_string(),
    }
}

fn fields_from_lines(body: &str) -> LabelFields {
    let mut fields: LabelFields = Vec::new();

    for line in body.lines().map(str::trim).filter(|l| !l.is_empty()) {
        if let Some(row) = line.strip_prefix('|') {
            let cells: Vec<&str> = row.trim_end_matches('|').split('|').map(str::trim).collect();
            if cells.len() >= 2 && !cells[0].chars().all(|c| c == '-' || c == ':') {
                fields.push(LabelField::new(cells[0], cells[1..].join(" ")));
            }
            continue;
        }

        match line.split_once(':') {
            Some((label, value)) if !label.trim().is_empty() => {
                fields.push(LabelField::new(label.trim(), value.trim()));
            }
            _ => {
                if let Some(last) = fields.last_mut() {
                    if !last.value.is_empty() {
                        last.value.push('\n');
                    }
                    last.value.push_str(line);
                }
            }
        }
    }

    // A markdown header row reads as a field named "Label".
    if fields.first().is_some_and(|f| f.label.eq_ignore_ascii_case("label")) {
        fields.remove(0);
    }
    fields
}

/// Write the raw OCR table as a two-column CSV for debugging.
pub fn export_csv(path: &Path, fields: &[LabelField]) -> Result<(), QaError> {
    let mut file = std::io::BufWriter::new(std::fs::File::create(path)?);
    writeln!(file, "Label,Value")?;
    for field in fields {
        writeln!(file, "{},{}", csv_cell(&field.label), csv_cell(&field.value))?;
    }
    file.flush()?;
    Ok(())
}

fn csv_cell(raw: &str) -> String {
    if raw.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", raw.replace('"', "\"\""))
    } else {
        raw.to_string()
    }
}

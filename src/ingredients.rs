//! Medicinal ingredient cross-check.
//!
//! Finds the "medicinal ingredients" label field and splits its embedded
//! mini-table into (ingredient, quantity) rows.

use crate::error::QaError;
use crate::models::{IngredientTable, LabelFields};
use tracing::{debug, warn};

pub const MEDICINAL_INGREDIENTS_FIELD: &str = "medicinal ingredients";

#[derive(Debug)]
pub struct IngredientExtraction {
    pub table: IngredientTable,
    /// Label fields to surface in the report. The ingredients field is removed
    /// once it parsed into at least one row.
    pub fields: LabelFields,
    /// Whether the label declared a medicinal ingredients field at all.
    pub declared: bool,
    /// Lines that could not be split, as `IngredientParse` errors.
    pub skipped: Vec<QaError>,
}

pub fn is_ingredients_field(label: &str) -> bool {
    label.trim().eq_ignore_ascii_case(MEDICINAL_INGREDIENTS_FIELD)
}

pub fn extract_ingredients(fields: LabelFields) -> IngredientExtraction {
    let raw: Vec<&str> = fields
        .iter()
        .filter(|f| is_ingredients_field(&f.label))
        .map(|f| f.value.as_str())
        .collect();

    if raw.is_empty() {
        debug!("ingredients not declared");
        return IngredientExtraction {
            table: IngredientTable::default(),
            fields,
            declared: false,
            skipped: Vec::new(),
        };
    }

    let mut table = IngredientTable::default();
    let mut skipped = Vec::new();
    for line in raw.iter().flat_map(|v| v.split(['\n', ';'])) {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match parse_ingredient_line(line) {
            Ok(row) => table.rows.push(row),
            Err(e) => {
                warn!(error = %e, "skipping ingredient line");
                skipped.push(e);
            }
        }
    }

    let fields = if table.is_empty() {
        fields
    } else {
        fields
            .into_iter()
            .filter(|f| !is_ingredients_field(&f.label))
            .collect()
    };

    IngredientExtraction {
        table,
        fields,
        declared: true,
        skipped,
    }
}

/// Split one line at its last numeric token: everything before is the
/// ingredient name, the token and what follows it is the quantity.
pub fn parse_ingredient_line(line: &str) -> Result<(String, String), QaError> {
    let cleaned = line
        .trim()
        .trim_start_matches(['-', '*', '•', '·'])
        .replace(['|', '\t'], " ");
    let tokens: Vec<&str> = cleaned.split_whitespace().collect();

    let split = tokens
        .iter()
        .rposition(|t| is_numeric_token(t))
        .ok_or_else(|| QaError::IngredientParse(line.to_string()))?;

    let name = tokens[..split]
        .join(" ")
        .trim_end_matches([':', ',', '-', '='])
        .trim()
        .to_string();
    let quantity = tokens[split..]
        .join(" ")
        .trim_end_matches([',', '.'])
        .to_string();

    if name.is_empty() {
        return Err(QaError::IngredientParse(line.to_string()));
    }
    Ok((name, quantity))
}

fn is_numeric_token(token: &str) -> bool {
    let mut chars = token.chars();
    match chars.next() {
        Some(c) if c.is_ascii_digit() => true,
        Some('.') => chars.next().is_some_and(|c| c.is_ascii_digit()),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_at_last_numeric_token() {
        assert_eq!(
            parse_ingredient_line("Zinc (as zinc citrate) 10 mg").unwrap(),
            ("Zinc (as zinc citrate)".to_string(), "10 mg".to_string())
        );
        assert_eq!(
            parse_ingredient_line("- Vitamin B12 (methylcobalamin): 1000mcg").unwrap(),
            ("Vitamin B12 (methylcobalamin)".to_string(), "1000mcg".to_string())
        );
        assert_eq!(
            parse_ingredient_line("Vitamin D3 25 mcg (1000 IU)").unwrap(),
            ("Vitamin D3".to_string(), "25 mcg (1000 IU)".to_string())
        );
    }

    #[test]
    fn lines_without_quantity_are_malformed() {
        assert!(matches!(
            parse_ingredient_line("Each capsule contains"),
            Err(QaError::IngredientParse(_))
        ));
        assert!(parse_ingredient_line("500mg").is_err());
    }

    #[test]
    fn malformed_lines_are_skipped_not_fatal() {
        let fields = vec![crate::models::LabelField::new(
            "Medicinal Ingredients",
            "Each capsule contains:\nMagnesium 150 mg\n",
        )];
        let out = extract_ingredients(fields);
        assert_eq!(out.table.rows, vec![("Magnesium".to_string(), "150 mg".to_string())]);
        assert_eq!(out.skipped.len(), 1);
        assert!(out.fields.is_empty());
    }

    #[test]
    fn unparseable_block_keeps_original_field() {
        let fields = vec![crate::models::LabelField::new("medicinal ingredients", "illegible")];
        let out = extract_ingredients(fields.clone());
        assert!(out.declared);
        assert!(out.table.is_empty());
        assert_eq!(out.fields, fields);
    }
}

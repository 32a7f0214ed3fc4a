mod common;

use bottleqa::ingredients::extract_ingredients;
use bottleqa::models::LabelField;
use common::sample_label_fields;

#[test]
fn test_semicolon_separated_ingredients() {
    let out = extract_ingredients(sample_label_fields());

    assert_eq!(
        out.table.rows,
        vec![
            ("Vitamin C".to_string(), "500mg".to_string()),
            ("Zinc".to_string(), "10mg".to_string()),
        ]
    );
    assert!(out.declared);
    assert!(out.skipped.is_empty());
    assert_eq!(out.fields.len(), 4);
    assert!(
        out.fields
            .iter()
            .all(|f| !f.label.eq_ignore_ascii_case("medicinal ingredients"))
    );
}

#[test]
fn test_absent_field_leaves_labels_unchanged() {
    let fields = vec![
        LabelField::new("Product Name", "Daily Immune Support"),
        LabelField::new("NPN", "80012345"),
    ];

    let out = extract_ingredients(fields.clone());

    assert!(out.table.is_empty());
    assert!(!out.declared);
    assert_eq!(out.fields, fields);
}

#[test]
fn test_multiline_block_keeps_label_order() {
    let fields = vec![
        LabelField::new("NPN", "80012345"),
        LabelField::new(
            "MEDICINAL INGREDIENTS",
            "Magnesium (citrate) 150 mg\nVitamin D3 .025 mg\n",
        ),
        LabelField::new("Dose", "2 capsules"),
    ];

    let out = extract_ingredients(fields);

    assert_eq!(out.table.len(), 2);
    assert_eq!(out.table.rows[1], ("Vitamin D3".to_string(), ".025 mg".to_string()));
    let labels: Vec<_> = out.fields.iter().map(|f| f.label.as_str()).collect();
    assert_eq!(labels, ["NPN", "Dose"]);
}

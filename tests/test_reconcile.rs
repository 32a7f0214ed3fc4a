mod common;

use bottleqa::rules::{PRODUCT_TYPE_CHECK, Rule, RuleKind};
use bottleqa::{CheckStatus, CheckValue, Checklist, QaError, RuleTable, View, ViewDetections, ViewMap, reconcile};

fn map(classes: &[(&str, f32)]) -> ViewMap {
    let mut map = ViewMap::new();
    for (class, confidence) in classes {
        map.record(class, *confidence);
    }
    map
}

fn clean_maps() -> Vec<(View, ViewMap)> {
    let mut maps = vec![
        (View::Top, map(&[("Cap", 0.95)])),
        (View::Bottom, map(&[("Batch Code", 0.81)])),
    ];
    for view in View::SIDES {
        maps.push((view, map(&[("Label", 0.9), ("Fill Level", 0.75)])));
    }
    maps
}

fn seed(product: &str) -> Checklist {
    let mut seed = Checklist::new();
    seed.set(PRODUCT_TYPE_CHECK, CheckValue::Text(product.to_string()));
    seed
}

#[test]
fn test_every_required_class_present_passes_all_checks() -> anyhow::Result<()> {
    let detections = clean_maps()
        .into_iter()
        .fold(ViewDetections::new(), |d, (view, m)| d.with_view(view, m));
    let rules = RuleTable::builtin();

    let result = reconcile(detections, seed("Pill Bottle"), &rules)?;

    assert_eq!(result.table.len(), rules.len());
    for rule in rules.rules() {
        let value = result.checklist.get(&rule.check).expect("every rule has a row");
        match rule.kind {
            RuleKind::Seeded => assert_eq!(value, &CheckValue::Text("Pill Bottle".into())),
            _ => assert_eq!(value.status(), Some(CheckStatus::Pass), "{}", rule.check),
        }
    }
    Ok(())
}

#[test]
fn test_empty_view_map_resolves_unknown() -> anyhow::Result<()> {
    let detections = clean_maps()
        .into_iter()
        .map(|(view, m)| if view == View::Bottom { (view, ViewMap::new()) } else { (view, m) })
        .fold(ViewDetections::new(), |d, (view, m)| d.with_view(view, m));

    let result = reconcile(detections, seed("Pill Bottle"), &RuleTable::builtin())?;

    for check in ["Base Intact", "Batch Code Printed"] {
        assert_eq!(
            result.checklist.get(check).and_then(CheckValue::status),
            Some(CheckStatus::Unknown),
            "{check}"
        );
    }
    assert_eq!(
        result.checklist.get("Cap Present").and_then(CheckValue::status),
        Some(CheckStatus::Pass)
    );
    Ok(())
}

#[test]
fn test_missing_product_type_seed_is_unknown() -> anyhow::Result<()> {
    let result = reconcile(ViewDetections::new(), Checklist::new(), &RuleTable::builtin())?;

    assert_eq!(result.table.rows[0].check, PRODUCT_TYPE_CHECK);
    assert_eq!(result.table.rows[0].status, "Unknown");
    assert!(result.table.rows.iter().all(|r| r.status == "Unknown"));
    Ok(())
}

#[test]
fn test_forbidden_class_fails_regardless_of_other_views() -> anyhow::Result<()> {
    let detections = clean_maps()
        .into_iter()
        .map(|(view, m)| {
            if view == View::Back {
                (view, map(&[("Label", 0.9), ("Damaged Label", 0.72)]))
            } else {
                (view, m)
            }
        })
        .fold(ViewDetections::new(), |d, (view, m)| d.with_view(view, m));

    let result = reconcile(detections, seed("Pill Bottle"), &RuleTable::builtin())?;

    assert_eq!(
        result.checklist.get("Label Intact").and_then(CheckValue::status),
        Some(CheckStatus::Fail)
    );
    Ok(())
}

#[test]
fn test_result_independent_of_recording_order() -> anyhow::Result<()> {
    let mut maps = clean_maps();
    maps[1].1 = map(&[("Batch Code", 0.81), ("Damaged Base", 0.9)]);

    let forward = maps
        .iter()
        .cloned()
        .fold(ViewDetections::new(), |d, (view, m)| d.with_view(view, m));
    let backward = maps
        .iter()
        .rev()
        .cloned()
        .fold(ViewDetections::new(), |d, (view, m)| d.with_view(view, m));

    let rules = RuleTable::builtin();
    let a = reconcile(forward, seed("Dropper Bottle"), &rules)?;
    let b = reconcile(backward, seed("Dropper Bottle"), &rules)?;

    assert_eq!(a.table, b.table);
    assert_eq!(a.checklist, b.checklist);
    Ok(())
}

#[test]
fn test_duplicate_checks_are_a_rule_table_error() {
    let result = RuleTable::new(vec![
        Rule::require("Cap Present", &[View::Top], "Cap"),
        Rule::require("Cap Present", &[View::Top], "Lid"),
    ]);
    assert!(matches!(result, Err(QaError::RuleTable(_))));
}

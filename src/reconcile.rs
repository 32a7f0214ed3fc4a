//! Checklist reconciliation: per-view detection maps in, one row per rule out.

use crate::error::QaError;
use crate::models::{
    CheckStatus, CheckValue, Checklist, ChecklistRow, ChecklistTable, View, ViewDetections, ViewMap,
};
use crate::rules::{self, Coverage, Rule, RuleKind, RuleTable};
use std::collections::BTreeSet;
use tracing::debug;

/// Output of [`reconcile`]. The detection maps are handed back unchanged.
#[derive(Debug)]
pub struct Reconciliation {
    pub detections: ViewDetections,
    pub checklist: Checklist,
    pub table: ChecklistTable,
    /// `MissingDetection` for every analysed view that lacked a required class.
    pub missing: Vec<QaError>,
}

/// Resolve every rule of `rules` against `detections`.
///
/// `seed` supplies values for [`RuleKind::Seeded`] rules (the product type).
/// Seed entries no rule refers to are not carried into the checklist. The
/// result depends only on the final maps, never on the order views were
/// recorded in.
pub fn reconcile(
    detections: ViewDetections,
    seed: Checklist,
    rules: &RuleTable,
) -> Result<Reconciliation, QaError> {
    rules::validate(rules.rules())?;

    let mut checklist = Checklist::new();
    let mut missing = Vec::new();
    for rule in rules.rules() {
        let value = match rule.kind {
            RuleKind::Seeded => seed
                .get(rule.seed_key())
                .cloned()
                .unwrap_or(CheckValue::Status(CheckStatus::Unknown)),
            RuleKind::Require | RuleKind::Forbid => {
                CheckValue::Status(resolve_rule(rule, &detections, &mut missing))
            }
        };
        debug!(check = %rule.check, value = %value, "resolved check");
        checklist.set(rule.check.clone(), value);
    }

    let table = ChecklistTable {
        rows: checklist
            .iter()
            .map(|(check, value)| ChecklistRow {
                check: check.to_string(),
                status: value.to_string(),
            })
            .collect(),
    };

    Ok(Reconciliation {
        detections,
        checklist,
        table,
        missing,
    })
}

/// Resolve one detection rule.
///
/// Views with an empty or missing map are unanalysed: they can never turn a
/// check into Pass or Fail on their own.
pub fn resolve(rule: &Rule, detections: &ViewDetections) -> CheckStatus {
    resolve_rule(rule, detections, &mut Vec::new())
}

fn resolve_rule(rule: &Rule, detections: &ViewDetections, missing: &mut Vec<QaError>) -> CheckStatus {
    let Some(class) = rule.class.as_deref() else {
        return CheckStatus::Unknown;
    };

    let views: BTreeSet<View> = rule.views.iter().copied().collect();
    let analysed: Vec<(View, &ViewMap)> = views
        .iter()
        .filter(|v| detections.is_analysed(**v))
        .filter_map(|v| detections.get(*v).map(|m| (*v, m)))
        .collect();

    if analysed.is_empty() {
        return CheckStatus::Unknown;
    }

    let complete = analysed.len() == views.len();
    let hits = analysed.iter().filter(|(_, m)| m.contains(class)).count();

    match (rule.kind, rule.coverage) {
        (RuleKind::Require, Coverage::Any) => {
            if hits > 0 {
                CheckStatus::Pass
            } else if complete {
                record_missing(&analysed, class, missing);
                CheckStatus::Fail
            } else {
                CheckStatus::Unknown
            }
        }
        (RuleKind::Require, Coverage::All) => {
            if hits < analysed.len() {
                record_missing(&analysed, class, missing);
                CheckStatus::Fail
            } else if complete {
                CheckStatus::Pass
            } else {
                CheckStatus::Unknown
            }
        }
        (RuleKind::Forbid, _) => {
            if hits > 0 {
                CheckStatus::Fail
            } else if complete {
                CheckStatus::Pass
            } else {
                CheckStatus::Unknown
            }
        }
        (RuleKind::Seeded, _) => CheckStatus::Unknown,
    }
}

fn record_missing(analysed: &[(View, &ViewMap)], class: &str, missing: &mut Vec<QaError>) {
    for (view, map) in analysed {
        if !map.contains(class) {
            debug!(%view, class, "required class not detected");
            missing.push(QaError::MissingDetection {
                view: *view,
                class_name: class.to_string(),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::PRODUCT_TYPE_CHECK;

    fn map(classes: &[(&str, f32)]) -> ViewMap {
        let mut m = ViewMap::new();
        for (c, conf) in classes {
            m.record(c, *conf);
        }
        m
    }

    #[test]
    fn require_any_passes_on_single_side() {
        let rule = Rule::require("Label Present", &View::SIDES, "Label");
        let detections = ViewDetections::new()
            .with_view(View::Left, map(&[("Fill Level", 0.9)]))
            .with_view(View::Right, map(&[("Label", 0.8)]));
        assert_eq!(resolve(&rule, &detections), CheckStatus::Pass);
    }

    #[test]
    fn require_any_is_unknown_while_views_are_missing() {
        let rule = Rule::require("Label Present", &View::SIDES, "Label");
        let detections = ViewDetections::new().with_view(View::Left, map(&[("Fill Level", 0.9)]));
        assert_eq!(resolve(&rule, &detections), CheckStatus::Unknown);
    }

    #[test]
    fn require_all_fails_on_first_gap() {
        let rule = Rule::require("Label Everywhere", &[View::Left, View::Right], "Label")
            .with_coverage(Coverage::All);
        let detections = ViewDetections::new()
            .with_view(View::Left, map(&[("Label", 0.9)]))
            .with_view(View::Right, map(&[("Cap", 0.9)]));
        assert_eq!(resolve(&rule, &detections), CheckStatus::Fail);
    }

    #[test]
    fn forbid_fails_on_defect() {
        let rule = Rule::forbid("Cap Intact", &[View::Top], "Damaged Cap");
        let detections =
            ViewDetections::new().with_view(View::Top, map(&[("Cap", 0.95), ("damaged cap", 0.82)]));
        assert_eq!(resolve(&rule, &detections), CheckStatus::Fail);
    }

    #[test]
    fn empty_view_map_is_unknown_not_fail() {
        let rule = Rule::require("Cap Present", &[View::Top], "Cap");
        let detections = ViewDetections::new().with_view(View::Top, ViewMap::new());
        assert_eq!(resolve(&rule, &detections), CheckStatus::Unknown);
    }

    #[test]
    fn failed_requirement_records_missing_views() {
        let table = RuleTable::new(vec![
            Rule::require("Fill Level", &[View::Left, View::Right], "Fill Level"),
            Rule::require("Cap Present", &[View::Top], "Cap"),
        ])
        .unwrap();
        let detections = ViewDetections::new()
            .with_view(View::Left, map(&[("Label", 0.9)]))
            .with_view(View::Right, map(&[("Label", 0.8)]));

        let out = reconcile(detections, Checklist::new(), &table).unwrap();

        let missing: Vec<_> = out
            .missing
            .iter()
            .map(|e| match e {
                QaError::MissingDetection { view, class_name } => (*view, class_name.as_str()),
                other => panic!("unexpected {other:?}"),
            })
            .collect();
        assert_eq!(missing, [(View::Left, "Fill Level"), (View::Right, "Fill Level")]);
    }

    #[test]
    fn seeded_rule_without_seed_is_unknown() {
        let table = RuleTable::new(vec![Rule::seeded(PRODUCT_TYPE_CHECK, &[View::Front])]).unwrap();
        let out = reconcile(ViewDetections::new(), Checklist::new(), &table).unwrap();
        assert_eq!(out.table.rows[0].status, "Unknown");
    }
}

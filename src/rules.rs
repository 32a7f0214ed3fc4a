//! The ordered rule table the reconciler resolves into checklist rows.
//!
//! Each rule names one check, the views it inspects, and how the class it
//! refers to decides the outcome. The built-in table can be replaced from
//! configuration; any table is validated before use.

use crate::error::QaError;
use crate::models::View;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Checklist key the product-type router writes to.
pub const PRODUCT_TYPE_CHECK: &str = "Product Type";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleKind {
    /// Copy a value recorded earlier in the checklist seed.
    Seeded,
    /// The class must be detected.
    Require,
    /// The class is a defect and must not be detected.
    Forbid,
}

/// How a `Require` rule treats several views.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Coverage {
    #[default]
    Any,
    All,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub check: String,
    pub views: Vec<View>,
    pub kind: RuleKind,
    #[serde(default)]
    pub class: Option<String>,
    #[serde(default)]
    pub coverage: Coverage,
    /// Seed key for `Seeded` rules; defaults to the check name.
    #[serde(default)]
    pub seed_key: Option<String>,
}

impl Rule {
    pub fn require(check: &str, views: &[View], class: &str) -> Self {
        Self {
            check: check.to_string(),
            views: views.to_vec(),
            kind: RuleKind::Require,
            class: Some(class.to_string()),
            coverage: Coverage::Any,
            seed_key: None,
        }
    }

    pub fn forbid(check: &str, views: &[View], class: &str) -> Self {
        Self {
            kind: RuleKind::Forbid,
            ..Self::require(check, views, class)
        }
    }

    pub fn seeded(check: &str, views: &[View]) -> Self {
        Self {
            check: check.to_string(),
            views: views.to_vec(),
            kind: RuleKind::Seeded,
            class: None,
            coverage: Coverage::Any,
            seed_key: None,
        }
    }

    pub fn with_coverage(mut self, coverage: Coverage) -> Self {
        self.coverage = coverage;
        self
    }

    pub fn seed_key(&self) -> &str {
        self.seed_key.as_deref().unwrap_or(&self.check)
    }
}

/// A validated, ordered rule table.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleTable {
    rules: Vec<Rule>,
}

impl RuleTable {
    pub fn new(rules: Vec<Rule>) -> Result<Self, QaError> {
        validate(&rules)?;
        Ok(Self { rules })
    }

    pub fn builtin() -> Self {
        use View::*;
        const SIDES: &[View] = &[Left, Right, Front, Back];

        Self {
            rules: vec![
                Rule::seeded(PRODUCT_TYPE_CHECK, &[Front]),
                Rule::require("Cap Present", &[Top], "Cap"),
                Rule::forbid("Cap Intact", &[Top], "Damaged Cap"),
                Rule::forbid("Seal Intact", &[Top], "Broken Seal"),
                Rule::forbid("Base Intact", &[Bottom], "Damaged Base"),
                Rule::require("Batch Code Printed", &[Bottom], "Batch Code"),
                Rule::require("Label Present", SIDES, "Label"),
                Rule::forbid("Label Intact", SIDES, "Damaged Label"),
                Rule::require("Fill Level", SIDES, "Fill Level"),
                Rule::forbid("Bottle Intact", SIDES, "Damaged Bottle"),
            ],
        }
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl Default for RuleTable {
    fn default() -> Self {
        Self::builtin()
    }
}

pub(crate) fn validate(rules: &[Rule]) -> Result<(), QaError> {
    if rules.is_empty() {
        return Err(QaError::RuleTable("no rules defined".into()));
    }

    let mut seen = HashSet::new();
    for rule in rules {
        if rule.check.trim().is_empty() {
            return Err(QaError::RuleTable("rule with empty check name".into()));
        }
        if !seen.insert(rule.check.as_str()) {
            return Err(QaError::RuleTable(format!(
                "duplicate check `{}`",
                rule.check
            )));
        }
        if rule.views.is_empty() {
            return Err(QaError::RuleTable(format!(
                "check `{}` names no views",
                rule.check
            )));
        }
        match rule.kind {
            RuleKind::Seeded => {}
            RuleKind::Require | RuleKind::Forbid => {
                if rule.class.as_deref().is_none_or(|c| c.trim().is_empty()) {
                    return Err(QaError::RuleTable(format!(
                        "check `{}` has no class",
                        rule.check
                    )));
                }
            }
        }
    }

    Ok(())
}

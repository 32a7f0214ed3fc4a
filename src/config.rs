//! TOML configuration: model endpoints, OCR settings and an optional rule
//! table override. Every field has a default, so an empty file is a valid
//! configuration. View thresholds are fixed and cannot be set here.

use crate::detection::{LabelCropPolicy, ProductType};
use crate::error::QaError;
use crate::rules::{Rule, RuleTable};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct QaConfig {
    pub models: ModelEndpoints,
    pub model_timeout_secs: u64,
    /// Use the generic side detector when the product type has no specialised one.
    pub fallback_to_generic_side: bool,
    pub label_crop_policy: LabelCropPolicy,
    /// Substring marking a class whose box is cropped for OCR.
    pub label_marker: String,
    pub ocr: OcrConfig,
    /// Replaces the built-in rule table when non-empty.
    pub rules: Vec<Rule>,
}

impl Default for QaConfig {
    fn default() -> Self {
        Self {
            models: ModelEndpoints::default(),
            model_timeout_secs: 30,
            fallback_to_generic_side: false,
            label_crop_policy: LabelCropPolicy::LastMatch,
            label_marker: "Label".to_string(),
            ocr: OcrConfig::default(),
            rules: Vec::new(),
        }
    }
}

impl QaConfig {
    pub fn load(path: &Path) -> Result<Self, QaError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml(&raw)
            .map_err(|e| QaError::Config(format!("{}: {}", path.display(), e)))
    }

    pub fn from_toml(raw: &str) -> Result<Self, QaError> {
        toml::from_str(raw).map_err(|e| QaError::Config(e.to_string()))
    }

    /// The configured rule table, validated. A malformed table is fatal.
    pub fn rule_table(&self) -> Result<RuleTable, QaError> {
        if self.rules.is_empty() {
            Ok(RuleTable::builtin())
        } else {
            RuleTable::new(self.rules.clone())
        }
    }

    pub fn model_timeout(&self) -> Duration {
        Duration::from_secs(self.model_timeout_secs)
    }
}

/// Inference endpoint URLs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelEndpoints {
    pub top_bottom: Option<String>,
    pub side_generic: Option<String>,
    pub classifier: Option<String>,
    /// Specialised side detectors keyed by product type.
    pub side: BTreeMap<ProductType, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OcrBackend {
    #[default]
    Vision,
    Local,
    None,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrConfig {
    pub backend: OcrBackend,
    pub endpoint: String,
    pub model: String,
    /// Name of the environment variable holding the API key.
    pub api_key_env: String,
    pub timeout_secs: u64,
    pub max_tokens: u32,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            backend: OcrBackend::Vision,
            endpoint: "https://api.openai.com/v1/chat/completions".to_string(),
            model: "gpt-4o".to_string(),
            api_key_env: "GPT4V_KEY".to_string(),
            timeout_secs: 120,
            max_tokens: 1024,
        }
    }
}

impl OcrConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

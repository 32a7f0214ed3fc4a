use image::DynamicImage;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// One of the six fixed photograph angles of the product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum View {
    Top,
    Bottom,
    Left,
    Right,
    Front,
    Back,
}

impl View {
    pub const ALL: [View; 6] = [
        View::Top,
        View::Bottom,
        View::Left,
        View::Right,
        View::Front,
        View::Back,
    ];

    /// Side views in the order their label crops are handed to OCR.
    pub const SIDES: [View; 4] = [View::Left, View::Right, View::Front, View::Back];

    pub fn name(&self) -> &'static str {
        match self {
            View::Top => "Top",
            View::Bottom => "Bottom",
            View::Left => "Left",
            View::Right => "Right",
            View::Front => "Front",
            View::Back => "Back",
        }
    }

    pub fn is_side(&self) -> bool {
        matches!(self, View::Left | View::Right | View::Front | View::Back)
    }
}

impl fmt::Display for View {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Axis-aligned box in source image pixel coordinates (x1, y1) - (x2, y2).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BoundingBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn is_well_formed(&self) -> bool {
        [self.x1, self.y1, self.x2, self.y2]
            .iter()
            .all(|v| v.is_finite())
            && self.x2 >= self.x1
            && self.y2 >= self.y1
    }

    /// Crop this region out of `img`, clamped to the image bounds.
    ///
    /// Coordinates are truncated to whole pixels. Returns `None` when the
    /// clamped region has no area.
    pub fn crop(&self, img: &DynamicImage) -> Option<DynamicImage> {
        let x = (self.x1.max(0.0) as u32).min(img.width());
        let y = (self.y1.max(0.0) as u32).min(img.height());
        let x2 = (self.x2.max(0.0) as u32).min(img.width());
        let y2 = (self.y2.max(0.0) as u32).min(img.height());

        let width = x2.saturating_sub(x);
        let height = y2.saturating_sub(y);
        if width == 0 || height == 0 {
            return None;
        }

        Some(img.crop_imm(x, y, width, height))
    }
}

/// A single box as returned by a detector, before any threshold is applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawDetection {
    pub bbox: BoundingBox,
    pub class_name: String,
    pub confidence: f32,
}

impl RawDetection {
    pub fn new(class_name: impl Into<String>, confidence: f32, bbox: BoundingBox) -> Self {
        Self {
            bbox,
            class_name: class_name.into(),
            confidence,
        }
    }
}

/// A class-labelled, confidence-scored observation that passed its view threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub class_name: String,
    pub confidence: f32,
}

/// Class name to confidence for one view.
///
/// Duplicate classes keep the highest confidence, so the map is independent
/// of the order detections were recorded in.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ViewMap {
    classes: BTreeMap<String, f32>,
}

impl ViewMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_detections<'a>(detections: impl IntoIterator<Item = &'a Detection>) -> Self {
        let mut map = Self::new();
        for detection in detections {
            map.record(&detection.class_name, detection.confidence);
        }
        map
    }

    pub fn record(&mut self, class_name: &str, confidence: f32) {
        self.classes
            .entry(class_name.to_string())
            .and_modify(|c| *c = c.max(confidence))
            .or_insert(confidence);
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    /// Case-insensitive class lookup.
    pub fn confidence_of(&self, class_name: &str) -> Option<f32> {
        self.classes
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(class_name))
            .map(|(_, confidence)| *confidence)
    }

    pub fn contains(&self, class_name: &str) -> bool {
        self.confidence_of(class_name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f32)> {
        self.classes.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

/// Per-view detection maps for one session. Each view is written once.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ViewDetections {
    views: BTreeMap<View, ViewMap>,
}

impl ViewDetections {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the map for `view`, returning the updated state.
    ///
    /// Each stage owns its view, so a second write for the same view is a bug.
    pub fn with_view(mut self, view: View, map: ViewMap) -> Self {
        debug_assert!(!self.views.contains_key(&view), "{view} view recorded twice");
        self.views.insert(view, map);
        self
    }

    pub fn get(&self, view: View) -> Option<&ViewMap> {
        self.views.get(&view)
    }

    /// A view counts as analysed only when its map holds at least one class.
    pub fn is_analysed(&self, view: View) -> bool {
        self.views.get(&view).is_some_and(|m| !m.is_empty())
    }

    pub fn iter(&self) -> impl Iterator<Item = (View, &ViewMap)> {
        self.views.iter().map(|(v, m)| (*v, m))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CheckStatus {
    Pass,
    Fail,
    Unknown,
}

impl fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CheckStatus::Pass => f.write_str("Pass"),
            CheckStatus::Fail => f.write_str("Fail"),
            CheckStatus::Unknown => f.write_str("Unknown"),
        }
    }
}

/// A resolved checklist entry: either a status or a recorded value such as the product type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CheckValue {
    Status(CheckStatus),
    Text(String),
}

impl CheckValue {
    pub fn status(&self) -> Option<CheckStatus> {
        match self {
            CheckValue::Status(s) => Some(*s),
            CheckValue::Text(_) => None,
        }
    }
}

impl fmt::Display for CheckValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CheckValue::Status(s) => s.fmt(f),
            CheckValue::Text(t) => f.write_str(t),
        }
    }
}

/// Ordered check name to value mapping. Insertion order is report row order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Checklist {
    entries: Vec<(String, CheckValue)>,
}

impl Checklist {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace, keeping the position of an existing entry.
    pub fn set(&mut self, name: impl Into<String>, value: CheckValue) {
        let name = name.into();
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some((_, v)) => *v = value,
            None => self.entries.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&CheckValue> {
        self.entries.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &CheckValue)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v))
    }
}

/// Two-column `Checks` / `Status` table in rule-table order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChecklistTable {
    pub rows: Vec<ChecklistRow>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChecklistRow {
    pub check: String,
    pub status: String,
}

impl ChecklistTable {
    pub const COLUMNS: [&'static str; 2] = ["Checks", "Status"];

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// One (field-name, value) pair read from a label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelField {
    pub label: String,
    pub value: String,
}

impl LabelField {
    pub fn new(label: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            value: value.into(),
        }
    }
}

pub type LabelFields = Vec<LabelField>;

/// (ingredient-name, quantity) pairs in declaration order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngredientTable {
    pub rows: Vec<(String, String)>,
}

impl IngredientTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

mod fixtures;
pub use fixtures::*;

// Re-export commonly used types from bottleqa for tests
pub use bottleqa::detection::{Classification, Classifier, Detector, ProductType, ProductTypeRouter};
pub use bottleqa::models::{BoundingBox, Detection, LabelField, LabelFields, RawDetection, ViewMap};
pub use bottleqa::ocr::{EncodedImage, LabelReader};
pub use bottleqa::{CheckStatus, CheckValue, Checklist, QaError, QaPipeline, RuleTable, SessionImages, View, ViewDetections};

//! Detector and classifier clients for an HTTP inference server.
//!
//! The image is posted as a PNG body; the server answers with
//! `{"predictions": [{"class": "...", "confidence": 0.9, "x1": .., "y1": .., "x2": .., "y2": ..}]}`.
//! Classifier responses omit the box fields.

use super::{Classification, Classifier, Detector};
use crate::error::QaError;
use crate::input::encode_png;
use crate::models::{BoundingBox, RawDetection};
use async_trait::async_trait;
use image::DynamicImage;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct PredictionResponse {
    #[serde(default)]
    predictions: Vec<WirePrediction>,
}

#[derive(Debug, Deserialize)]
struct WirePrediction {
    #[serde(alias = "name", alias = "class_name")]
    class: String,
    confidence: f32,
    #[serde(default)]
    x1: Option<f32>,
    #[serde(default)]
    y1: Option<f32>,
    #[serde(default)]
    x2: Option<f32>,
    #[serde(default)]
    y2: Option<f32>,
}

impl WirePrediction {
    fn into_detection(self, model: &str) -> Result<RawDetection, QaError> {
        match (self.x1, self.y1, self.x2, self.y2) {
            (Some(x1), Some(y1), Some(x2), Some(y2)) => Ok(RawDetection::new(
                self.class,
                self.confidence,
                BoundingBox::new(x1, y1, x2, y2),
            )),
            _ => Err(QaError::model(
                model,
                format!("prediction `{}` has no bounding box", self.class),
            )),
        }
    }
}

/// Shared request logic for both model kinds.
#[derive(Debug, Clone)]
struct InferenceEndpoint {
    name: String,
    url: String,
    client: reqwest::Client,
}

impl InferenceEndpoint {
    async fn predict(&self, image: &DynamicImage) -> Result<Vec<WirePrediction>, QaError> {
        let body = encode_png(image)?;
        let response = self
            .client
            .post(&self.url)
            .header(reqwest::header::CONTENT_TYPE, "image/png")
            .body(body)
            .send()
            .await
            .map_err(|e| QaError::model(&self.name, e))?
            .error_for_status()
            .map_err(|e| QaError::model(&self.name, e))?;

        let parsed: PredictionResponse = response
            .json()
            .await
            .map_err(|e| QaError::model(&self.name, format!("malformed response: {e}")))?;
        Ok(parsed.predictions)
    }
}

#[derive(Debug, Clone)]
pub struct HttpDetector {
    endpoint: InferenceEndpoint,
}

impl HttpDetector {
    pub fn new(name: impl Into<String>, url: impl Into<String>, client: reqwest::Client) -> Self {
        Self {
            endpoint: InferenceEndpoint {
                name: name.into(),
                url: url.into(),
                client,
            },
        }
    }
}

#[async_trait]
impl Detector for HttpDetector {
    fn name(&self) -> &str {
        &self.endpoint.name
    }

    async fn invoke(&self, image: &DynamicImage) -> Result<Vec<RawDetection>, QaError> {
        self.endpoint
            .predict(image)
            .await?
            .into_iter()
            .map(|p| p.into_detection(&self.endpoint.name))
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct HttpClassifier {
    endpoint: InferenceEndpoint,
}

impl HttpClassifier {
    pub fn new(name: impl Into<String>, url: impl Into<String>, client: reqwest::Client) -> Self {
        Self {
            endpoint: InferenceEndpoint {
                name: name.into(),
                url: url.into(),
                client,
            },
        }
    }
}

#[async_trait]
impl Classifier for HttpClassifier {
    fn name(&self) -> &str {
        &self.endpoint.name
    }

    async fn classify(&self, image: &DynamicImage) -> Result<Vec<Classification>, QaError> {
        Ok(self
            .endpoint
            .predict(image)
            .await?
            .into_iter()
            .map(|p| Classification {
                class_name: p.class,
                confidence: p.confidence,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detection_response_decodes() {
        let parsed: PredictionResponse = serde_json::from_str(
            r#"{"predictions":[{"class":"Cap","confidence":0.93,"x1":1,"y1":2,"x2":30,"y2":40}]}"#,
        )
        .unwrap();
        let detection = parsed
            .predictions
            .into_iter()
            .next()
            .unwrap()
            .into_detection("top")
            .unwrap();
        assert_eq!(detection.class_name, "Cap");
        assert_eq!(detection.bbox, BoundingBox::new(1.0, 2.0, 30.0, 40.0));
    }

    #[test]
    fn detection_without_box_is_model_error() {
        let parsed: PredictionResponse =
            serde_json::from_str(r#"{"predictions":[{"name":"Cap","confidence":0.93}]}"#).unwrap();
        let err = parsed
            .predictions
            .into_iter()
            .next()
            .unwrap()
            .into_detection("top")
            .unwrap_err();
        assert!(matches!(err, QaError::ModelInvocation { .. }));
    }
}

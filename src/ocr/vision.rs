use super::{EncodedImage, LabelReader, parse_label_fields};
use crate::config::OcrConfig;
use crate::error::QaError;
use crate::models::LabelFields;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Instant;
use tracing::{debug, info};

/// Label reader backed by a vision-language model behind an
/// OpenAI-compatible chat completions endpoint.
#[derive(Debug, Clone)]
pub struct VisionLabelReader {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: String,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    max_tokens: u32,
    temperature: f32,
    messages: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

impl VisionLabelReader {
    pub fn new(
        client: reqwest::Client,
        endpoint: impl Into<String>,
        model: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
            model: model.into(),
            api_key: api_key.into(),
            max_tokens: 1024,
        }
    }

    /// Build from configuration, reading the API key from the configured
    /// environment variable.
    pub fn from_config(config: &OcrConfig, client: reqwest::Client) -> Result<Self, QaError> {
        let api_key = std::env::var(&config.api_key_env).map_err(|_| {
            QaError::Config(format!("environment variable `{}` is not set", config.api_key_env))
        })?;
        let mut reader = Self::new(client, &config.endpoint, &config.model, api_key);
        reader.max_tokens = config.max_tokens;
        Ok(reader)
    }

    fn request(&self, images: &[EncodedImage], prompt: &str) -> ChatRequest {
        let mut content = vec![json!({ "type": "text", "text": prompt })];
        content.extend(images.iter().map(|img| {
            json!({
                "type": "image_url",
                "image_url": { "url": img.data_url(), "detail": "high" }
            })
        }));

        ChatRequest {
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            temperature: 0.0,
            messages: vec![json!({ "role": "user", "content": content })],
        }
    }
}

#[async_trait]
impl LabelReader for VisionLabelReader {
    fn name(&self) -> &str {
        &self.model
    }

    async fn extract(&self, images: &[EncodedImage], prompt: &str) -> Result<LabelFields, QaError> {
        let start = Instant::now();
        let request = self.request(images, prompt);

        let response: ChatResponse = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let text = response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| QaError::OcrFormat("response has no message content".into()))?;
        debug!(chars = text.len(), "vision model answered");

        let fields = parse_label_fields(&text)?;
        info!(
            model = %self.model,
            images = images.len(),
            fields = fields.len(),
            elapsed_ms = %start.elapsed().as_millis(),
            "label extraction complete"
        );
        Ok(fields)
    }
}

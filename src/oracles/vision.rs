use anyhow::{Context, Result, anyhow};
use image::DynamicImage;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

use super::retry::post_json;
use super::{LabelingOracle, OracleFuture};
use crate::data::{PNG_MIME, data_url, encode_png};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_PROMPT: &str = "What text or label is visible in this cropped region from a technical diagram? \
Reply with ONLY the text/name you see, nothing else. \
Maximum 3 words. No sentences. No explanations. \
If no text is visible, reply: Unknown";

const MAX_REPLY_TOKENS: u32 = 20;

#[derive(Debug, Clone)]
pub struct VisionLabeler {
    key: String,
    model: String,
    base_url: String,
    prompt: String,
    client: reqwest::Client,
}

impl VisionLabeler {
    pub fn new(key: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .with_context(|| "failed to build labeling HTTP client")?;
        Ok(Self {
            key: key.into(),
            model: DEFAULT_MODEL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            prompt: DEFAULT_PROMPT.to_string(),
            client,
        })
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        let model = model.into();
        if !model.trim().is_empty() {
            self.model = model;
        }
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        if !base_url.trim().is_empty() {
            self.base_url = base_url.trim_end_matches('/').to_string();
        }
        self
    }

    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        let prompt = prompt.into();
        if !prompt.trim().is_empty() {
            self.prompt = prompt;
        }
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn request_body(&self, image_url: &str) -> serde_json::Value {
        json!({
            "model": self.model,
            "max_tokens": MAX_REPLY_TOKENS,
            "temperature": 0,
            "messages": [
                {
                    "role": "user",
                    "content": [
                        {"type": "text", "text": self.prompt},
                        {"type": "image_url", "image_url": {"url": image_url}}
                    ]
                }
            ]
        })
    }
}

impl LabelingOracle for VisionLabeler {
    fn name(&self) -> &str {
        "vision labeler"
    }

    fn label(&self, crop: DynamicImage) -> OracleFuture<Option<String>> {
        let labeler = self.clone();
        Box::pin(async move {
            let png = encode_png(&crop)?;
            let body = labeler.request_body(&data_url(PNG_MIME, &png));
            let url = format!("{}/chat/completions", labeler.base_url);
            let text = post_json(
                &labeler.client,
                "vision labeler",
                &url,
                Some(labeler.key.as_str()),
                &body,
                extract_openai_error,
            )
            .await?;
            extract_reply(&text)
        })
    }
}

fn extract_reply(text: &str) -> Result<Option<String>> {
    let payload: ChatResponse =
        serde_json::from_str(text).with_context(|| "failed to parse labeling response JSON")?;
    let choice = payload
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| anyhow!("no choices returned from labeling model"))?;
    Ok(choice
        .message
        .content
        .filter(|content| !content.trim().is_empty()))
}

fn extract_openai_error(body: &str) -> Option<String> {
    #[derive(Deserialize)]
    struct ErrorBody {
        error: Option<ApiError>,
    }

    #[derive(Deserialize)]
    struct ApiError {
        message: Option<String>,
        #[serde(rename = "type")]
        kind: Option<String>,
        code: Option<String>,
    }

    let parsed: ErrorBody = serde_json::from_str(body).ok()?;
    let error = parsed.error?;
    Some(format_error_parts(error.message, error.kind, error.code))
}

fn format_error_parts(
    message: Option<String>,
    kind: Option<String>,
    code: Option<String>,
) -> String {
    let mut parts = Vec::new();
    if let Some(message) = message.filter(|value| !value.trim().is_empty()) {
        parts.push(message);
    }
    if let Some(kind) = kind.filter(|value| !value.trim().is_empty()) {
        parts.push(format!("type: {}", kind));
    }
    if let Some(code) = code.filter(|value| !value.trim().is_empty()) {
        parts.push(format!("code: {}", code));
    }
    if parts.is_empty() {
        "unknown error".to_string()
    } else {
        parts.join(" | ")
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

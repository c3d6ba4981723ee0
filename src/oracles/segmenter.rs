use anyhow::{Context, Result};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use image::DynamicImage;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::debug;

use super::retry::post_json;
use super::{OracleFuture, SegmentationOracle};
use crate::data::encode_png;
use crate::pipeline::OracleBox;

#[derive(Debug, Clone)]
pub struct HttpSegmenter {
    url: String,
    client: reqwest::Client,
}

impl HttpSegmenter {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .with_context(|| "failed to build segmentation HTTP client")?;
        Ok(Self {
            url: url.into(),
            client,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl SegmentationOracle for HttpSegmenter {
    fn name(&self) -> &str {
        "segmenter"
    }

    fn segment(&self, image: DynamicImage) -> OracleFuture<Vec<OracleBox>> {
        let url = self.url.clone();
        let client = self.client.clone();
        Box::pin(async move {
            let png = tokio::task::spawn_blocking(move || encode_png(&image))
                .await
                .with_context(|| "PNG encoding task failed")??;
            let body = json!({ "image_base64": BASE64.encode(&png) });
            let text = post_json(&client, "segmenter", &url, None, &body, extract_error).await?;
            let segments = parse_segments(&text)?;
            debug!("segmenter returned {} boxes", segments.len());
            Ok(segments)
        })
    }
}

#[derive(Debug, Deserialize)]
struct SegmentResponse {
    #[serde(default)]
    segments: Vec<OracleBox>,
}

pub(crate) fn parse_segments(text: &str) -> Result<Vec<OracleBox>> {
    let payload: SegmentResponse =
        serde_json::from_str(text).with_context(|| "failed to parse segmentation response JSON")?;
    Ok(payload.segments)
}

fn extract_error(body: &str) -> Option<String> {
    #[derive(Deserialize)]
    struct ErrorBody {
        error: Option<String>,
        detail: Option<String>,
    }

    let parsed: ErrorBody = serde_json::from_str(body).ok()?;
    parsed
        .error
        .or(parsed.detail)
        .filter(|message| !message.trim().is_empty())
}

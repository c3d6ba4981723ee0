use anyhow::{Result, anyhow};
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

pub mod data;
pub mod extractor;
pub mod logging;
pub mod oracles;
pub mod pipeline;
pub mod server;
pub mod settings;

#[cfg(test)]
mod test_util;

pub use extractor::{ExtractError, Extraction, ExtractionStatus, Extractor};
pub use pipeline::{Component, PipelineConfig, Relationship, Relationships};

use oracles::{HttpSegmenter, InferenceGate, VisionLabeler};
use settings::Settings;

#[derive(Debug, Clone, Default)]
pub struct Config {
    pub data: Option<String>,
    pub hints: Vec<String>,
    pub with_relationships: bool,
    pub server: Option<String>,
    pub settings_path: Option<String>,
}

pub async fn run(config: Config, input: Option<Vec<u8>>) -> Result<String> {
    let settings_path = config.settings_path.as_deref().map(Path::new);
    let mut settings = settings::load_settings(settings_path)?;
    let extractor = build_extractor(&settings)?;

    if let Some(addr) = config.server {
        if !addr.trim().is_empty() {
            settings.server_addr = addr.trim().to_string();
        }
        server::run_server(settings, extractor).await?;
        return Ok(String::new());
    }

    let bytes = match (config.data.as_deref(), input) {
        (Some(path), _) => data::ImageData::load(Path::new(path))?.bytes,
        (None, Some(bytes)) if !bytes.is_empty() => bytes,
        _ => return Err(anyhow!("no diagram given; pass --data or pipe an image on stdin")),
    };

    let image = extractor::decode(&bytes)?;
    let deadline = Duration::from_secs(settings.extract_timeout_secs);
    let extraction = extractor
        .extract_within(&image, &config.hints, deadline)
        .await;
    if extraction.is_error() {
        let reason = extraction.error.unwrap_or_default();
        return Err(anyhow!("extraction failed: {}", reason));
    }

    let relationships = config
        .with_relationships
        .then(|| extractor.analyze_relationships(&extraction.components));
    format_output(&extraction, relationships.as_ref())
}

pub fn build_extractor(settings: &Settings) -> Result<Extractor> {
    let gate = InferenceGate::new();
    let mut extractor = Extractor::new(settings.pipeline.clone());

    match settings.segment_url.as_deref() {
        Some(url) => {
            let segmenter =
                HttpSegmenter::new(url, Duration::from_secs(settings.segment_timeout_secs))?;
            info!("segmentation oracle: {}", segmenter.url());
            extractor = extractor.with_segmenter(gate.wrap(segmenter));
        }
        None => warn!(
            "segmentation oracle not configured (set [segmentation] url or {})",
            settings::SEGMENT_URL_ENV
        ),
    }

    match settings::resolve_label_key() {
        Some(key) => {
            let mut labeler =
                VisionLabeler::new(key, Duration::from_secs(settings.label_timeout_secs))?
                    .with_model(settings.label_model.clone());
            if let Some(base_url) = settings.label_base_url.as_deref() {
                labeler = labeler.with_base_url(base_url);
            }
            if let Some(prompt) = settings.label_prompt.as_deref() {
                labeler = labeler.with_prompt(prompt);
            }
            info!("labeling oracle: {}", labeler.model());
            extractor = extractor.with_labeler(gate.wrap(labeler));
        }
        None => warn!(
            "labeling oracle not configured (set {})",
            settings::LABEL_KEY_ENVS.join(" or ")
        ),
    }

    Ok(extractor)
}

fn format_output(extraction: &Extraction, relationships: Option<&Relationships>) -> Result<String> {
    let mut value = serde_json::to_value(extraction)?;
    if let (Some(relationships), Some(object)) = (relationships, value.as_object_mut()) {
        object.insert(
            "relationships".to_string(),
            serde_json::to_value(relationships)?,
        );
    }
    Ok(serde_json::to_string_pretty(&value)?)
}

use image::DynamicImage;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::oracles::{LabelingOracle, SegmentationOracle};
use crate::pipeline::{
    Component, PipelineConfig, Relationships, analyze_relationships, deduplicate_by_label, ingest,
    label_components, normalize_components, refine_segments,
};

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("malformed input: {0}")]
    MalformedInput(String),
    #[error("{oracle} unavailable: {message}")]
    OracleUnavailable { oracle: String, message: String },
    #[error("extraction timed out after {0:?}")]
    Timeout(Duration),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractionStatus {
    Success,
    Degraded,
    Error,
}

/// Outcome of one extraction call. Always well-formed: failures show up in
/// `status` and `error`, never as a missing result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Extraction {
    pub status: ExtractionStatus,
    pub components: Vec<Component>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Extraction {
    pub fn success(components: Vec<Component>) -> Self {
        Self {
            status: ExtractionStatus::Success,
            components,
            error: None,
        }
    }

    pub fn degraded(components: Vec<Component>, reason: &ExtractError) -> Self {
        Self {
            status: ExtractionStatus::Degraded,
            components,
            error: Some(reason.to_string()),
        }
    }

    pub fn failed(error: &ExtractError) -> Self {
        Self {
            status: ExtractionStatus::Error,
            components: Vec::new(),
            error: Some(error.to_string()),
        }
    }

    pub fn is_error(&self) -> bool {
        self.status == ExtractionStatus::Error
    }
}

#[derive(Clone)]
pub struct Extractor {
    config: Arc<PipelineConfig>,
    segmenter: Option<Arc<dyn SegmentationOracle>>,
    labeler: Option<Arc<dyn LabelingOracle>>,
}

impl Extractor {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config: Arc::new(config),
            segmenter: None,
            labeler: None,
        }
    }

    pub fn with_segmenter(mut self, segmenter: impl SegmentationOracle + 'static) -> Self {
        self.segmenter = Some(Arc::new(segmenter));
        self
    }

    pub fn with_labeler(mut self, labeler: impl LabelingOracle + 'static) -> Self {
        self.labeler = Some(Arc::new(labeler));
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn has_segmenter(&self) -> bool {
        self.segmenter.is_some()
    }

    pub fn has_labeler(&self) -> bool {
        self.labeler.is_some()
    }

    pub async fn extract(&self, image: &DynamicImage, hints: &[String]) -> Extraction {
        let (width, height) = (image.width(), image.height());
        if width == 0 || height == 0 {
            return Extraction::failed(&ExtractError::MalformedInput(format!(
                "image has zero size ({}x{})",
                width, height
            )));
        }

        let Some(segmenter) = self.segmenter.as_deref() else {
            warn!("no segmentation oracle configured");
            return Extraction::degraded(
                Vec::new(),
                &ExtractError::OracleUnavailable {
                    oracle: "segmenter".to_string(),
                    message: "not configured".to_string(),
                },
            );
        };

        let raw = match segmenter.segment(image.clone()).await {
            Ok(raw) => raw,
            Err(err) => {
                warn!("{} failed: {:#}", segmenter.name(), err);
                return Extraction::degraded(
                    Vec::new(),
                    &ExtractError::OracleUnavailable {
                        oracle: segmenter.name().to_string(),
                        message: format!("{:#}", err),
                    },
                );
            }
        };

        let config = self.config.as_ref();
        let segments = ingest(raw, width, height);
        let gray = image.to_luma8();
        let refined = refine_segments(segments, &gray, config);

        let components = normalize_components(&refined, width, height);
        info!("normalized to components: {}", components.len());

        let labeled = label_components(
            components,
            &refined,
            image,
            hints,
            self.labeler.as_deref(),
            config,
        )
        .await;
        let total = labeled.components.len();
        let components = deduplicate_by_label(labeled.components, config.max_components);
        info!("extracted {} components", components.len());

        if labeled.errors > 0 {
            let oracle = self
                .labeler
                .as_deref()
                .map(|labeler| labeler.name().to_string())
                .unwrap_or_else(|| "labeler".to_string());
            return Extraction::degraded(
                components,
                &ExtractError::OracleUnavailable {
                    oracle,
                    message: format!("{} of {} label calls failed", labeled.errors, total),
                },
            );
        }
        if labeled.unlabeled > 0 {
            return Extraction::degraded(
                components,
                &ExtractError::OracleUnavailable {
                    oracle: "labeler".to_string(),
                    message: "not configured".to_string(),
                },
            );
        }
        Extraction::success(components)
    }

    pub async fn extract_bytes(&self, bytes: &[u8], hints: &[String]) -> Extraction {
        match decode(bytes) {
            Ok(image) => self.extract(&image, hints).await,
            Err(err) => {
                warn!("{}", err);
                Extraction::failed(&err)
            }
        }
    }

    /// Like [`Extractor::extract`] under a whole-call deadline. An expired
    /// deadline yields no components, never a partial result.
    pub async fn extract_within(
        &self,
        image: &DynamicImage,
        hints: &[String],
        deadline: Duration,
    ) -> Extraction {
        let started = Instant::now();
        let outcome = tokio::time::timeout(deadline, self.extract(image, hints)).await;
        // the stages are synchronous and can overrun between await points
        match outcome {
            Ok(extraction) if started.elapsed() <= deadline => extraction,
            _ => {
                let err = ExtractError::Timeout(deadline);
                warn!("{}", err);
                Extraction::failed(&err)
            }
        }
    }

    pub fn analyze_relationships(&self, components: &[Component]) -> Relationships {
        analyze_relationships(components, self.config.proximity_threshold)
    }
}

pub fn decode(bytes: &[u8]) -> Result<DynamicImage, ExtractError> {
    if bytes.is_empty() {
        return Err(ExtractError::MalformedInput("empty image data".to_string()));
    }
    let image = image::load_from_memory(bytes)
        .map_err(|err| ExtractError::MalformedInput(err.to_string()))?;
    if image.width() == 0 || image.height() == 0 {
        return Err(ExtractError::MalformedInput("image has zero size".to_string()));
    }
    Ok(image)
}

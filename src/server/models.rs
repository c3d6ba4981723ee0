use serde::{Deserialize, Serialize};

use crate::extractor::Extraction;
use crate::pipeline::{Component, Relationships};

#[derive(Debug, Serialize)]
pub(crate) struct HealthResponse {
    pub(crate) status: &'static str,
    pub(crate) segmentation: bool,
    pub(crate) labeling: bool,
}

#[derive(Debug, Deserialize)]
pub(crate) struct UploadRequest {
    #[serde(default)]
    pub(crate) name: Option<String>,
    pub(crate) data_base64: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct UploadResponse {
    pub(crate) stored_name: String,
    pub(crate) mime: String,
    pub(crate) size: usize,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub(crate) struct ExtractRequest {
    pub(crate) stored_name: Option<String>,
    pub(crate) image_base64: Option<String>,
    pub(crate) hints: Vec<String>,
    pub(crate) with_relationships: bool,
}

#[derive(Debug, Serialize)]
pub(crate) struct ExtractResponse {
    #[serde(flatten)]
    pub(crate) extraction: Extraction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) relationships: Option<Relationships>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RelationshipsRequest {
    pub(crate) components: Vec<Component>,
}

#[derive(Debug, Serialize)]
pub(crate) struct ErrorResponse {
    pub(crate) error: String,
}

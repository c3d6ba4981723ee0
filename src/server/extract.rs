use axum::http::StatusCode;
use tracing::{info, warn};

use super::models::{ExtractRequest, ExtractResponse, UploadRequest, UploadResponse};
use super::state::ServerState;
use super::util::{stored_upload_path, write_upload};
use crate::data::{self, ImageData};
use crate::extractor::{self, Extraction};

#[derive(Debug)]
pub(crate) struct ServerError {
    pub(crate) status: StatusCode,
    pub(crate) message: String,
}

impl ServerError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub(crate) fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub(crate) fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub(crate) fn too_large(message: impl Into<String>) -> Self {
        Self::new(StatusCode::PAYLOAD_TOO_LARGE, message)
    }

    pub(crate) fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

impl From<anyhow::Error> for ServerError {
    fn from(err: anyhow::Error) -> Self {
        ServerError::internal(format!("{:#}", err))
    }
}

pub(crate) fn upload_request(
    state: &ServerState,
    request: UploadRequest,
) -> Result<UploadResponse, ServerError> {
    let bytes = data::decode_base64(&request.data_base64)
        .map_err(|err| ServerError::bad_request(format!("{:#}", err)))?;
    if bytes.is_empty() {
        return Err(ServerError::bad_request("upload is empty"));
    }
    if bytes.len() > state.max_upload_bytes {
        return Err(ServerError::too_large(format!(
            "upload is {} bytes (limit {})",
            bytes.len(),
            state.max_upload_bytes
        )));
    }
    let image = ImageData::from_bytes(bytes, request.name.as_deref())
        .map_err(|err| ServerError::bad_request(format!("{:#}", err)))?;
    let stored_name = write_upload(&image, &state.upload_dir)?;
    info!("stored upload {} ({} bytes)", stored_name, image.bytes.len());
    Ok(UploadResponse {
        stored_name,
        mime: image.mime,
        size: image.bytes.len(),
    })
}

pub(crate) async fn extract_request(
    state: &ServerState,
    request: ExtractRequest,
) -> Result<(StatusCode, ExtractResponse), ServerError> {
    let bytes = match (request.stored_name.as_deref(), request.image_base64.as_deref()) {
        (Some(_), Some(_)) => {
            return Err(ServerError::bad_request(
                "stored_name and image_base64 cannot be provided together",
            ));
        }
        (None, None) => {
            return Err(ServerError::bad_request(
                "either stored_name or image_base64 is required",
            ));
        }
        (Some(name), None) => {
            let path = stored_upload_path(&state.upload_dir, name)
                .ok_or_else(|| ServerError::bad_request("stored_name must be a plain file name"))?;
            if !path.is_file() {
                return Err(ServerError::not_found(format!("no upload named '{}'", name)));
            }
            std::fs::read(&path)
                .map_err(|err| ServerError::internal(format!("failed to read upload: {}", err)))?
        }
        (None, Some(encoded)) => data::decode_base64(encoded)
            .map_err(|err| ServerError::bad_request(format!("{:#}", err)))?,
    };

    let extraction = match extractor::decode(&bytes) {
        Ok(image) => {
            state
                .extractor
                .extract_within(&image, &request.hints, state.extract_timeout)
                .await
        }
        Err(err) => {
            warn!("rejecting extraction: {}", err);
            Extraction::failed(&err)
        }
    };

    let relationships = (request.with_relationships && !extraction.is_error())
        .then(|| state.extractor.analyze_relationships(&extraction.components));
    let status = if extraction.is_error() {
        StatusCode::UNPROCESSABLE_ENTITY
    } else {
        StatusCode::OK
    };
    Ok((
        status,
        ExtractResponse {
            extraction,
            relationships,
        },
    ))
}

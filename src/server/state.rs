use std::path::PathBuf;
use std::time::Duration;

use crate::extractor::Extractor;
use crate::settings::Settings;

#[derive(Clone)]
pub(crate) struct ServerState {
    pub(crate) extractor: Extractor,
    pub(crate) upload_dir: PathBuf,
    pub(crate) extract_timeout: Duration,
    pub(crate) max_upload_bytes: usize,
}

impl ServerState {
    pub(crate) fn new(settings: &Settings, extractor: Extractor) -> Self {
        Self {
            extractor,
            upload_dir: settings.upload_dir.clone(),
            extract_timeout: Duration::from_secs(settings.extract_timeout_secs),
            max_upload_bytes: settings.max_upload_bytes,
        }
    }
}

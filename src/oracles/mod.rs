use anyhow::Result;
use image::DynamicImage;
use std::future::Future;
use std::pin::Pin;

use crate::pipeline::OracleBox;

mod gate;
mod retry;
mod segmenter;
mod vision;

pub use gate::{Gated, InferenceGate};
pub use segmenter::HttpSegmenter;
pub use vision::{
    DEFAULT_MODEL as DEFAULT_LABEL_MODEL, DEFAULT_PROMPT as DEFAULT_LABEL_PROMPT, VisionLabeler,
};

pub type OracleFuture<T> = Pin<Box<dyn Future<Output = Result<T>> + Send>>;

pub trait SegmentationOracle: Send + Sync {
    fn name(&self) -> &str;
    fn segment(&self, image: DynamicImage) -> OracleFuture<Vec<OracleBox>>;
}

pub trait LabelingOracle: Send + Sync {
    fn name(&self) -> &str;
    fn label(&self, crop: DynamicImage) -> OracleFuture<Option<String>>;
}

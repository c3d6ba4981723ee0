use image::DynamicImage;
use std::sync::Arc;
use tokio::sync::Mutex;

use super::{LabelingOracle, OracleFuture, SegmentationOracle};
use crate::pipeline::OracleBox;

/// Single-accelerator lock. Every gated oracle call holds it for the duration
/// of the inference; clones share the same lock.
#[derive(Debug, Clone, Default)]
pub struct InferenceGate {
    lock: Arc<Mutex<()>>,
}

impl InferenceGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn wrap<O>(&self, oracle: O) -> Gated<O> {
        Gated {
            inner: oracle,
            gate: self.clone(),
        }
    }

    fn run<T: Send + 'static>(&self, call: OracleFuture<T>) -> OracleFuture<T> {
        let lock = self.lock.clone();
        Box::pin(async move {
            let _held = lock.lock_owned().await;
            call.await
        })
    }
}

/// An oracle whose calls queue behind an [`InferenceGate`].
#[derive(Debug, Clone)]
pub struct Gated<O> {
    inner: O,
    gate: InferenceGate,
}

impl<O: SegmentationOracle> SegmentationOracle for Gated<O> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn segment(&self, image: DynamicImage) -> OracleFuture<Vec<OracleBox>> {
        self.gate.run(self.inner.segment(image))
    }
}

impl<O: LabelingOracle> LabelingOracle for Gated<O> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn label(&self, crop: DynamicImage) -> OracleFuture<Option<String>> {
        self.gate.run(self.inner.label(crop))
    }
}

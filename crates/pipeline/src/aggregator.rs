//! Runs detection over sampled frames and reduces the results.

use std::sync::Arc;

use crackx_core::report::Frame;
use crackx_core::verdict::{AggregateVerdict, VerdictAccumulator};

use crate::detector::DetectionPort;

/// Feeds frames to the detection model, in order, and folds the
/// per-frame results into one [`AggregateVerdict`].
#[derive(Clone)]
pub struct DetectionAggregator {
    port: Arc<dyn DetectionPort>,
    threshold: f64,
}

impl DetectionAggregator {
    pub fn new(port: Arc<dyn DetectionPort>, threshold: f64) -> Self {
        Self { port, threshold }
    }

    /// Verdict for the frames, or `None` if no frame produced a detection
    /// at or above the threshold.
    ///
    /// A frame whose inference call fails is skipped.
    pub async fn aggregate(&self, frames: &[Frame]) -> Option<AggregateVerdict> {
        let mut acc = VerdictAccumulator::new(self.threshold);
        let mut failed = 0usize;

        for frame in frames {
            match self.port.detect(&frame.data).await {
                Ok(Some(detection)) => {
                    let confidence = detection.confidence;
                    if !acc.observe(frame.index, detection) {
                        tracing::trace!(frame = frame.index, confidence, "Detection below threshold");
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    failed += 1;
                    tracing::warn!(
                        frame = frame.index,
                        stage = "detect",
                        error = %e,
                        "Inference failed, skipping frame"
                    );
                }
            }
        }

        if failed > 0 && failed == frames.len() {
            tracing::warn!(frames = failed, "Inference failed on every sampled frame");
        }

        acc.finish(frames.len())
    }
}

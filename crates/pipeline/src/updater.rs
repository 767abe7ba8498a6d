//! Persists a video's verdict onto its report.

use std::sync::Arc;

use crackx_core::types::DbId;
use crackx_core::verdict::AggregateVerdict;

use crate::error::StoreError;
use crate::store::ReportStore;

/// Writes the headline detection of a verdict back to the report store.
#[derive(Clone)]
pub struct ReportUpdater {
    store: Arc<dyn ReportStore>,
}

impl ReportUpdater {
    pub fn new(store: Arc<dyn ReportStore>) -> Self {
        Self { store }
    }

    /// Replace the report's detection with `verdict.best_detection`.
    ///
    /// Once this succeeds the report is no longer pending.
    pub async fn update(&self, report_id: DbId, verdict: &AggregateVerdict) -> Result<(), StoreError> {
        self.store
            .update_detection(report_id, &verdict.best_detection)
            .await?;
        tracing::info!(
            report_id,
            damage_type = %verdict.best_detection.damage_type,
            confidence = verdict.best_detection.confidence,
            severity = ?verdict.best_detection.severity,
            frames_with_detection = verdict.frames_with_detection,
            total_frames_sampled = verdict.total_frames_sampled,
            "Report detection updated"
        );
        Ok(())
    }
}

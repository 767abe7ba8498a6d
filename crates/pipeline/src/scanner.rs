//! Discovery of reports awaiting video analysis.

use std::sync::Arc;

use crackx_core::report::VideoReport;

use crate::error::StoreError;
use crate::store::ReportStore;

/// Lists the reports the next cycle should process.
#[derive(Clone)]
pub struct PendingReportScanner {
    store: Arc<dyn ReportStore>,
}

impl PendingReportScanner {
    pub fn new(store: Arc<dyn ReportStore>) -> Self {
        Self { store }
    }

    /// Pending video reports in store order.
    ///
    /// Rows the store returns that are not actually pending (blank video
    /// reference, resolved detection) are dropped.
    pub async fn scan(&self) -> Result<Vec<VideoReport>, StoreError> {
        let reports = self.store.find_pending_video_reports().await?;
        let total = reports.len();
        let pending: Vec<VideoReport> = reports.into_iter().filter(VideoReport::is_pending).collect();
        if pending.len() < total {
            tracing::debug!(
                skipped = total - pending.len(),
                "Dropped reports that are not pending"
            );
        }
        Ok(pending)
    }
}

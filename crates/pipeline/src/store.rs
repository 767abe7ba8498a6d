//! Report store seam and its PostgreSQL adapter.

use async_trait::async_trait;
use crackx_core::detection::Detection;
use crackx_core::report::VideoReport;
use crackx_core::types::DbId;
use crackx_db::repositories::ReportRepo;
use crackx_db::DbPool;

use crate::error::StoreError;

/// Persistent storage of reports.
#[async_trait]
pub trait ReportStore: Send + Sync {
    /// Reports with a video and no resolved detection, oldest first.
    async fn find_pending_video_reports(&self) -> Result<Vec<VideoReport>, StoreError>;

    /// Replace a report's detection. Idempotent for identical input.
    async fn update_detection(&self, id: DbId, detection: &Detection) -> Result<(), StoreError>;
}

/// [`ReportStore`] backed by the `reports` table.
#[derive(Clone)]
pub struct PgReportStore {
    pool: DbPool,
}

impl PgReportStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ReportStore for PgReportStore {
    async fn find_pending_video_reports(&self) -> Result<Vec<VideoReport>, StoreError> {
        let rows = ReportRepo::find_pending_video(&self.pool)
            .await
            .map_err(store_error)?;
        Ok(rows.into_iter().map(VideoReport::from).collect())
    }

    async fn update_detection(&self, id: DbId, detection: &Detection) -> Result<(), StoreError> {
        let updated = ReportRepo::update_detection(&self.pool, id, detection)
            .await
            .map_err(store_error)?;
        if updated {
            Ok(())
        } else {
            Err(StoreError::NotFound(id))
        }
    }
}

/// Connection-level failures mean the store is unreachable; everything
/// else is reported as a database error.
fn store_error(e: sqlx::Error) -> StoreError {
    match e {
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
            StoreError::Unavailable(e.to_string())
        }
        other => StoreError::Database(other),
    }
}

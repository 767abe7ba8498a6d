//! Repository for the `reports` table.

use crackx_core::detection::Detection;
use crackx_core::types::DbId;
use sqlx::types::Json;
use sqlx::PgPool;

use crate::models::report::{CreateReport, Report};

const COLUMNS: &str = "id, video_uri, photo_uri, ai_detection, created_at, updated_at";

/// A report is unresolved while its detection is missing, not an object,
/// or carries a zero (or missing) confidence.
const UNRESOLVED_DETECTION: &str = "(ai_detection IS NULL
        OR jsonb_typeof(ai_detection) <> 'object'
        OR (CASE WHEN jsonb_typeof(ai_detection -> 'confidence') = 'number'
                 THEN (ai_detection ->> 'confidence')::double precision
                 ELSE 0 END) = 0)";

pub struct ReportRepo;

impl ReportRepo {
    /// Insert a report.
    pub async fn create(pool: &PgPool, input: &CreateReport) -> Result<Report, sqlx::Error> {
        let query = format!(
            "INSERT INTO reports (video_uri, photo_uri, ai_detection)
             VALUES ($1, $2, $3)
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Report>(&query)
            .bind(&input.video_uri)
            .bind(&input.photo_uri)
            .bind(input.ai_detection.clone().map(Json))
            .fetch_one(pool)
            .await
    }

    /// Find a report by id.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Report>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM reports WHERE id = $1");
        sqlx::query_as::<_, Report>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Reports with a non-blank video reference and no resolved detection,
    /// oldest first.
    pub async fn find_pending_video(pool: &PgPool) -> Result<Vec<Report>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM reports
             WHERE video_uri IS NOT NULL
               AND btrim(video_uri) <> ''
               AND {UNRESOLVED_DETECTION}
             ORDER BY created_at ASC, id ASC"
        );
        sqlx::query_as::<_, Report>(&query).fetch_all(pool).await
    }

    /// Replace the report's detection in a single statement.
    ///
    /// Returns `false` if no row has the given id.
    pub async fn update_detection(
        pool: &PgPool,
        id: DbId,
        detection: &Detection,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE reports SET ai_detection = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(Json(detection))
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}

//! Report entity model and DTOs.

use crackx_core::detection::Detection;
use crackx_core::report::VideoReport;
use crackx_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;

/// A row from the `reports` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Report {
    pub id: DbId,
    pub video_uri: Option<String>,
    pub photo_uri: Option<String>,
    pub ai_detection: Option<Json<serde_json::Value>>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Report {
    /// Parse the stored detection. Malformed JSON reads as absent.
    pub fn detection(&self) -> Option<Detection> {
        let value = self.ai_detection.as_ref()?;
        match serde_json::from_value::<Detection>(value.0.clone()) {
            Ok(detection) => Some(detection),
            Err(e) => {
                tracing::debug!(report_id = self.id, error = %e, "Unparsable ai_detection, treating as absent");
                None
            }
        }
    }
}

impl From<Report> for VideoReport {
    fn from(row: Report) -> Self {
        let detection = row.detection();
        Self {
            id: row.id,
            video_uri: row.video_uri,
            detection,
        }
    }
}

/// DTO for inserting a report.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateReport {
    pub video_uri: Option<String>,
    pub photo_uri: Option<String>,
    pub ai_detection: Option<serde_json::Value>,
}

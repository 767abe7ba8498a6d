//! Video reports and the frames sampled from them.

use serde::{Deserialize, Serialize};

use crate::detection::Detection;
use crate::types::DbId;

/// A citizen-submitted report as seen by the assessment pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoReport {
    pub id: DbId,
    pub video_uri: Option<String>,
    pub detection: Option<Detection>,
}

impl VideoReport {
    /// The video reference, if present and non-blank.
    pub fn video_uri(&self) -> Option<&str> {
        self.video_uri
            .as_deref()
            .map(str::trim)
            .filter(|uri| !uri.is_empty())
    }

    /// Eligible for processing: has a video and no resolved detection.
    pub fn is_pending(&self) -> bool {
        self.video_uri().is_some()
            && self
                .detection
                .as_ref()
                .map_or(true, Detection::is_unresolved)
    }
}

/// One sampled frame, JPEG-encoded for the detection model.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Position within the sampled sequence (0-based).
    pub index: usize,
    /// Ordinal of the frame in the decoded video (0-based).
    pub source_frame: u64,
    /// Encoded image bytes.
    pub data: Vec<u8>,
}

//! Error taxonomy for the pipeline stages.
//!
//! Each stage has its own error type; [`ProcessError`] wraps them for the
//! per-report pipeline and names the stage that failed.

use crackx_core::ffmpeg::FfmpegError;
use crackx_core::types::DbId;

// ---------------------------------------------------------------------------
// Stage errors
// ---------------------------------------------------------------------------

/// Retrieving the remote video into scratch storage failed.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("Unsupported video URI: '{0}'")]
    UnsupportedUri(String),

    #[error("Video download timed out")]
    Timeout,

    #[error("HTTP request failed: {0}")]
    Request(#[source] reqwest::Error),

    #[error("Video source returned HTTP {0}")]
    HttpStatus(u16),

    #[error("Video exceeds the {limit} byte download limit")]
    TooLarge { limit: u64 },

    #[error("Scratch write failed: {0}")]
    Io(#[from] std::io::Error),
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else {
            Self::Request(e)
        }
    }
}

/// The video could not be opened for frame sampling.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("Probe failed: {0}")]
    Probe(#[from] FfmpegError),

    #[error("No decodable video stream in {0}")]
    NoVideoStream(String),
}

/// A single frame's inference call failed.
#[derive(Debug, thiserror::Error)]
pub enum InferenceError {
    #[error("Detection request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Detection service returned HTTP {0}")]
    HttpStatus(u16),

    #[error("Malformed detection response: {0}")]
    Malformed(String),
}

/// The report store could not be read or written.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Report {0} not found")]
    NotFound(DbId),

    #[error("Report store unavailable: {0}")]
    Unavailable(String),
}

// ---------------------------------------------------------------------------
// Per-report pipeline
// ---------------------------------------------------------------------------

/// Pipeline stage, used as a structured log field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Scan,
    Fetch,
    Sample,
    Detect,
    Update,
    Cleanup,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Scan => "scan",
            Self::Fetch => "fetch",
            Self::Sample => "sample",
            Self::Detect => "detect",
            Self::Update => "update",
            Self::Cleanup => "cleanup",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why processing one report was aborted.
#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Pipeline panicked during {stage}: {message}")]
    Panicked { stage: Stage, message: String },
}

impl ProcessError {
    /// The stage that failed.
    pub fn stage(&self) -> Stage {
        match self {
            Self::Fetch(_) => Stage::Fetch,
            Self::Decode(_) => Stage::Sample,
            Self::Store(_) => Stage::Update,
            Self::Panicked { stage, .. } => *stage,
        }
    }
}

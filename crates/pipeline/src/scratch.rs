//! Scratch storage for videos under analysis.

use std::path::{Path, PathBuf};

use crackx_core::types::DbId;

/// Directory holding at most one downloaded video per report.
#[derive(Debug, Clone)]
pub struct ScratchDir {
    root: PathBuf,
}

impl ScratchDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Deterministic location of a report's video: `{root}/{id}.mp4`.
    pub fn video_path(&self, report_id: DbId) -> PathBuf {
        self.root.join(format!("{report_id}.mp4"))
    }

    /// Create the directory if it does not exist yet.
    pub async fn ensure(&self) -> std::io::Result<()> {
        tokio::fs::create_dir_all(&self.root).await
    }
}

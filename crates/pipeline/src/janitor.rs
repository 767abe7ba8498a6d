//! Removal of scratch artifacts.

use std::io::ErrorKind;

use crackx_core::types::DbId;

use crate::error::Stage;
use crate::scratch::ScratchDir;

/// Deletes downloaded videos once a report has been processed.
///
/// Cleanup failures are logged and never propagated: a leftover file is
/// overwritten by the next download for the same report.
#[derive(Debug, Clone)]
pub struct ArtifactJanitor {
    scratch: ScratchDir,
}

impl ArtifactJanitor {
    pub fn new(scratch: ScratchDir) -> Self {
        Self { scratch }
    }

    /// Remove the scratch video for `report_id`, if any.
    pub async fn release(&self, report_id: DbId) {
        let path = self.scratch.video_path(report_id);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => tracing::debug!(report_id, path = %path.display(), "Removed scratch video"),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(
                report_id,
                stage = %Stage::Cleanup,
                path = %path.display(),
                error = %e,
                "Failed to remove scratch video"
            ),
        }
    }

    /// Remove every `*.mp4` left in the scratch directory.
    ///
    /// Returns the number of files removed. A missing directory counts as
    /// empty.
    pub async fn sweep(&self) -> usize {
        let mut entries = match tokio::fs::read_dir(self.scratch.root()).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return 0,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to list scratch directory");
                return 0;
            }
        };

        let mut removed = 0;
        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to read scratch directory entry");
                    break;
                }
            };
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("mp4") {
                continue;
            }
            match tokio::fs::remove_file(&path).await {
                Ok(()) => removed += 1,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Failed to remove stale video")
                }
            }
        }

        if removed > 0 {
            tracing::info!(removed, "Swept stale scratch videos");
        }
        removed
    }
}

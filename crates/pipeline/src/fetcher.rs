//! Download of report videos into scratch storage.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use crackx_core::report::VideoReport;
use tokio::io::AsyncWriteExt;

use crate::error::FetchError;
use crate::scratch::ScratchDir;

/// Retrieves a report's video to a local file.
#[async_trait]
pub trait VideoFetcher: Send + Sync {
    /// Download the video and return the local path. On error no file is
    /// left behind.
    async fn fetch(&self, report: &VideoReport) -> Result<PathBuf, FetchError>;
}

/// [`VideoFetcher`] for `http`/`https` video references.
///
/// The body is streamed to `{scratch}/{report_id}.mp4` chunk by chunk,
/// overwriting any previous attempt.
pub struct HttpVideoFetcher {
    client: reqwest::Client,
    scratch: ScratchDir,
    max_bytes: u64,
}

impl HttpVideoFetcher {
    pub fn new(scratch: ScratchDir, timeout: Duration, max_bytes: u64) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            scratch,
            max_bytes,
        })
    }

    async fn download(&self, url: reqwest::Url, dest: &Path) -> Result<u64, FetchError> {
        let mut response = self.client.get(url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::HttpStatus(status.as_u16()));
        }
        if response.content_length().is_some_and(|len| len > self.max_bytes) {
            return Err(FetchError::TooLarge {
                limit: self.max_bytes,
            });
        }

        self.scratch.ensure().await?;
        let mut file = tokio::fs::File::create(dest).await?;
        let mut written: u64 = 0;
        while let Some(chunk) = response.chunk().await? {
            written += chunk.len() as u64;
            if written > self.max_bytes {
                return Err(FetchError::TooLarge {
                    limit: self.max_bytes,
                });
            }
            file.write_all(&chunk).await?;
        }
        file.flush().await?;
        Ok(written)
    }
}

/// Parse a video reference, accepting only `http` and `https`.
pub fn parse_video_uri(uri: &str) -> Result<reqwest::Url, FetchError> {
    let url = reqwest::Url::parse(uri.trim())
        .map_err(|_| FetchError::UnsupportedUri(uri.to_string()))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        _ => Err(FetchError::UnsupportedUri(uri.to_string())),
    }
}

#[async_trait]
impl VideoFetcher for HttpVideoFetcher {
    async fn fetch(&self, report: &VideoReport) -> Result<PathBuf, FetchError> {
        let uri = report
            .video_uri()
            .ok_or_else(|| FetchError::UnsupportedUri(String::new()))?;
        let url = parse_video_uri(uri)?;
        let dest = self.scratch.video_path(report.id);

        match self.download(url, &dest).await {
            Ok(bytes) => {
                tracing::info!(report_id = report.id, bytes, path = %dest.display(), "Video downloaded");
                Ok(dest)
            }
            Err(e) => {
                if let Err(rm) = tokio::fs::remove_file(&dest).await {
                    if rm.kind() != std::io::ErrorKind::NotFound {
                        tracing::warn!(report_id = report.id, error = %rm, "Failed to remove partial download");
                    }
                }
                Err(e)
            }
        }
    }
}

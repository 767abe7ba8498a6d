//! Uniform temporal sampling of video frames.

use std::io::ErrorKind;
use std::path::Path;

use async_trait::async_trait;
use crackx_core::ffmpeg::{self, VideoInfo};
use crackx_core::report::Frame;
use crackx_core::sampling::{frame_stride, FrameSelector};
use image::codecs::jpeg::JpegEncoder;
use image::ExtendedColorType;
use tokio::io::AsyncReadExt;

use crate::error::DecodeError;

/// Default JPEG quality for frames sent to the detection model.
pub const DEFAULT_JPEG_QUALITY: u8 = 90;

/// Produces an ordered sequence of frames from a local video.
#[async_trait]
pub trait FrameSampler: Send + Sync {
    /// Sample roughly `rate_hz` frames per second of video.
    ///
    /// Fails only when the video cannot be opened; a stream that breaks
    /// off mid-way yields the frames decoded so far.
    async fn sample(&self, video: &Path, rate_hz: f64) -> Result<Vec<Frame>, DecodeError>;
}

/// [`FrameSampler`] that decodes through an `ffmpeg` subprocess.
///
/// The first video stream is decoded to raw RGB24 on a pipe; every
/// `stride`-th frame is JPEG-encoded and kept, where `stride` is the
/// native frame rate divided by the sampling rate, rounded.
#[derive(Debug, Clone)]
pub struct FfmpegFrameSampler {
    max_frames: usize,
    jpeg_quality: u8,
}

impl FfmpegFrameSampler {
    pub fn new(max_frames: usize) -> Self {
        Self {
            max_frames,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
        }
    }
}

#[async_trait]
impl FrameSampler for FfmpegFrameSampler {
    async fn sample(&self, video: &Path, rate_hz: f64) -> Result<Vec<Frame>, DecodeError> {
        let probe = ffmpeg::probe_video(video).await?;
        let info = ffmpeg::video_info(&probe)
            .ok_or_else(|| DecodeError::NoVideoStream(video.display().to_string()))?;

        let stride = frame_stride(info.fps, rate_hz);
        tracing::debug!(
            path = %video.display(),
            width = info.width,
            height = info.height,
            fps = info.fps,
            total_frames = info.total_frames,
            stride,
            "Sampling video"
        );

        let mut child = ffmpeg::rgb24_decoder(video)
            .spawn()
            .map_err(|e| DecodeError::Probe(ffmpeg::FfmpegError::NotFound(e)))?;

        // Drain stderr so ffmpeg never blocks on a full pipe.
        let stderr_task = child.stderr.take().map(|mut stderr| {
            tokio::spawn(async move {
                let mut out = String::new();
                let _ = stderr.read_to_string(&mut out).await;
                out
            })
        });

        let mut frames = Vec::new();
        if let Some(mut stdout) = child.stdout.take() {
            let mut selector = FrameSelector::new(stride, self.max_frames);
            let mut buf = vec![0u8; info.rgb_frame_len()];
            let mut ordinal: u64 = 0;

            while !selector.is_full() {
                match stdout.read_exact(&mut buf).await {
                    Ok(_) => {}
                    Err(e) if e.kind() == ErrorKind::UnexpectedEof => break,
                    Err(e) => {
                        tracing::warn!(path = %video.display(), error = %e, "Frame read failed");
                        break;
                    }
                }

                if selector.select(ordinal) {
                    match encode_frame(buf.clone(), info, self.jpeg_quality).await {
                        Ok(data) => frames.push(Frame {
                            index: frames.len(),
                            source_frame: ordinal,
                            data,
                        }),
                        Err(e) => tracing::warn!(frame = ordinal, error = %e, "Frame encode failed"),
                    }
                }
                ordinal += 1;
            }
        }

        // Reaching the ceiling leaves ffmpeg mid-stream.
        let _ = child.start_kill();
        let status = child.wait().await;
        let stderr = match stderr_task {
            Some(task) => task.await.unwrap_or_default(),
            None => String::new(),
        };
        if let Ok(status) = status {
            if !status.success() && frames.is_empty() {
                tracing::warn!(
                    path = %video.display(),
                    exit_code = ?status.code(),
                    stderr = %stderr.trim(),
                    "ffmpeg exited without producing frames"
                );
            }
        }

        tracing::debug!(path = %video.display(), sampled = frames.len(), "Sampling finished");
        Ok(frames)
    }
}

async fn encode_frame(rgb: Vec<u8>, info: VideoInfo, quality: u8) -> Result<Vec<u8>, String> {
    tokio::task::spawn_blocking(move || encode_jpeg(&rgb, info.width, info.height, quality))
        .await
        .map_err(|e| e.to_string())?
        .map_err(|e| e.to_string())
}

/// JPEG-encode one packed RGB24 frame.
pub fn encode_jpeg(rgb: &[u8], width: u32, height: u32, quality: u8) -> image::ImageResult<Vec<u8>> {
    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, quality).encode(rgb, width, height, ExtendedColorType::Rgb8)?;
    Ok(out)
}

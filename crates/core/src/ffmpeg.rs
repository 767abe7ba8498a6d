//! FFmpeg/FFprobe command utilities.
//!
//! `ffprobe` supplies the native frame rate and resolution; `ffmpeg`
//! decodes the first video stream to packed RGB on stdout so callers can
//! read it frame by frame without touching the disk.

use std::path::Path;
use std::process::Stdio;

use serde::Deserialize;

/// Error type for FFmpeg/FFprobe operations.
#[derive(Debug, thiserror::Error)]
pub enum FfmpegError {
    #[error("ffprobe/ffmpeg binary not found: {0}")]
    NotFound(std::io::Error),

    #[error("ffprobe/ffmpeg execution failed (exit code {exit_code:?}): {stderr}")]
    ExecutionFailed {
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error("failed to parse ffprobe output: {0}")]
    ParseError(String),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("video file not found: {0}")]
    VideoNotFound(String),
}

// ---------------------------------------------------------------------------
// ffprobe JSON output structures
// ---------------------------------------------------------------------------

/// Top-level ffprobe JSON output (`-print_format json -show_format -show_streams`).
#[derive(Debug, Deserialize)]
pub struct FfprobeOutput {
    #[serde(default)]
    pub streams: Vec<FfprobeStream>,
    pub format: Option<FfprobeFormat>,
}

/// A single stream from ffprobe output.
#[derive(Debug, Default, Deserialize)]
pub struct FfprobeStream {
    pub index: i32,
    pub codec_name: Option<String>,
    pub codec_type: Option<String>,
    pub width: Option<i32>,
    pub height: Option<i32>,
    /// e.g. "30/1" or "24000/1001"
    pub r_frame_rate: Option<String>,
    pub avg_frame_rate: Option<String>,
    pub duration: Option<String>,
    pub nb_frames: Option<String>,
    #[serde(default)]
    pub tags: FfprobeTags,
    #[serde(default)]
    pub side_data_list: Vec<FfprobeSideData>,
}

/// Stream tags; older muxers store rotation here as e.g. `"90"`.
#[derive(Debug, Default, Deserialize)]
pub struct FfprobeTags {
    pub rotate: Option<String>,
}

/// Stream side data; the display matrix entry carries `rotation` in degrees.
#[derive(Debug, Default, Deserialize)]
pub struct FfprobeSideData {
    pub rotation: Option<f64>,
}

/// Format-level metadata from ffprobe.
#[derive(Debug, Default, Deserialize)]
pub struct FfprobeFormat {
    pub duration: Option<String>,
}

/// The facts the frame sampler needs about a video.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VideoInfo {
    pub width: u32,
    pub height: u32,
    /// Native frame rate; `0.0` when unknown.
    pub fps: f64,
    /// Declared or estimated frame count; `0` when unknown.
    pub total_frames: i64,
}

impl VideoInfo {
    /// Size in bytes of one packed RGB24 frame.
    pub fn rgb_frame_len(&self) -> usize {
        self.width as usize * self.height as usize * 3
    }
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Run `ffprobe` on a video file and return the parsed JSON output.
pub async fn probe_video(path: &Path) -> Result<FfprobeOutput, FfmpegError> {
    if !path.exists() {
        return Err(FfmpegError::VideoNotFound(
            path.to_string_lossy().to_string(),
        ));
    }

    let output = tokio::process::Command::new("ffprobe")
        .args([
            "-v",
            "quiet",
            "-print_format",
            "json",
            "-show_format",
            "-show_streams",
        ])
        .arg(path)
        .output()
        .await
        .map_err(FfmpegError::NotFound)?;

    if !output.status.success() {
        return Err(FfmpegError::ExecutionFailed {
            exit_code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        });
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    serde_json::from_str::<FfprobeOutput>(&stdout)
        .map_err(|e| FfmpegError::ParseError(format!("{e}: {stdout}")))
}

/// Build an `ffmpeg` command that decodes the first video stream of
/// `video_path` to packed RGB24 frames on stdout.
///
/// Frames come out rotated upright; [`video_info`] reports matching
/// dimensions.
///
/// Stdout and stderr are piped; the child is killed if dropped.
pub fn rgb24_decoder(video_path: &Path) -> tokio::process::Command {
    let mut cmd = tokio::process::Command::new("ffmpeg");
    cmd.args(["-v", "error", "-nostdin", "-i"])
        .arg(video_path)
        .args(["-map", "0:v:0", "-f", "rawvideo", "-pix_fmt", "rgb24", "-"])
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    cmd
}

// ---------------------------------------------------------------------------
// Parsing helpers
// ---------------------------------------------------------------------------

/// Find the first video stream in the ffprobe output.
fn first_video_stream(probe: &FfprobeOutput) -> Option<&FfprobeStream> {
    probe
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))
}

/// Summarize the first video stream, or `None` if there is no video stream
/// with usable dimensions.
///
/// Width and height are those of the frames `ffmpeg` emits, which it
/// rotates upright by default: a stream rotated by 90 or 270 degrees has
/// its stored dimensions swapped.
pub fn video_info(probe: &FfprobeOutput) -> Option<VideoInfo> {
    let (width, height) = parse_resolution(probe);
    if width <= 0 || height <= 0 {
        return None;
    }
    let (width, height) = match parse_rotation(probe) {
        90 | 270 => (height, width),
        _ => (width, height),
    };
    Some(VideoInfo {
        width: width as u32,
        height: height as u32,
        fps: parse_framerate(probe),
        total_frames: parse_total_frames(probe),
    })
}

/// Rotation of the first video stream in degrees, normalized to `0..360`.
///
/// The display matrix side data wins over the legacy `rotate` tag.
pub fn parse_rotation(probe: &FfprobeOutput) -> i32 {
    let Some(stream) = first_video_stream(probe) else {
        return 0;
    };
    let degrees = stream
        .side_data_list
        .iter()
        .find_map(|sd| sd.rotation)
        .or_else(|| {
            stream
                .tags
                .rotate
                .as_deref()
                .and_then(|r| r.trim().parse::<f64>().ok())
        })
        .unwrap_or(0.0);
    if !degrees.is_finite() {
        return 0;
    }
    (degrees.round() as i64).rem_euclid(360) as i32
}

/// Parse the video duration in seconds from ffprobe output.
pub fn parse_duration(probe: &FfprobeOutput) -> f64 {
    // Format-level duration first, then the first video stream's.
    probe
        .format
        .as_ref()
        .and_then(|f| f.duration.as_deref())
        .and_then(|d| d.parse::<f64>().ok())
        .or_else(|| {
            first_video_stream(probe)
                .and_then(|s| s.duration.as_deref())
                .and_then(|d| d.parse::<f64>().ok())
        })
        .unwrap_or(0.0)
}

/// Parse the video framerate from ffprobe output.
///
/// Prefers `avg_frame_rate`, falling back to `r_frame_rate`. Both are
/// fractions like `"30/1"` or `"24000/1001"`; `"0/0"` means unknown.
pub fn parse_framerate(probe: &FfprobeOutput) -> f64 {
    let Some(stream) = first_video_stream(probe) else {
        return 0.0;
    };
    [stream.avg_frame_rate.as_deref(), stream.r_frame_rate.as_deref()]
        .into_iter()
        .flatten()
        .map(parse_fraction)
        .find(|fps| *fps > 0.0)
        .unwrap_or(0.0)
}

/// Parse a fraction string like `"30/1"` into a float.
fn parse_fraction(s: &str) -> f64 {
    let parts: Vec<&str> = s.split('/').collect();
    if parts.len() == 2 {
        let num = parts[0].parse::<f64>().unwrap_or(0.0);
        let den = parts[1].parse::<f64>().unwrap_or(1.0);
        if den > 0.0 {
            return num / den;
        }
        return 0.0;
    }
    s.parse::<f64>().unwrap_or(0.0)
}

/// Count total frames from ffprobe output.
pub fn parse_total_frames(probe: &FfprobeOutput) -> i64 {
    if let Some(n) = first_video_stream(probe)
        .and_then(|s| s.nb_frames.as_deref())
        .and_then(|nb| nb.parse::<i64>().ok())
    {
        return n;
    }
    // Estimate from duration * framerate.
    let duration = parse_duration(probe);
    let fps = parse_framerate(probe);
    if duration > 0.0 && fps > 0.0 {
        return (duration * fps).round() as i64;
    }
    0
}

/// Find the first video stream's resolution.
pub fn parse_resolution(probe: &FfprobeOutput) -> (i32, i32) {
    first_video_stream(probe)
        .map(|s| (s.width.unwrap_or(0), s.height.unwrap_or(0)))
        .unwrap_or((0, 0))
}

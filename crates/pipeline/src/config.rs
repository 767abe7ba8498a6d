use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crackx_core::verdict::DEFAULT_ACCEPTANCE_THRESHOLD;

/// Error raised when an environment variable is missing or unparsable.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{var} has invalid value '{value}': {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

/// Log output format for the worker binary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl LogFormat {
    /// Read `LOG_FORMAT`; anything other than `json` means text.
    pub fn from_env() -> Self {
        match std::env::var("LOG_FORMAT").as_deref() {
            Ok("json") => Self::Json,
            _ => Self::Text,
        }
    }
}

/// Worker configuration loaded from environment variables.
///
/// All fields except the database URL have defaults suitable for local
/// development.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// PostgreSQL URL of the report store.
    pub database_url: String,
    /// Base URL of the detection model service.
    pub detector_url: String,
    /// Sleep between scan cycles.
    pub poll_interval: Duration,
    /// Sampled frames per second of video.
    pub sample_rate_hz: f64,
    /// Acceptance threshold for per-frame detections.
    pub min_confidence: f64,
    /// Where downloaded videos are kept while they are analyzed.
    pub scratch_dir: PathBuf,
    /// Whole-transfer timeout for a video download.
    pub fetch_timeout: Duration,
    /// Download size ceiling.
    pub max_video_bytes: u64,
    /// Timeout for a single inference request.
    pub detect_timeout: Duration,
    /// Ceiling on frames sampled from one video.
    pub max_sampled_frames: usize,
}

impl WorkerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                | Default                  |
    /// |------------------------|--------------------------|
    /// | `DATABASE_URL`         | (required)               |
    /// | `DETECTOR_URL`         | `http://localhost:5000`  |
    /// | `POLL_INTERVAL_SECS`   | `30`                     |
    /// | `FRAME_SAMPLE_RATE_HZ` | `1.0`                    |
    /// | `MIN_CONFIDENCE`       | `0.3`                    |
    /// | `SCRATCH_DIR`          | `./temp_videos`          |
    /// | `FETCH_TIMEOUT_SECS`   | `120`                    |
    /// | `MAX_VIDEO_BYTES`      | `536870912`              |
    /// | `DETECT_TIMEOUT_SECS`  | `30`                     |
    /// | `MAX_SAMPLED_FRAMES`   | `600`                    |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup("DATABASE_URL")
            .filter(|v| !v.trim().is_empty())
            .ok_or(ConfigError::Missing("DATABASE_URL"))?;

        let detector_url = lookup("DETECTOR_URL")
            .unwrap_or_else(|| "http://localhost:5000".into())
            .trim_end_matches('/')
            .to_string();

        let poll_interval_secs: u64 = parse_or(&lookup, "POLL_INTERVAL_SECS", 30)?;
        if poll_interval_secs == 0 {
            return Err(invalid("POLL_INTERVAL_SECS", 0, "must be at least 1"));
        }

        let sample_rate_hz: f64 = parse_or(&lookup, "FRAME_SAMPLE_RATE_HZ", 1.0)?;
        if !(sample_rate_hz.is_finite() && sample_rate_hz > 0.0) {
            return Err(invalid("FRAME_SAMPLE_RATE_HZ", sample_rate_hz, "must be > 0"));
        }

        let min_confidence: f64 =
            parse_or(&lookup, "MIN_CONFIDENCE", DEFAULT_ACCEPTANCE_THRESHOLD)?;
        if !(0.0..=1.0).contains(&min_confidence) {
            return Err(invalid("MIN_CONFIDENCE", min_confidence, "must be within [0, 1]"));
        }

        let scratch_dir = lookup("SCRATCH_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("./temp_videos"));

        let fetch_timeout_secs: u64 = parse_or(&lookup, "FETCH_TIMEOUT_SECS", 120)?;
        let max_video_bytes: u64 = parse_or(&lookup, "MAX_VIDEO_BYTES", 512 * 1024 * 1024)?;
        let detect_timeout_secs: u64 = parse_or(&lookup, "DETECT_TIMEOUT_SECS", 30)?;

        let max_sampled_frames: usize = parse_or(&lookup, "MAX_SAMPLED_FRAMES", 600)?;
        if max_sampled_frames == 0 {
            return Err(invalid("MAX_SAMPLED_FRAMES", 0, "must be at least 1"));
        }

        Ok(Self {
            database_url,
            detector_url,
            poll_interval: Duration::from_secs(poll_interval_secs),
            sample_rate_hz,
            min_confidence,
            scratch_dir,
            fetch_timeout: Duration::from_secs(fetch_timeout_secs),
            max_video_bytes,
            detect_timeout: Duration::from_secs(detect_timeout_secs),
            max_sampled_frames,
        })
    }
}

fn parse_or<F, T>(lookup: &F, var: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(var) {
        None => Ok(default),
        Some(raw) => raw.trim().parse::<T>().map_err(|e| ConfigError::Invalid {
            var,
            value: raw,
            reason: e.to_string(),
        }),
    }
}

fn invalid(var: &'static str, value: impl std::fmt::Display, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        var,
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

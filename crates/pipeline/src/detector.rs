//! Per-frame damage detection.
//!
//! [`DetectionPort`] is the seam to the detection model. [`HttpDetector`]
//! talks to the model service's `POST /api/detect` endpoint, which takes
//! a multipart `image` field and answers with
//! `{"success": bool, "detection": {...}}`.

use std::time::Duration;

use async_trait::async_trait;
use crackx_core::detection::{BoundingBox, DamageType, Detection, Severity};
use serde::Deserialize;

use crate::error::InferenceError;

/// Runs the detection model on one encoded image.
#[async_trait]
pub trait DetectionPort: Send + Sync {
    /// The strongest damage found in the image, or `None` when the model
    /// reports nothing above its own confidence floor.
    async fn detect(&self, image: &[u8]) -> Result<Option<Detection>, InferenceError>;
}

// ---------------------------------------------------------------------------
// Wire format
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct DetectResponse {
    #[serde(default)]
    success: bool,
    detection: Option<RawDetection>,
}

/// Detection as the model service reports it, before validation.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawDetection {
    pub damage_type: String,
    pub confidence: f64,
    #[serde(default)]
    pub severity: Option<String>,
    pub bounding_box: RawBoundingBox,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct RawBoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// Validate a raw model result into a [`Detection`].
///
/// Confidence outside `[0, 1]` is malformed; results below
/// `min_confidence` are treated as "no detection". The
/// bounding box is clamped to the unit square, severity is derived from
/// the damage type and box area, and a higher severity reported by the
/// model is kept.
pub fn normalize(raw: RawDetection, min_confidence: f64) -> Result<Option<Detection>, InferenceError> {
    if !(0.0..=1.0).contains(&raw.confidence) {
        return Err(InferenceError::Malformed(format!(
            "confidence must be within [0, 1], got {}",
            raw.confidence
        )));
    }
    if raw.confidence < min_confidence {
        return Ok(None);
    }

    let b = raw.bounding_box;
    let bounding_box = BoundingBox::clamped(b.x, b.y, b.width, b.height);
    let reported = raw.severity.as_deref().and_then(Severity::from_label);

    let detection = Detection::new(DamageType::from_label(&raw.damage_type), raw.confidence, bounding_box)
        .map_err(|e| InferenceError::Malformed(e.to_string()))?
        .with_reported_severity(reported);
    Ok(Some(detection))
}

// ---------------------------------------------------------------------------
// HTTP adapter
// ---------------------------------------------------------------------------

/// [`DetectionPort`] backed by the model service over HTTP.
pub struct HttpDetector {
    client: reqwest::Client,
    endpoint: String,
    min_confidence: f64,
}

impl HttpDetector {
    /// Create a detector for the service at `base_url`, e.g.
    /// `http://localhost:5000`.
    pub fn new(base_url: &str, timeout: Duration, min_confidence: f64) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: format!("{}/api/detect", base_url.trim_end_matches('/')),
            min_confidence,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl DetectionPort for HttpDetector {
    async fn detect(&self, image: &[u8]) -> Result<Option<Detection>, InferenceError> {
        let part = reqwest::multipart::Part::bytes(image.to_vec())
            .file_name("frame.jpg")
            .mime_str("image/jpeg")?;
        let form = reqwest::multipart::Form::new().part("image", part);

        let response = self.client.post(&self.endpoint).multipart(form).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(InferenceError::HttpStatus(status.as_u16()));
        }

        let body: DetectResponse = response
            .json()
            .await
            .map_err(|e| InferenceError::Malformed(e.to_string()))?;

        match body {
            DetectResponse {
                success: true,
                detection: Some(raw),
            } => normalize(raw, self.min_confidence),
            _ => Ok(None),
        }
    }
}

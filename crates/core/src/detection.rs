//! Per-frame detection model: damage categories, severity, bounding boxes.
//!
//! Raw model output is normalized here, at the boundary: damage-type labels
//! collapse into [`DamageType`], boxes are clamped into the unit square, and
//! severity is derived from the damage type and box area.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Bounding-box area (fraction of the frame) above which severity escalates.
pub const LARGE_AREA_FRACTION: f64 = 0.05;

// ---------------------------------------------------------------------------
// DamageType
// ---------------------------------------------------------------------------

/// Road-damage category reported for a single detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum DamageType {
    Crack,
    Pothole,
    AlligatorCrack,
    Other,
}

impl DamageType {
    /// Normalize a raw model label into a damage type.
    ///
    /// Accepts the plain names, the RDD class codes (`D00`, `D10`, `D20`,
    /// `D40`) and the longitudinal/transverse crack variants. Separators
    /// (`-`, `_`, space) and case are ignored. Unknown labels map to
    /// [`DamageType::Other`].
    pub fn from_label(label: &str) -> Self {
        let key: String = label
            .trim()
            .chars()
            .filter(|c| !matches!(c, '-' | '_' | ' '))
            .flat_map(char::to_lowercase)
            .collect();

        match key.as_str() {
            "crack" | "longitudinal" | "longitudinalcrack" | "transverse" | "transversecrack"
            | "d00" | "d10" => Self::Crack,
            "alligatorcrack" | "alligator" | "d20" => Self::AlligatorCrack,
            "pothole" | "d40" => Self::Pothole,
            _ => Self::Other,
        }
    }

    /// Canonical label, as stored in the report's detection field.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Crack => "crack",
            Self::Pothole => "pothole",
            Self::AlligatorCrack => "alligator-crack",
            Self::Other => "other",
        }
    }

    /// Severity assigned before any area escalation.
    pub fn base_severity(self) -> Severity {
        match self {
            Self::Crack | Self::Other => Severity::Low,
            Self::AlligatorCrack => Severity::Medium,
            Self::Pothole => Severity::High,
        }
    }
}

impl From<String> for DamageType {
    fn from(value: String) -> Self {
        Self::from_label(&value)
    }
}

impl From<DamageType> for String {
    fn from(value: DamageType) -> Self {
        value.as_str().to_string()
    }
}

impl std::fmt::Display for DamageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Severity
// ---------------------------------------------------------------------------

/// Repair urgency. Ordered `Low < Medium < High`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    /// One level up, saturating at [`Severity::High`].
    pub fn escalate(self) -> Self {
        match self {
            Self::Low => Self::Medium,
            Self::Medium | Self::High => Self::High,
        }
    }

    /// Derive severity from the damage type and the box area fraction.
    ///
    /// Starts at the type's base severity and escalates one level when the
    /// area exceeds [`LARGE_AREA_FRACTION`]. Never demotes.
    pub fn derive(damage_type: DamageType, box_area: f64) -> Self {
        let base = damage_type.base_severity();
        if box_area > LARGE_AREA_FRACTION {
            base.escalate()
        } else {
            base
        }
    }

    /// Parse a lowercase severity label (`low`, `medium`, `high`).
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// BoundingBox
// ---------------------------------------------------------------------------

/// Normalized box: every coordinate in `[0, 1]`, with `x + width <= 1` and
/// `y + height <= 1`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl BoundingBox {
    /// Build a box, clamping each coordinate into the unit square.
    ///
    /// NaN coordinates become `0.0`. Width and height are clipped so the
    /// box never extends past the frame edge.
    pub fn clamped(x: f64, y: f64, width: f64, height: f64) -> Self {
        let x = unit(x);
        let y = unit(y);
        Self {
            x,
            y,
            width: unit(width).min(1.0 - x),
            height: unit(height).min(1.0 - y),
        }
    }

    /// Area as a fraction of the frame.
    pub fn area(&self) -> f64 {
        self.width * self.height
    }
}

fn unit(v: f64) -> f64 {
    if v.is_nan() {
        0.0
    } else {
        v.clamp(0.0, 1.0)
    }
}

// ---------------------------------------------------------------------------
// Detection
// ---------------------------------------------------------------------------

/// One model inference result for a single frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Detection {
    pub damage_type: DamageType,
    pub confidence: f64,
    pub severity: Severity,
    pub bounding_box: BoundingBox,
}

impl Detection {
    /// Build a detection, deriving its severity from type and box area.
    ///
    /// Fails if `confidence` is NaN or outside `[0, 1]`.
    pub fn new(
        damage_type: DamageType,
        confidence: f64,
        bounding_box: BoundingBox,
    ) -> Result<Self, CoreError> {
        if !(0.0..=1.0).contains(&confidence) {
            return Err(CoreError::Validation(format!(
                "Detection confidence must be within [0, 1], got {confidence}"
            )));
        }

        Ok(Self {
            damage_type,
            confidence,
            severity: Severity::derive(damage_type, bounding_box.area()),
            bounding_box,
        })
    }

    /// Raise severity to `reported` if the model claimed a higher level.
    pub fn with_reported_severity(mut self, reported: Option<Severity>) -> Self {
        if let Some(reported) = reported {
            self.severity = self.severity.max(reported);
        }
        self
    }

    /// Zero confidence is the sentinel for "not yet analyzed".
    pub fn is_unresolved(&self) -> bool {
        self.confidence <= 0.0
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

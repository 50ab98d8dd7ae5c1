//! Resolution-adaptive severity buckets.
//!
//! Severity is read from the box's share of the frame, with two corrections:
//! thresholds loosen on low-resolution frames so a fixed pixel count still
//! reads as small, and boxes under `MIN_SIGNIFICANT_AREA_PX` are always low so
//! tight close-ups of tiny damage never read high.

use serde::{Deserialize, Serialize};

/// Boxes smaller than this (px²) are always `Low`.
pub const MIN_SIGNIFICANT_AREA_PX: f64 = 1500.0;

const LOW_RATIO_FLOOR: f64 = 0.04;
const MEDIUM_RATIO_FLOOR: f64 = 0.12;
const LOW_AREA_PX: f64 = 2500.0;
const MEDIUM_AREA_PX: f64 = 8000.0;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Only reachable through cost-estimator input; the classifier never emits it.
    #[default]
    Unknown,
    Low,
    Medium,
    High,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Unknown => "unknown",
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
        }
    }

    /// Parse a label. Anything unrecognised reads as `Unknown`.
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "low" => Severity::Low,
            "medium" => Severity::Medium,
            "high" => Severity::High,
            _ => Severity::Unknown,
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classify a pixel-space box against its image.
///
/// Returns the severity together with the raw (unrounded) area ratio.
/// Negative box sides count as zero; the image area is floored at 1 px².
pub fn classify_severity(
    width: f64,
    height: f64,
    image_width: f64,
    image_height: f64,
) -> (Severity, f64) {
    let damage_area = width.max(0.0) * height.max(0.0);
    let image_area = (image_width * image_height).max(1.0);
    let ratio = damage_area / image_area;

    let low_threshold = LOW_RATIO_FLOOR.max(LOW_AREA_PX / image_area);
    let medium_threshold = MEDIUM_RATIO_FLOOR.max(MEDIUM_AREA_PX / image_area);

    let severity = if damage_area < MIN_SIGNIFICANT_AREA_PX || ratio < low_threshold {
        Severity::Low
    } else if ratio < medium_threshold {
        Severity::Medium
    } else {
        Severity::High
    };

    (severity, ratio)
}

//! Normalized detection records and their wire payload.

use serde::{Deserialize, Serialize};

use crate::cost::RepairEstimate;
use crate::severity::Severity;

/// Axis-aligned box relative to image size, top-left origin.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct NormalizedBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl NormalizedBox {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Corner form `(x1, y1, x2, y2)`.
    pub fn corners(&self) -> Corners {
        Corners {
            x1: self.x,
            y1: self.y,
            x2: self.x + self.width,
            y2: self.y + self.height,
        }
    }
}

/// Box in corner form. Used for overlap computations.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Corners {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
}

impl Corners {
    pub fn area(&self) -> f64 {
        (self.x2 - self.x1).max(0.0) * (self.y2 - self.y1).max(0.0)
    }

    pub fn intersection_area(&self, other: &Corners) -> f64 {
        let w = (self.x2.min(other.x2) - self.x1.max(other.x1)).max(0.0);
        let h = (self.y2.min(other.y2) - self.y1.max(other.y1)).max(0.0);
        w * h
    }

    /// Intersection over union. Degenerate pairs (union ≤ 0) score 0.
    pub fn iou(&self, other: &Corners) -> f64 {
        let intersection = self.intersection_area(other);
        let union = self.area() + other.area() - intersection;

        if union > 0.0 {
            intersection / union
        } else {
            0.0
        }
    }
}

/// One detected damage instance, normalized and costed.
///
/// Built once by the normalizer; carries no reference to the source image
/// or the detector that produced it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(into = "DetectionPayload", from = "DetectionPayload")]
pub struct DetectionRecord {
    pub class_name: String,
    /// 0..1, four decimals.
    pub confidence: f64,
    /// 0..100, two decimals.
    pub confidence_pct: f64,
    pub bbox: NormalizedBox,
    pub area_ratio: f64,
    pub severity: Severity,
    pub repair_estimate: RepairEstimate,
}

impl DetectionRecord {
    pub fn repair_cost(&self) -> u64 {
        self.repair_estimate.total_cost
    }
}

/// Flat per-detection object handed to callers.
///
/// `type` duplicates `class` for consumers that key on either name.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DetectionPayload {
    pub class: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub conf: f64,
    pub confidence: f64,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub area_ratio: f64,
    pub severity: Severity,
    pub repair_cost: u64,
    pub repair_details: RepairEstimate,
}

impl From<DetectionRecord> for DetectionPayload {
    fn from(record: DetectionRecord) -> Self {
        Self {
            kind: record.class_name.clone(),
            class: record.class_name,
            conf: record.confidence,
            confidence: record.confidence_pct,
            x: record.bbox.x,
            y: record.bbox.y,
            width: record.bbox.width,
            height: record.bbox.height,
            area_ratio: record.area_ratio,
            severity: record.severity,
            repair_cost: record.repair_estimate.total_cost,
            repair_details: record.repair_estimate,
        }
    }
}

impl From<DetectionPayload> for DetectionRecord {
    fn from(payload: DetectionPayload) -> Self {
        // `repair_cost` is a mirror of the embedded total; the details win.
        Self {
            class_name: payload.class,
            confidence: payload.conf,
            confidence_pct: payload.confidence,
            bbox: NormalizedBox::new(payload.x, payload.y, payload.width, payload.height),
            area_ratio: payload.area_ratio,
            severity: payload.severity,
            repair_estimate: payload.repair_details,
        }
    }
}

/// Round half away from zero to `decimals` places.
pub(crate) fn round_dp(value: f64, decimals: i32) -> f64 {
    let scale = 10f64.powi(decimals);
    (value * scale).round() / scale
}

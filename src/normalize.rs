//! Raw detector output to detection records.

use crate::cost::RepairEstimator;
use crate::detect::{RawDetection, RawDetections};
use crate::error::InspectError;
use crate::frame::ImageSize;
use crate::record::{round_dp, DetectionRecord, NormalizedBox};
use crate::severity::classify_severity;

/// Turn one image's raw detections into costed records.
///
/// Output has the same length and order as `raw.detections`; nothing is
/// dropped or merged here. Only a zero image dimension is rejected.
pub fn normalize_detections(
    raw: &RawDetections,
    size: ImageSize,
    estimator: &RepairEstimator,
) -> Result<Vec<DetectionRecord>, InspectError> {
    size.ensure_non_empty()?;

    Ok(raw
        .detections
        .iter()
        .map(|det| normalize_one(det, raw.class_name(det.class_id), size, estimator))
        .collect())
}

fn normalize_one(
    det: &RawDetection,
    class_name: String,
    size: ImageSize,
    estimator: &RepairEstimator,
) -> DetectionRecord {
    let image_width = size.width as f64;
    let image_height = size.height as f64;
    let (width, height) = (det.width(), det.height());

    let (severity, area_ratio) = classify_severity(width, height, image_width, image_height);
    let repair_estimate = estimator.estimate(&class_name, severity, area_ratio, det.confidence);

    let bbox = NormalizedBox::new(
        round_dp(det.x_min / image_width, 4),
        round_dp(det.y_min / image_height, 4),
        round_dp(width / image_width, 4),
        round_dp(height / image_height, 4),
    );

    DetectionRecord {
        class_name,
        confidence: round_dp(det.confidence, 4),
        confidence_pct: round_dp(det.confidence * 100.0, 2),
        bbox,
        area_ratio: round_dp(area_ratio, 4),
        severity,
        repair_estimate,
    }
}

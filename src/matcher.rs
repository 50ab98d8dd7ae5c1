//! Pickup/return damage diff.
//!
//! A return-side detection is pre-existing when any pickup detection of the
//! same class overlaps it with IoU at or above the threshold. Matching is
//! existence-based: pickup boxes are never consumed, so one pre-existing
//! damage can absorb several slightly different re-detections.

use std::collections::HashMap;

use crate::error::InspectError;
use crate::record::{Corners, DetectionRecord};

pub const DEFAULT_IOU_THRESHOLD: f64 = 0.3;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DamageMatcher {
    iou_threshold: f64,
}

impl Default for DamageMatcher {
    fn default() -> Self {
        Self {
            iou_threshold: DEFAULT_IOU_THRESHOLD,
        }
    }
}

impl DamageMatcher {
    /// Threshold must lie in `(0, 1]`.
    pub fn new(iou_threshold: f64) -> Result<Self, InspectError> {
        validate_iou_threshold(iou_threshold).map_err(InspectError::InvalidThreshold)?;
        Ok(Self { iou_threshold })
    }

    pub fn iou_threshold(&self) -> f64 {
        self.iou_threshold
    }

    /// Return-side records with no sufficiently overlapping same-class
    /// pickup record, in their original order.
    pub fn new_damages<'a>(
        &self,
        pickup: &[DetectionRecord],
        returned: &'a [DetectionRecord],
    ) -> Vec<&'a DetectionRecord> {
        let mut pickup_by_class: HashMap<&str, Vec<Corners>> = HashMap::new();
        for record in pickup {
            pickup_by_class
                .entry(record.class_name.as_str())
                .or_default()
                .push(record.bbox.corners());
        }

        returned
            .iter()
            .filter(|record| {
                let candidate = record.bbox.corners();
                let matched = pickup_by_class
                    .get(record.class_name.as_str())
                    .is_some_and(|boxes| {
                        boxes
                            .iter()
                            .any(|existing| candidate.iou(existing) >= self.iou_threshold)
                    });
                !matched
            })
            .collect()
    }
}

pub(crate) fn validate_iou_threshold(value: f64) -> Result<(), String> {
    if value > 0.0 && value <= 1.0 {
        Ok(())
    } else {
        Err(format!("must be in (0, 1], got {}", value))
    }
}

/// Convenience wrapper returning owned records.
pub fn find_new_damages(
    pickup: &[DetectionRecord],
    returned: &[DetectionRecord],
    iou_threshold: f64,
) -> Result<Vec<DetectionRecord>, InspectError> {
    let matcher = DamageMatcher::new(iou_threshold)?;
    Ok(matcher
        .new_damages(pickup, returned)
        .into_iter()
        .cloned()
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cost::RepairEstimator;
    use crate::record::NormalizedBox;
    use crate::severity::Severity;

    fn record(class_name: &str, x: f64, y: f64, w: f64, h: f64) -> DetectionRecord {
        DetectionRecord {
            class_name: class_name.to_string(),
            confidence: 0.8,
            confidence_pct: 80.0,
            bbox: NormalizedBox::new(x, y, w, h),
            area_ratio: w * h,
            severity: Severity::Low,
            repair_estimate: RepairEstimator::default().estimate(
                class_name,
                Severity::Low,
                w * h,
                0.8,
            ),
        }
    }

    #[test]
    fn same_class_overlap_is_preexisting() {
        let pickup = vec![record("scratch", 0.1, 0.1, 0.1, 0.1)];
        let returned = vec![
            record("scratch", 0.1, 0.1, 0.1, 0.1),
            record("dent", 0.1, 0.1, 0.1, 0.1),
        ];

        let new = DamageMatcher::default().new_damages(&pickup, &returned);
        assert_eq!(new.len(), 1);
        assert_eq!(new[0].class_name, "dent");
    }

    #[test]
    fn empty_pickup_reports_every_return_record() {
        let returned = vec![
            record("dent", 0.5, 0.5, 0.1, 0.1),
            record("scratch", 0.1, 0.1, 0.2, 0.1),
            record("dent", 0.7, 0.2, 0.1, 0.1),
        ];
        let new = find_new_damages(&[], &returned, 0.3).unwrap();
        assert_eq!(new, returned);
    }

    #[test]
    fn empty_return_gives_empty_result() {
        let pickup = vec![record("dent", 0.5, 0.5, 0.1, 0.1)];
        assert!(DamageMatcher::default().new_damages(&pickup, &[]).is_empty());
    }

    #[test]
    fn one_pickup_box_absorbs_several_redetections() {
        let pickup = vec![record("dent", 0.40, 0.40, 0.20, 0.20)];
        let returned = vec![
            record("dent", 0.41, 0.40, 0.20, 0.20),
            record("dent", 0.39, 0.42, 0.20, 0.19),
        ];
        assert!(DamageMatcher::default()
            .new_damages(&pickup, &returned)
            .is_empty());
    }

    #[test]
    fn class_names_match_exactly() {
        let pickup = vec![record("Scratch", 0.1, 0.1, 0.1, 0.1)];
        let returned = vec![record("scratch", 0.1, 0.1, 0.1, 0.1)];
        assert_eq!(DamageMatcher::default().new_damages(&pickup, &returned).len(), 1);
    }

    #[test]
    fn overlap_exactly_at_threshold_matches() {
        // Half-shifted box: overlap 0.005, union 0.015, IoU 1/3.
        let pickup = vec![record("dent", 0.0, 0.0, 0.1, 0.1)];
        let returned = vec![record("dent", 0.05, 0.0, 0.1, 0.1)];
        let iou = pickup[0].bbox.corners().iou(&returned[0].bbox.corners());

        let at = DamageMatcher::new(iou).unwrap();
        assert!(at.new_damages(&pickup, &returned).is_empty());

        let above = DamageMatcher::new(0.34).unwrap();
        assert_eq!(above.new_damages(&pickup, &returned).len(), 1);
    }

    #[test]
    fn raising_threshold_never_shrinks_result() {
        let pickup = vec![
            record("dent", 0.10, 0.10, 0.20, 0.20),
            record("scratch", 0.50, 0.50, 0.10, 0.30),
        ];
        let returned = vec![
            record("dent", 0.12, 0.10, 0.20, 0.20),
            record("dent", 0.20, 0.20, 0.20, 0.20),
            record("scratch", 0.52, 0.55, 0.10, 0.30),
            record("scratch", 0.58, 0.70, 0.10, 0.30),
            record("crack", 0.10, 0.10, 0.20, 0.20),
        ];

        let mut previous = 0;
        for step in 1..=10 {
            let matcher = DamageMatcher::new(step as f64 / 10.0).unwrap();
            let first = matcher.new_damages(&pickup, &returned);
            let second = matcher.new_damages(&pickup, &returned);
            assert_eq!(first, second);
            assert!(first.len() >= previous);
            previous = first.len();
        }
        assert_eq!(previous, returned.len());
    }

    #[test]
    fn thresholds_outside_unit_interval_are_rejected() {
        for bad in [0.0, -0.1, 1.01, f64::NAN] {
            assert!(matches!(
                DamageMatcher::new(bad),
                Err(InspectError::InvalidThreshold(_))
            ));
        }
        assert!(DamageMatcher::new(1.0).is_ok());
    }
}

//! Detector, estimator, matcher and scorer wired into one pipeline.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::InspectConfig;
use crate::cost::RepairEstimator;
use crate::detect::DetectorHandle;
use crate::error::InspectError;
use crate::frame::DecodedImage;
use crate::matcher::DamageMatcher;
use crate::normalize::normalize_detections;
use crate::record::DetectionRecord;
use crate::similarity::SimilarityScorer;

/// Result of diffing a pickup photo against a return photo.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ComparisonReport {
    /// `None` when scoring was skipped or no scorer is attached.
    pub similarity: Option<f64>,
    pub pickup_detections: Vec<DetectionRecord>,
    pub return_detections: Vec<DetectionRecord>,
    pub new_damages: Vec<DetectionRecord>,
}

impl ComparisonReport {
    /// Estimated repair cost of damage that appeared since pickup.
    pub fn new_damage_cost(&self) -> u64 {
        self.new_damages.iter().map(|d| d.repair_cost()).sum()
    }
}

#[derive(Clone, Copy, Debug)]
pub struct CompareOptions {
    pub compute_similarity: bool,
}

impl Default for CompareOptions {
    fn default() -> Self {
        Self {
            compute_similarity: true,
        }
    }
}

/// Per-request inspection entry point.
///
/// Holds only shared, already-initialized dependencies; every call is
/// independent and safe to run concurrently.
#[derive(Clone)]
pub struct DamageInspector {
    detector: DetectorHandle,
    estimator: RepairEstimator,
    matcher: DamageMatcher,
    scorer: Option<Arc<dyn SimilarityScorer>>,
}

impl DamageInspector {
    pub fn new(
        detector: DetectorHandle,
        estimator: RepairEstimator,
        matcher: DamageMatcher,
    ) -> Self {
        Self {
            detector,
            estimator,
            matcher,
            scorer: None,
        }
    }

    /// Build from loaded configuration; a bad IoU threshold is rejected.
    pub fn from_config(
        detector: DetectorHandle,
        config: &InspectConfig,
    ) -> Result<Self, InspectError> {
        Ok(Self::new(detector, config.estimator(), config.matcher()?))
    }

    pub fn with_scorer(mut self, scorer: Arc<dyn SimilarityScorer>) -> Self {
        self.scorer = Some(scorer);
        self
    }

    pub fn matcher(&self) -> &DamageMatcher {
        &self.matcher
    }

    /// Detect and normalize damage on one decoded image.
    pub fn analyze_image(
        &self,
        image: &DecodedImage,
    ) -> Result<Vec<DetectionRecord>, InspectError> {
        let raw = self.detector.detect(image)?;
        let records = normalize_detections(&raw, image.size(), &self.estimator)?;
        log::debug!(
            "{} detector found {} damage(s) on {}x{} image",
            self.detector.name(),
            records.len(),
            image.width(),
            image.height()
        );
        Ok(records)
    }

    /// Decode `bytes` and run `analyze_image`.
    pub fn analyze_image_bytes(&self, bytes: &[u8]) -> Result<Vec<DetectionRecord>, InspectError> {
        let image = DecodedImage::from_bytes(bytes)?;
        self.analyze_image(&image)
    }

    /// Detect on both photos, optionally score their similarity, and report
    /// damage present on return but not on pickup.
    pub fn compare(
        &self,
        pickup: &DecodedImage,
        returned: &DecodedImage,
        options: CompareOptions,
    ) -> Result<ComparisonReport, InspectError> {
        let pickup_detections = self.analyze_image(pickup)?;
        let return_detections = self.analyze_image(returned)?;

        let similarity = match (&self.scorer, options.compute_similarity) {
            (Some(scorer), true) => Some(
                scorer
                    .score(pickup, returned)
                    .map_err(|e| InspectError::inference(format!("similarity scorer: {:#}", e)))?,
            ),
            _ => None,
        };

        let new_damages: Vec<DetectionRecord> = self
            .matcher
            .new_damages(&pickup_detections, &return_detections)
            .into_iter()
            .cloned()
            .collect();

        log::info!(
            "compared pickup ({} damages) with return ({} damages): {} new",
            pickup_detections.len(),
            return_detections.len(),
            new_damages.len()
        );

        Ok(ComparisonReport {
            similarity,
            pickup_detections,
            return_detections,
            new_damages,
        })
    }

    /// Decode both payloads and run `compare`. Both must decode before any
    /// detection work starts.
    pub fn compare_bytes(
        &self,
        pickup: &[u8],
        returned: &[u8],
        options: CompareOptions,
    ) -> Result<ComparisonReport, InspectError> {
        let pickup = DecodedImage::from_bytes(pickup)?;
        let returned = DecodedImage::from_bytes(returned)?;
        self.compare(&pickup, &returned, options)
    }
}

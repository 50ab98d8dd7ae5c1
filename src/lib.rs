//! Vehicle damage inspection
//!
//! Detects body damage on vehicle photos, grades each finding, attaches a
//! repair cost estimate, and diffs pickup photos against return photos so
//! only damage that appeared in between is reported.
//!
//! # Pipeline
//!
//! 1. **Detect**: a `DetectorBackend` returns pixel-space boxes with class ids.
//! 2. **Normalize**: boxes become image-relative records with a severity grade
//!    and a `RepairEstimate` (`normalize`, `severity`, `cost`).
//! 3. **Compare**: return-side records with no same-class pickup record at or
//!    above the IoU threshold are new damage (`matcher`).
//!
//! # Module Structure
//!
//! - `frame`: decoded image input
//! - `detect`: backend trait, stub and ONNX backends, load chain with fallback
//! - `inspect`: synchronous pipeline entry point
//! - `dispatch`: async wrapper with per-request timeout
//! - `similarity`: whole-image similarity scoring and scorer cache
//! - `config`: file and environment configuration

pub mod config;
pub mod cost;
pub mod detect;
pub mod dispatch;
pub mod error;
pub mod frame;
pub mod inspect;
pub mod matcher;
pub mod normalize;
pub mod record;
pub mod severity;
pub mod similarity;

pub use config::{DetectorSettings, InspectConfig, CARDD_CLASSES};
pub use cost::{CostRates, RepairEstimate, RepairEstimator};
pub use detect::{
    DetectorBackend, DetectorHandle, DetectorLoader, LoadReport, LoadedDetector, RawDetection,
    RawDetections, StubBackend,
};
#[cfg(feature = "backend-tract")]
pub use detect::TractBackend;
pub use dispatch::InferenceDispatcher;
pub use error::InspectError;
pub use frame::{DecodedImage, ImageSize};
pub use inspect::{CompareOptions, ComparisonReport, DamageInspector};
pub use matcher::{find_new_damages, DamageMatcher, DEFAULT_IOU_THRESHOLD};
pub use normalize::normalize_detections;
pub use record::{DetectionRecord, NormalizedBox};
pub use severity::{classify_severity, Severity};
pub use similarity::{
    cosine_similarity, EmbeddingScorer, ImageEmbedder, ScorerCache, ScorerKey, SimilarityScorer,
};

/// Install the process-wide logger, filtered by `RUST_LOG` (default `info`).
///
/// Safe to call more than once; later calls are ignored.
pub fn init_logging() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .try_init();
}

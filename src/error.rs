use thiserror::Error;

/// Failures surfaced by the inspection pipeline.
///
/// Business-level oddities (unknown damage type, unknown severity label,
/// out-of-range confidence) never produce an error; they degrade to default
/// profiles or clamped values instead.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum InspectError {
    #[error("invalid image: {0}")]
    InvalidImage(String),
    #[error("invalid iou threshold: {0}")]
    InvalidThreshold(String),
    #[error("inference failed: {0}")]
    InferenceFailure(String),
    #[error("no detector could be loaded ({})", .attempts.join("; "))]
    DetectorUnavailable { attempts: Vec<String> },
}

impl InspectError {
    pub(crate) fn inference(err: impl std::fmt::Display) -> Self {
        InspectError::InferenceFailure(err.to_string())
    }
}

impl From<InspectError> for String {
    #[inline(always)]
    fn from(value: InspectError) -> Self {
        value.to_string()
    }
}

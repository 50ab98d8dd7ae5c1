use std::collections::VecDeque;

use anyhow::{anyhow, Result};

use crate::detect::backend::DetectorBackend;
use crate::detect::result::RawDetections;
use crate::frame::DecodedImage;

/// Scripted backend for tests and dry runs.
///
/// Queued responses are returned one per call, in order; once the queue is
/// drained every call returns the standing response.
#[derive(Clone, Debug, Default)]
pub struct StubBackend {
    queued: VecDeque<RawDetections>,
    standing: RawDetections,
    failure: Option<String>,
}

impl StubBackend {
    /// Backend that never detects anything.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Backend that returns `detections` for every image.
    pub fn with_detections(detections: RawDetections) -> Self {
        Self {
            standing: detections,
            ..Self::default()
        }
    }

    /// Backend whose every call fails with `message`.
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            failure: Some(message.into()),
            ..Self::default()
        }
    }

    /// Queue a one-shot response ahead of the standing one.
    pub fn then(mut self, detections: RawDetections) -> Self {
        self.queued.push_back(detections);
        self
    }
}

impl DetectorBackend for StubBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn detect(&mut self, _image: &DecodedImage) -> Result<RawDetections> {
        if let Some(message) = &self.failure {
            return Err(anyhow!("{}", message));
        }
        Ok(self
            .queued
            .pop_front()
            .unwrap_or_else(|| self.standing.clone()))
    }
}

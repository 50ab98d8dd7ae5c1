use std::sync::{Arc, Mutex};

use anyhow::Result;

use crate::detect::backend::DetectorBackend;
use crate::detect::result::RawDetections;
use crate::error::InspectError;
use crate::frame::DecodedImage;

/// Shared, already-initialized detector.
///
/// The backend is wrapped in `Mutex` because `DetectorBackend::detect` takes
/// `&mut self`. Cloning the handle shares the same backend.
#[derive(Clone)]
pub struct DetectorHandle {
    name: &'static str,
    backend: Arc<Mutex<Box<dyn DetectorBackend>>>,
}

impl DetectorHandle {
    pub fn new<B: DetectorBackend + 'static>(backend: B) -> Self {
        Self::from_boxed(Box::new(backend))
    }

    fn from_boxed(backend: Box<dyn DetectorBackend>) -> Self {
        Self {
            name: backend.name(),
            backend: Arc::new(Mutex::new(backend)),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Run the detector. Any backend error becomes `InferenceFailure`.
    pub fn detect(&self, image: &DecodedImage) -> Result<RawDetections, InspectError> {
        let mut guard = self
            .backend
            .lock()
            .map_err(|_| InspectError::inference(format!("{} backend lock poisoned", self.name)))?;
        guard
            .detect(image)
            .map_err(|e| InspectError::inference(format!("{} backend: {:#}", self.name, e)))
    }
}

impl std::fmt::Debug for DetectorHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DetectorHandle")
            .field("name", &self.name)
            .finish()
    }
}

/// Outcome of one load attempt.
#[derive(Clone, Debug, PartialEq)]
pub struct LoadAttempt {
    pub label: String,
    /// `None` when this attempt produced the detector.
    pub error: Option<String>,
}

/// Every attempt made while loading, in order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LoadReport {
    pub attempts: Vec<LoadAttempt>,
}

impl LoadReport {
    /// Label of the candidate that loaded, if any.
    pub fn selected(&self) -> Option<&str> {
        self.attempts
            .iter()
            .find(|attempt| attempt.error.is_none())
            .map(|attempt| attempt.label.as_str())
    }

    /// True when the first candidate failed and a later one was used.
    pub fn used_fallback(&self) -> bool {
        self.attempts.len() > 1 && self.selected().is_some()
    }

    fn failures(&self) -> Vec<String> {
        self.attempts
            .iter()
            .filter_map(|attempt| {
                attempt
                    .error
                    .as_ref()
                    .map(|err| format!("{}: {}", attempt.label, err))
            })
            .collect()
    }
}

pub struct LoadedDetector {
    pub handle: DetectorHandle,
    pub report: LoadReport,
}

type LoadFn = Box<dyn FnOnce() -> Result<Box<dyn DetectorBackend>> + Send>;

/// Ordered fallback chain of detector candidates.
///
/// Candidates are tried in registration order; the first one that loads and
/// warms up is kept. Failures are recorded in the `LoadReport`, never dropped.
#[derive(Default)]
pub struct DetectorLoader {
    candidates: Vec<(String, LoadFn)>,
}

impl DetectorLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a candidate to the chain.
    pub fn candidate<B, F>(mut self, label: impl Into<String>, load: F) -> Self
    where
        B: DetectorBackend + 'static,
        F: FnOnce() -> Result<B> + Send + 'static,
    {
        let load: LoadFn =
            Box::new(move || load().map(|backend| Box::new(backend) as Box<dyn DetectorBackend>));
        self.candidates.push((label.into(), load));
        self
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn load(self) -> Result<LoadedDetector, InspectError> {
        let mut report = LoadReport::default();

        for (label, load) in self.candidates {
            log::info!("loading detector candidate '{}'", label);
            let loaded = load().and_then(|mut backend| {
                backend.warm_up()?;
                Ok(backend)
            });
            match loaded {
                Ok(backend) => {
                    if !report.attempts.is_empty() {
                        log::warn!(
                            "detector fell back to '{}' after {} failed attempt(s)",
                            label,
                            report.attempts.len()
                        );
                    }
                    log::info!("detector '{}' ready ({})", label, backend.name());
                    report.attempts.push(LoadAttempt { label, error: None });
                    return Ok(LoadedDetector {
                        handle: DetectorHandle::from_boxed(backend),
                        report,
                    });
                }
                Err(err) => {
                    log::warn!("detector candidate '{}' failed: {:#}", label, err);
                    report.attempts.push(LoadAttempt {
                        label,
                        error: Some(format!("{:#}", err)),
                    });
                }
            }
        }

        let mut attempts = report.failures();
        if attempts.is_empty() {
            attempts.push("no detector candidates configured".to_string());
        }
        Err(InspectError::DetectorUnavailable { attempts })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::backends::StubBackend;
    use anyhow::anyhow;

    struct ColdBackend;

    impl DetectorBackend for ColdBackend {
        fn name(&self) -> &'static str {
            "cold"
        }

        fn detect(&mut self, _image: &DecodedImage) -> Result<RawDetections> {
            Ok(RawDetections::default())
        }

        fn warm_up(&mut self) -> Result<()> {
            Err(anyhow!("warm-up inference crashed"))
        }
    }

    #[test]
    fn first_successful_candidate_wins() {
        let loaded = DetectorLoader::new()
            .candidate("primary", || Ok(StubBackend::empty()))
            .candidate("fallback", || -> Result<StubBackend> {
                panic!("fallback must not be loaded")
            })
            .load()
            .unwrap();

        assert_eq!(loaded.handle.name(), "stub");
        assert_eq!(loaded.report.selected(), Some("primary"));
        assert!(!loaded.report.used_fallback());
    }

    #[test]
    fn failures_are_recorded_before_fallback() {
        let loaded = DetectorLoader::new()
            .candidate("runs/best.onnx", || -> Result<StubBackend> {
                Err(anyhow!("weights not found"))
            })
            .candidate("cold", || Ok(ColdBackend))
            .candidate("yolov8n.onnx", || Ok(StubBackend::empty()))
            .load()
            .unwrap();

        assert!(loaded.report.used_fallback());
        assert_eq!(loaded.report.selected(), Some("yolov8n.onnx"));
        assert_eq!(loaded.report.attempts.len(), 3);
        assert_eq!(
            loaded.report.attempts[0].error.as_deref(),
            Some("weights not found")
        );
        assert_eq!(
            loaded.report.attempts[1].error.as_deref(),
            Some("warm-up inference crashed")
        );
    }

    #[test]
    fn exhausted_chain_reports_every_attempt() {
        let err = DetectorLoader::new()
            .candidate("a", || -> Result<StubBackend> { Err(anyhow!("missing")) })
            .candidate("b", || -> Result<StubBackend> { Err(anyhow!("corrupt")) })
            .load()
            .err()
            .unwrap();

        assert_eq!(
            err,
            InspectError::DetectorUnavailable {
                attempts: vec!["a: missing".to_string(), "b: corrupt".to_string()],
            }
        );
    }

    #[test]
    fn empty_chain_is_unavailable() {
        let err = DetectorLoader::new().load().err().unwrap();
        assert!(matches!(err, InspectError::DetectorUnavailable { .. }));
    }
}

//! Async front for the blocking inspection pipeline.
//!
//! Detection and scoring are CPU-bound, so each request runs on tokio's
//! blocking pool under a deadline. The inspector is shared read-only across
//! requests.

use std::sync::Arc;
use std::time::Duration;

use tokio::task;
use tokio::time;

use crate::error::InspectError;
use crate::inspect::{CompareOptions, ComparisonReport, DamageInspector};
use crate::record::DetectionRecord;

#[derive(Clone)]
pub struct InferenceDispatcher {
    inspector: Arc<DamageInspector>,
    timeout: Duration,
}

impl InferenceDispatcher {
    pub fn new(inspector: DamageInspector, timeout: Duration) -> Self {
        Self {
            inspector: Arc::new(inspector),
            timeout,
        }
    }

    pub fn inspector(&self) -> &DamageInspector {
        &self.inspector
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Analyze one encoded image.
    pub async fn analyze(&self, bytes: Vec<u8>) -> Result<Vec<DetectionRecord>, InspectError> {
        let inspector = Arc::clone(&self.inspector);
        self.run("analyze", self.timeout, move || {
            inspector.analyze_image_bytes(&bytes)
        })
        .await
    }

    /// Analyze several images; results keep input order.
    ///
    /// An empty upload yields an empty detection list in its slot. Any other
    /// undecodable image fails the batch. The deadline is the per-image
    /// timeout times the number of non-empty uploads.
    pub async fn analyze_batch(
        &self,
        images: Vec<Vec<u8>>,
    ) -> Result<Vec<Vec<DetectionRecord>>, InspectError> {
        let pending = images.iter().filter(|bytes| !bytes.is_empty()).count();
        if pending == 0 {
            return Ok(vec![Vec::new(); images.len()]);
        }
        let deadline = self
            .timeout
            .saturating_mul(u32::try_from(pending).unwrap_or(u32::MAX));
        let inspector = Arc::clone(&self.inspector);
        self.run("analyze_batch", deadline, move || {
            images
                .iter()
                .map(|bytes| {
                    if bytes.is_empty() {
                        Ok(Vec::new())
                    } else {
                        inspector.analyze_image_bytes(bytes)
                    }
                })
                .collect()
        })
        .await
    }

    /// Diff a pickup photo against a return photo.
    pub async fn compare(
        &self,
        pickup: Vec<u8>,
        returned: Vec<u8>,
        options: CompareOptions,
    ) -> Result<ComparisonReport, InspectError> {
        let inspector = Arc::clone(&self.inspector);
        self.run("compare", self.timeout, move || {
            inspector.compare_bytes(&pickup, &returned, options)
        })
        .await
    }

    async fn run<T, F>(
        &self,
        op: &'static str,
        deadline: Duration,
        work: F,
    ) -> Result<T, InspectError>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T, InspectError> + Send + 'static,
    {
        let handle = task::spawn_blocking(work);
        match time::timeout(deadline, handle).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_err)) => {
                log::error!("{} task aborted: {}", op, join_err);
                Err(InspectError::inference(format!("{} task aborted: {}", op, join_err)))
            }
            Err(_) => {
                // The blocking task keeps running; its result is dropped.
                log::warn!("{} timed out after {:?}", op, deadline);
                Err(InspectError::inference(format!(
                    "{} timed out after {:?}",
                    op, deadline
                )))
            }
        }
    }
}

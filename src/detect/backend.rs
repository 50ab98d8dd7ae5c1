use anyhow::Result;

use crate::detect::result::RawDetections;
use crate::frame::DecodedImage;

/// Object detector producing raw damage boxes.
///
/// Implementations own their model state. They may be slow and must be
/// treated as blocking; async callers go through `InferenceDispatcher`.
/// Boxes are expected in pixel space within `[0, W] x [0, H]`.
pub trait DetectorBackend: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Run detection on one decoded image.
    fn detect(&mut self, image: &DecodedImage) -> Result<RawDetections>;

    /// Optional warm-up hook, run once after loading.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}

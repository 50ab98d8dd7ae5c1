//! Decoded image boundary.
//!
//! Every pipeline entry point goes through `DecodedImage`, so an undecodable
//! payload or an empty raster is rejected before any detector work starts.

use image::RgbImage;

use crate::error::InspectError;

/// An RGB raster with non-zero dimensions.
pub struct DecodedImage {
    pixels: RgbImage,
}

impl DecodedImage {
    /// Decode an encoded image (JPEG, PNG) and convert it to 8-bit RGB.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, InspectError> {
        if bytes.is_empty() {
            return Err(InspectError::InvalidImage("empty image payload".to_string()));
        }
        let decoded = image::load_from_memory(bytes)
            .map_err(|e| InspectError::InvalidImage(format!("unable to decode image bytes: {e}")))?;
        Self::from_rgb(decoded.to_rgb8())
    }

    /// Wrap an already-decoded raster.
    pub fn from_rgb(pixels: RgbImage) -> Result<Self, InspectError> {
        if pixels.width() == 0 || pixels.height() == 0 {
            return Err(InspectError::InvalidImage(format!(
                "image has zero dimension ({}x{})",
                pixels.width(),
                pixels.height()
            )));
        }
        Ok(Self { pixels })
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn size(&self) -> ImageSize {
        ImageSize {
            width: self.width(),
            height: self.height(),
        }
    }

    /// Read-only access for detector and embedding backends.
    pub fn pixels(&self) -> &RgbImage {
        &self.pixels
    }
}

impl std::fmt::Debug for DecodedImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecodedImage")
            .field("width", &self.width())
            .field("height", &self.height())
            .finish()
    }
}

/// Pixel dimensions of the image a detection set was produced from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ImageSize {
    pub width: u32,
    pub height: u32,
}

impl ImageSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub(crate) fn ensure_non_empty(&self) -> Result<(), InspectError> {
        if self.width == 0 || self.height == 0 {
            return Err(InspectError::InvalidImage(format!(
                "image dimensions must be positive, got {}x{}",
                self.width, self.height
            )));
        }
        Ok(())
    }
}

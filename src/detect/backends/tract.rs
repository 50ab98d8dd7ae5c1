#![cfg(feature = "backend-tract")]

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use image::imageops::FilterType;
use tract_onnx::prelude::*;

use crate::config::DetectorSettings;
use crate::detect::backend::DetectorBackend;
use crate::detect::result::{class_table, RawDetection, RawDetections};
use crate::frame::DecodedImage;
use crate::record::Corners;

/// Tract-based backend for YOLOv8-style ONNX exports.
///
/// Expects a single `[1, 3, H, W]` f32 input and a `[1, 4 + classes, anchors]`
/// output whose first four rows are centre-x, centre-y, width and height in
/// model-input pixels. Boxes are rescaled to the source image and clipped to it.
pub struct TractBackend {
    model: TypedRunnableModel<TypedModel>,
    input_width: u32,
    input_height: u32,
    class_names: BTreeMap<u32, String>,
    confidence_threshold: f32,
    nms_iou: f64,
    max_detections: usize,
}

impl TractBackend {
    /// Load an ONNX model from disk and prepare it for inference.
    pub fn load<P: AsRef<Path>>(model_path: P, settings: &DetectorSettings) -> Result<Self> {
        let model_path = model_path.as_ref();
        if !model_path.is_file() {
            return Err(anyhow!("weights file {} not found", model_path.display()));
        }
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(
                    f32::datum_type(),
                    tvec!(
                        1,
                        3,
                        settings.input_height as usize,
                        settings.input_width as usize
                    ),
                ),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        Ok(Self {
            model,
            input_width: settings.input_width,
            input_height: settings.input_height,
            class_names: class_table(&settings.class_names),
            confidence_threshold: settings.confidence_threshold as f32,
            nms_iou: settings.nms_iou,
            max_detections: settings.max_detections,
        })
    }

    fn build_input(&self, image: &DecodedImage) -> Tensor {
        let resized = image::imageops::resize(
            image.pixels(),
            self.input_width,
            self.input_height,
            FilterType::Triangle,
        );
        let input = tract_ndarray::Array4::from_shape_fn(
            (1, 3, self.input_height as usize, self.input_width as usize),
            |(_, channel, y, x)| resized.get_pixel(x as u32, y as u32)[channel] as f32 / 255.0,
        );
        input.into_tensor()
    }

    fn decode(&self, outputs: TVec<TValue>, image: &DecodedImage) -> Result<Vec<RawDetection>> {
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        let view = output
            .to_array_view::<f32>()
            .context("model output tensor was not f32")?
            .into_dimensionality::<tract_ndarray::Ix3>()
            .context("model output is not [1, 4 + classes, anchors]")?;

        let (rows, anchors) = (view.shape()[1], view.shape()[2]);
        if rows < 5 {
            return Err(anyhow!("model output has {} rows, expected at least 5", rows));
        }

        let scale_x = image.width() as f64 / self.input_width as f64;
        let scale_y = image.height() as f64 / self.input_height as f64;
        let max_x = image.width() as f64;
        let max_y = image.height() as f64;

        let mut candidates = Vec::new();
        for anchor in 0..anchors {
            let (class_id, score) = (4..rows)
                .map(|row| (row - 4, view[[0, row, anchor]]))
                .fold((0, f32::NEG_INFINITY), |best, cur| {
                    if cur.1 > best.1 {
                        cur
                    } else {
                        best
                    }
                });
            if !score.is_finite() || score < self.confidence_threshold {
                continue;
            }

            let cx = view[[0, 0, anchor]] as f64 * scale_x;
            let cy = view[[0, 1, anchor]] as f64 * scale_y;
            let w = view[[0, 2, anchor]] as f64 * scale_x;
            let h = view[[0, 3, anchor]] as f64 * scale_y;

            candidates.push(RawDetection::new(
                [
                    (cx - w / 2.0).clamp(0.0, max_x),
                    (cy - h / 2.0).clamp(0.0, max_y),
                    (cx + w / 2.0).clamp(0.0, max_x),
                    (cy + h / 2.0).clamp(0.0, max_y),
                ],
                score as f64,
                class_id as u32,
            ));
        }

        Ok(non_max_suppression(
            candidates,
            self.nms_iou,
            self.max_detections,
        ))
    }
}

impl DetectorBackend for TractBackend {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn detect(&mut self, image: &DecodedImage) -> Result<RawDetections> {
        let input = self.build_input(image);
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;

        let mut raw = RawDetections::new(self.class_names.clone());
        for detection in self.decode(outputs, image)? {
            raw.push(detection);
        }
        log::debug!("tract backend produced {} boxes", raw.len());
        Ok(raw)
    }

    fn warm_up(&mut self) -> Result<()> {
        let blank = image::RgbImage::new(self.input_width, self.input_height);
        let image = DecodedImage::from_rgb(blank).map_err(|e| anyhow!("{}", e))?;
        self.detect(&image).map(|_| ())
    }
}

fn corners(det: &RawDetection) -> Corners {
    Corners {
        x1: det.x_min,
        y1: det.y_min,
        x2: det.x_max,
        y2: det.y_max,
    }
}

/// Per-class greedy suppression, highest confidence first.
///
/// A box is dropped when it overlaps an already-kept box of the same class by
/// more than `iou_threshold`. The survivors are returned by descending
/// confidence, capped at `max_detections`.
pub(crate) fn non_max_suppression(
    mut candidates: Vec<RawDetection>,
    iou_threshold: f64,
    max_detections: usize,
) -> Vec<RawDetection> {
    candidates.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut kept: Vec<RawDetection> = Vec::new();
    for candidate in candidates {
        if kept.len() >= max_detections {
            break;
        }
        let suppressed = kept.iter().any(|k| {
            k.class_id == candidate.class_id
                && corners(k).iou(&corners(&candidate)) > iou_threshold
        });
        if !suppressed {
            kept.push(candidate);
        }
    }
    kept
}

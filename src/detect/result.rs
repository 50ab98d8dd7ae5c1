use std::collections::BTreeMap;

/// One raw box as emitted by a detector, in absolute pixel coordinates.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RawDetection {
    pub x_min: f64,
    pub y_min: f64,
    pub x_max: f64,
    pub y_max: f64,
    pub confidence: f64,
    pub class_id: u32,
}

impl RawDetection {
    pub fn new(xyxy: [f64; 4], confidence: f64, class_id: u32) -> Self {
        Self {
            x_min: xyxy[0],
            y_min: xyxy[1],
            x_max: xyxy[2],
            y_max: xyxy[3],
            confidence,
            class_id,
        }
    }

    pub fn width(&self) -> f64 {
        self.x_max - self.x_min
    }

    pub fn height(&self) -> f64 {
        self.y_max - self.y_min
    }
}

/// Detector output for a single image.
///
/// Order is whatever the detector produced and is preserved downstream.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RawDetections {
    pub detections: Vec<RawDetection>,
    /// Class id to label mapping supplied by the model.
    pub class_names: BTreeMap<u32, String>,
}

impl RawDetections {
    pub fn new(class_names: BTreeMap<u32, String>) -> Self {
        Self {
            detections: Vec::new(),
            class_names,
        }
    }

    pub fn push(&mut self, detection: RawDetection) {
        self.detections.push(detection);
    }

    pub fn len(&self) -> usize {
        self.detections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.detections.is_empty()
    }

    /// Label for a class id; unmapped ids read as `class_<id>`.
    pub fn class_name(&self, class_id: u32) -> String {
        self.class_names
            .get(&class_id)
            .cloned()
            .unwrap_or_else(|| format!("class_{}", class_id))
    }
}

/// Build an id-to-name table from an ordered label list.
pub fn class_table<S: AsRef<str>>(labels: &[S]) -> BTreeMap<u32, String> {
    labels
        .iter()
        .enumerate()
        .map(|(id, label)| (id as u32, label.as_ref().to_string()))
        .collect()
}

use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::cost::{CostRates, RepairEstimator, DEFAULT_LABOR_RATE, DEFAULT_MATERIAL_RATE};
use crate::detect::DetectorLoader;
use crate::error::InspectError;
use crate::matcher::{validate_iou_threshold, DamageMatcher, DEFAULT_IOU_THRESHOLD};
use crate::similarity::ScorerKey;

const DEFAULT_WEIGHTS_PATH: &str = "runs/detect/cardd2/weights/best.onnx";
const DEFAULT_FALLBACK_WEIGHTS_PATH: &str = "yolov8n.onnx";
const DEFAULT_INPUT_SIZE: u32 = 640;
const DEFAULT_CONFIDENCE_THRESHOLD: f64 = 0.5;
const DEFAULT_NMS_IOU: f64 = 0.5;
const DEFAULT_MAX_DETECTIONS: usize = 40;
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Label order of the CarDD damage dataset the default weights are trained on.
pub const CARDD_CLASSES: [&str; 6] = [
    "dent",
    "scratch",
    "crack",
    "glass shatter",
    "lamp broken",
    "tire flat",
];

#[derive(Debug, Deserialize, Default)]
struct InspectConfigFile {
    rates: Option<RatesConfigFile>,
    matcher: Option<MatcherConfigFile>,
    detector: Option<DetectorConfigFile>,
    similarity: Option<SimilarityConfigFile>,
    inference_timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct RatesConfigFile {
    labor: Option<f64>,
    material: Option<f64>,
}

#[derive(Debug, Deserialize, Default)]
struct MatcherConfigFile {
    iou_threshold: Option<f64>,
}

#[derive(Debug, Deserialize, Default)]
struct DetectorConfigFile {
    weights_path: Option<PathBuf>,
    fallback_weights_path: Option<PathBuf>,
    input_width: Option<u32>,
    input_height: Option<u32>,
    class_names: Option<Vec<String>>,
    confidence_threshold: Option<f64>,
    nms_iou: Option<f64>,
    max_detections: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
struct SimilarityConfigFile {
    model_name: Option<String>,
    checkpoint: Option<String>,
    device: Option<String>,
}

#[derive(Debug, Clone)]
pub struct InspectConfig {
    pub rates: CostRates,
    pub iou_threshold: f64,
    pub detector: DetectorSettings,
    pub similarity: ScorerKey,
    pub inference_timeout: Duration,
}

/// Settings consumed by detector loaders and backends.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectorSettings {
    pub weights_path: PathBuf,
    /// Known-good generic checkpoint tried when `weights_path` fails.
    pub fallback_weights_path: Option<PathBuf>,
    pub input_width: u32,
    pub input_height: u32,
    pub class_names: Vec<String>,
    pub confidence_threshold: f64,
    pub nms_iou: f64,
    pub max_detections: usize,
}

impl Default for DetectorSettings {
    fn default() -> Self {
        Self {
            weights_path: PathBuf::from(DEFAULT_WEIGHTS_PATH),
            fallback_weights_path: Some(PathBuf::from(DEFAULT_FALLBACK_WEIGHTS_PATH)),
            input_width: DEFAULT_INPUT_SIZE,
            input_height: DEFAULT_INPUT_SIZE,
            class_names: CARDD_CLASSES.iter().map(|c| c.to_string()).collect(),
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            nms_iou: DEFAULT_NMS_IOU,
            max_detections: DEFAULT_MAX_DETECTIONS,
        }
    }
}

impl DetectorSettings {
    /// Weights to try, in order. A fallback equal to the primary is skipped.
    pub fn weight_chain(&self) -> Vec<PathBuf> {
        let mut chain = vec![self.weights_path.clone()];
        if let Some(fallback) = &self.fallback_weights_path {
            if fallback != &self.weights_path {
                chain.push(fallback.clone());
            }
        }
        chain
    }
}

impl Default for InspectConfig {
    fn default() -> Self {
        Self::from_file(InspectConfigFile::default())
    }
}

impl InspectConfig {
    /// Load from the optional `DAMAGE_CONFIG` file, then apply environment
    /// overrides, then validate.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("DAMAGE_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) if !path.trim().is_empty() => Some(read_config_file(Path::new(path))?),
            _ => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: InspectConfigFile) -> Self {
        let rates = CostRates {
            labor_rate: file
                .rates
                .as_ref()
                .and_then(|rates| rates.labor)
                .unwrap_or(DEFAULT_LABOR_RATE),
            material_rate: file
                .rates
                .as_ref()
                .and_then(|rates| rates.material)
                .unwrap_or(DEFAULT_MATERIAL_RATE),
        };
        let iou_threshold = file
            .matcher
            .and_then(|matcher| matcher.iou_threshold)
            .unwrap_or(DEFAULT_IOU_THRESHOLD);

        let defaults = DetectorSettings::default();
        let detector = match file.detector {
            Some(det) => DetectorSettings {
                weights_path: det.weights_path.unwrap_or(defaults.weights_path),
                fallback_weights_path: det
                    .fallback_weights_path
                    .or(defaults.fallback_weights_path),
                input_width: det.input_width.unwrap_or(defaults.input_width),
                input_height: det.input_height.unwrap_or(defaults.input_height),
                class_names: det.class_names.unwrap_or(defaults.class_names),
                confidence_threshold: det
                    .confidence_threshold
                    .unwrap_or(defaults.confidence_threshold),
                nms_iou: det.nms_iou.unwrap_or(defaults.nms_iou),
                max_detections: det.max_detections.unwrap_or(defaults.max_detections),
            },
            None => defaults,
        };

        let default_key = ScorerKey::default();
        let similarity = match file.similarity {
            Some(sim) => ScorerKey {
                model_name: sim.model_name.unwrap_or(default_key.model_name),
                checkpoint: sim.checkpoint.unwrap_or(default_key.checkpoint),
                device: sim.device.unwrap_or(default_key.device),
            },
            None => default_key,
        };

        let inference_timeout =
            Duration::from_secs(file.inference_timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS));

        Self {
            rates,
            iou_threshold,
            detector,
            similarity,
            inference_timeout,
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(rate) = env_f64("LABOR_RATE_USD")? {
            self.rates.labor_rate = rate;
        }
        if let Some(rate) = env_f64("MATERIAL_RATE_USD")? {
            self.rates.material_rate = rate;
        }
        if let Some(threshold) = env_f64("DAMAGE_IOU_THRESHOLD")? {
            self.iou_threshold = threshold;
        }
        if let Ok(path) = std::env::var("YOLO_MODEL_PATH") {
            if !path.trim().is_empty() {
                self.detector.weights_path = PathBuf::from(path);
            }
        }
        if let Ok(path) = std::env::var("YOLO_FALLBACK_MODEL_PATH") {
            if !path.trim().is_empty() {
                self.detector.fallback_weights_path = Some(PathBuf::from(path));
            }
        }
        if let Ok(classes) = std::env::var("DAMAGE_CLASS_NAMES") {
            let parsed = split_csv(&classes);
            if !parsed.is_empty() {
                self.detector.class_names = parsed;
            }
        }
        if let Ok(device) = std::env::var("DAMAGE_SIMILARITY_DEVICE") {
            if !device.trim().is_empty() {
                self.similarity.device = device.trim().to_string();
            }
        }
        if let Ok(timeout) = std::env::var("DAMAGE_INFERENCE_TIMEOUT_SECS") {
            let seconds: u64 = timeout.trim().parse().map_err(|_| {
                anyhow!("DAMAGE_INFERENCE_TIMEOUT_SECS must be an integer number of seconds")
            })?;
            self.inference_timeout = Duration::from_secs(seconds);
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        for (name, rate) in [
            ("labor rate", self.rates.labor_rate),
            ("material rate", self.rates.material_rate),
        ] {
            if !rate.is_finite() || rate <= 0.0 {
                return Err(anyhow!("{} must be a positive number, got {}", name, rate));
            }
        }
        validate_iou_threshold(self.iou_threshold)
            .map_err(|e| anyhow!("iou threshold {}", e))?;

        if self.inference_timeout.is_zero() {
            return Err(anyhow!("inference timeout must be greater than zero"));
        }

        let det = &self.detector;
        if det.input_width == 0 || det.input_height == 0 {
            return Err(anyhow!("detector input size must be non-zero"));
        }
        if det.class_names.is_empty() {
            return Err(anyhow!("detector class list must not be empty"));
        }
        for (name, value) in [
            ("confidence threshold", det.confidence_threshold),
            ("nms iou", det.nms_iou),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(anyhow!("detector {} must be in [0, 1], got {}", name, value));
            }
        }
        if det.max_detections == 0 {
            return Err(anyhow!("detector max detections must be at least 1"));
        }
        Ok(())
    }

    pub fn estimator(&self) -> RepairEstimator {
        RepairEstimator::new(self.rates)
    }

    pub fn matcher(&self) -> Result<DamageMatcher, InspectError> {
        DamageMatcher::new(self.iou_threshold)
    }

    /// Primary weights, then the generic fallback checkpoint.
    #[cfg(feature = "backend-tract")]
    pub fn detector_loader(&self) -> DetectorLoader {
        use crate::detect::TractBackend;

        self.detector
            .weight_chain()
            .into_iter()
            .fold(DetectorLoader::new(), |loader, path| {
                let settings = self.detector.clone();
                loader.candidate(path.display().to_string(), move || {
                    TractBackend::load(&path, &settings)
                })
            })
    }

    /// Without an inference backend compiled in there is nothing to load.
    #[cfg(not(feature = "backend-tract"))]
    pub fn detector_loader(&self) -> DetectorLoader {
        log::warn!("built without an inference backend; detector chain is empty");
        DetectorLoader::new()
    }
}

fn read_config_file(path: &Path) -> Result<InspectConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    let cfg = if is_toml {
        toml::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}

fn env_f64(name: &str) -> Result<Option<f64>> {
    match std::env::var(name) {
        Ok(value) if !value.trim().is_empty() => value
            .trim()
            .parse::<f64>()
            .map(Some)
            .map_err(|_| anyhow!("{} must be a number, got '{}'", name, value)),
        _ => Ok(None),
    }
}

fn split_csv(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|entry| entry.trim())
        .filter(|entry| !entry.is_empty())
        .map(|entry| entry.to_string())
        .collect()
}

use std::io::Cursor;

use anyhow::anyhow;
use image::{ImageFormat, RgbImage};

use damage_inspect::detect::{class_table, RawDetection, RawDetections, StubBackend};
use damage_inspect::{
    CompareOptions, DamageInspector, DamageMatcher, DetectorLoader, InspectConfig, InspectError,
    RepairEstimator, Severity, CARDD_CLASSES,
};

fn png(width: u32, height: u32) -> Vec<u8> {
    let mut bytes = Vec::new();
    RgbImage::from_pixel(width, height, image::Rgb([120, 120, 130]))
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .expect("encode png");
    bytes
}

fn raw(dets: &[([f64; 4], f64, &str)]) -> RawDetections {
    let table = class_table(&CARDD_CLASSES);
    let mut raw = RawDetections::new(table);
    for (xyxy, conf, class) in dets {
        let id = CARDD_CLASSES
            .iter()
            .position(|c| c == class)
            .expect("known class") as u32;
        raw.push(RawDetection::new(*xyxy, *conf, id));
    }
    raw
}

fn inspector(backend: StubBackend) -> DamageInspector {
    let loaded = DetectorLoader::new()
        .candidate("scripted", move || Ok(backend))
        .load()
        .expect("stub loads");
    DamageInspector::from_config(loaded.handle, &InspectConfig::default()).expect("inspector")
}

#[test]
fn analyze_grades_and_prices_each_detection() {
    let backend = StubBackend::with_detections(raw(&[
        ([400.0, 400.0, 600.0, 600.0], 0.87, "dent"),
        ([10.0, 10.0, 30.0, 30.0], 0.62, "scratch"),
    ]));
    let records = inspector(backend).analyze_image_bytes(&png(1000, 1000)).unwrap();

    assert_eq!(records.len(), 2);

    let dent = &records[0];
    assert_eq!(dent.class_name, "dent");
    assert_eq!(dent.area_ratio, 0.04);
    assert_eq!(dent.severity, Severity::Medium);
    assert_eq!(dent.repair_estimate.severity, Severity::Medium);
    assert_eq!(dent.repair_estimate.total_cost % 10, 0);
    assert!(dent.repair_cost() > 0);

    let scratch = &records[1];
    assert_eq!(scratch.severity, Severity::Low);
    assert!(scratch.repair_cost() < dent.repair_cost());
}

#[test]
fn payload_json_has_flat_shape() {
    let backend =
        StubBackend::with_detections(raw(&[([100.0, 100.0, 300.0, 200.0], 0.9, "crack")]));
    let records = inspector(backend).analyze_image_bytes(&png(1000, 1000)).unwrap();

    let json = serde_json::to_value(&records).unwrap();
    let first = &json[0];
    assert_eq!(first["class"], "crack");
    assert_eq!(first["type"], "crack");
    assert_eq!(first["conf"], 0.9);
    assert_eq!(first["confidence"], 90.0);
    assert_eq!(first["x"], 0.1);
    assert_eq!(first["y"], 0.1);
    assert_eq!(first["width"], 0.2);
    assert_eq!(first["height"], 0.1);
    assert_eq!(first["severity"], "low");
    assert_eq!(first["repair_cost"], first["repair_details"]["total_cost"]);
    assert_eq!(first["repair_details"]["damage_type"], "crack");
}

#[test]
fn compare_flags_only_new_same_location_damage() {
    let backend = StubBackend::empty()
        .then(raw(&[([100.0, 100.0, 200.0, 200.0], 0.8, "scratch")]))
        .then(raw(&[
            ([100.0, 100.0, 200.0, 200.0], 0.8, "scratch"),
            ([100.0, 100.0, 200.0, 200.0], 0.7, "dent"),
        ]));

    let report = inspector(backend)
        .compare_bytes(&png(1000, 1000), &png(1000, 1000), CompareOptions::default())
        .unwrap();

    assert_eq!(report.similarity, None);
    assert_eq!(report.pickup_detections.len(), 1);
    assert_eq!(report.return_detections.len(), 2);
    assert_eq!(report.new_damages.len(), 1);
    assert_eq!(report.new_damages[0].class_name, "dent");
    assert_eq!(report.new_damage_cost(), report.new_damages[0].repair_cost());
}

#[test]
fn clean_pickup_reports_every_return_damage_in_order() {
    let backend = StubBackend::empty().then(RawDetections::default()).then(raw(&[
        ([50.0, 50.0, 150.0, 150.0], 0.9, "dent"),
        ([700.0, 100.0, 900.0, 160.0], 0.6, "scratch"),
        ([300.0, 800.0, 420.0, 950.0], 0.75, "lamp broken"),
    ]));

    let report = inspector(backend)
        .compare_bytes(&png(1000, 1000), &png(1000, 1000), CompareOptions::default())
        .unwrap();

    assert!(report.pickup_detections.is_empty());
    assert_eq!(report.new_damages, report.return_detections);
    let classes: Vec<&str> = report
        .new_damages
        .iter()
        .map(|d| d.class_name.as_str())
        .collect();
    assert_eq!(classes, vec!["dent", "scratch", "lamp broken"]);
}

#[test]
fn bad_uploads_are_invalid_image() {
    let inspector = inspector(StubBackend::empty());

    assert!(matches!(
        inspector.analyze_image_bytes(&[]),
        Err(InspectError::InvalidImage(_))
    ));
    assert!(matches!(
        inspector.analyze_image_bytes(b"not an image"),
        Err(InspectError::InvalidImage(_))
    ));
    assert!(matches!(
        inspector.compare_bytes(&png(10, 10), b"garbage", CompareOptions::default()),
        Err(InspectError::InvalidImage(_))
    ));
}

#[test]
fn backend_error_surfaces_as_inference_failure() {
    let inspector = inspector(StubBackend::failing("tensor shape mismatch"));
    match inspector.analyze_image_bytes(&png(32, 32)) {
        Err(InspectError::InferenceFailure(msg)) => assert!(msg.contains("tensor shape mismatch")),
        other => panic!("expected inference failure, got {:?}", other),
    }
}

#[test]
fn loader_falls_back_and_records_failure() {
    let loaded = DetectorLoader::new()
        .candidate("runs/detect/cardd2/weights/best.onnx", || -> anyhow::Result<StubBackend> {
            Err(anyhow!("weights not found"))
        })
        .candidate("yolov8n.onnx", || Ok(StubBackend::empty()))
        .load()
        .expect("fallback loads");

    assert!(loaded.report.used_fallback());
    assert_eq!(loaded.report.selected(), Some("yolov8n.onnx"));
    assert_eq!(
        loaded.report.attempts[0].error.as_deref(),
        Some("weights not found")
    );

    let inspector = DamageInspector::new(
        loaded.handle,
        RepairEstimator::default(),
        DamageMatcher::default(),
    );
    assert!(inspector.analyze_image_bytes(&png(16, 16)).unwrap().is_empty());
}

#[test]
fn exhausted_chain_is_detector_unavailable() {
    let err = DetectorLoader::new()
        .candidate("primary", || -> anyhow::Result<StubBackend> { Err(anyhow!("corrupt")) })
        .candidate("fallback", || -> anyhow::Result<StubBackend> { Err(anyhow!("missing")) })
        .load()
        .err()
        .unwrap();

    assert_eq!(
        err,
        InspectError::DetectorUnavailable {
            attempts: vec!["primary: corrupt".into(), "fallback: missing".into()],
        }
    );
}

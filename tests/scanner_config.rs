use std::sync::Mutex;
use std::time::Duration;

use tempfile::NamedTempFile;

use product_scanner::config::ScannerConfig;

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "SCANNER_CONFIG",
        "SCANNER_CAMERA_URL",
        "SCANNER_FPS",
        "SCANNER_CAPTURE_THRESHOLD",
        "SCANNER_DETECTOR_BACKEND",
        "SCANNER_MODEL_PATH",
        "SCANNER_LABELS_PATH",
    ] {
        std::env::remove_var(key);
    }
}

#[test]
fn loads_json_config_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    let json = r#"{
        "camera": {
            "url": "/dev/video2",
            "width": 1280,
            "height": 720,
            "target_fps": 15
        },
        "detector": {
            "report_floor": 0.25,
            "max_detections": 8
        },
        "capture": { "threshold": 0.6 },
        "overlay": { "guide_margin": 0.15, "font_px": 20.0 },
        "slow_cycle_warn_ms": 400
    }"#;
    std::io::Write::write_all(&mut file, json.as_bytes()).expect("write config");

    std::env::set_var("SCANNER_CONFIG", file.path());
    std::env::set_var("SCANNER_FPS", "24");
    std::env::set_var("SCANNER_CAMERA_URL", "stub://counter");

    let cfg = ScannerConfig::load().expect("load config");

    assert_eq!(cfg.camera.url, "stub://counter");
    assert_eq!(cfg.camera.width, 1280);
    assert_eq!(cfg.camera.height, 720);
    assert_eq!(cfg.camera.target_fps, 24);
    assert_eq!(cfg.detector.backend, "stub");
    assert_eq!(cfg.detector.report_floor, 0.25);
    assert_eq!(cfg.detector.max_detections, 8);
    assert_eq!(cfg.capture_threshold, 0.6);
    assert_eq!(cfg.overlay.guide_margin, 0.15);
    assert_eq!(cfg.overlay.font_px, 20.0);
    assert_eq!(cfg.overlay.line_width, 2.0);
    assert_eq!(cfg.slow_cycle_warn, Duration::from_millis(400));

    let settings = cfg.scanner_settings();
    assert_eq!(settings.constraints.width, 1280);
    assert_eq!(settings.capture_threshold, 0.6);

    clear_env();
}

#[test]
fn loads_toml_by_extension() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = tempfile::Builder::new()
        .suffix(".toml")
        .tempfile()
        .expect("temp config");
    let toml = r#"
        [camera]
        url = "stub://shelf"
        target_fps = 10

        [detector]
        backend = "tract"
        model_path = "models/ssd_mobilenet.onnx"
        labels_path = "models/coco_labels.txt"
        input_width = 320
        input_height = 320
    "#;
    std::io::Write::write_all(&mut file, toml.as_bytes()).expect("write config");

    let cfg = ScannerConfig::load_from(file.path()).expect("load toml");
    assert_eq!(cfg.camera.url, "stub://shelf");
    assert_eq!(cfg.camera.target_fps, 10);
    assert_eq!(cfg.camera.width, 640);
    assert_eq!(cfg.detector.backend, "tract");
    assert_eq!(cfg.detector.input_width, 320);
    assert_eq!(
        cfg.detector.labels_path.as_deref(),
        Some(std::path::Path::new("models/coco_labels.txt"))
    );

    clear_env();
}

#[test]
fn defaults_apply_without_config_file() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let cfg = ScannerConfig::load().expect("defaults");
    assert_eq!(cfg.camera.url, "stub://front_camera");
    assert_eq!(cfg.camera.width, 640);
    assert_eq!(cfg.camera.height, 480);
    assert_eq!(cfg.camera.target_fps, 30);
    assert_eq!(cfg.capture_threshold, 0.5);
    assert_eq!(cfg.detector.report_floor, 0.3);
    assert_eq!(cfg.slow_cycle_warn, Duration::from_millis(250));
}

#[test]
fn rejects_invalid_values() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("SCANNER_CAPTURE_THRESHOLD", "1.5");
    assert!(ScannerConfig::load().is_err());

    std::env::set_var("SCANNER_CAPTURE_THRESHOLD", "0.2");
    let err = ScannerConfig::load().unwrap_err();
    assert!(err.to_string().contains("exceeds capture threshold"));

    std::env::set_var("SCANNER_CAPTURE_THRESHOLD", "0.5");
    std::env::set_var("SCANNER_FPS", "fast");
    assert!(ScannerConfig::load().is_err());

    std::env::set_var("SCANNER_FPS", "0");
    assert!(ScannerConfig::load().is_err());
    std::env::remove_var("SCANNER_FPS");

    std::env::set_var("SCANNER_DETECTOR_BACKEND", "tract");
    let err = ScannerConfig::load().unwrap_err();
    assert!(err.to_string().contains("tract backend requires"));

    clear_env();
}

#[test]
fn unreadable_config_is_an_error() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("SCANNER_CONFIG", "/nonexistent/scanner.json");
    let err = ScannerConfig::load().unwrap_err();
    assert!(err.to_string().contains("failed to read config file"));

    clear_env();
}

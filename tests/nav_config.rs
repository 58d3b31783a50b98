use std::io::Write;
use std::sync::Mutex;
use std::time::Duration;

use tempfile::{Builder, NamedTempFile};

use reactive_nav::config::NavConfig;

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "NAV_CONFIG",
        "NAV_CAMERA_DEVICE",
        "NAV_DETECTOR_BACKEND",
        "NAV_MODEL_PATH",
        "NAV_SCENARIO_PATH",
        "NAV_MIN_CONFIDENCE",
        "NAV_MAX_CYCLES",
    ] {
        std::env::remove_var(key);
    }
}

#[test]
fn loads_json_config_with_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    let json = r#"{
        "camera": {
            "device": "/dev/video2",
            "width": 640,
            "height": 480,
            "fps": 15,
            "join_timeout_ms": 250,
            "warmup_ms": 0
        },
        "detector": {
            "backend": "tract",
            "model_path": "models/detector.onnx",
            "confidence_threshold": 0.4,
            "input_width": 320,
            "input_height": 320
        },
        "planner": {
            "stop_area_threshold": 0.2,
            "center_threshold": 0.1,
            "min_confidence": 0.55
        },
        "runtime": {
            "idle_wait_ms": 2,
            "health_log_secs": 10
        }
    }"#;
    file.write_all(json.as_bytes()).expect("write config");

    std::env::set_var("NAV_CONFIG", file.path());
    std::env::set_var("NAV_CAMERA_DEVICE", "stub://bench");
    std::env::set_var("NAV_MIN_CONFIDENCE", "0.7");
    std::env::set_var("NAV_MAX_CYCLES", "500");

    let cfg = NavConfig::load().expect("load config");

    assert_eq!(cfg.camera.device, "stub://bench");
    assert_eq!((cfg.camera.width, cfg.camera.height, cfg.camera.fps), (640, 480, 15));
    assert_eq!(cfg.camera.join_timeout, Duration::from_millis(250));
    assert_eq!(cfg.camera.warmup, Duration::ZERO);
    assert_eq!(cfg.detector.backend, "tract");
    assert_eq!(
        cfg.detector.model_path.as_deref(),
        Some(std::path::Path::new("models/detector.onnx"))
    );
    assert_eq!(cfg.detector.confidence_threshold, 0.4);
    assert_eq!(cfg.planner.stop_area_threshold, 0.2);
    assert_eq!(cfg.planner.center_threshold, 0.1);
    assert_eq!(cfg.planner.min_confidence, 0.7);
    assert_eq!(cfg.runtime.idle_wait, Duration::from_millis(2));
    assert_eq!(cfg.runtime.max_cycles, Some(500));

    clear_env();
}

#[test]
fn loads_toml_config() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = Builder::new().suffix(".toml").tempfile().expect("temp config");
    file.write_all(
        br#"
        [camera]
        device = "0"
        fps = 10

        [detector]
        backend = "scripted"
        scenario_path = "scenarios/hallway.json"
        "#,
    )
    .expect("write config");

    let cfg = NavConfig::load_from(Some(file.path())).expect("load config");
    assert_eq!(cfg.camera.device, "0");
    assert_eq!(cfg.camera.fps, 10);
    assert_eq!(cfg.detector.backend, "scripted");
    assert_eq!(cfg.runtime.max_cycles, None);

    clear_env();
}

#[test]
fn rejects_invalid_values() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("NAV_MIN_CONFIDENCE", "high");
    assert!(NavConfig::load().is_err());

    std::env::set_var("NAV_MIN_CONFIDENCE", "1.5");
    assert!(NavConfig::load().is_err());
    std::env::remove_var("NAV_MIN_CONFIDENCE");

    std::env::set_var("NAV_DETECTOR_BACKEND", "darknet");
    assert!(NavConfig::load().is_err());

    clear_env();
}

#[test]
fn defaults_without_config_file() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let cfg = NavConfig::load().expect("defaults");
    assert_eq!(cfg.camera.device, "stub://front");
    assert_eq!(cfg.planner.min_confidence, 0.5);
    assert_eq!(cfg.detector.backend, "stub");
}

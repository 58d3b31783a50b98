use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::ingest::{CaptureConfig, DeviceId};
use crate::planner::PlannerThresholds;

const DEFAULT_DETECTOR_BACKEND: &str = "stub";
const DEFAULT_CONFIDENCE: f32 = 0.5;
const DEFAULT_MODEL_INPUT: u32 = 320;
const DEFAULT_IDLE_WAIT_MS: u64 = 10;
const DEFAULT_HEALTH_LOG_SECS: u64 = 5;
const KNOWN_BACKENDS: [&str; 3] = ["stub", "scripted", "tract"];

#[derive(Debug, Deserialize, Default)]
struct NavConfigFile {
    camera: Option<CameraConfigFile>,
    detector: Option<DetectorConfigFile>,
    planner: Option<PlannerConfigFile>,
    runtime: Option<RuntimeConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct CameraConfigFile {
    device: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    fps: Option<u32>,
    join_timeout_ms: Option<u64>,
    warmup_ms: Option<u64>,
    failure_rate: Option<f64>,
}

#[derive(Debug, Deserialize, Default)]
struct DetectorConfigFile {
    backend: Option<String>,
    model_path: Option<PathBuf>,
    scenario_path: Option<PathBuf>,
    confidence_threshold: Option<f32>,
    input_width: Option<u32>,
    input_height: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct PlannerConfigFile {
    stop_area_threshold: Option<f32>,
    center_threshold: Option<f32>,
    min_confidence: Option<f32>,
}

#[derive(Debug, Deserialize, Default)]
struct RuntimeConfigFile {
    idle_wait_ms: Option<u64>,
    health_log_secs: Option<u64>,
    max_cycles: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct NavConfig {
    pub camera: CaptureConfig,
    pub detector: DetectorSettings,
    pub planner: PlannerThresholds,
    pub runtime: RuntimeSettings,
}

#[derive(Debug, Clone)]
pub struct DetectorSettings {
    /// `stub`, `scripted` or `tract`.
    pub backend: String,
    pub model_path: Option<PathBuf>,
    pub scenario_path: Option<PathBuf>,
    pub confidence_threshold: f32,
    pub input_width: u32,
    pub input_height: u32,
}

impl Default for DetectorSettings {
    fn default() -> Self {
        Self {
            backend: DEFAULT_DETECTOR_BACKEND.to_string(),
            model_path: None,
            scenario_path: None,
            confidence_threshold: DEFAULT_CONFIDENCE,
            input_width: DEFAULT_MODEL_INPUT,
            input_height: DEFAULT_MODEL_INPUT,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RuntimeSettings {
    /// Longest the main cycle waits when no valid frame is available.
    pub idle_wait: Duration,
    pub health_log_interval: Duration,
    /// Stop after this many processed cycles (unbounded when `None`).
    pub max_cycles: Option<u64>,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            idle_wait: Duration::from_millis(DEFAULT_IDLE_WAIT_MS),
            health_log_interval: Duration::from_secs(DEFAULT_HEALTH_LOG_SECS),
            max_cycles: None,
        }
    }
}

impl NavConfig {
    /// Load from the file named by `NAV_CONFIG` (if set), then apply `NAV_*`
    /// environment overrides and validate.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("NAV_CONFIG").ok().map(PathBuf::from);
        Self::load_from(config_path.as_deref())
    }

    /// Like `load`, with an explicit config file path.
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let file_cfg = match path {
            Some(path) => read_config_file(path)?,
            None => NavConfigFile::default(),
        };
        let mut cfg = Self::from_file(file_cfg);
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: NavConfigFile) -> Self {
        let camera_defaults = CaptureConfig::default();
        let camera_file = file.camera.unwrap_or_default();
        let camera = CaptureConfig {
            device: camera_file.device.unwrap_or(camera_defaults.device),
            width: camera_file.width.unwrap_or(camera_defaults.width),
            height: camera_file.height.unwrap_or(camera_defaults.height),
            fps: camera_file.fps.unwrap_or(camera_defaults.fps),
            join_timeout: camera_file
                .join_timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(camera_defaults.join_timeout),
            warmup: camera_file
                .warmup_ms
                .map(Duration::from_millis)
                .unwrap_or(camera_defaults.warmup),
            failure_rate: camera_file
                .failure_rate
                .unwrap_or(camera_defaults.failure_rate),
        };

        let detector_file = file.detector.unwrap_or_default();
        let detector = DetectorSettings {
            backend: detector_file
                .backend
                .unwrap_or_else(|| DEFAULT_DETECTOR_BACKEND.to_string()),
            model_path: detector_file.model_path,
            scenario_path: detector_file.scenario_path,
            confidence_threshold: detector_file
                .confidence_threshold
                .unwrap_or(DEFAULT_CONFIDENCE),
            input_width: detector_file.input_width.unwrap_or(DEFAULT_MODEL_INPUT),
            input_height: detector_file.input_height.unwrap_or(DEFAULT_MODEL_INPUT),
        };

        let planner_defaults = PlannerThresholds::default();
        let planner_file = file.planner.unwrap_or_default();
        let planner = PlannerThresholds {
            stop_area_threshold: planner_file
                .stop_area_threshold
                .unwrap_or(planner_defaults.stop_area_threshold),
            center_threshold: planner_file
                .center_threshold
                .unwrap_or(planner_defaults.center_threshold),
            min_confidence: planner_file
                .min_confidence
                .unwrap_or(planner_defaults.min_confidence),
        };

        let runtime_file = file.runtime.unwrap_or_default();
        let runtime = RuntimeSettings {
            idle_wait: Duration::from_millis(
                runtime_file.idle_wait_ms.unwrap_or(DEFAULT_IDLE_WAIT_MS),
            ),
            health_log_interval: Duration::from_secs(
                runtime_file
                    .health_log_secs
                    .unwrap_or(DEFAULT_HEALTH_LOG_SECS),
            ),
            max_cycles: runtime_file.max_cycles,
        };

        Self {
            camera,
            detector,
            planner,
            runtime,
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(device) = std::env::var("NAV_CAMERA_DEVICE") {
            if !device.trim().is_empty() {
                self.camera.device = device;
            }
        }
        if let Ok(backend) = std::env::var("NAV_DETECTOR_BACKEND") {
            if !backend.trim().is_empty() {
                self.detector.backend = backend.trim().to_lowercase();
            }
        }
        if let Ok(path) = std::env::var("NAV_MODEL_PATH") {
            if !path.trim().is_empty() {
                self.detector.model_path = Some(PathBuf::from(path));
            }
        }
        if let Ok(path) = std::env::var("NAV_SCENARIO_PATH") {
            if !path.trim().is_empty() {
                self.detector.scenario_path = Some(PathBuf::from(path));
            }
        }
        if let Ok(value) = std::env::var("NAV_MIN_CONFIDENCE") {
            self.planner.min_confidence = value
                .parse()
                .map_err(|_| anyhow!("NAV_MIN_CONFIDENCE must be a number in [0, 1]"))?;
        }
        if let Ok(value) = std::env::var("NAV_MAX_CYCLES") {
            let cycles: u64 = value
                .parse()
                .map_err(|_| anyhow!("NAV_MAX_CYCLES must be a non-negative integer"))?;
            self.runtime.max_cycles = Some(cycles);
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        self.camera
            .device
            .parse::<DeviceId>()
            .map_err(|e| anyhow!("camera.device: {}", e))?;
        if self.camera.width == 0 || self.camera.height == 0 {
            return Err(anyhow!("camera resolution must be non-zero"));
        }
        if self.camera.fps == 0 {
            return Err(anyhow!("camera fps must be >= 1"));
        }
        if !(0.0..=1.0).contains(&self.camera.failure_rate) {
            return Err(anyhow!("camera.failure_rate must be within [0, 1]"));
        }
        if !KNOWN_BACKENDS.contains(&self.detector.backend.as_str()) {
            return Err(anyhow!(
                "unknown detector backend '{}' (expected one of {})",
                self.detector.backend,
                KNOWN_BACKENDS.join(", ")
            ));
        }
        if self.detector.input_width == 0 || self.detector.input_height == 0 {
            return Err(anyhow!("detector input size must be non-zero"));
        }
        for (name, value) in [
            ("detector.confidence_threshold", self.detector.confidence_threshold),
            ("planner.stop_area_threshold", self.planner.stop_area_threshold),
            ("planner.center_threshold", self.planner.center_threshold),
            ("planner.min_confidence", self.planner.min_confidence),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(anyhow!("{} must be within [0, 1], got {}", name, value));
            }
        }
        Ok(())
    }
}

fn read_config_file(path: &Path) -> Result<NavConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    let cfg = if is_toml {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_platform() {
        let cfg = NavConfig::from_file(NavConfigFile::default());
        assert_eq!(cfg.camera.device, "stub://front");
        assert_eq!((cfg.camera.width, cfg.camera.height, cfg.camera.fps), (320, 240, 30));
        assert_eq!(cfg.planner, PlannerThresholds::default());
        assert_eq!(cfg.detector.backend, "stub");
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn rejects_out_of_range_thresholds() {
        let mut cfg = NavConfig::from_file(NavConfigFile::default());
        cfg.planner.center_threshold = 1.5;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_unknown_backend_and_zero_fps() {
        let mut cfg = NavConfig::from_file(NavConfigFile::default());
        cfg.detector.backend = "opencv".to_string();
        assert!(cfg.validate().is_err());

        let mut cfg = NavConfig::from_file(NavConfigFile::default());
        cfg.camera.fps = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn parses_toml_sections() {
        let file: NavConfigFile = toml::from_str(
            r#"
            [camera]
            device = "/dev/video1"
            fps = 15

            [planner]
            min_confidence = 0.6
            "#,
        )
        .expect("toml");
        let cfg = NavConfig::from_file(file);
        assert_eq!(cfg.camera.device, "/dev/video1");
        assert_eq!(cfg.camera.fps, 15);
        assert_eq!(cfg.camera.width, 320);
        assert_eq!(cfg.planner.min_confidence, 0.6);
        assert_eq!(cfg.planner.stop_area_threshold, 0.15);
    }
}

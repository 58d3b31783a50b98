//! Object detection seam.
//!
//! The navigation core does not care how detections are produced. Anything
//! implementing `Detector` can feed the planner:
//! - `StubBackend`: deterministic pseudo-detections derived from frame content
//! - `ScriptedBackend`: replays recorded detection sets (tests, offline runs)
//! - `TractBackend`: ONNX object detector (feature: backend-tract)

mod backends;
mod detection;
mod detector;
pub mod labels;

use anyhow::{anyhow, Result};

use crate::config::DetectorSettings;

pub use backends::{ScriptedBackend, StubBackend};
#[cfg(feature = "backend-tract")]
pub use backends::TractBackend;
pub use detection::{BoundingBox, Detection};
pub use detector::Detector;

/// Build the detector named by `settings.backend`.
pub fn build_detector(settings: &DetectorSettings) -> Result<Box<dyn Detector>> {
    match settings.backend.as_str() {
        "stub" => Ok(Box::new(
            StubBackend::new().with_threshold(settings.confidence_threshold),
        )),
        "scripted" => {
            let path = settings
                .scenario_path
                .as_ref()
                .ok_or_else(|| anyhow!("scripted detector requires detector.scenario_path"))?;
            Ok(Box::new(ScriptedBackend::from_json_file(path)?))
        }
        "tract" => build_tract(settings),
        other => Err(anyhow!("unknown detector backend '{}'", other)),
    }
}

#[cfg(feature = "backend-tract")]
fn build_tract(settings: &DetectorSettings) -> Result<Box<dyn Detector>> {
    let model_path = settings
        .model_path
        .as_ref()
        .ok_or_else(|| anyhow!("tract detector requires detector.model_path"))?;
    Ok(Box::new(
        TractBackend::new(model_path, settings.input_width, settings.input_height)
            .with_threshold(settings.confidence_threshold),
    ))
}

#[cfg(not(feature = "backend-tract"))]
fn build_tract(_settings: &DetectorSettings) -> Result<Box<dyn Detector>> {
    Err(anyhow!("tract detector requires the backend-tract feature"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_stub_backend() -> Result<()> {
        let detector = build_detector(&DetectorSettings::default())?;
        assert_eq!(detector.name(), "stub");
        Ok(())
    }

    #[test]
    fn rejects_unknown_backend() {
        let settings = DetectorSettings {
            backend: "yolo".to_string(),
            ..DetectorSettings::default()
        };
        assert!(build_detector(&settings).is_err());
    }

    #[test]
    fn scripted_backend_needs_scenario() {
        let settings = DetectorSettings {
            backend: "scripted".to_string(),
            scenario_path: None,
            ..DetectorSettings::default()
        };
        assert!(build_detector(&settings).is_err());
    }
}

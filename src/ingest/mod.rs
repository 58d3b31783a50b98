//! Frame acquisition.
//!
//! This module provides the capture side of the loop:
//! - `FrameSource`: owns a capture device and a background acquisition thread
//! - `SyntheticDevice`: generated frames for `stub://` device ids
//! - `V4l2Device`: local USB/V4L2 cameras (feature: ingest-v4l2)
//!
//! Devices are opened once. A device that cannot be opened is fatal
//! (`NavError::DeviceUnavailable`); a single failed capture is not.

#[cfg(feature = "ingest-v4l2")]
mod normalize;
mod source;
mod synthetic;
#[cfg(feature = "ingest-v4l2")]
pub mod v4l2;

use anyhow::{anyhow, Result};
use std::str::FromStr;
use std::time::Duration;

use crate::frame::Frame;
use crate::NavError;

pub use source::{FrameSource, SourceStats};
pub use synthetic::SyntheticDevice;
#[cfg(feature = "ingest-v4l2")]
pub use v4l2::V4l2Device;

/// Identifies a capture device.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DeviceId {
    /// `stub://<name>`: generated frames, no hardware.
    Synthetic(String),
    /// Bare camera index, mapped to `/dev/video<N>`.
    Index(u32),
    /// Device node path.
    Path(String),
}

impl DeviceId {
    /// Device node for hardware ids.
    pub fn device_path(&self) -> Option<String> {
        match self {
            DeviceId::Synthetic(_) => None,
            DeviceId::Index(index) => Some(format!("/dev/video{}", index)),
            DeviceId::Path(path) => Some(path.clone()),
        }
    }
}

impl FromStr for DeviceId {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        let value = value.trim();
        if value.is_empty() {
            return Err(anyhow!("device id must not be empty"));
        }
        if let Some(name) = value.strip_prefix("stub://") {
            return Ok(DeviceId::Synthetic(name.to_string()));
        }
        if let Ok(index) = value.parse::<u32>() {
            return Ok(DeviceId::Index(index));
        }
        if value.contains("://") {
            return Err(anyhow!("unsupported device scheme in '{}'", value));
        }
        Ok(DeviceId::Path(value.to_string()))
    }
}

impl std::fmt::Display for DeviceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceId::Synthetic(name) => write!(f, "stub://{}", name),
            DeviceId::Index(index) => write!(f, "{}", index),
            DeviceId::Path(path) => write!(f, "{}", path),
        }
    }
}

/// Configuration for a `FrameSource`.
#[derive(Clone, Debug)]
pub struct CaptureConfig {
    /// Device id (`stub://front`, `0`, `/dev/video2`).
    pub device: String,
    /// Requested frame width.
    pub width: u32,
    /// Requested frame height.
    pub height: u32,
    /// Requested frame rate.
    pub fps: u32,
    /// Upper bound on how long `stop()` waits for the acquisition thread.
    pub join_timeout: Duration,
    /// Settling delay between opening the device and starting the loop.
    pub warmup: Duration,
    /// Probability of a simulated capture failure (synthetic devices only).
    pub failure_rate: f64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            device: "stub://front".to_string(),
            width: 320,
            height: 240,
            fps: 30,
            join_timeout: Duration::from_secs(1),
            warmup: Duration::from_millis(500),
            failure_rate: 0.0,
        }
    }
}

/// A frame-producing device driven by the acquisition thread.
///
/// `capture` may block for up to one frame interval. Errors from `capture`
/// are treated as transient by the acquisition loop.
pub trait CaptureDevice: Send {
    /// Human-readable device identifier for logs.
    fn describe(&self) -> String;

    /// Capture the next frame.
    fn capture(&mut self) -> Result<Frame>;

    /// Release the underlying device. Called once when the loop exits.
    fn release(&mut self) {}
}

/// Open the device named by `config.device` and negotiate its format.
pub fn open_device(config: &CaptureConfig) -> Result<Box<dyn CaptureDevice>> {
    let id: DeviceId = config.device.parse()?;
    match id {
        DeviceId::Synthetic(name) => Ok(Box::new(SyntheticDevice::new(&name, config))),
        DeviceId::Index(_) | DeviceId::Path(_) => open_hardware(&id, config),
    }
}

#[cfg(feature = "ingest-v4l2")]
fn open_hardware(id: &DeviceId, config: &CaptureConfig) -> Result<Box<dyn CaptureDevice>> {
    let path = id
        .device_path()
        .ok_or_else(|| anyhow!("device '{}' has no device node", id))?;
    Ok(Box::new(V4l2Device::open(&path, config)?))
}

#[cfg(not(feature = "ingest-v4l2"))]
fn open_hardware(id: &DeviceId, _config: &CaptureConfig) -> Result<Box<dyn CaptureDevice>> {
    Err(NavError::DeviceUnavailable {
        device: id.to_string(),
        reason: "hardware capture requires the ingest-v4l2 feature".to_string(),
    }
    .into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_device_ids() {
        assert_eq!(
            "stub://front".parse::<DeviceId>().unwrap(),
            DeviceId::Synthetic("front".to_string())
        );
        assert_eq!("0".parse::<DeviceId>().unwrap(), DeviceId::Index(0));
        assert_eq!(
            "/dev/video2".parse::<DeviceId>().unwrap(),
            DeviceId::Path("/dev/video2".to_string())
        );
        assert!("".parse::<DeviceId>().is_err());
        assert!("rtsp://camera".parse::<DeviceId>().is_err());
    }

    #[test]
    fn index_maps_to_device_node() {
        assert_eq!(
            DeviceId::Index(1).device_path().as_deref(),
            Some("/dev/video1")
        );
        assert_eq!(DeviceId::Synthetic("x".to_string()).device_path(), None);
    }

    #[test]
    fn opens_synthetic_device() {
        let config = CaptureConfig::default();
        let device = open_device(&config).expect("synthetic device");
        assert_eq!(device.describe(), "stub://front");
    }

    #[cfg(not(feature = "ingest-v4l2"))]
    #[test]
    fn hardware_without_backend_is_device_unavailable() {
        let config = CaptureConfig {
            device: "0".to_string(),
            ..CaptureConfig::default()
        };
        let err = open_device(&config).err().expect("open must fail");
        match err.downcast_ref::<NavError>() {
            Some(NavError::DeviceUnavailable { device, .. }) => assert_eq!(device, "0"),
            other => panic!("unexpected error: {:?}", other),
        }
    }
}

//! Reactive obstacle-avoidance loop.
//!
//! This crate implements the core of a single-frame reactive navigator for a
//! mobile platform: frames are acquired on a background thread, handed to an
//! object detector, reduced to one of four navigation actions, and forwarded to
//! an actuation layer only when the commanded action changes.
//!
//! # Module Structure
//!
//! - `frame`: Owned frames and the single shared "latest frame" slot
//! - `ingest`: `FrameSource` and capture devices (synthetic, V4L2)
//! - `detect`: Detector seam, detections, and backends
//! - `planner`: Rule-based decision engine (`PathPlanner`)
//! - `control`: Debounced actuation (`ActionGate`)
//! - `orchestrator`: The main cycle and its shutdown sequence
//! - `config`: Daemon configuration (file + environment)

pub mod config;
pub mod control;
pub mod detect;
mod error;
pub mod frame;
pub mod ingest;
pub mod orchestrator;
pub mod planner;

pub use control::{ActionGate, ActionStatus, Actuator, LogActuator};
pub use detect::{build_detector, BoundingBox, Detection, Detector, ScriptedBackend, StubBackend};
pub use error::NavError;
pub use frame::{Frame, FrameSlot, SlotStats};
pub use ingest::{CaptureConfig, CaptureDevice, DeviceId, FrameSource, SyntheticDevice};
pub use orchestrator::{
    CadenceMeter, LogVisualizer, Navigator, NullVisualizer, RunSummary, Visualizer,
};
pub use planner::{Decision, NavAction, PathPlanner, PlannerThresholds};

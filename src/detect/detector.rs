use anyhow::Result;

use super::Detection;
use crate::frame::Frame;

/// Produces detections for a frame.
///
/// Implementations may defer expensive initialisation to the first `detect`
/// call; `load` lets the caller front-load it at startup instead. A model that
/// cannot be loaded is reported as `NavError::ModelLoadFailure` and is fatal.
///
/// Confidence filtering here is optional. The planner filters again.
pub trait Detector: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// One-time initialisation. Calling it again is a no-op.
    fn load(&mut self) -> Result<()> {
        Ok(())
    }

    /// Run detection on a frame.
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>>;
}

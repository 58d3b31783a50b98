use anyhow::{Context, Result};
use std::path::Path;

use crate::detect::{Detection, Detector};
use crate::frame::Frame;

/// Replays a fixed sequence of detection sets, one per `detect` call.
///
/// The sequence wraps around when exhausted. An empty script always yields
/// no detections.
pub struct ScriptedBackend {
    script: Vec<Vec<Detection>>,
    cursor: usize,
}

impl ScriptedBackend {
    pub fn new(script: Vec<Vec<Detection>>) -> Self {
        Self { script, cursor: 0 }
    }

    /// Load a JSON array of detection arrays.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("read detection scenario {}", path.display()))?;
        let script: Vec<Vec<Detection>> = serde_json::from_str(&raw)
            .with_context(|| format!("invalid detection scenario {}", path.display()))?;
        log::info!(
            "ScriptedBackend: loaded {} detection sets from {}",
            script.len(),
            path.display()
        );
        Ok(Self::new(script))
    }

    pub fn len(&self) -> usize {
        self.script.len()
    }

    pub fn is_empty(&self) -> bool {
        self.script.is_empty()
    }
}

impl Detector for ScriptedBackend {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn detect(&mut self, _frame: &Frame) -> Result<Vec<Detection>> {
        if self.script.is_empty() {
            return Ok(Vec::new());
        }
        let detections = self.script[self.cursor].clone();
        self.cursor = (self.cursor + 1) % self.script.len();
        Ok(detections)
    }
}

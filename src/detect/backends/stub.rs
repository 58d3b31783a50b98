use anyhow::Result;
use sha2::{Digest, Sha256};

use crate::detect::labels::label_for;
use crate::detect::{Detection, Detector};
use crate::frame::Frame;

/// Stub backend for running without a model.
///
/// Derives zero to two pseudo-detections from a SHA-256 digest of the frame
/// pixels, so identical frames always produce identical detections.
pub struct StubBackend {
    confidence_threshold: f32,
}

impl StubBackend {
    pub fn new() -> Self {
        Self {
            confidence_threshold: 0.0,
        }
    }

    /// Drop detections scoring below `threshold`.
    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.confidence_threshold = threshold;
        self
    }

    fn detections_from_digest(&self, digest: &[u8; 32]) -> Vec<Detection> {
        let count = (digest[0] % 3) as usize;
        (0..count)
            .map(|i| {
                let chunk = &digest[1 + i * 6..7 + i * 6];
                let unit = |b: u8| b as f32 / 255.0;
                let center_x = unit(chunk[0]);
                let center_y = 0.3 + unit(chunk[1]) * 0.4;
                let half_w = 0.05 + unit(chunk[2]) * 0.2;
                let half_h = 0.05 + unit(chunk[3]) * 0.2;
                let score = 0.3 + unit(chunk[4]) * 0.7;
                Detection::new(
                    [
                        center_x - half_w,
                        center_y - half_h,
                        center_x + half_w,
                        center_y + half_h,
                    ],
                    score,
                    label_for(chunk[5] as usize % 80),
                )
            })
            .filter(|det| det.score >= self.confidence_threshold)
            .collect()
    }
}

impl Default for StubBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl Detector for StubBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>> {
        let digest: [u8; 32] = Sha256::digest(frame.pixels()).into();
        Ok(self.detections_from_digest(&digest))
    }
}

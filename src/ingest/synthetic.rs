use anyhow::Result;
use rand::Rng;
use std::time::{Duration, Instant};

use super::{CaptureConfig, CaptureDevice};
use crate::frame::{Frame, BYTES_PER_PIXEL};
use crate::NavError;

/// Generated frames for `stub://` devices.
///
/// Captures are paced to the configured frame rate. Each frame carries a
/// vertical bar that sweeps across the image, so consecutive frames differ.
pub struct SyntheticDevice {
    name: String,
    width: u32,
    height: u32,
    frame_interval: Duration,
    failure_rate: f64,
    frame_count: u64,
    next_due: Option<Instant>,
}

impl SyntheticDevice {
    pub fn new(name: &str, config: &CaptureConfig) -> Self {
        let frame_interval = if config.fps == 0 {
            Duration::ZERO
        } else {
            Duration::from_secs(1) / config.fps
        };
        Self {
            name: name.to_string(),
            width: config.width,
            height: config.height,
            frame_interval,
            failure_rate: config.failure_rate.clamp(0.0, 1.0),
            frame_count: 0,
            next_due: None,
        }
    }

    fn pace(&mut self) {
        let now = Instant::now();
        if let Some(due) = self.next_due {
            if due > now {
                std::thread::sleep(due - now);
            }
        }
        let base = self.next_due.map_or(now, |due| due.max(now));
        self.next_due = Some(base + self.frame_interval);
    }

    fn generate_pixels(&self) -> Vec<u8> {
        let width = self.width as usize;
        let height = self.height as usize;
        let mut pixels = vec![0u8; width * height * BYTES_PER_PIXEL];
        if width == 0 {
            return pixels;
        }

        let bar_width = (width / 8).max(1);
        let bar_start = (self.frame_count as usize * 2) % width;
        for y in 0..height {
            for x in 0..width {
                let offset = (y * width + x) * BYTES_PER_PIXEL;
                let in_bar = (x + width - bar_start) % width < bar_width;
                let shade = ((y * 255) / height.max(1)) as u8;
                pixels[offset] = if in_bar { 255 } else { shade };
                pixels[offset + 1] = shade / 2;
                pixels[offset + 2] = ((x * 255) / width) as u8;
            }
        }
        pixels
    }
}

impl CaptureDevice for SyntheticDevice {
    fn describe(&self) -> String {
        format!("stub://{}", self.name)
    }

    fn capture(&mut self) -> Result<Frame> {
        self.pace();
        self.frame_count += 1;

        if self.failure_rate > 0.0 && rand::thread_rng().gen_bool(self.failure_rate) {
            return Err(NavError::TransientCaptureFailure {
                device: self.describe(),
                reason: format!("simulated drop at frame {}", self.frame_count),
            }
            .into());
        }

        Frame::new(self.generate_pixels(), self.width, self.height)
    }

    fn release(&mut self) {
        log::info!(
            "SyntheticDevice: released {} after {} frames",
            self.describe(),
            self.frame_count
        );
    }
}

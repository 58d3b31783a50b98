use anyhow::{Context, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use super::{open_device, CaptureConfig, CaptureDevice};
use crate::frame::{Frame, FrameSlot};

/// Pause after a failed capture so a dead device does not spin a core.
const FAILURE_BACKOFF: Duration = Duration::from_millis(5);

/// Capture statistics for a `FrameSource`.
#[derive(Clone, Debug)]
pub struct SourceStats {
    pub device: String,
    pub frames_captured: u64,
    pub capture_failures: u64,
    pub running: bool,
}

struct Worker {
    handle: JoinHandle<()>,
    done: mpsc::Receiver<()>,
}

/// Background frame acquisition.
///
/// The acquisition thread publishes every successful capture into a single
/// `FrameSlot`; `read` copies the latest frame out without waiting for the
/// device.
pub struct FrameSource {
    slot: Arc<FrameSlot>,
    running: Arc<AtomicBool>,
    worker: Option<Worker>,
    device: String,
    join_timeout: Duration,
}

impl FrameSource {
    /// Open the configured device and start acquiring.
    pub fn start(config: &CaptureConfig) -> Result<Self> {
        let device = open_device(config)?;
        Self::start_with(device, config)
    }

    /// Start acquiring from an already opened device.
    pub fn start_with(device: Box<dyn CaptureDevice>, config: &CaptureConfig) -> Result<Self> {
        if !config.warmup.is_zero() {
            std::thread::sleep(config.warmup);
        }

        let name = device.describe();
        let slot = Arc::new(FrameSlot::new());
        let running = Arc::new(AtomicBool::new(true));
        let (done_tx, done) = mpsc::channel();

        let thread_slot = slot.clone();
        let thread_running = running.clone();
        let handle = std::thread::Builder::new()
            .name("frame-acquisition".to_string())
            .spawn(move || {
                acquisition_loop(device, &thread_slot, &thread_running);
                let _ = done_tx.send(());
            })
            .context("spawn acquisition thread")?;

        log::info!(
            "FrameSource: acquiring from {} ({}x{} @ {} fps)",
            name,
            config.width,
            config.height,
            config.fps
        );

        Ok(Self {
            slot,
            running,
            worker: Some(Worker { handle, done }),
            device: name,
            join_timeout: config.join_timeout,
        })
    }

    /// Copy of the most recent valid frame, or `None` if no capture has
    /// succeeded yet or the last capture failed.
    pub fn read(&self) -> Option<Frame> {
        self.slot.snapshot()
    }

    /// Like `read`, but waits up to `timeout` for a valid frame.
    pub fn wait_for_frame(&self, timeout: Duration) -> Option<Frame> {
        self.slot.wait_for_frame(timeout)
    }

    /// Waits up to `timeout` for a frame newer than sequence `after`.
    pub fn wait_for_newer(&self, after: u64, timeout: Duration) -> Option<Frame> {
        self.slot.wait_for_newer(after, timeout)
    }

    pub fn is_running(&self) -> bool {
        self.worker.is_some() && self.running.load(Ordering::SeqCst)
    }

    pub fn stats(&self) -> SourceStats {
        let slot = self.slot.stats();
        SourceStats {
            device: self.device.clone(),
            frames_captured: slot.published,
            capture_failures: slot.failures,
            running: self.is_running(),
        }
    }

    /// Stop the acquisition thread.
    ///
    /// Waits at most `join_timeout`. A thread stuck inside the device call is
    /// detached; it releases the device itself if the call ever returns.
    /// Calling `stop` on a stopped source does nothing.
    pub fn stop(&mut self) {
        let Some(worker) = self.worker.take() else {
            return;
        };
        self.running.store(false, Ordering::SeqCst);

        match worker.done.recv_timeout(self.join_timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if worker.handle.join().is_err() {
                    log::error!("FrameSource: acquisition thread for {} panicked", self.device);
                }
                log::info!("FrameSource: {} stopped", self.device);
            }
            Err(RecvTimeoutError::Timeout) => {
                log::warn!(
                    "FrameSource: acquisition thread for {} did not exit within {:?}; detaching",
                    self.device,
                    self.join_timeout
                );
            }
        }
    }
}

impl Drop for FrameSource {
    fn drop(&mut self) {
        self.stop();
    }
}

fn acquisition_loop(mut device: Box<dyn CaptureDevice>, slot: &FrameSlot, running: &AtomicBool) {
    let name = device.describe();
    let mut consecutive_failures = 0u64;

    while running.load(Ordering::SeqCst) {
        match device.capture() {
            Ok(frame) => {
                if !running.load(Ordering::SeqCst) {
                    break;
                }
                slot.publish(frame);
                if consecutive_failures > 0 {
                    log::info!(
                        "FrameSource: {} recovered after {} failed captures",
                        name,
                        consecutive_failures
                    );
                    consecutive_failures = 0;
                }
            }
            Err(err) => {
                slot.invalidate();
                consecutive_failures += 1;
                if consecutive_failures == 1 || consecutive_failures % 100 == 0 {
                    log::warn!(
                        "FrameSource: capture failed on {} ({} in a row): {:#}",
                        name,
                        consecutive_failures,
                        err
                    );
                }
                std::thread::sleep(FAILURE_BACKOFF);
            }
        }
    }

    device.release();
    log::debug!("FrameSource: acquisition loop for {} exited", name);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::NavError;
    use anyhow::anyhow;
    use std::sync::atomic::AtomicUsize;
    use std::time::Instant;

    fn fast_config() -> CaptureConfig {
        CaptureConfig {
            device: "stub://test".to_string(),
            width: 8,
            height: 6,
            fps: 200,
            join_timeout: Duration::from_millis(500),
            warmup: Duration::ZERO,
            failure_rate: 0.0,
        }
    }

    /// Fails every capture until `ok_after` attempts, then succeeds.
    struct FlakyDevice {
        attempts: usize,
        ok_after: usize,
        released: Arc<AtomicBool>,
    }

    impl CaptureDevice for FlakyDevice {
        fn describe(&self) -> String {
            "flaky".to_string()
        }

        fn capture(&mut self) -> Result<Frame> {
            self.attempts += 1;
            std::thread::sleep(Duration::from_millis(1));
            if self.attempts <= self.ok_after {
                return Err(NavError::TransientCaptureFailure {
                    device: "flaky".to_string(),
                    reason: "no data".to_string(),
                }
                .into());
            }
            Frame::new(vec![0u8; 2 * 2 * 3], 2, 2)
        }

        fn release(&mut self) {
            self.released.store(true, Ordering::SeqCst);
        }
    }

    /// Blocks inside `capture` far longer than any join timeout.
    struct StuckDevice {
        calls: Arc<AtomicUsize>,
    }

    impl CaptureDevice for StuckDevice {
        fn describe(&self) -> String {
            "stuck".to_string()
        }

        fn capture(&mut self) -> Result<Frame> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(Duration::from_secs(3));
            Err(anyhow!("device hung"))
        }
    }

    #[test]
    fn read_before_first_capture_is_none() -> Result<()> {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut config = fast_config();
        config.join_timeout = Duration::from_millis(10);
        let mut source = FrameSource::start_with(
            Box::new(StuckDevice {
                calls: calls.clone(),
            }),
            &config,
        )?;

        assert!(source.read().is_none());
        source.stop();
        Ok(())
    }

    #[test]
    fn synthetic_source_delivers_frames() -> Result<()> {
        let mut source = FrameSource::start(&fast_config())?;
        let frame = source
            .wait_for_frame(Duration::from_secs(2))
            .expect("frame within timeout");
        assert_eq!((frame.width, frame.height), (8, 6));
        assert!(frame.sequence() >= 1);

        source.stop();
        assert!(!source.is_running());
        Ok(())
    }

    #[test]
    fn transient_failures_do_not_stop_the_loop() -> Result<()> {
        let released = Arc::new(AtomicBool::new(false));
        let device = FlakyDevice {
            attempts: 0,
            ok_after: 3,
            released: released.clone(),
        };
        let mut source = FrameSource::start_with(Box::new(device), &fast_config())?;

        let frame = source.wait_for_frame(Duration::from_secs(2));
        assert!(frame.is_some());
        assert!(source.stats().capture_failures >= 3);

        source.stop();
        assert!(released.load(Ordering::SeqCst), "device released on exit");
        Ok(())
    }

    #[test]
    fn stop_is_idempotent_and_halts_capture() -> Result<()> {
        let mut source = FrameSource::start(&fast_config())?;
        source.wait_for_frame(Duration::from_secs(2));
        source.stop();
        let captured = source.stats().frames_captured;

        source.stop();
        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(source.stats().frames_captured, captured);
        Ok(())
    }

    #[test]
    fn stop_is_bounded_when_device_hangs() -> Result<()> {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut config = fast_config();
        config.join_timeout = Duration::from_millis(50);
        let mut source = FrameSource::start_with(
            Box::new(StuckDevice {
                calls: calls.clone(),
            }),
            &config,
        )?;
        while calls.load(Ordering::SeqCst) == 0 {
            std::thread::sleep(Duration::from_millis(1));
        }

        let start = Instant::now();
        source.stop();
        assert!(start.elapsed() < Duration::from_secs(2));
        assert!(!source.is_running());
        Ok(())
    }
}

//! Frames and the shared latest-frame slot.
//!
//! - `Frame`: Owned RGB24 pixel buffer. `Clone` is a deep copy.
//! - `FrameSlot`: The single mutex-guarded slot shared between the acquisition
//!   thread (writer) and the main cycle (reader).
//!
//! The slot never hands out a reference into its buffer. Readers always receive
//! their own copy, taken while the lock is held, so the acquisition thread can
//! replace the slot contents at any time.

use anyhow::{anyhow, Result};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Bytes per pixel for the only pixel layout the core handles (RGB24).
pub const BYTES_PER_PIXEL: usize = 3;

// ----------------------------------------------------------------------------
// Frame
// ----------------------------------------------------------------------------

/// One captured image.
///
/// `sequence` is assigned when the frame is published to a `FrameSlot`; a
/// frame that was never published has sequence 0.
#[derive(Clone)]
pub struct Frame {
    pixels: Vec<u8>,
    pub width: u32,
    pub height: u32,
    sequence: u64,
    captured_at: Instant,
}

impl Frame {
    /// Wrap an RGB24 buffer. The buffer length must match the dimensions.
    pub fn new(pixels: Vec<u8>, width: u32, height: u32) -> Result<Self> {
        let expected = (width as usize)
            .checked_mul(height as usize)
            .and_then(|v| v.checked_mul(BYTES_PER_PIXEL))
            .ok_or_else(|| anyhow!("frame dimensions overflow"))?;
        if pixels.len() != expected {
            return Err(anyhow!(
                "RGB frame length mismatch: expected {}, got {}",
                expected,
                pixels.len()
            ));
        }
        Ok(Self {
            pixels,
            width,
            height,
            sequence: 0,
            captured_at: Instant::now(),
        })
    }

    /// Publish order within the slot that delivered this frame.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// RGB triple at `(x, y)`. Callers stay within `width`/`height`.
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 3] {
        let idx = (y as usize * self.width as usize + x as usize) * BYTES_PER_PIXEL;
        [self.pixels[idx], self.pixels[idx + 1], self.pixels[idx + 2]]
    }

    /// Time since capture.
    pub fn age(&self) -> Duration {
        self.captured_at.elapsed()
    }

    pub fn byte_len(&self) -> usize {
        self.pixels.len()
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("sequence", &self.sequence)
            .field("bytes", &self.pixels.len())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// FrameSlot
// ----------------------------------------------------------------------------

#[derive(Default)]
struct SlotState {
    latest: Option<Frame>,
    valid: bool,
    published: u64,
    failures: u64,
}

/// Counters for a `FrameSlot`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SlotStats {
    pub published: u64,
    pub failures: u64,
    pub valid: bool,
}

/// Single-slot "latest frame" holder.
///
/// A newer publish always supersedes the previous frame, so a reader can never
/// observe a stale frame after a newer one has landed.
#[derive(Default)]
pub struct FrameSlot {
    state: Mutex<SlotState>,
    fresh: Condvar,
}

impl FrameSlot {
    pub fn new() -> Self {
        Self::default()
    }

    // The slot holds plain data, so a writer that panicked mid-update cannot
    // leave it in a state worse than "one frame behind".
    fn lock(&self) -> MutexGuard<'_, SlotState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replace the latest frame and mark the slot valid. Returns the sequence
    /// number assigned to the frame.
    pub fn publish(&self, mut frame: Frame) -> u64 {
        let sequence = {
            let mut state = self.lock();
            state.published += 1;
            frame.sequence = state.published;
            state.latest = Some(frame);
            state.valid = true;
            state.published
        };
        self.fresh.notify_all();
        sequence
    }

    /// Mark the slot invalid after a failed capture.
    pub fn invalidate(&self) {
        let mut state = self.lock();
        state.valid = false;
        state.failures += 1;
    }

    /// Copy out the latest frame if the slot is valid. Never waits for capture.
    pub fn snapshot(&self) -> Option<Frame> {
        let state = self.lock();
        if state.valid {
            state.latest.clone()
        } else {
            None
        }
    }

    /// Like `snapshot`, but waits up to `timeout` for the slot to become valid.
    pub fn wait_for_frame(&self, timeout: Duration) -> Option<Frame> {
        self.wait_for_newer(0, timeout)
    }

    /// Waits up to `timeout` for a valid frame with a sequence after `after`.
    pub fn wait_for_newer(&self, after: u64, timeout: Duration) -> Option<Frame> {
        let guard = self.lock();
        let (state, _timed_out) = self
            .fresh
            .wait_timeout_while(guard, timeout, |state| {
                !(state.valid && state.published > after)
            })
            .unwrap_or_else(PoisonError::into_inner);
        if state.valid && state.published > after {
            state.latest.clone()
        } else {
            None
        }
    }

    pub fn stats(&self) -> SlotStats {
        let state = self.lock();
        SlotStats {
            published: state.published,
            failures: state.failures,
            valid: state.valid,
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn solid_frame(value: u8) -> Frame {
        Frame::new(vec![value; 4 * 2 * BYTES_PER_PIXEL], 4, 2).expect("frame")
    }

    #[test]
    fn frame_rejects_mismatched_buffer() {
        assert!(Frame::new(vec![0u8; 10], 4, 2).is_err());
    }

    #[test]
    fn unpublished_frame_has_no_sequence() {
        let frame = solid_frame(0);
        assert_eq!(frame.sequence(), 0);

        let slot = FrameSlot::new();
        let assigned = slot.publish(frame);
        assert_eq!(slot.snapshot().expect("frame").sequence(), assigned);
    }

    #[test]
    fn age_grows_from_capture_and_survives_copies() {
        let frame = solid_frame(4);
        std::thread::sleep(Duration::from_millis(5));
        let copy = frame.clone();
        assert!(frame.age() >= Duration::from_millis(5));
        assert!(copy.age() >= Duration::from_millis(5));
    }

    #[test]
    fn empty_slot_reads_nothing() {
        let slot = FrameSlot::new();
        assert!(slot.snapshot().is_none());
        assert_eq!(slot.stats(), SlotStats::default());
    }

    #[test]
    fn newer_publish_supersedes_older() {
        let slot = FrameSlot::new();
        slot.publish(solid_frame(1));
        slot.publish(solid_frame(2));

        let frame = slot.snapshot().expect("valid frame");
        assert_eq!(frame.sequence(), 2);
        assert_eq!(frame.pixel(0, 0), [2, 2, 2]);
    }

    #[test]
    fn snapshot_is_a_copy() {
        let slot = FrameSlot::new();
        slot.publish(solid_frame(7));
        let first = slot.snapshot().expect("frame");
        slot.publish(solid_frame(9));

        // The earlier copy is unaffected by the later publish.
        assert_eq!(first.pixel(3, 1), [7, 7, 7]);
        assert_eq!(slot.snapshot().expect("frame").pixel(3, 1), [9, 9, 9]);
    }

    #[test]
    fn invalidate_hides_frame_until_next_publish() {
        let slot = FrameSlot::new();
        slot.publish(solid_frame(1));
        slot.invalidate();
        assert!(slot.snapshot().is_none());
        assert_eq!(slot.stats().failures, 1);

        slot.publish(solid_frame(3));
        assert_eq!(slot.snapshot().expect("frame").sequence(), 2);
    }

    #[test]
    fn wait_for_frame_times_out_when_empty() {
        let slot = FrameSlot::new();
        let start = Instant::now();
        assert!(slot.wait_for_frame(Duration::from_millis(20)).is_none());
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn wait_for_newer_ignores_already_seen_frame() {
        let slot = FrameSlot::new();
        let seen = slot.publish(solid_frame(1));
        assert!(slot
            .wait_for_newer(seen, Duration::from_millis(10))
            .is_none());

        slot.publish(solid_frame(2));
        let frame = slot.wait_for_newer(seen, Duration::from_millis(10));
        assert_eq!(frame.expect("newer frame").sequence(), seen + 1);
    }

    #[test]
    fn wait_for_frame_wakes_on_publish() {
        let slot = Arc::new(FrameSlot::new());
        let writer = slot.clone();
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(10));
            writer.publish(solid_frame(5));
        });

        let frame = slot.wait_for_frame(Duration::from_secs(5));
        handle.join().expect("writer thread");
        assert_eq!(frame.expect("frame").pixel(0, 0), [5, 5, 5]);
    }
}

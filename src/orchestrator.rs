//! The main cycle.
//!
//! `Navigator` drives one synchronous loop on the calling thread:
//! read frame -> detect -> plan -> gate -> measure cadence -> render.
//! The only other execution context is the `FrameSource` acquisition thread.
//!
//! Whatever ends the loop (quit flag, cycle limit, fatal error, a panic in a
//! detector or visualizer), the shutdown sequence runs in the same order:
//! stop the frame source, force-stop the action gate, clean up the visualizer.

use anyhow::{Context, Result};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crate::config::RuntimeSettings;
use crate::control::{ActionGate, ActionStatus, Actuator};
use crate::detect::{Detection, Detector};
use crate::frame::Frame;
use crate::ingest::FrameSource;
use crate::planner::{Decision, PathPlanner};
use crate::NavError;

const CADENCE_SMOOTHING: f32 = 0.1;

// ----------------------------------------------------------------------------
// Visualizer
// ----------------------------------------------------------------------------

/// Rendering sink. Receives the core's data as-is; detection boxes may
/// extend slightly outside `[0, 1]` and must be clamped by the renderer.
pub trait Visualizer: Send {
    fn render(
        &mut self,
        frame: &Frame,
        detections: &[Detection],
        decision: &Decision,
        fps: f32,
    ) -> Result<()>;

    /// Release rendering resources. Called once during shutdown.
    fn cleanup(&mut self) {}
}

/// Discards everything.
#[derive(Debug, Default)]
pub struct NullVisualizer;

impl Visualizer for NullVisualizer {
    fn render(&mut self, _: &Frame, _: &[Detection], _: &Decision, _: f32) -> Result<()> {
        Ok(())
    }
}

/// Text renderer for headless runs: one debug line per detection and decision.
#[derive(Debug, Default)]
pub struct LogVisualizer {
    frames: u64,
}

impl Visualizer for LogVisualizer {
    fn render(
        &mut self,
        frame: &Frame,
        detections: &[Detection],
        decision: &Decision,
        fps: f32,
    ) -> Result<()> {
        self.frames += 1;
        for det in detections {
            let (x0, y0, x1, y1) = det.bbox.to_pixels(frame.width, frame.height);
            log::debug!(
                "frame #{} {} {:.2} [{},{} -> {},{}]",
                frame.sequence(),
                det.class_name,
                det.score,
                x0,
                y0,
                x1,
                y1
            );
        }
        log::debug!(
            "frame #{} action={} reason=\"{}\" fps={:.1}",
            frame.sequence(),
            decision.action,
            decision.reasoning,
            fps
        );
        Ok(())
    }

    fn cleanup(&mut self) {
        log::info!("LogVisualizer: rendered {} frames", self.frames);
    }
}

// ----------------------------------------------------------------------------
// Cadence
// ----------------------------------------------------------------------------

/// Cycle rate measurement.
#[derive(Clone, Debug)]
pub struct CadenceMeter {
    last: Instant,
    smoothed: Option<f32>,
}

impl CadenceMeter {
    pub fn new() -> Self {
        Self {
            last: Instant::now(),
            smoothed: None,
        }
    }

    /// Record a completed cycle and return the instantaneous rate.
    pub fn tick(&mut self) -> f32 {
        self.tick_at(Instant::now())
    }

    pub fn tick_at(&mut self, now: Instant) -> f32 {
        let dt = now.saturating_duration_since(self.last).as_secs_f32();
        self.last = now;
        let fps = if dt > 0.0 { 1.0 / dt } else { 0.0 };
        self.smoothed = Some(match self.smoothed {
            Some(prev) => prev + CADENCE_SMOOTHING * (fps - prev),
            None => fps,
        });
        fps
    }

    /// Exponential moving average of the rate, 0 before the first tick.
    pub fn average(&self) -> f32 {
        self.smoothed.unwrap_or(0.0)
    }
}

impl Default for CadenceMeter {
    fn default() -> Self {
        Self::new()
    }
}

// ----------------------------------------------------------------------------
// Navigator
// ----------------------------------------------------------------------------

/// Outcome of a completed run.
#[derive(Clone, Debug)]
pub struct RunSummary {
    /// Cycles that went all the way through planning.
    pub cycles: u64,
    /// Iterations that found no new valid frame.
    pub idle_polls: u64,
    /// Cycles abandoned after a non-fatal detector error.
    pub skipped_cycles: u64,
    pub commands_applied: u64,
    pub mean_fps: f32,
    /// Capture-to-decision latency of the last planned frame.
    pub frame_latency: Duration,
    pub final_status: ActionStatus,
}

#[derive(Default)]
struct Counters {
    cycles: u64,
    idle_polls: u64,
    skipped_cycles: u64,
    frame_latency: Duration,
}

pub struct Navigator<A: Actuator> {
    source: FrameSource,
    detector: Box<dyn Detector>,
    planner: PathPlanner,
    gate: ActionGate<A>,
    visualizer: Box<dyn Visualizer>,
    settings: RuntimeSettings,
    cadence: CadenceMeter,
}

impl<A: Actuator> Navigator<A> {
    pub fn new(
        source: FrameSource,
        detector: Box<dyn Detector>,
        planner: PathPlanner,
        gate: ActionGate<A>,
        visualizer: Box<dyn Visualizer>,
        settings: RuntimeSettings,
    ) -> Self {
        Self {
            source,
            detector,
            planner,
            gate,
            visualizer,
            settings,
            cadence: CadenceMeter::new(),
        }
    }

    /// Run until `quit` is set, the cycle limit is reached, or a fatal error.
    ///
    /// Shutdown runs on every exit path before the result is returned. A panic
    /// inside the cycle is re-raised after shutdown has run.
    pub fn run(&mut self, quit: &AtomicBool) -> Result<RunSummary> {
        let mut counters = Counters::default();
        let outcome =
            panic::catch_unwind(AssertUnwindSafe(|| self.cycle_loop(quit, &mut counters)));
        self.shutdown();

        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(payload) => {
                log::error!(
                    "navigator cycle panicked after {} cycles; actuator stopped",
                    counters.cycles
                );
                panic::resume_unwind(payload);
            }
        };

        if let Err(err) = &outcome {
            log::error!(
                "navigator stopped after {} cycles: {:#}",
                counters.cycles,
                err
            );
        }
        outcome?;

        Ok(RunSummary {
            cycles: counters.cycles,
            idle_polls: counters.idle_polls,
            skipped_cycles: counters.skipped_cycles,
            commands_applied: self.gate.applied_count(),
            mean_fps: self.cadence.average(),
            frame_latency: counters.frame_latency,
            final_status: self.gate.status(),
        })
    }

    pub fn gate(&self) -> &ActionGate<A> {
        &self.gate
    }

    fn cycle_loop(&mut self, quit: &AtomicBool, counters: &mut Counters) -> Result<()> {
        self.detector
            .load()
            .with_context(|| format!("initialize {} detector", self.detector.name()))?;
        self.gate.initialize();
        self.cadence = CadenceMeter::new();

        let mut last_sequence = 0u64;
        let mut last_health_log = Instant::now();

        while !quit.load(Ordering::SeqCst) {
            if self
                .settings
                .max_cycles
                .is_some_and(|max| counters.cycles >= max)
            {
                log::info!("cycle limit of {} reached", counters.cycles);
                break;
            }

            let frame = match self.source.read() {
                Some(frame) if frame.sequence() > last_sequence => frame,
                _ => {
                    counters.idle_polls += 1;
                    self.source
                        .wait_for_newer(last_sequence, self.settings.idle_wait);
                    continue;
                }
            };
            last_sequence = frame.sequence();

            let detections = match self.detector.detect(&frame) {
                Ok(detections) => detections,
                Err(err) if NavError::is_fatal_error(&err) => {
                    return Err(err.context("detector failed"));
                }
                Err(err) => {
                    counters.skipped_cycles += 1;
                    log::warn!(
                        "detection failed on frame #{}, skipping cycle: {:#}",
                        frame.sequence(),
                        err
                    );
                    continue;
                }
            };

            let decision = self.planner.plan(&detections);
            self.gate.execute_decision(&decision);
            counters.frame_latency = frame.age();
            let fps = self.cadence.tick();

            if let Err(err) = self
                .visualizer
                .render(&frame, &detections, &decision, fps)
            {
                log::warn!("render failed on frame #{}: {:#}", frame.sequence(), err);
            }
            counters.cycles += 1;

            if last_health_log.elapsed() >= self.settings.health_log_interval {
                self.log_health(counters);
                last_health_log = Instant::now();
            }
        }

        Ok(())
    }

    fn log_health(&self, counters: &Counters) {
        let stats = self.source.stats();
        log::info!(
            "camera={} running={} frames={} failures={} cycles={} idle={} skipped={} fps={:.1} latency={}ms action={}",
            stats.device,
            stats.running,
            stats.frames_captured,
            stats.capture_failures,
            counters.cycles,
            counters.idle_polls,
            counters.skipped_cycles,
            self.cadence.average(),
            counters.frame_latency.as_millis(),
            self.gate.status().action
        );
    }

    fn shutdown(&mut self) {
        log::info!("shutting down navigator");
        self.source.stop();
        self.gate.shutdown();
        self.visualizer.cleanup();
        log::info!("shutdown complete");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cadence_reports_instantaneous_rate() {
        let mut meter = CadenceMeter::new();
        let start = meter.last;
        let fps = meter.tick_at(start + Duration::from_millis(100));
        assert!((fps - 10.0).abs() < 0.01);
        assert!((meter.average() - 10.0).abs() < 0.01);

        let fps = meter.tick_at(start + Duration::from_millis(150));
        assert!((fps - 20.0).abs() < 0.01);
        // Smoothed value moves a tenth of the way toward the new sample.
        assert!((meter.average() - 11.0).abs() < 0.01);
    }

    #[test]
    fn cadence_handles_zero_interval() {
        let mut meter = CadenceMeter::new();
        let now = meter.last;
        assert_eq!(meter.tick_at(now), 0.0);
    }
}

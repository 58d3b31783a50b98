//! navd - reactive obstacle-avoidance daemon
//!
//! This daemon:
//! 1. Opens the camera and starts background frame acquisition
//! 2. Loads the configured detector
//! 3. Runs the detect -> plan -> gate cycle until Ctrl-C or a cycle limit
//! 4. Stops the camera and leaves the actuator stopped on every exit path

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use reactive_nav::config::NavConfig;
use reactive_nav::{
    build_detector, ActionGate, FrameSource, LogActuator, LogVisualizer, Navigator,
    NullVisualizer, PathPlanner, Visualizer,
};

#[path = "../ui.rs"]
mod ui;

#[derive(Parser, Debug)]
#[command(name = "navd", version, about = "Reactive obstacle-avoidance daemon")]
struct Args {
    /// Config file (.toml or .json).
    #[arg(long, env = "NAV_CONFIG", value_name = "PATH")]
    config: Option<PathBuf>,
    /// Camera device override (stub://name, index, or device path).
    #[arg(long, value_name = "DEVICE")]
    device: Option<String>,
    /// Stop after this many cycles.
    #[arg(long)]
    max_cycles: Option<u64>,
    /// Skip per-frame debug rendering.
    #[arg(long)]
    no_render: bool,
    /// UI mode for stderr progress.
    #[arg(long, value_enum, default_value = "auto")]
    ui: ui::UiMode,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let ui = ui::Ui::new(args.ui);

    let mut cfg = {
        let _stage = ui.stage("Load configuration");
        NavConfig::load_from(args.config.as_deref())?
    };
    if let Some(device) = args.device {
        cfg.camera.device = device;
    }
    if args.max_cycles.is_some() {
        cfg.runtime.max_cycles = args.max_cycles;
    }

    let quit = Arc::new(AtomicBool::new(false));
    let handler_quit = quit.clone();
    ctrlc::set_handler(move || {
        handler_quit.store(true, Ordering::SeqCst);
    })
    .context("install Ctrl-C handler")?;

    let source = {
        let _stage = ui.stage(&format!("Open camera {}", cfg.camera.device));
        FrameSource::start(&cfg.camera)?
    };

    let detector = {
        let _stage = ui.stage(&format!("Load {} detector", cfg.detector.backend));
        let mut detector = build_detector(&cfg.detector)?;
        detector.load()?;
        detector
    };

    let visualizer: Box<dyn Visualizer> = if args.no_render {
        Box::new(NullVisualizer)
    } else {
        Box::new(LogVisualizer::default())
    };

    let mut navigator = Navigator::new(
        source,
        detector,
        PathPlanner::new(cfg.planner),
        ActionGate::new(LogActuator),
        visualizer,
        cfg.runtime.clone(),
    );

    log::info!(
        "navd running (stop_area={} center={} min_confidence={}). Press Ctrl-C to quit.",
        cfg.planner.stop_area_threshold,
        cfg.planner.center_threshold,
        cfg.planner.min_confidence
    );

    let summary = navigator.run(&quit)?;
    log::info!(
        "navd finished: cycles={} idle={} skipped={} commands={} mean_fps={:.1}",
        summary.cycles,
        summary.idle_polls,
        summary.skipped_cycles,
        summary.commands_applied,
        summary.mean_fps
    );
    println!("{}", serde_json::to_string(&summary.final_status)?);
    Ok(())
}

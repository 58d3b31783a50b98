//! plan_replay - run recorded detections through the planner offline.
//!
//! Input is JSON Lines: each line is an array of detections for one frame,
//! e.g. `[{"bbox":[0.1,0.4,0.3,0.6],"score":0.8,"class_name":"chair"}]`.
//! Output is one JSON decision per line on stdout, followed by a summary on
//! stderr of how many actuation commands the gate would have issued.

use anyhow::{Context, Result};
use clap::Parser;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;

use reactive_nav::config::NavConfig;
use reactive_nav::{ActionGate, Actuator, Detection, NavAction, PathPlanner};

#[derive(Parser, Debug)]
#[command(name = "plan_replay", about = "Replay recorded detections through the planner")]
struct Args {
    /// JSON Lines file of detection arrays.
    #[arg(long, value_name = "PATH")]
    input: PathBuf,
    /// Config file supplying planner thresholds.
    #[arg(long, env = "NAV_CONFIG", value_name = "PATH")]
    config: Option<PathBuf>,
}

#[derive(Default)]
struct CountingActuator {
    commands: Vec<NavAction>,
}

impl Actuator for CountingActuator {
    fn apply(&mut self, action: NavAction) {
        self.commands.push(action);
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let args = Args::parse();
    let cfg = NavConfig::load_from(args.config.as_deref())?;

    let planner = PathPlanner::new(cfg.planner);
    let mut gate = ActionGate::new(CountingActuator::default());
    gate.initialize();

    let file = std::fs::File::open(&args.input)
        .with_context(|| format!("open {}", args.input.display()))?;
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    let mut frames = 0u64;

    for (index, line) in BufReader::new(file).lines().enumerate() {
        let line = line.with_context(|| format!("read line {}", index + 1))?;
        if line.trim().is_empty() {
            continue;
        }
        let detections: Vec<Detection> = serde_json::from_str(&line)
            .with_context(|| format!("invalid detections on line {}", index + 1))?;
        let decision = planner.plan(&detections);
        gate.execute_decision(&decision);
        writeln!(out, "{}", serde_json::to_string(&decision)?)?;
        frames += 1;
    }

    gate.shutdown();
    let commands = &gate.actuator().commands;
    eprintln!(
        "{} frames, {} actuation commands ({} excluding final stop)",
        frames,
        commands.len(),
        commands.len().saturating_sub(1)
    );
    Ok(())
}

//! # adapt
//!
//! Center-out reaching task with visuomotor rotation.
//!
//! ```bash
//! # Fullscreen session driven by the mouse, demo schedule
//! adapt s01
//!
//! # Scripted blocks and a custom setup
//! adapt s01 --config rig.toml --schedule blocks.toml
//!
//! # Headless run with a simulated subject
//! adapt sim --simulate --blocks 2 --seed 7 -v
//! ```

mod app;
mod simulate;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use adapt_experiment::{
    BlockSource, DemoSchedule, ExperimentConfig, ScheduleFile, SessionSummary, write_json,
};
use anyhow::{Context, Result};
use clap::Parser;
use tracing::{Level, error, info};
use tracing_subscriber::EnvFilter;

/// Visuomotor adaptation experiment
#[derive(Parser, Debug)]
#[command(name = "adapt")]
#[command(version)]
#[command(about = "Center-out reaching task with cursor rotation")]
struct Args {
    /// Subject identifier, used to name the data files.
    #[arg(default_value = "test")]
    subject: String,

    /// Experiment configuration (TOML). Built-in defaults when omitted.
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Block schedule (TOML). Endless demo blocks when omitted.
    #[arg(long, value_name = "FILE")]
    schedule: Option<PathBuf>,

    /// Run headless with a scripted subject instead of opening a window
    #[arg(short = 's', long)]
    simulate: bool,

    /// Stop after this many demo blocks (simulation defaults to 2)
    #[arg(long)]
    blocks: Option<u32>,

    /// Seed for random target selection
    #[arg(long)]
    seed: Option<u64>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Output logs in JSON format
    #[arg(long)]
    json: bool,
}

fn main() {
    if let Err(e) = run() {
        error!("adapt failed: {e:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let args = Args::parse();
    setup_tracing(&args);

    info!("adapt v{} starting", env!("CARGO_PKG_VERSION"));

    let config = match &args.config {
        Some(path) => ExperimentConfig::load(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => ExperimentConfig::default(),
    };
    let schedule = load_schedule(&args)?;
    let data_dir = config.data.directory.clone();

    let summary = if args.simulate {
        simulate::run(Arc::new(config), schedule, &args.subject, args.seed)?
    } else {
        app::App::new(config, schedule, args.subject.clone(), args.seed)?.run()?
    };

    write_summary(&data_dir, &args.subject, &summary)
}

fn load_schedule(args: &Args) -> Result<Box<dyn BlockSource>> {
    if let Some(path) = &args.schedule {
        let file = ScheduleFile::load(path)?;
        info!(path = %path.display(), blocks = file.remaining(), "schedule loaded");
        return Ok(Box::new(file));
    }

    let mut demo = DemoSchedule::new(args.seed);
    let limit = match (args.blocks, args.simulate) {
        (Some(n), _) => Some(n),
        (None, true) => Some(2),
        (None, false) => None,
    };
    if let Some(n) = limit {
        demo = demo.with_block_limit(n);
    }
    info!(?limit, "demo schedule");
    Ok(Box::new(demo))
}

fn write_summary(dir: &Path, subject: &str, summary: &SessionSummary) -> Result<()> {
    let path = dir.join(format!("{subject}_session.json"));
    write_json(&path, summary)?;
    info!(
        path = %path.display(),
        trials = summary.trials,
        completed = summary.completed,
        "session summary written"
    );
    Ok(())
}

fn setup_tracing(args: &Args) {
    let level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    if args.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

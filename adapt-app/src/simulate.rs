//! Headless run: a scripted subject reaches back and forth in real time
//! while nothing is drawn.

use std::sync::Arc;
use std::time::Duration;

use adapt_experiment::{
    BlockSource, ExperimentConfig, ScriptedMotion, Session, SessionSummary, TsvSink,
};
use adapt_render::NullRenderer;
use adapt_timing::MonotonicTimer;
use anyhow::Result;
use tracing::info;

/// Movement overshoots the target distance by this factor.
const OVERSHOOT: f64 = 1.25;
/// Duration of one simulated reach [s].
const REACH_TIME: f64 = 0.3;

/// Scripted subject for `config`: rests long enough for the hold and the
/// feedback period, then reaches past the target along each target
/// direction in turn.
fn subject(config: &ExperimentConfig) -> ScriptedMotion {
    let pause = config.loop_pause().max(Duration::from_micros(100)).as_secs_f64();
    let rest = config.target.hold_time.max(config.feedback.duration) + 0.2;
    let hold = (rest / pause).ceil() as usize;
    let extent = config.target.distance * OVERSHOOT;
    let step = extent * pause / REACH_TIME;

    let count = config.target.count.max(1);
    let headings = (0..count).map(|i| i as f64 * 360.0 / count as f64).collect();
    ScriptedMotion::center_out(headings, hold, step, extent)
}

pub fn run(
    config: Arc<ExperimentConfig>,
    schedule: Box<dyn BlockSource>,
    subject_id: &str,
    seed: Option<u64>,
) -> Result<SessionSummary> {
    let sink = TsvSink::new(&config.data.directory, subject_id)?;
    let motion = subject(&config);
    let mut session = Session::new(config, MonotonicTimer::new(), motion, schedule, sink)?;
    if let Some(seed) = seed {
        session = session.with_seed(seed);
    }

    let signals = session.signals();
    ctrlc::set_handler(move || {
        info!("interrupt received, aborting run");
        signals.run.trigger();
    })?;

    info!(subject = subject_id, "simulated session starting");
    let mut renderer = NullRenderer::new();
    let summary = session.run(&mut renderer)?;
    info!(frames = renderer.frames(), "simulated session done");
    Ok(summary)
}

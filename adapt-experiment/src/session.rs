//! Block and trial runner.
//!
//! A [`Session`] owns the clock, the cursor and the single trial in
//! progress. [`Session::tick`] performs exactly one loop iteration, so the
//! same code drives a windowed event loop and the blocking
//! [`Session::run`].

use std::sync::Arc;

use adapt_core::{Target, TargetSpec, TrajectorySample, TrialRecord};
use adapt_render::{Renderer, draw_scene};
use adapt_timing::{ClockError, LoopStats, Scheduler, Stopwatch, StopwatchClock, TimeSource};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::{ConfigError, ExperimentConfig};
use crate::cursor::Cursor;
use crate::machine::{Observation, Thresholds};
use crate::motion::MotionSource;
use crate::schedule::{BlockSource, BlockSpec, TrialSpec};
use crate::signals::AbortSignals;
use crate::sink::{DataSink, SinkError};
use crate::trial::{Trial, TrialOutcome, TrialSetup};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Clock(#[from] ClockError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Sink(#[from] SinkError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    /// No block is active; waiting for [`Session::start_next_block`].
    Idle,
    Running,
    BlockFinished { block: u32 },
    Finished,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tick {
    pub status: SessionStatus,
    /// A frame was drawn during this iteration.
    pub rendered: bool,
    /// Set on the iteration a trial ended.
    pub trial_ended: Option<TrialOutcome>,
}

impl Tick {
    fn quiet(status: SessionStatus) -> Self {
        Self {
            status,
            rendered: false,
            trial_ended: None,
        }
    }
}

/// Running totals over the whole session.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SessionSummary {
    pub blocks: u32,
    pub blocks_skipped: u32,
    pub trials: u32,
    pub completed: u32,
    pub aborted: u32,
    pub device_failures: u32,
    pub mean_reaction_time: Option<f64>,
    pub mean_movement_time: Option<f64>,
    /// Mean main-loop period within trials [s].
    pub mean_loop_period: Option<f64>,
    /// Standard deviation of the loop period within trials [s].
    pub loop_jitter: Option<f64>,
    #[serde(skip)]
    rt: (f64, u32),
    #[serde(skip)]
    mt: (f64, u32),
    #[serde(skip)]
    loops: LoopStats,
}

impl SessionSummary {
    fn record(&mut self, outcome: TrialOutcome, record: &TrialRecord) {
        self.trials += 1;
        match outcome {
            TrialOutcome::Completed => self.completed += 1,
            TrialOutcome::AbortedBlock | TrialOutcome::AbortedRun => self.aborted += 1,
            TrialOutcome::DeviceFailed => self.device_failures += 1,
        }

        fn add(acc: &mut (f64, u32), v: Option<f64>) -> Option<f64> {
            if let Some(v) = v {
                acc.0 += v;
                acc.1 += 1;
            }
            (acc.1 > 0).then(|| acc.0 / acc.1 as f64)
        }
        self.mean_reaction_time = add(&mut self.rt, record.reaction_time);
        self.mean_movement_time = add(&mut self.mt, record.movement_time);
    }

    fn record_loops(&mut self, stats: &LoopStats) {
        self.loops.merge(stats);
        if self.loops.count > 0 {
            self.mean_loop_period = Some(self.loops.mean_dt());
            self.loop_jitter = Some(self.loops.jitter());
        }
    }
}

#[derive(Debug)]
struct ActiveBlock {
    number: u32,
    spec: BlockSpec,
    next: usize,
}

impl ActiveBlock {
    fn next_trial(&mut self) -> Option<(u32, TrialSpec)> {
        let spec = *self.spec.trials.get(self.next)?;
        self.next += 1;
        Some((self.next as u32, spec))
    }

    fn has_more(&self) -> bool {
        self.next < self.spec.trials.len()
    }
}

pub struct Session<T, M, B, K>
where
    T: TimeSource,
    M: MotionSource,
    B: BlockSource,
    K: DataSink,
{
    config: Arc<ExperimentConfig>,
    clock: StopwatchClock<T>,
    cursor: Cursor<M>,
    scheduler: Scheduler,
    schedule: B,
    sink: K,
    signals: AbortSignals,
    rng: StdRng,
    blocks_started: u32,
    block: Option<ActiveBlock>,
    trial: Option<Trial>,
    summary: SessionSummary,
    finished: bool,
}

impl<T, M, B, K> Session<T, M, B, K>
where
    T: TimeSource,
    M: MotionSource,
    B: BlockSource,
    K: DataSink,
{
    pub fn new(
        config: Arc<ExperimentConfig>,
        time: T,
        motion: M,
        schedule: B,
        sink: K,
    ) -> Result<Self, SessionError> {
        config.validate()?;
        let clock = StopwatchClock::new(time)?;
        let scheduler = Scheduler::new(config.timing.sample_rate, config.timing.graphics_rate)?;
        let cursor = Cursor::new(motion, config.center(), &config.cursor);

        Ok(Self {
            config,
            clock,
            cursor,
            scheduler,
            schedule,
            sink,
            signals: AbortSignals::new(),
            rng: StdRng::from_os_rng(),
            blocks_started: 0,
            block: None,
            trial: None,
            summary: SessionSummary::default(),
            finished: false,
        })
    }

    /// Fixes the random target sequence.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    /// Shares externally created abort flags (key handlers, Ctrl-C).
    pub fn with_signals(mut self, signals: AbortSignals) -> Self {
        self.signals = signals;
        self
    }

    pub fn signals(&self) -> AbortSignals {
        self.signals.clone()
    }

    pub fn config(&self) -> &ExperimentConfig {
        &self.config
    }

    pub fn summary(&self) -> &SessionSummary {
        &self.summary
    }

    pub fn sink(&self) -> &K {
        &self.sink
    }

    pub fn cursor(&self) -> &Cursor<M> {
        &self.cursor
    }

    pub fn clock(&self) -> &StopwatchClock<T> {
        &self.clock
    }

    pub fn current_trial(&self) -> Option<&Trial> {
        self.trial.as_ref()
    }

    /// Number of the active block, if any.
    pub fn active_block(&self) -> Option<u32> {
        self.block.as_ref().map(|b| b.number)
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn into_sink(self) -> K {
        self.sink
    }

    /// Pulls blocks from the schedule until one can be run.
    ///
    /// Malformed and empty blocks are skipped with a warning. Returns the
    /// new block number, or `None` once the schedule is exhausted or the
    /// run was aborted.
    pub fn start_next_block(&mut self) -> Option<u32> {
        if self.signals.run.is_triggered() {
            self.finished = true;
        }
        if self.finished {
            return None;
        }
        if let Some(block) = &self.block {
            return Some(block.number);
        }

        loop {
            match self.schedule.next_block() {
                None => {
                    info!(blocks = self.blocks_started, "schedule exhausted");
                    self.finished = true;
                    return None;
                }
                Some(Err(e)) => {
                    warn!(error = %e, "skipping block");
                    self.summary.blocks_skipped += 1;
                }
                Some(Ok(spec)) if spec.is_empty() => {
                    warn!("skipping block without trials");
                    self.summary.blocks_skipped += 1;
                }
                Some(Ok(spec)) => {
                    if let Err(reason) = self.check_distances(&spec) {
                        warn!(%reason, "skipping block");
                        self.summary.blocks_skipped += 1;
                        continue;
                    }
                    self.blocks_started += 1;
                    self.summary.blocks += 1;
                    let number = self.blocks_started;

                    self.signals.block.clear();
                    let home = self.cursor.re_center();
                    info!(
                        block = number,
                        trials = spec.len(),
                        rotation = spec.rotation,
                        home_x = home.0,
                        home_y = home.1,
                        "block started"
                    );
                    self.block = Some(ActiveBlock {
                        number,
                        spec,
                        next: 0,
                    });
                    return Some(number);
                }
            }
        }
    }

    /// One loop iteration: clock, cursor, abort flags, sampling and
    /// rendering, then the state guard.
    pub fn tick<R: Renderer + ?Sized>(&mut self, renderer: &mut R) -> Result<Tick, SessionError> {
        if self.finished {
            return Ok(Tick::quiet(SessionStatus::Finished));
        }
        if self.block.is_none() {
            return Ok(Tick::quiet(SessionStatus::Idle));
        }

        if self.trial.is_none() {
            if self.signals.run.is_triggered() {
                self.finished = true;
                return Ok(self.end_block(renderer));
            }
            if self.signals.block.is_triggered() {
                return Ok(self.end_block(renderer));
            }
            if !self.start_trial()? {
                return Ok(self.end_block(renderer));
            }
        }

        self.clock.update()?;

        if let Err(e) = self.cursor.update() {
            warn!(error = %e, "motion device failed");
            return self.end_trial(TrialOutcome::DeviceFailed, renderer, false);
        }

        if self.signals.run.is_triggered() {
            return self.end_trial(TrialOutcome::AbortedRun, renderer, false);
        }
        if self.signals.block.is_triggered() {
            return self.end_trial(TrialOutcome::AbortedBlock, renderer, false);
        }

        let Some(trial) = self.trial.as_mut() else {
            return Ok(Tick::quiet(SessionStatus::Running));
        };

        let fired = self.scheduler.poll(&mut self.clock);
        let raw = self.cursor.raw();
        let display = self.cursor.display();

        if fired.sample {
            trial.push_sample(TrajectorySample {
                time: self.clock.get(Stopwatch::Trial),
                state: trial.state(),
                raw_x: raw.0,
                raw_y: raw.1,
                display_x: display.0,
                display_y: display.1,
            });
        }

        let mut rendered = false;
        if fired.render {
            let scene = trial.scene(&self.config, display);
            match draw_scene(renderer, &scene) {
                Ok(()) => rendered = true,
                Err(e) => warn!(error = %e, "frame dropped"),
            }
        }

        let obs = Observation {
            displacement: self.cursor.visual_displacement(),
            phase_elapsed: self.clock.get(Stopwatch::Phase),
            raw,
            display,
            center: self.cursor.center(),
        };
        if trial.advance(&obs, &mut self.clock).is_terminal() {
            return self.end_trial(TrialOutcome::Completed, renderer, rendered);
        }

        Ok(Tick {
            status: SessionStatus::Running,
            rendered,
            trial_ended: None,
        })
    }

    /// Runs blocks back to back until the schedule is exhausted or the run
    /// is aborted, pausing between iterations.
    pub fn run<R: Renderer + ?Sized>(
        &mut self,
        renderer: &mut R,
    ) -> Result<SessionSummary, SessionError> {
        let pause = self.config.loop_pause();
        loop {
            if self.block.is_none() && self.start_next_block().is_none() {
                break;
            }
            if self.tick(renderer)?.status == SessionStatus::Finished {
                break;
            }
            self.clock.source().sleep(pause);
        }
        let loops = &self.summary.loops;
        info!(
            trials = self.summary.trials,
            completed = self.summary.completed,
            aborted = self.summary.aborted,
            loop_rate = loops.effective_rate(),
            loop_jitter = loops.jitter(),
            "session finished"
        );
        Ok(self.summary.clone())
    }

    /// Ends the run from outside the loop (window closed, shutdown), still
    /// flushing the trial in progress.
    pub fn abort_run<R: Renderer + ?Sized>(
        &mut self,
        renderer: &mut R,
    ) -> Result<Tick, SessionError> {
        self.signals.run.trigger();
        let mut tick = if self.block.is_some() && !self.finished {
            self.tick(renderer)?
        } else {
            Tick::quiet(SessionStatus::Finished)
        };
        self.finished = true;
        tick.status = SessionStatus::Finished;
        Ok(tick)
    }

    /// Explicit targets must put the early checkpoint outside fixation,
    /// like the configured distance does.
    fn check_distances(&self, spec: &BlockSpec) -> Result<(), String> {
        let center = self.config.center();
        let minimum = 4.0 * self.config.fixation.radius;
        for (i, trial) in spec.trials.iter().enumerate() {
            let Some(target) = trial.target.resolve(center, self.config.target.distance) else {
                continue;
            };
            if target.distance <= minimum {
                return Err(format!(
                    "trial {}: target distance {} must exceed four fixation radii ({minimum})",
                    i + 1,
                    target.distance
                ));
            }
        }
        Ok(())
    }

    fn resolve_target(&mut self, spec: &TargetSpec) -> Target {
        let center = self.config.center();
        let distance = self.config.target.distance;
        spec.resolve(center, distance).unwrap_or_else(|| {
            let count = self.config.target.count;
            Target::direction(center, distance, self.rng.random_range(0..count), count)
        })
    }

    /// Returns `false` when the active block has no trials left.
    fn start_trial(&mut self) -> Result<bool, SessionError> {
        let Some(block) = self.block.as_mut() else {
            return Ok(false);
        };
        let block_number = block.number;
        let block_rotation = block.spec.rotation;
        let block_cursor = block.spec.cursor_visible;
        let Some((number, spec)) = block.next_trial() else {
            return Ok(false);
        };

        // the gap since the last trial must not count towards this one
        self.clock.update()?;
        self.clock.reset(Stopwatch::Trial);
        self.clock.reset(Stopwatch::Phase);
        self.clock.reset_stats();
        self.scheduler.restart(&mut self.clock);

        let rotation = spec.rotation.unwrap_or(block_rotation);
        self.cursor.set_rotation_deg(rotation);
        let target = self.resolve_target(&spec.target);

        let setup = TrialSetup {
            block: block_number,
            number,
            target,
            rotation,
            cursor_visible: spec.cursor_visible.unwrap_or(block_cursor),
            start_time: self.clock.get(Stopwatch::Session),
        };
        debug!(
            block = block_number,
            trial = number,
            target_angle = target.angle,
            rotation,
            "trial started"
        );
        self.trial = Some(Trial::new(setup, Thresholds::new(&self.config, target.distance)));
        Ok(true)
    }

    fn end_trial<R: Renderer + ?Sized>(
        &mut self,
        outcome: TrialOutcome,
        renderer: &mut R,
        rendered: bool,
    ) -> Result<Tick, SessionError> {
        let Some(trial) = self.trial.take() else {
            return Ok(Tick::quiet(SessionStatus::Running));
        };
        let block = trial.block();
        let number = trial.number();
        let state = trial.state();
        let (record, samples) = trial.into_parts();

        self.sink.write_summary(&record)?;
        self.sink
            .write_trajectory(block, &samples, &format!("Trial {number}:"))?;
        self.summary.record(outcome, &record);
        self.summary.record_loops(self.clock.stats());

        info!(
            block,
            trial = number,
            ?outcome,
            ?state,
            samples = samples.len(),
            reaction_time = record.reaction_time,
            movement_time = record.movement_time,
            "trial ended"
        );

        let more = self.block.as_ref().is_some_and(ActiveBlock::has_more);
        let mut tick = match outcome {
            TrialOutcome::Completed if more => Tick::quiet(SessionStatus::Running),
            TrialOutcome::Completed | TrialOutcome::AbortedBlock | TrialOutcome::DeviceFailed => {
                self.end_block(renderer)
            }
            TrialOutcome::AbortedRun => {
                self.finished = true;
                self.end_block(renderer)
            }
        };
        tick.rendered |= rendered;
        tick.trial_ended = Some(outcome);
        Ok(tick)
    }

    fn end_block<R: Renderer + ?Sized>(&mut self, renderer: &mut R) -> Tick {
        let number = self.block.take().map_or(0, |b| b.number);
        renderer.clear();
        let rendered = match renderer.present() {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "cannot blank screen");
                false
            }
        };
        info!(block = number, "block finished");

        let status = if self.finished {
            SessionStatus::Finished
        } else {
            SessionStatus::BlockFinished { block: number }
        };
        Tick {
            status,
            rendered,
            trial_ended: None,
        }
    }
}

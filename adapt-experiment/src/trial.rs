use adapt_core::{Target, TrajectorySample, TrialRecord, TrialState};
use adapt_render::Scene;
use adapt_timing::{Stopwatch, StopwatchClock, TimeSource};

use crate::config::ExperimentConfig;
use crate::machine::{self, Effect, Observation, Thresholds};

/// How a trial ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrialOutcome {
    Completed,
    AbortedBlock,
    AbortedRun,
    DeviceFailed,
}

impl TrialOutcome {
    pub fn is_completed(self) -> bool {
        self == TrialOutcome::Completed
    }
}

/// Everything fixed at trial start.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrialSetup {
    pub block: u32,
    /// 1-based within the block.
    pub number: u32,
    pub target: Target,
    pub rotation: f64,
    pub cursor_visible: bool,
    /// Session stopwatch at trial start [s].
    pub start_time: f64,
}

/// The trial in progress. Owns its record and trajectory until it ends.
#[derive(Debug, Clone)]
pub struct Trial {
    setup: TrialSetup,
    thresholds: Thresholds,
    state: TrialState,
    record: TrialRecord,
    trajectory: Vec<TrajectorySample>,
    target_on: bool,
    feedback_on: bool,
    feedback_point: Option<(f64, f64)>,
}

impl Trial {
    pub fn new(setup: TrialSetup, thresholds: Thresholds) -> Self {
        let mut record = TrialRecord::template();
        record.block_number = Some(setup.block);
        record.trial_number = Some(setup.number);
        record.start_time = Some(setup.start_time);
        record.rotation = Some(setup.rotation);
        record.cursor_visible = Some(setup.cursor_visible);
        record.target = Some(setup.target);

        Self {
            setup,
            thresholds,
            state: TrialState::Starting,
            record,
            trajectory: Vec::new(),
            target_on: false,
            feedback_on: false,
            feedback_point: None,
        }
    }

    pub fn setup(&self) -> &TrialSetup {
        &self.setup
    }

    pub fn number(&self) -> u32 {
        self.setup.number
    }

    pub fn block(&self) -> u32 {
        self.setup.block
    }

    pub fn target(&self) -> Target {
        self.setup.target
    }

    pub fn thresholds(&self) -> &Thresholds {
        &self.thresholds
    }

    pub fn state(&self) -> TrialState {
        self.state
    }

    pub fn record(&self) -> &TrialRecord {
        &self.record
    }

    pub fn trajectory(&self) -> &[TrajectorySample] {
        &self.trajectory
    }

    pub fn push_sample(&mut self, sample: TrajectorySample) {
        self.trajectory.push(sample);
    }

    /// Evaluates the state guard once and applies its effects.
    pub fn advance<T: TimeSource>(
        &mut self,
        obs: &Observation,
        clock: &mut StopwatchClock<T>,
    ) -> TrialState {
        let step = machine::step(self.state, obs, &self.thresholds);
        for effect in &step.effects {
            self.apply(effect, clock);
        }
        self.state = step.next;
        self.state
    }

    fn apply<T: TimeSource>(&mut self, effect: &Effect, clock: &mut StopwatchClock<T>) {
        match *effect {
            Effect::ResetPhaseTimer => clock.reset(Stopwatch::Phase),
            Effect::ShowTarget => self.target_on = true,
            Effect::ReactionTime { time, raw } => self.record.record_reaction(time, raw),
            Effect::Checkpoint(cp) => self.record.record_checkpoint(&cp),
            Effect::Feedback { display, angle_deg } => {
                self.record.record_feedback(display, angle_deg);
                self.feedback_point = Some(display);
            }
            Effect::ShowFeedback => self.feedback_on = self.setup.cursor_visible,
        }
    }

    /// What should be on screen with the cursor at `cursor`.
    ///
    /// With the cursor hidden for this trial it is only drawn while the
    /// subject returns to the fixation spot, and no endpoint feedback is
    /// given.
    pub fn scene(&self, config: &ExperimentConfig, cursor: (f64, f64)) -> Scene {
        Scene {
            center: config.center(),
            fixation_radius: config.fixation.radius,
            fixation_stroke: config.fixation.stroke,
            cursor_radius: config.cursor.radius,
            target_radius: config.target.radius,
            show_fixation: true,
            show_cursor: self.setup.cursor_visible || !self.target_on,
            show_target: self.target_on,
            show_feedback: self.feedback_on,
            cursor,
            target: Some(self.setup.target),
            feedback: self.feedback_point,
        }
    }

    pub fn into_parts(self) -> (TrialRecord, Vec<TrajectorySample>) {
        (self.record, self.trajectory)
    }
}

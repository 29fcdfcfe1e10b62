//! Per-trial state machine.
//!
//! [`step`] is a pure function of the current state and one iteration's
//! observation. It returns the next state and the side effects the caller
//! must apply; it never touches clocks, records or the screen itself.

use adapt_core::{Checkpoint, CheckpointKind, TrialState, offset_angle_deg};

use crate::config::ExperimentConfig;

/// Guard parameters for one trial.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    pub fixation_radius: f64,
    pub hold_time: f64,
    pub target_distance: f64,
    pub feedback_duration: f64,
}

impl Thresholds {
    pub fn new(config: &ExperimentConfig, target_distance: f64) -> Self {
        Self {
            fixation_radius: config.fixation.radius,
            hold_time: config.target.hold_time,
            target_distance,
            feedback_duration: config.feedback.duration,
        }
    }
}

/// Everything the guards look at, sampled after the clock and cursor
/// updates of the current iteration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Observation {
    pub displacement: f64,
    /// Phase stopwatch [s].
    pub phase_elapsed: f64,
    pub raw: (f64, f64),
    pub display: (f64, f64),
    pub center: (f64, f64),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Effect {
    ResetPhaseTimer,
    ShowTarget,
    /// Cursor left fixation.
    ReactionTime { time: f64, raw: (f64, f64) },
    Checkpoint(Checkpoint),
    /// On-screen landing point shown as feedback.
    Feedback { display: (f64, f64), angle_deg: f64 },
    ShowFeedback,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    pub next: TrialState,
    pub effects: Vec<Effect>,
}

impl Step {
    fn stay(state: TrialState) -> Self {
        Self {
            next: state,
            effects: Vec::new(),
        }
    }

    fn to(next: TrialState, effects: Vec<Effect>) -> Self {
        Self { next, effects }
    }
}

fn checkpoint(kind: CheckpointKind, obs: &Observation) -> Effect {
    Effect::Checkpoint(Checkpoint {
        kind,
        time: obs.phase_elapsed,
        raw: obs.raw,
        angle_deg: offset_angle_deg(obs.raw.0, obs.raw.1),
    })
}

fn crossed(kind: CheckpointKind, obs: &Observation, th: &Thresholds) -> bool {
    obs.displacement >= th.target_distance * kind.fraction()
}

/// Evaluates the guard of `state` once.
pub fn step(state: TrialState, obs: &Observation, th: &Thresholds) -> Step {
    use TrialState::*;

    match state {
        Starting if obs.displacement < th.fixation_radius => {
            Step::to(Waiting, vec![Effect::ResetPhaseTimer])
        }
        Waiting if obs.phase_elapsed >= th.hold_time => {
            Step::to(WaitForRt, vec![Effect::ResetPhaseTimer, Effect::ShowTarget])
        }
        WaitForRt if obs.displacement >= th.fixation_radius => Step::to(
            MovingEarly,
            vec![
                Effect::ReactionTime {
                    time: obs.phase_elapsed,
                    raw: obs.raw,
                },
                Effect::ResetPhaseTimer,
            ],
        ),
        MovingEarly if crossed(CheckpointKind::Early, obs, th) => {
            Step::to(MovingMidpoint, vec![checkpoint(CheckpointKind::Early, obs)])
        }
        MovingMidpoint if crossed(CheckpointKind::Midpoint, obs, th) => {
            Step::to(Moving, vec![checkpoint(CheckpointKind::Midpoint, obs)])
        }
        Moving if crossed(CheckpointKind::Final, obs, th) => {
            let offset = (obs.display.0 - obs.center.0, obs.display.1 - obs.center.1);
            Step::to(
                Feedback,
                vec![
                    checkpoint(CheckpointKind::Final, obs),
                    Effect::Feedback {
                        display: obs.display,
                        angle_deg: offset_angle_deg(offset.0, offset.1),
                    },
                    Effect::ResetPhaseTimer,
                    Effect::ShowFeedback,
                ],
            )
        }
        Feedback if obs.phase_elapsed >= th.feedback_duration => Step::to(Finished, Vec::new()),
        other => Step::stay(other),
    }
}

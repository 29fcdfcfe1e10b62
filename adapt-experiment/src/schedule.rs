//! Where blocks of trials come from.
//!
//! A schedule file is TOML with one `[[block]]` table per block:
//!
//! ```toml
//! [[block]]
//! rotation = 0.0
//! random_trials = 8
//!
//! [[block]]
//! rotation = 30.0
//! cursor_visible = false
//! trials = [
//!     { angle = 45.0, distance = 150.0 },
//!     { x = 0.0, y = -200.0, rotation = 0.0 },
//!     {},
//! ]
//! ```
//!
//! Blocks are validated one at a time, so a malformed block is reported
//! where it occurs and the rest of the file stays usable.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use adapt_core::TargetSpec;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Deserialize;
use thiserror::Error;

/// Trials in each demo block.
pub const DEMO_TRIALS_PER_BLOCK: usize = 24;
/// Magnitude of the demo perturbation [deg].
pub const DEMO_ROTATION: f64 = 45.0;
/// Upper bound on the trials of one scheduled block.
pub const MAX_TRIALS_PER_BLOCK: usize = 10_000;

#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("cannot read schedule {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("schedule parse error: {0}")]
    Parse(String),
    #[error("block {index} is malformed: {reason}")]
    MalformedBlock { index: usize, reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TrialSpec {
    pub target: TargetSpec,
    /// Overrides the block rotation for this trial [deg].
    pub rotation: Option<f64>,
    /// Overrides the block cursor visibility for this trial.
    pub cursor_visible: Option<bool>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BlockSpec {
    /// Visuomotor rotation applied to every trial of the block [deg].
    pub rotation: f64,
    pub cursor_visible: bool,
    pub trials: Vec<TrialSpec>,
}

impl BlockSpec {
    /// Block of `n` random-target trials.
    pub fn random(rotation: f64, n: usize) -> Self {
        Self {
            rotation,
            cursor_visible: true,
            trials: vec![TrialSpec::default(); n],
        }
    }

    pub fn len(&self) -> usize {
        self.trials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trials.is_empty()
    }
}

pub trait BlockSource {
    /// Next block, `Some(Err(..))` for a block that cannot be run, `None`
    /// when the schedule is exhausted.
    fn next_block(&mut self) -> Option<Result<BlockSpec, ScheduleError>>;
}

impl<S: BlockSource + ?Sized> BlockSource for Box<S> {
    fn next_block(&mut self) -> Option<Result<BlockSpec, ScheduleError>> {
        (**self).next_block()
    }
}

#[derive(Debug, Deserialize)]
struct RawSchedule {
    #[serde(default)]
    block: Vec<toml::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawBlock {
    #[serde(default)]
    rotation: f64,
    cursor_visible: Option<bool>,
    trials: Option<Vec<RawTrial>>,
    random_trials: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawTrial {
    angle: Option<f64>,
    distance: Option<f64>,
    x: Option<f64>,
    y: Option<f64>,
    rotation: Option<f64>,
    cursor_visible: Option<bool>,
}

fn finite(name: &str, v: Option<f64>) -> Result<(), String> {
    match v {
        Some(v) if !v.is_finite() => Err(format!("{name} must be finite, got {v}")),
        _ => Ok(()),
    }
}

impl RawTrial {
    fn into_spec(self) -> Result<TrialSpec, String> {
        finite("angle", self.angle)?;
        finite("distance", self.distance)?;
        finite("x", self.x)?;
        finite("y", self.y)?;
        finite("rotation", self.rotation)?;

        if let Some(d) = self.distance {
            if d <= 0.0 {
                return Err(format!("distance must be positive, got {d}"));
            }
        }

        let target = match (self.angle, self.x, self.y) {
            (Some(angle), _, _) => TargetSpec::Polar {
                angle,
                distance: self.distance,
            },
            (None, Some(x), Some(y)) => {
                if x.hypot(y) == 0.0 {
                    return Err("target coincides with the start position".into());
                }
                TargetSpec::Cartesian { x, y }
            }
            (None, Some(_), None) | (None, None, Some(_)) => {
                return Err("target needs both x and y".into());
            }
            (None, None, None) => {
                if self.distance.is_some() {
                    return Err("distance given without angle".into());
                }
                TargetSpec::Random
            }
        };

        Ok(TrialSpec {
            target,
            rotation: self.rotation,
            cursor_visible: self.cursor_visible,
        })
    }
}

fn within_limit(n: usize) -> Result<(), String> {
    if n > MAX_TRIALS_PER_BLOCK {
        return Err(format!("{n} trials exceed the limit of {MAX_TRIALS_PER_BLOCK} per block"));
    }
    Ok(())
}

impl RawBlock {
    fn into_spec(self) -> Result<BlockSpec, String> {
        if !self.rotation.is_finite() {
            return Err(format!("rotation must be finite, got {}", self.rotation));
        }

        let trials = match (self.trials, self.random_trials) {
            (Some(_), Some(_)) => {
                return Err("give either trials or random_trials, not both".into());
            }
            (Some(trials), None) => {
                within_limit(trials.len())?;
                trials
                    .into_iter()
                    .enumerate()
                    .map(|(i, t)| t.into_spec().map_err(|e| format!("trial {}: {e}", i + 1)))
                    .collect::<Result<Vec<_>, _>>()?
            }
            (None, Some(n)) => {
                within_limit(n)?;
                vec![TrialSpec::default(); n]
            }
            (None, None) => Vec::new(),
        };

        if trials.is_empty() {
            return Err("block has no trials".into());
        }

        Ok(BlockSpec {
            rotation: self.rotation,
            cursor_visible: self.cursor_visible.unwrap_or(true),
            trials,
        })
    }
}

/// Blocks read from a TOML schedule, in file order.
#[derive(Debug)]
pub struct ScheduleFile {
    blocks: VecDeque<Result<BlockSpec, ScheduleError>>,
}

impl ScheduleFile {
    pub fn load(path: &Path) -> Result<Self, ScheduleError> {
        let content = std::fs::read_to_string(path).map_err(|source| ScheduleError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Fails only when the document itself is unreadable; individual
    /// blocks that do not validate are yielded as errors.
    pub fn from_toml_str(content: &str) -> Result<Self, ScheduleError> {
        let raw: RawSchedule =
            toml::from_str(content).map_err(|e| ScheduleError::Parse(e.to_string()))?;

        let blocks = raw
            .block
            .into_iter()
            .enumerate()
            .map(|(i, value)| {
                let index = i + 1;
                value
                    .try_into::<RawBlock>()
                    .map_err(|e| e.to_string())
                    .and_then(RawBlock::into_spec)
                    .map_err(|reason| ScheduleError::MalformedBlock { index, reason })
            })
            .collect();

        Ok(Self { blocks })
    }

    /// Blocks not yet handed out, including malformed ones.
    pub fn remaining(&self) -> usize {
        self.blocks.len()
    }
}

impl BlockSource for ScheduleFile {
    fn next_block(&mut self) -> Option<Result<BlockSpec, ScheduleError>> {
        self.blocks.pop_front()
    }
}

/// Endless demo schedule: unperturbed odd blocks, even blocks rotated by
/// plus or minus [`DEMO_ROTATION`] at random.
#[derive(Debug)]
pub struct DemoSchedule {
    rng: StdRng,
    served: u32,
    trials_per_block: usize,
    limit: Option<u32>,
}

impl DemoSchedule {
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self {
            rng,
            served: 0,
            trials_per_block: DEMO_TRIALS_PER_BLOCK,
            limit: None,
        }
    }

    pub fn with_trials_per_block(mut self, n: usize) -> Self {
        self.trials_per_block = n;
        self
    }

    /// Stops after `blocks` blocks instead of running forever.
    pub fn with_block_limit(mut self, blocks: u32) -> Self {
        self.limit = Some(blocks);
        self
    }
}

impl BlockSource for DemoSchedule {
    fn next_block(&mut self) -> Option<Result<BlockSpec, ScheduleError>> {
        if self.limit.is_some_and(|limit| self.served >= limit) {
            return None;
        }
        self.served += 1;
        let rotation = if self.served % 2 == 0 {
            if self.rng.random_bool(0.5) {
                DEMO_ROTATION
            } else {
                -DEMO_ROTATION
            }
        } else {
            0.0
        };
        Some(Ok(BlockSpec::random(rotation, self.trials_per_block)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blocks(src: &str) -> Vec<Result<BlockSpec, ScheduleError>> {
        let mut file = ScheduleFile::from_toml_str(src).unwrap();
        std::iter::from_fn(|| file.next_block()).collect()
    }

    #[test]
    fn parses_explicit_and_random_blocks() {
        let out = blocks(
            r#"
            [[block]]
            random_trials = 3

            [[block]]
            rotation = 30
            cursor_visible = false
            trials = [
                { angle = 45.0, distance = 150.0 },
                { x = 0.0, y = -200.0, rotation = 0.0 },
                { cursor_visible = true },
            ]
            "#,
        );
        assert_eq!(out.len(), 2);

        let first = out[0].as_ref().unwrap();
        assert_eq!(first.rotation, 0.0);
        assert!(first.cursor_visible);
        assert_eq!(first.len(), 3);
        assert!(first.trials.iter().all(|t| t.target == TargetSpec::Random));

        let second = out[1].as_ref().unwrap();
        assert_eq!(second.rotation, 30.0);
        assert!(!second.cursor_visible);
        assert_eq!(
            second.trials[0].target,
            TargetSpec::Polar {
                angle: 45.0,
                distance: Some(150.0)
            }
        );
        assert_eq!(second.trials[1].target, TargetSpec::Cartesian { x: 0.0, y: -200.0 });
        assert_eq!(second.trials[1].rotation, Some(0.0));
        assert_eq!(second.trials[2].cursor_visible, Some(true));
    }

    #[test]
    fn angle_wins_over_coordinates() {
        let out = blocks("[[block]]\ntrials = [{ angle = 90.0, x = 5.0, y = 5.0 }]\n");
        let block = out[0].as_ref().unwrap();
        assert!(matches!(block.trials[0].target, TargetSpec::Polar { angle, .. } if angle == 90.0));
    }

    #[test]
    fn malformed_block_does_not_poison_the_rest() {
        let out = blocks(
            r#"
            [[block]]
            random_trials = 2

            [[block]]
            trials = [{ x = 10.0 }]

            [[block]]
            trials = [{ angle = 0.0, distance = -5.0 }]

            [[block]]
            trials = []

            [[block]]
            trials = [{ angel = 10.0 }]

            [[block]]
            random_trials = 1
            "#,
        );
        assert_eq!(out.len(), 6);
        assert!(out[0].is_ok());
        for (i, res) in out.iter().enumerate().take(5).skip(1) {
            match res {
                Err(ScheduleError::MalformedBlock { index, .. }) => assert_eq!(*index, i + 1),
                other => panic!("block {} should be malformed: {other:?}", i + 1),
            }
        }
        assert!(out[5].is_ok());
    }

    #[test]
    fn oversized_block_is_malformed() {
        let src = format!(
            "[[block]]\nrandom_trials = 100000000000000000\n\n[[block]]\nrandom_trials = {}\n\n[[block]]\nrandom_trials = 2\n",
            MAX_TRIALS_PER_BLOCK + 1
        );
        let out = blocks(&src);
        assert_eq!(out.len(), 3);
        assert!(matches!(out[0], Err(ScheduleError::MalformedBlock { index: 1, .. })));
        assert!(matches!(out[1], Err(ScheduleError::MalformedBlock { index: 2, .. })));
        assert_eq!(out[2].as_ref().unwrap().len(), 2);
    }

    #[test]
    fn largest_block_is_accepted() {
        let src = format!("[[block]]\nrandom_trials = {MAX_TRIALS_PER_BLOCK}\n");
        assert_eq!(blocks(&src)[0].as_ref().unwrap().len(), MAX_TRIALS_PER_BLOCK);
    }

    #[test]
    fn integer_values_are_accepted_as_floats() {
        let out = blocks("[[block]]\nrotation = -30\ntrials = [{ angle = 90, distance = 150 }]\n");
        let block = out[0].as_ref().unwrap();
        assert_eq!(block.rotation, -30.0);
        assert_eq!(
            block.trials[0].target,
            TargetSpec::Polar {
                angle: 90.0,
                distance: Some(150.0)
            }
        );
    }

    #[test]
    fn empty_document_has_no_blocks() {
        assert!(blocks("").is_empty());
    }

    #[test]
    fn broken_toml_is_a_parse_error() {
        assert!(matches!(
            ScheduleFile::from_toml_str("[[block]\nrotation = "),
            Err(ScheduleError::Parse(_))
        ));
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = ScheduleFile::load(Path::new("/nonexistent/schedule.toml")).unwrap_err();
        assert!(matches!(err, ScheduleError::Io { .. }));
    }

    #[test]
    fn demo_alternates_perturbation() {
        let mut demo = DemoSchedule::new(Some(7));
        for n in 1..=10 {
            let block = demo.next_block().unwrap().unwrap();
            assert_eq!(block.len(), DEMO_TRIALS_PER_BLOCK);
            if n % 2 == 1 {
                assert_eq!(block.rotation, 0.0);
            } else {
                assert_eq!(block.rotation.abs(), DEMO_ROTATION);
            }
        }
    }

    #[test]
    fn demo_block_limit() {
        let mut demo = DemoSchedule::new(Some(1))
            .with_trials_per_block(3)
            .with_block_limit(2);
        assert_eq!(demo.next_block().unwrap().unwrap().len(), 3);
        assert!(demo.next_block().is_some());
        assert!(demo.next_block().is_none());
    }
}

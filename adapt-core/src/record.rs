//! Per-trial summary record.
//!
//! Every field starts unset and is written at most once, by the phase that
//! owns it. Writers render unset fields as [`SENTINEL`].

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::target::Target;
use crate::trial::{Checkpoint, CheckpointKind};

/// Value written for fields the trial never reached.
pub const SENTINEL: f64 = -1.0;

/// Fixed output column order. Extra keys follow in insertion order.
pub const SUMMARY_COLUMNS: [&str; 27] = [
    "blockNumber",
    "trialNumber",
    "startTime",
    "rotation",
    "cursorVisible",
    "reactionTime",
    "movementTime",
    "targetX",
    "targetY",
    "targetAngle",
    "targetDistance",
    "startX",
    "startY",
    "earlyTime",
    "earlyX",
    "earlyY",
    "earlyAngle",
    "midpointTime",
    "midpointX",
    "midpointY",
    "midpointAngle",
    "finalX",
    "finalY",
    "finalAngle",
    "feedbackX",
    "feedbackY",
    "feedbackAngle",
];

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Int(i64),
    Float(f64),
    Unset,
}

impl FieldValue {
    pub fn is_set(&self) -> bool {
        !matches!(self, FieldValue::Unset)
    }
}

impl From<Option<f64>> for FieldValue {
    fn from(v: Option<f64>) -> Self {
        v.map_or(FieldValue::Unset, FieldValue::Float)
    }
}

impl From<Option<u32>> for FieldValue {
    fn from(v: Option<u32>) -> Self {
        v.map_or(FieldValue::Unset, |n| FieldValue::Int(n as i64))
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Int(n) => write!(f, "{n}"),
            FieldValue::Float(v) => write!(f, "{v}"),
            FieldValue::Unset => write!(f, "{}", SENTINEL),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Capture {
    pub time: Option<f64>,
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub angle: Option<f64>,
}

impl Capture {
    fn set(&mut self, time: Option<f64>, x: f64, y: f64, angle: f64) {
        self.time = time;
        self.x = Some(x);
        self.y = Some(y);
        self.angle = Some(angle);
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrialRecord {
    pub block_number: Option<u32>,
    pub trial_number: Option<u32>,
    pub start_time: Option<f64>,
    pub rotation: Option<f64>,
    pub cursor_visible: Option<bool>,
    pub reaction_time: Option<f64>,
    pub movement_time: Option<f64>,
    pub target: Option<Target>,
    pub start_x: Option<f64>,
    pub start_y: Option<f64>,
    pub early: Capture,
    pub midpoint: Capture,
    #[serde(rename = "final")]
    pub final_: Capture,
    pub feedback: Capture,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub extras: Vec<(String, FieldValue)>,
}

impl TrialRecord {
    /// Record with every field unset.
    pub fn template() -> Self {
        Self::default()
    }

    /// Movement onset: reaction time and the raw position leaving fixation.
    pub fn record_reaction(&mut self, time: f64, raw: (f64, f64)) {
        self.reaction_time = Some(time);
        self.start_x = Some(raw.0);
        self.start_y = Some(raw.1);
    }

    pub fn record_checkpoint(&mut self, cp: &Checkpoint) {
        let slot = match cp.kind {
            CheckpointKind::Early => &mut self.early,
            CheckpointKind::Midpoint => &mut self.midpoint,
            CheckpointKind::Final => &mut self.final_,
        };
        // the final crossing time is reported as movement time instead
        let time = match cp.kind {
            CheckpointKind::Final => None,
            _ => Some(cp.time),
        };
        slot.set(time, cp.raw.0, cp.raw.1, cp.angle_deg);
        if cp.kind == CheckpointKind::Final {
            self.movement_time = Some(cp.time);
        }
    }

    pub fn record_feedback(&mut self, display: (f64, f64), angle_deg: f64) {
        self.feedback.set(None, display.0, display.1, angle_deg);
    }

    /// Appends a column after the fixed schema. Re-inserting a key replaces it.
    pub fn insert_extra(&mut self, key: impl Into<String>, value: FieldValue) {
        let key = key.into();
        if SUMMARY_COLUMNS.contains(&key.as_str()) {
            return;
        }
        match self.extras.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.extras.push((key, value)),
        }
    }

    /// All columns in output order.
    pub fn columns(&self) -> Vec<(&str, FieldValue)> {
        let target = self.target.as_ref();
        let fixed: [FieldValue; SUMMARY_COLUMNS.len()] = [
            self.block_number.into(),
            self.trial_number.into(),
            self.start_time.into(),
            self.rotation.into(),
            self.cursor_visible
                .map_or(FieldValue::Unset, |v| FieldValue::Int(v as i64)),
            self.reaction_time.into(),
            self.movement_time.into(),
            target.map(|t| t.x).into(),
            target.map(|t| t.y).into(),
            target.map(|t| t.angle).into(),
            target.map(|t| t.distance).into(),
            self.start_x.into(),
            self.start_y.into(),
            self.early.time.into(),
            self.early.x.into(),
            self.early.y.into(),
            self.early.angle.into(),
            self.midpoint.time.into(),
            self.midpoint.x.into(),
            self.midpoint.y.into(),
            self.midpoint.angle.into(),
            self.final_.x.into(),
            self.final_.y.into(),
            self.final_.angle.into(),
            self.feedback.x.into(),
            self.feedback.y.into(),
            self.feedback.angle.into(),
        ];
        SUMMARY_COLUMNS
            .iter()
            .copied()
            .zip(fixed)
            .chain(self.extras.iter().map(|(k, v)| (k.as_str(), *v)))
            .collect()
    }

    /// Looks up a column by name.
    pub fn get(&self, column: &str) -> Option<FieldValue> {
        self.columns()
            .into_iter()
            .find(|(k, _)| *k == column)
            .map(|(_, v)| v)
    }
}

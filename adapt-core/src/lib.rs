pub mod geometry;
pub mod record;
pub mod target;
pub mod trial;

pub use geometry::{normalize_deg, offset_angle_deg, polar_to_rect, rect_to_polar};
pub use record::{FieldValue, SENTINEL, SUMMARY_COLUMNS, TrialRecord};
pub use target::{Target, TargetSpec};
pub use trial::{Checkpoint, CheckpointKind, TrajectorySample, TrialState};

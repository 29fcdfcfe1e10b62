use serde::{Deserialize, Serialize};

/// Trial state machine states, in forward order.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum TrialState {
    #[default]
    Starting,
    Waiting,
    WaitForRt,
    MovingEarly,
    MovingMidpoint,
    Moving,
    Feedback,
    Finished,
}

impl TrialState {
    /// Numeric tag written into trajectory files.
    pub const fn code(self) -> u8 {
        match self {
            Self::Starting => 0,
            Self::Waiting => 1,
            Self::WaitForRt => 3,
            Self::MovingEarly => 4,
            Self::MovingMidpoint => 5,
            Self::Moving => 10,
            Self::Feedback => 20,
            Self::Finished => 99,
        }
    }

    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Finished)
    }

    /// True once the subject has left the fixation spot.
    pub const fn is_moving(self) -> bool {
        matches!(self, Self::MovingEarly | Self::MovingMidpoint | Self::Moving)
    }
}

/// Displacement checkpoints along the reach.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckpointKind {
    /// 1/4 of the target distance.
    Early,
    /// 1/2 of the target distance.
    Midpoint,
    /// Full target distance.
    Final,
}

impl CheckpointKind {
    pub const fn fraction(self) -> f64 {
        match self {
            Self::Early => 0.25,
            Self::Midpoint => 0.5,
            Self::Final => 1.0,
        }
    }
}

/// Position captured when the cursor crosses a checkpoint.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Checkpoint {
    pub kind: CheckpointKind,
    /// Phase timer reading at the crossing [s].
    pub time: f64,
    /// Raw, home-relative device position.
    pub raw: (f64, f64),
    /// Heading of the raw offset in target-convention degrees.
    pub angle_deg: f64,
}

/// One row of a trial trajectory.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrajectorySample {
    /// Trial stopwatch reading [s].
    pub time: f64,
    pub state: TrialState,
    pub raw_x: f64,
    pub raw_y: f64,
    pub display_x: f64,
    pub display_y: f64,
}

impl TrajectorySample {
    /// Column header used by tab-separated trajectory writers.
    pub const HEADER: [&'static str; 6] = ["time", "state", "rawX", "rawY", "displayX", "displayY"];
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn states_are_ordered_forward() {
        use TrialState::*;
        let order = [
            Starting,
            Waiting,
            WaitForRt,
            MovingEarly,
            MovingMidpoint,
            Moving,
            Feedback,
            Finished,
        ];
        for pair in order.windows(2) {
            assert!(pair[0] < pair[1]);
            assert!(pair[0].code() < pair[1].code());
        }
    }

    #[test]
    fn only_finished_is_terminal() {
        assert_eq!(TrialState::default(), TrialState::Starting);
        assert!(TrialState::Finished.is_terminal());
        assert!(!TrialState::Feedback.is_terminal());
        assert!(TrialState::MovingMidpoint.is_moving());
        assert!(!TrialState::WaitForRt.is_moving());
    }
}

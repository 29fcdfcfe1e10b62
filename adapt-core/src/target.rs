use serde::{Deserialize, Serialize};

use crate::geometry::{normalize_deg, polar_to_rect};

/// How a trial's target is described by a schedule.
///
/// When an angle is present it is authoritative; cartesian coordinates are
/// relative to the screen center.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub enum TargetSpec {
    Polar { angle: f64, distance: Option<f64> },
    Cartesian { x: f64, y: f64 },
    /// One of the evenly spaced directions, chosen at trial start.
    #[default]
    Random,
}

impl TargetSpec {
    /// Resolves an explicit spec to absolute screen coordinates.
    ///
    /// Returns `None` for [`TargetSpec::Random`], which needs a direction
    /// drawn by the caller (see [`Target::direction`]).
    pub fn resolve(&self, center: (f64, f64), default_distance: f64) -> Option<Target> {
        match *self {
            TargetSpec::Polar { angle, distance } => Some(Target::from_polar(
                center,
                distance.unwrap_or(default_distance),
                angle,
            )),
            TargetSpec::Cartesian { x, y } => Some(Target::from_offset(center, x, y)),
            TargetSpec::Random => None,
        }
    }
}

/// A resolved target in absolute screen coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Target {
    pub x: f64,
    pub y: f64,
    /// Degrees in [0, 360).
    pub angle: f64,
    pub distance: f64,
}

impl Target {
    pub fn from_polar(center: (f64, f64), distance: f64, angle: f64) -> Self {
        let angle = normalize_deg(angle);
        let (x, y) = polar_to_rect(center, distance, angle);
        Self { x, y, angle, distance }
    }

    /// Target at `(dx, dy)` from `center`; angle and distance are derived.
    pub fn from_offset(center: (f64, f64), dx: f64, dy: f64) -> Self {
        let (distance, angle) = crate::geometry::rect_to_polar((0.0, 0.0), dx, dy);
        Self {
            x: center.0 + dx,
            y: center.1 + dy,
            angle,
            distance,
        }
    }

    /// Target in direction `index` of `count` evenly spaced directions.
    pub fn direction(center: (f64, f64), distance: f64, index: u32, count: u32) -> Self {
        let count = count.max(1);
        let angle = (index % count) as f64 * (360.0 / count as f64);
        Self::from_polar(center, distance, angle)
    }
}

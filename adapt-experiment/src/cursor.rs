//! Maps raw device displacement onto the screen.
//!
//! Display position is recomputed only in [`Cursor::update`]: raw offset is
//! scaled by the signed gains, rotated by the current perturbation and added
//! to the screen center.

use crate::config::CursorConfig;
use crate::motion::{MotionError, MotionSource};

/// A rotation kept in both degrees and radians.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Rotation {
    deg: f64,
    rad: f64,
}

impl Rotation {
    pub fn from_deg(deg: f64) -> Self {
        Self {
            deg,
            rad: deg.to_radians(),
        }
    }

    pub fn from_rad(rad: f64) -> Self {
        Self {
            deg: rad.to_degrees(),
            rad,
        }
    }

    pub fn deg(&self) -> f64 {
        self.deg
    }

    pub fn rad(&self) -> f64 {
        self.rad
    }

    /// Rotates `(x, y)` by this angle.
    #[inline]
    pub fn apply(&self, (x, y): (f64, f64)) -> (f64, f64) {
        let (sin, cos) = self.rad.sin_cos();
        (x * cos - y * sin, x * sin + y * cos)
    }
}

#[derive(Debug)]
pub struct Cursor<M: MotionSource> {
    source: M,
    center: (f64, f64),
    home: (f64, f64),
    rotation: Rotation,
    /// Signed; the sign encodes axis inversion.
    gain: (f64, f64),
    raw: (f64, f64),
    display: (f64, f64),
    visual_displacement: f64,
}

impl<M: MotionSource> Cursor<M> {
    /// Homes the device at its current position and puts the cursor on
    /// `center`.
    pub fn new(mut source: M, center: (f64, f64), config: &CursorConfig) -> Self {
        let home = source.re_home();
        let mut cursor = Self {
            source,
            center,
            home,
            rotation: Rotation::default(),
            gain: (1.0, 1.0),
            raw: (0.0, 0.0),
            display: center,
            visual_displacement: 0.0,
        };
        cursor.set_gain(config.gain_x, config.gain_y);
        if config.invert_x {
            cursor.invert_x();
        }
        if config.invert_y {
            cursor.invert_y();
        }
        cursor
    }

    /// Queries the device once and recomputes the display position.
    pub fn update(&mut self) -> Result<(), MotionError> {
        self.source.update()?;
        self.raw = self.source.relative_position();

        let visual = (self.raw.0 * self.gain.0, self.raw.1 * self.gain.1);
        let (dx, dy) = self.rotation.apply(visual);
        self.display = (self.center.0 + dx, self.center.1 + dy);
        // rotation preserves length, so measure before rotating
        self.visual_displacement = visual.0.hypot(visual.1);
        Ok(())
    }

    pub fn set_rotation_deg(&mut self, deg: f64) {
        self.rotation = Rotation::from_deg(deg);
    }

    pub fn set_rotation_rad(&mut self, rad: f64) {
        self.rotation = Rotation::from_rad(rad);
    }

    /// Changes gain magnitude while keeping any axis inversion.
    /// `gain_y` defaults to `gain_x`.
    pub fn set_gain(&mut self, gain_x: f64, gain_y: Option<f64>) {
        let gain_y = gain_y.unwrap_or(gain_x);
        self.gain = (gain_x.copysign(self.gain.0), gain_y.copysign(self.gain.1));
    }

    pub fn invert_x(&mut self) {
        self.gain.0 = -self.gain.0;
    }

    pub fn invert_y(&mut self) {
        self.gain.1 = -self.gain.1;
    }

    pub fn set_center(&mut self, x: f64, y: f64) {
        self.center = (x, y);
    }

    pub fn set_home(&mut self, x: f64, y: f64) {
        self.home = (x, y);
        self.source.set_home(x, y);
    }

    /// Re-homes the device where it is now and puts the cursor back on the
    /// center. Returns the new home.
    pub fn re_center(&mut self) -> (f64, f64) {
        self.home = self.source.re_home();
        self.raw = (0.0, 0.0);
        self.display = self.center;
        self.visual_displacement = 0.0;
        self.home
    }

    pub fn raw(&self) -> (f64, f64) {
        self.raw
    }

    pub fn display(&self) -> (f64, f64) {
        self.display
    }

    pub fn visual_displacement(&self) -> f64 {
        self.visual_displacement
    }

    pub fn rotation(&self) -> Rotation {
        self.rotation
    }

    pub fn gain(&self) -> (f64, f64) {
        self.gain
    }

    pub fn center(&self) -> (f64, f64) {
        self.center
    }

    pub fn home_position(&self) -> (f64, f64) {
        self.home
    }

    pub fn source(&self) -> &M {
        &self.source
    }
}

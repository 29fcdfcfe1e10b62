//! 2D position devices reporting home-relative coordinates.

use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum MotionError {
    #[error("motion device unavailable: {0}")]
    Unavailable(String),
}

/// A raw position device.
///
/// `update` queries the hardware exactly once per loop iteration.
pub trait MotionSource {
    fn update(&mut self) -> Result<(), MotionError>;
    /// Position relative to home.
    fn relative_position(&self) -> (f64, f64);
    fn set_home(&mut self, x: f64, y: f64);
    /// Makes the current position the new home and returns it.
    fn re_home(&mut self) -> (f64, f64);
}

/// Absolute device position plus home.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct Tracker {
    current: (f64, f64),
    home: (f64, f64),
}

impl Tracker {
    fn apply(&mut self, (dx, dy): (f64, f64)) {
        self.current.0 += dx;
        self.current.1 += dy;
    }

    fn relative(&self) -> (f64, f64) {
        (self.current.0 - self.home.0, self.current.1 - self.home.1)
    }

    fn re_home(&mut self) -> (f64, f64) {
        self.home = self.current;
        self.home
    }
}

#[derive(Debug, Default)]
struct FeedState {
    pending: (f64, f64),
    disconnected: Option<String>,
}

/// Producer side of a [`RelativeMotion`]: the window system pushes raw
/// pointer deltas here as they arrive.
#[derive(Debug, Clone, Default)]
pub struct MotionFeed {
    inner: Arc<Mutex<FeedState>>,
}

impl MotionFeed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, dx: f64, dy: f64) {
        let mut state = self.inner.lock();
        state.pending.0 += dx;
        state.pending.1 += dy;
    }

    /// Marks the device as gone; the next `update` fails.
    pub fn disconnect(&self, reason: impl Into<String>) {
        self.inner.lock().disconnected = Some(reason.into());
    }

    fn take(&self) -> Result<(f64, f64), MotionError> {
        let mut state = self.inner.lock();
        if let Some(reason) = &state.disconnected {
            return Err(MotionError::Unavailable(reason.clone()));
        }
        Ok(std::mem::take(&mut state.pending))
    }
}

/// Incremental device (mouse, trackball): accumulates deltas since the last
/// update into an absolute position.
#[derive(Debug, Clone, Default)]
pub struct RelativeMotion {
    feed: MotionFeed,
    tracker: Tracker,
}

impl RelativeMotion {
    pub fn new(feed: MotionFeed) -> Self {
        Self {
            feed,
            tracker: Tracker::default(),
        }
    }

    pub fn feed(&self) -> &MotionFeed {
        &self.feed
    }
}

impl MotionSource for RelativeMotion {
    fn update(&mut self) -> Result<(), MotionError> {
        let delta = self.feed.take()?;
        self.tracker.apply(delta);
        Ok(())
    }

    fn relative_position(&self) -> (f64, f64) {
        self.tracker.relative()
    }

    fn set_home(&mut self, x: f64, y: f64) {
        self.tracker.home = (x, y);
    }

    fn re_home(&mut self) -> (f64, f64) {
        // motion that arrived before the re-home belongs to the old frame
        if let Ok(delta) = self.feed.take() {
            self.tracker.apply(delta);
        }
        self.tracker.re_home()
    }
}

/// Replays a fixed sequence of deltas, one per update. Once exhausted the
/// device stays still.
pub struct ScriptedMotion {
    deltas: Box<dyn Iterator<Item = (f64, f64)> + Send>,
    tracker: Tracker,
}

impl ScriptedMotion {
    pub fn from_deltas<I>(deltas: I) -> Self
    where
        I: IntoIterator<Item = (f64, f64)>,
        I::IntoIter: Send + 'static,
    {
        Self {
            deltas: Box::new(deltas.into_iter()),
            tracker: Tracker::default(),
        }
    }

    /// Straight line along `heading_deg` at `step` per update, for `updates`
    /// updates.
    pub fn linear(heading_deg: f64, step: f64, updates: usize) -> Self {
        let rad = heading_deg.to_radians();
        let delta = (step * rad.cos(), step * rad.sin());
        Self::from_deltas(std::iter::repeat_n(delta, updates))
    }

    /// Simulated subject cycling through `headings`: rest for `hold`
    /// updates, move out to `extent` at `step` per update, rest, move back.
    pub fn center_out(headings: Vec<f64>, hold: usize, step: f64, extent: f64) -> Self {
        let strokes = if step > 0.0 {
            (extent / step).ceil() as usize
        } else {
            0
        };
        let deltas = headings.into_iter().cycle().flat_map(move |deg| {
            let rad = f64::to_radians(deg);
            let (dx, dy) = (step * rad.cos(), step * rad.sin());
            std::iter::repeat_n((0.0, 0.0), hold)
                .chain(std::iter::repeat_n((dx, dy), strokes))
                .chain(std::iter::repeat_n((0.0, 0.0), hold))
                .chain(std::iter::repeat_n((-dx, -dy), strokes))
        });
        Self::from_deltas(deltas)
    }
}

impl MotionSource for ScriptedMotion {
    fn update(&mut self) -> Result<(), MotionError> {
        let delta = self.deltas.next().unwrap_or((0.0, 0.0));
        self.tracker.apply(delta);
        Ok(())
    }

    fn relative_position(&self) -> (f64, f64) {
        self.tracker.relative()
    }

    fn set_home(&mut self, x: f64, y: f64) {
        self.tracker.home = (x, y);
    }

    fn re_home(&mut self) -> (f64, f64) {
        self.tracker.re_home()
    }
}

impl std::fmt::Debug for ScriptedMotion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptedMotion")
            .field("tracker", &self.tracker)
            .finish_non_exhaustive()
    }
}

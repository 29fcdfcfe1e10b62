//! One master time source driving several independent stopwatches.
//!
//! [`StopwatchClock::update`] reads the source exactly once and advances every
//! stopwatch by the same `dt`, so all consumers inside one loop iteration see
//! the same notion of "now".

use thiserror::Error;

use crate::timer::TimeSource;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ClockError {
    #[error("time source went backwards: last reading {last}s, now {now}s")]
    NonMonotonic { last: f64, now: f64 },

    #[error("time source returned a non-finite reading: {0}")]
    InvalidReading(f64),

    #[error("rate must be finite and positive, got {0} Hz")]
    InvalidRate(f64),
}

/// Named count-up accumulators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stopwatch {
    /// Whole session; only cleared by [`StopwatchClock::reset_all`].
    Session,
    /// Time since the current trial began.
    Trial,
    /// Time in the current trial phase.
    Phase,
    /// Graphics refresh accumulator.
    Render,
    /// Position sampling accumulator.
    Sample,
}

impl Stopwatch {
    pub const ALL: [Stopwatch; 5] = [
        Stopwatch::Session,
        Stopwatch::Trial,
        Stopwatch::Phase,
        Stopwatch::Render,
        Stopwatch::Sample,
    ];

    const COUNT: usize = Self::ALL.len();

    const fn index(self) -> usize {
        self as usize
    }
}

/// Running statistics over the loop period (`dt` of each update).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoopStats {
    pub count: u64,
    sum: f64,
    sum_sq: f64,
    pub min_dt: f64,
    pub max_dt: f64,
}

impl LoopStats {
    pub const fn new() -> Self {
        Self {
            count: 0,
            sum: 0.0,
            sum_sq: 0.0,
            min_dt: f64::INFINITY,
            max_dt: 0.0,
        }
    }

    #[inline]
    fn record(&mut self, dt: f64) {
        self.count += 1;
        self.sum += dt;
        self.sum_sq += dt * dt;
        self.min_dt = self.min_dt.min(dt);
        self.max_dt = self.max_dt.max(dt);
    }

    /// Folds `other` into these statistics.
    pub fn merge(&mut self, other: &LoopStats) {
        self.count += other.count;
        self.sum += other.sum;
        self.sum_sq += other.sum_sq;
        self.min_dt = self.min_dt.min(other.min_dt);
        self.max_dt = self.max_dt.max(other.max_dt);
    }

    /// Mean loop period [s], 0 before the first update.
    pub fn mean_dt(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum / self.count as f64
        }
    }

    /// Standard deviation of the loop period [s].
    pub fn jitter(&self) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        let mean = self.mean_dt();
        (self.sum_sq / self.count as f64 - mean * mean).max(0.0).sqrt()
    }

    /// Loop iterations per second.
    pub fn effective_rate(&self) -> f64 {
        let mean = self.mean_dt();
        if mean > 0.0 { 1.0 / mean } else { 0.0 }
    }
}

impl Default for LoopStats {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone)]
pub struct StopwatchClock<T: TimeSource> {
    source: T,
    watches: [f64; Stopwatch::COUNT],
    initial_time: f64,
    last_time: f64,
    dt: f64,
    stats: LoopStats,
}

impl<T: TimeSource> StopwatchClock<T> {
    /// Creates the clock with every stopwatch at zero.
    pub fn new(source: T) -> Result<Self, ClockError> {
        let initial_time = read(&source)?;
        Ok(Self {
            source,
            watches: [0.0; Stopwatch::COUNT],
            initial_time,
            last_time: initial_time,
            dt: 0.0,
            stats: LoopStats::new(),
        })
    }

    /// Reads the time source once and advances all stopwatches. Returns `dt`.
    pub fn update(&mut self) -> Result<f64, ClockError> {
        let now = read(&self.source)?;
        let dt = now - self.last_time;
        if dt < 0.0 {
            return Err(ClockError::NonMonotonic {
                last: self.last_time,
                now,
            });
        }
        self.last_time = now;
        self.dt = dt;
        for w in &mut self.watches {
            *w += dt;
        }
        self.stats.record(dt);
        Ok(dt)
    }

    #[inline]
    pub fn get(&self, which: Stopwatch) -> f64 {
        self.watches[which.index()]
    }

    /// Direct write, used by triggers that carry residual time.
    #[inline]
    pub fn set(&mut self, which: Stopwatch, value: f64) {
        self.watches[which.index()] = value;
    }

    #[inline]
    pub fn reset(&mut self, which: Stopwatch) {
        self.set(which, 0.0);
    }

    /// Zeroes every stopwatch and restarts the master epoch.
    pub fn reset_all(&mut self) -> Result<(), ClockError> {
        let now = read(&self.source)?;
        self.initial_time = now;
        self.last_time = now;
        self.dt = 0.0;
        self.watches = [0.0; Stopwatch::COUNT];
        self.stats = LoopStats::new();
        Ok(())
    }

    /// `dt` of the most recent update.
    pub fn dt(&self) -> f64 {
        self.dt
    }

    /// Master time elapsed since creation or the last `reset_all`.
    pub fn elapsed(&self) -> f64 {
        self.last_time - self.initial_time
    }

    pub fn stats(&self) -> &LoopStats {
        &self.stats
    }

    /// Starts loop statistics afresh without touching the stopwatches.
    pub fn reset_stats(&mut self) {
        self.stats = LoopStats::new();
    }

    pub fn source(&self) -> &T {
        &self.source
    }
}

fn read<T: TimeSource>(source: &T) -> Result<f64, ClockError> {
    let now = source.now();
    if now.is_finite() {
        Ok(now)
    } else {
        Err(ClockError::InvalidReading(now))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timer::ManualTimer;
    use std::time::Duration;

    fn clock() -> (ManualTimer, StopwatchClock<ManualTimer>) {
        let timer = ManualTimer::new();
        let clock = StopwatchClock::new(timer.clone()).unwrap();
        (timer, clock)
    }

    #[test]
    fn all_stopwatches_advance_by_the_same_dt() {
        let (timer, mut clock) = clock();
        timer.advance(Duration::from_millis(10));
        let dt = clock.update().unwrap();
        assert!((dt - 0.010).abs() < 1e-12);
        for w in Stopwatch::ALL {
            assert!((clock.get(w) - 0.010).abs() < 1e-12);
        }
    }

    #[test]
    fn second_update_without_time_passing_is_zero() {
        let (timer, mut clock) = clock();
        timer.advance(Duration::from_millis(5));
        clock.update().unwrap();
        assert_eq!(clock.update().unwrap(), 0.0);
        assert!((clock.get(Stopwatch::Trial) - 0.005).abs() < 1e-12);
    }

    #[test]
    fn reset_only_touches_one_stopwatch() {
        let (timer, mut clock) = clock();
        timer.advance(Duration::from_millis(30));
        clock.update().unwrap();
        clock.reset(Stopwatch::Phase);
        timer.advance(Duration::from_millis(20));
        clock.update().unwrap();
        assert!((clock.get(Stopwatch::Phase) - 0.020).abs() < 1e-12);
        assert!((clock.get(Stopwatch::Trial) - 0.050).abs() < 1e-12);
        assert!((clock.get(Stopwatch::Session) - 0.050).abs() < 1e-12);
    }

    #[test]
    fn set_keeps_accumulating_from_written_value() {
        let (timer, mut clock) = clock();
        clock.set(Stopwatch::Sample, 0.003);
        timer.advance(Duration::from_millis(4));
        clock.update().unwrap();
        assert!((clock.get(Stopwatch::Sample) - 0.007).abs() < 1e-12);
    }

    #[test]
    fn backwards_time_is_rejected() {
        let (timer, mut clock) = clock();
        timer.set(Duration::from_secs(2));
        clock.update().unwrap();
        timer.set(Duration::from_secs(1));
        let err = clock.update().unwrap_err();
        assert!(matches!(err, ClockError::NonMonotonic { .. }));
        // state is untouched by the failed update
        assert!((clock.get(Stopwatch::Session) - 2.0).abs() < 1e-12);
    }

    #[test]
    fn reset_all_restarts_epoch() {
        let (timer, mut clock) = clock();
        timer.advance(Duration::from_secs(3));
        clock.update().unwrap();
        clock.reset_all().unwrap();
        assert_eq!(clock.elapsed(), 0.0);
        timer.advance(Duration::from_millis(100));
        clock.update().unwrap();
        assert!((clock.elapsed() - 0.1).abs() < 1e-9);
        assert!((clock.get(Stopwatch::Session) - 0.1).abs() < 1e-9);
    }

    #[test]
    fn loop_stats_track_period() {
        let (timer, mut clock) = clock();
        for ms in [2u64, 4, 2, 4] {
            timer.advance(Duration::from_millis(ms));
            clock.update().unwrap();
        }
        let stats = clock.stats();
        assert_eq!(stats.count, 4);
        assert!((stats.mean_dt() - 0.003).abs() < 1e-9);
        assert!((stats.jitter() - 0.001).abs() < 1e-6);
        assert!((stats.min_dt - 0.002).abs() < 1e-9);
        assert!((stats.max_dt - 0.004).abs() < 1e-9);
        assert!((stats.effective_rate() - 333.333).abs() < 0.01);
    }

    #[test]
    fn reset_stats_leaves_stopwatches_and_merge_combines() {
        let (timer, mut clock) = clock();
        timer.advance(Duration::from_secs(30));
        clock.update().unwrap();
        clock.reset_stats();
        assert_eq!(clock.stats().count, 0);
        assert!((clock.get(Stopwatch::Session) - 30.0).abs() < 1e-9);

        let mut total = LoopStats::new();
        for ms in [2u64, 2] {
            timer.advance(Duration::from_millis(ms));
            clock.update().unwrap();
        }
        total.merge(clock.stats());
        clock.reset_stats();
        for ms in [4u64, 4] {
            timer.advance(Duration::from_millis(ms));
            clock.update().unwrap();
        }
        total.merge(clock.stats());

        assert_eq!(total.count, 4);
        assert!((total.mean_dt() - 0.003).abs() < 1e-9);
        assert!((total.max_dt - 0.004).abs() < 1e-9);
        assert!((total.min_dt - 0.002).abs() < 1e-9);
    }
}

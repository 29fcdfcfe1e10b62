//! Fixed-rate triggers layered on stopwatch accumulators.
//!
//! A trigger fires when its accumulator reaches one period and then subtracts
//! exactly one period. The residual carries into the next period, so a late
//! firing does not push every later firing back and the long-run rate stays
//! at the target.

use crate::clock::{ClockError, Stopwatch, StopwatchClock};
use crate::timer::TimeSource;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PeriodicTrigger {
    watch: Stopwatch,
    period: f64,
}

impl PeriodicTrigger {
    pub fn from_rate(watch: Stopwatch, rate_hz: f64) -> Result<Self, ClockError> {
        if !rate_hz.is_finite() || rate_hz <= 0.0 {
            return Err(ClockError::InvalidRate(rate_hz));
        }
        Ok(Self {
            watch,
            period: 1.0 / rate_hz,
        })
    }

    /// Fires at most once per call.
    #[inline]
    pub fn poll<T: TimeSource>(&self, clock: &mut StopwatchClock<T>) -> bool {
        let acc = clock.get(self.watch);
        if acc >= self.period {
            clock.set(self.watch, acc - self.period);
            true
        } else {
            false
        }
    }

    pub fn period(&self) -> f64 {
        self.period
    }

    pub fn watch(&self) -> Stopwatch {
        self.watch
    }
}

/// Which triggers fired this iteration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Fired {
    pub sample: bool,
    pub render: bool,
}

/// The sampling and graphics triggers of the trial loop.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Scheduler {
    sample: PeriodicTrigger,
    render: PeriodicTrigger,
}

impl Scheduler {
    pub fn new(sample_rate: f64, graphics_rate: f64) -> Result<Self, ClockError> {
        Ok(Self {
            sample: PeriodicTrigger::from_rate(Stopwatch::Sample, sample_rate)?,
            render: PeriodicTrigger::from_rate(Stopwatch::Render, graphics_rate)?,
        })
    }

    pub fn poll<T: TimeSource>(&self, clock: &mut StopwatchClock<T>) -> Fired {
        Fired {
            sample: self.sample.poll(clock),
            render: self.render.poll(clock),
        }
    }

    /// Clears both accumulators, e.g. at trial start.
    pub fn restart<T: TimeSource>(&self, clock: &mut StopwatchClock<T>) {
        clock.reset(self.sample.watch());
        clock.reset(self.render.watch());
    }

    pub fn sample_period(&self) -> f64 {
        self.sample.period()
    }

    pub fn render_period(&self) -> f64 {
        self.render.period()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timer::ManualTimer;
    use std::time::Duration;

    /// Steps simulated time in `dt` increments until `total` has elapsed and
    /// counts firings.
    fn count_firings(rate: f64, dt: Duration, total: Duration) -> u32 {
        let timer = ManualTimer::new();
        let mut clock = StopwatchClock::new(timer.clone()).unwrap();
        let trigger = PeriodicTrigger::from_rate(Stopwatch::Sample, rate).unwrap();
        let mut fired = 0;
        while timer.elapsed() < total {
            timer.advance(dt);
            clock.update().unwrap();
            if trigger.poll(&mut clock) {
                fired += 1;
            }
        }
        fired
    }

    #[test]
    fn hundred_hz_over_one_second_for_awkward_steps() {
        for ms in [1u64, 3, 7] {
            let n = count_firings(100.0, Duration::from_millis(ms), Duration::from_secs(1));
            assert!((99..=101).contains(&n), "dt={ms}ms fired {n} times");
        }
    }

    #[test]
    fn carry_over_does_not_drift_where_reset_to_zero_does() {
        // 7 ms steps against a 10 ms period: each firing is up to 4 ms late.
        let dt = Duration::from_millis(7);
        let total = Duration::from_secs(10);
        let carried = count_firings(100.0, dt, total);
        assert!((999..=1001).contains(&carried), "carried {carried}");

        let timer = ManualTimer::new();
        let mut clock = StopwatchClock::new(timer.clone()).unwrap();
        let mut discarded = 0;
        while timer.elapsed() < total {
            timer.advance(dt);
            clock.update().unwrap();
            if clock.get(Stopwatch::Sample) >= 0.01 {
                clock.reset(Stopwatch::Sample);
                discarded += 1;
            }
        }
        // resetting fires every second step, i.e. every 14 ms
        assert!(discarded < 750, "reset-to-zero fired {discarded} times");
    }

    #[test]
    fn residual_is_exactly_one_period_less() {
        let timer = ManualTimer::new();
        let mut clock = StopwatchClock::new(timer.clone()).unwrap();
        let trigger = PeriodicTrigger::from_rate(Stopwatch::Render, 100.0).unwrap();
        timer.advance(Duration::from_millis(13));
        clock.update().unwrap();
        assert!(trigger.poll(&mut clock));
        assert!((clock.get(Stopwatch::Render) - 0.003).abs() < 1e-9);
        assert!(!trigger.poll(&mut clock));
    }

    #[test]
    fn invalid_rates_are_rejected() {
        for rate in [0.0, -5.0, f64::NAN, f64::INFINITY] {
            assert!(PeriodicTrigger::from_rate(Stopwatch::Sample, rate).is_err());
        }
        assert!(Scheduler::new(100.0, 0.0).is_err());
    }

    #[test]
    fn scheduler_triggers_are_independent() {
        let timer = ManualTimer::new();
        let mut clock = StopwatchClock::new(timer.clone()).unwrap();
        let scheduler = Scheduler::new(100.0, 50.0).unwrap();
        timer.advance(Duration::from_millis(10));
        clock.update().unwrap();
        assert_eq!(
            scheduler.poll(&mut clock),
            Fired {
                sample: true,
                render: false
            }
        );
        timer.advance(Duration::from_millis(10));
        clock.update().unwrap();
        assert_eq!(
            scheduler.poll(&mut clock),
            Fired {
                sample: true,
                render: true
            }
        );
        scheduler.restart(&mut clock);
        assert_eq!(clock.get(Stopwatch::Sample), 0.0);
        assert_eq!(clock.get(Stopwatch::Render), 0.0);
    }
}

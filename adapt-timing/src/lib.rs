pub mod clock;
pub mod timer;
pub mod trigger;

pub use clock::{ClockError, LoopStats, Stopwatch, StopwatchClock};
pub use timer::{ManualTimer, MonotonicTimer, TimeSource};
pub use trigger::{Fired, PeriodicTrigger, Scheduler};

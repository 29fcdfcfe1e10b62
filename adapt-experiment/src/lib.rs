pub mod config;
pub mod cursor;
pub mod machine;
pub mod motion;
pub mod schedule;
pub mod session;
pub mod signals;
pub mod sink;
pub mod trial;

pub use config::{ConfigError, ExperimentConfig};
pub use cursor::{Cursor, Rotation};
pub use machine::{Effect, Observation, Step, Thresholds};
pub use motion::{MotionError, MotionFeed, MotionSource, RelativeMotion, ScriptedMotion};
pub use schedule::{BlockSource, BlockSpec, DemoSchedule, ScheduleError, ScheduleFile, TrialSpec};
pub use session::{Session, SessionError, SessionStatus, SessionSummary, Tick};
pub use signals::{AbortSignals, CancelToken};
pub use sink::{DataSink, MemorySink, SinkError, StoredTrajectory, TsvSink, write_json};
pub use trial::{Trial, TrialOutcome, TrialSetup};

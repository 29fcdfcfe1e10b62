//! Experiment configuration.
//!
//! Built once at startup, validated, then shared read-only as
//! `Arc<ExperimentConfig>`.
//!
//! ```toml
//! [target]
//! count = 8
//! distance = 200.0
//!
//! [timing]
//! sample_rate = 100.0
//! graphics_rate = 120.0
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DisplayConfig {
    pub width: u32,
    pub height: u32,
    pub fullscreen: bool,
    /// Mirror left/right, e.g. for back-projection.
    pub mirror_horizontal: bool,
    pub mirror_vertical: bool,
    /// Font for the instruction screens; a system font when absent.
    pub font: Option<PathBuf>,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            width: 1024,
            height: 768,
            fullscreen: true,
            mirror_horizontal: false,
            mirror_vertical: false,
            font: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TargetConfig {
    /// Evenly spaced directions for randomly placed targets.
    pub count: u32,
    /// [px]
    pub distance: f64,
    /// [px]
    pub radius: f64,
    /// Fixation hold before the target appears [s].
    pub hold_time: f64,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            count: 8,
            distance: 200.0,
            radius: 10.0,
            hold_time: 0.2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FixationConfig {
    pub radius: f64,
    pub stroke: f64,
}

impl Default for FixationConfig {
    fn default() -> Self {
        Self {
            radius: 15.0,
            stroke: 2.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CursorConfig {
    pub radius: f64,
    pub gain_x: f64,
    /// Defaults to `gain_x` (isotropic).
    pub gain_y: Option<f64>,
    pub invert_x: bool,
    pub invert_y: bool,
}

impl Default for CursorConfig {
    fn default() -> Self {
        Self {
            radius: 5.0,
            gain_x: 1.0,
            gain_y: None,
            invert_x: false,
            invert_y: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FeedbackConfig {
    /// [s]
    pub duration: f64,
}

impl Default for FeedbackConfig {
    fn default() -> Self {
        Self { duration: 1.0 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TimingConfig {
    /// Trajectory sampling [Hz].
    pub sample_rate: f64,
    /// Upper bound on redraws [Hz].
    pub graphics_rate: f64,
    /// Pause between loop iterations [µs].
    pub loop_pause_us: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            sample_rate: 100.0,
            graphics_rate: 120.0,
            loop_pause_us: 500,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DataConfig {
    pub directory: PathBuf,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("Data"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExperimentConfig {
    pub display: DisplayConfig,
    pub target: TargetConfig,
    pub fixation: FixationConfig,
    pub cursor: CursorConfig,
    pub feedback: FeedbackConfig,
    pub timing: TimingConfig,
    pub data: DataConfig,
}

impl ExperimentConfig {
    /// Reads, parses and validates a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::FileNotFound(path.to_path_buf())
            } else {
                ConfigError::ParseError(e.to_string())
            }
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self =
            toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        fn fail(msg: impl Into<String>) -> Result<(), ConfigError> {
            Err(ConfigError::ValidationError(msg.into()))
        }
        fn non_negative(name: &str, v: f64) -> Result<(), ConfigError> {
            if v.is_finite() && v >= 0.0 {
                Ok(())
            } else {
                fail(format!("{name} must be finite and >= 0, got {v}"))
            }
        }

        if self.display.width == 0 || self.display.height == 0 {
            return fail("display size must be non-zero");
        }
        for (name, rate) in [
            ("timing.sample_rate", self.timing.sample_rate),
            ("timing.graphics_rate", self.timing.graphics_rate),
        ] {
            if !rate.is_finite() || rate <= 0.0 {
                return fail(format!("{name} must be finite and > 0, got {rate}"));
            }
        }
        if self.target.count == 0 {
            return fail("target.count must be at least 1");
        }
        non_negative("target.distance", self.target.distance)?;
        non_negative("target.radius", self.target.radius)?;
        non_negative("target.hold_time", self.target.hold_time)?;
        non_negative("fixation.radius", self.fixation.radius)?;
        non_negative("fixation.stroke", self.fixation.stroke)?;
        non_negative("cursor.radius", self.cursor.radius)?;
        non_negative("feedback.duration", self.feedback.duration)?;
        if self.fixation.radius >= self.target.distance / 4.0 {
            return fail(format!(
                "fixation.radius ({}) must be below a quarter of target.distance ({})",
                self.fixation.radius, self.target.distance
            ));
        }
        let gains = [Some(self.cursor.gain_x), self.cursor.gain_y];
        for gain in gains.into_iter().flatten() {
            if !gain.is_finite() || gain == 0.0 {
                return fail(format!("cursor gain must be finite and non-zero, got {gain}"));
            }
        }
        Ok(())
    }

    /// Screen center, the origin of target placement.
    pub fn center(&self) -> (f64, f64) {
        (
            self.display.width as f64 / 2.0,
            self.display.height as f64 / 2.0,
        )
    }

    pub fn loop_pause(&self) -> Duration {
        Duration::from_micros(self.timing.loop_pause_us)
    }
}

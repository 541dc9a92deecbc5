//! Configuration using Figment.
//!
//! Settings are layered, later sources winning:
//! 1. built-in defaults
//! 2. a TOML file (`config/psu_waveform.toml` unless another path is given)
//! 3. environment variables prefixed `PSU_WAVEFORM_`, with `__` between levels
//!    (e.g. `PSU_WAVEFORM_ENGINE__ENABLE_SETTLE_MS=50`)
//!
//! Run plans are separate TOML documents describing one run for the CLI.
//!
//! # Example
//! ```no_run
//! use psu_waveform::config::Settings;
//!
//! let settings = Settings::load()?;
//! settings.validate()?;
//! println!("{}: {} channels", settings.application.name, settings.channels.len());
//! # Ok::<(), psu_waveform::error::EngineError>(())
//! ```

use crate::engine::RunRequest;
use crate::error::{EngineError, EngineResult};
use crate::execution::{ChannelExecutionConfig, ExecutionTiming};
use crate::hardware::{ChannelId, ChannelLimit, ChannelLimits};
use crate::waveform::{WaveformKind, WaveformSpec, MAX_TARGET_VOLTAGE};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

/// Default settings file, relative to the working directory.
pub const DEFAULT_SETTINGS_PATH: &str = "config/psu_waveform.toml";

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "PSU_WAVEFORM_";

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Top-level settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Application settings
    #[serde(default)]
    pub application: ApplicationConfig,
    /// Execution timing
    #[serde(default)]
    pub engine: EngineConfig,
    /// Hardware limits of each output
    #[serde(default = "default_channels")]
    pub channels: Vec<ChannelLimit>,
}

/// Application-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationConfig {
    /// Application name
    #[serde(default = "default_name")]
    pub name: String,
    /// Logging level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Executor timing configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Relay settle after enabling an output, in milliseconds
    #[serde(default = "default_enable_settle")]
    pub enable_settle_ms: u64,
    /// Delay after configuring each channel of a multi-channel run, in milliseconds
    #[serde(default = "default_channel_setup_delay")]
    pub channel_setup_delay_ms: u64,
    /// Per-point settle used when a request gives none, in milliseconds
    #[serde(default = "default_settle_time")]
    pub default_settle_time_ms: u64,
    /// Progress is reported every this fraction of the points
    #[serde(default = "default_progress_fraction")]
    pub progress_fraction: f64,
    /// Measure voltage and current after every setpoint
    #[serde(default)]
    pub readback: bool,
}

fn default_name() -> String {
    "PSU Waveform".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_enable_settle() -> u64 {
    100
}

fn default_channel_setup_delay() -> u64 {
    50
}

fn default_settle_time() -> u64 {
    50
}

fn default_progress_fraction() -> f64 {
    0.10
}

fn default_channels() -> Vec<ChannelLimit> {
    ChannelLimits::default().entries().to_vec()
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            log_level: default_log_level(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            enable_settle_ms: default_enable_settle(),
            channel_setup_delay_ms: default_channel_setup_delay(),
            default_settle_time_ms: default_settle_time(),
            progress_fraction: default_progress_fraction(),
            readback: false,
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            application: ApplicationConfig::default(),
            engine: EngineConfig::default(),
            channels: default_channels(),
        }
    }
}

impl EngineConfig {
    /// Per-point settle for requests without one.
    pub fn default_settle_time(&self) -> Duration {
        Duration::from_millis(self.default_settle_time_ms)
    }
}

impl Settings {
    /// Load from [`DEFAULT_SETTINGS_PATH`] and the environment.
    pub fn load() -> EngineResult<Self> {
        Self::load_from(DEFAULT_SETTINGS_PATH)
    }

    /// Load from a specific file path and the environment. A missing file
    /// leaves the defaults in place.
    pub fn load_from<P: AsRef<Path>>(path: P) -> EngineResult<Self> {
        let settings: Settings = Figment::from(Serialized::defaults(Settings::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;
        Ok(settings)
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> EngineResult<()> {
        let level = self.application.log_level.to_lowercase();
        if !LOG_LEVELS.contains(&level.as_str()) {
            return Err(EngineError::Configuration(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                LOG_LEVELS.join(", ")
            )));
        }

        let fraction = self.engine.progress_fraction;
        if !(fraction > 0.0 && fraction <= 1.0) {
            return Err(EngineError::Configuration(format!(
                "Invalid progress_fraction {fraction}. Must be in (0, 1]"
            )));
        }

        if self.channels.is_empty() {
            return Err(EngineError::Configuration(
                "At least one channel must be configured".into(),
            ));
        }

        let mut ids = HashSet::new();
        for channel in &self.channels {
            if !ids.insert(channel.id) {
                return Err(EngineError::Configuration(format!(
                    "Duplicate channel id: {}",
                    channel.id.get()
                )));
            }
            if !(channel.max_voltage > 0.0 && channel.max_voltage <= MAX_TARGET_VOLTAGE) {
                return Err(EngineError::Configuration(format!(
                    "{}: max_voltage {} must be in (0, {MAX_TARGET_VOLTAGE}]",
                    channel.id, channel.max_voltage
                )));
            }
            if !(channel.default_current_limit > 0.0 && channel.default_current_limit.is_finite()) {
                return Err(EngineError::Configuration(format!(
                    "{}: default_current_limit must be positive",
                    channel.id
                )));
            }
        }

        Ok(())
    }

    /// Channel table for request validation.
    pub fn channel_limits(&self) -> ChannelLimits {
        ChannelLimits::new(self.channels.clone())
    }

    /// Executor timing derived from the engine section.
    pub fn timing(&self) -> ExecutionTiming {
        ExecutionTiming {
            enable_settle: Duration::from_millis(self.engine.enable_settle_ms),
            channel_setup_delay: Duration::from_millis(self.engine.channel_setup_delay_ms),
            progress_fraction: self.engine.progress_fraction,
            readback: self.engine.readback,
        }
    }
}

/// One run, as written in a plan file.
///
/// ```toml
/// point_duration_ms = 20
///
/// [[channels]]
/// channel = 1
/// waveform = "sine"
/// target_voltage = 3.0
/// cycles = 3
/// points_per_cycle = 50
/// cycle_duration = 8.0
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunPlan {
    /// Target time per point; derived from the waveforms when absent.
    #[serde(default)]
    pub point_duration_ms: Option<u64>,
    /// One entry runs a single-channel run, several a multi-channel run.
    pub channels: Vec<PlanChannel>,
}

/// One channel of a [`RunPlan`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanChannel {
    /// Channel number.
    pub channel: u8,
    /// Waveform name, e.g. `"sine"`, `"ramp-up"`, `"ECG"`.
    #[serde(default = "default_waveform")]
    pub waveform: String,
    /// Peak voltage.
    #[serde(default = "default_target_voltage")]
    pub target_voltage: f64,
    /// Number of cycles.
    #[serde(default = "default_cycles")]
    pub cycles: u32,
    /// Samples per cycle.
    #[serde(default = "default_points_per_cycle")]
    pub points_per_cycle: u32,
    /// Seconds per cycle.
    #[serde(default = "default_cycle_duration")]
    pub cycle_duration: f64,
    /// Current limit in amperes; the channel's default when absent.
    #[serde(default)]
    pub current_limit: Option<f64>,
    /// Minimum time per point; the engine default when absent.
    #[serde(default)]
    pub settle_time_ms: Option<u64>,
}

fn default_waveform() -> String {
    WaveformKind::default().to_string()
}

fn default_target_voltage() -> f64 {
    3.0
}

fn default_cycles() -> u32 {
    3
}

fn default_points_per_cycle() -> u32 {
    50
}

fn default_cycle_duration() -> f64 {
    8.0
}

impl PlanChannel {
    /// Parsed waveform spec.
    pub fn spec(&self) -> EngineResult<WaveformSpec> {
        let kind: WaveformKind = self.waveform.parse()?;
        Ok(WaveformSpec::new(
            kind,
            self.target_voltage,
            self.cycles,
            self.points_per_cycle,
            self.cycle_duration,
        ))
    }
}

impl RunPlan {
    /// Parse a plan document.
    pub fn from_toml(text: &str) -> EngineResult<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Read and parse a plan file.
    pub fn load_from<P: AsRef<Path>>(path: P) -> EngineResult<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml(&text)
    }

    /// Turn the plan into an engine request. Channel ids and ceilings are
    /// checked again by the engine.
    pub fn to_request(&self, settings: &Settings) -> EngineResult<RunRequest> {
        let point_duration = self.point_duration_ms.map(Duration::from_millis);
        let limits = settings.channel_limits();

        match self.channels.as_slice() {
            [] => Err(EngineError::Configuration(
                "Run plan has no channels".into(),
            )),
            [only] => Ok(RunRequest::Single {
                channel: ChannelId(only.channel),
                spec: only.spec()?,
                settle_time: only.settle_time_ms.map(Duration::from_millis),
                point_duration,
            }),
            many => {
                let configs = many
                    .iter()
                    .map(|entry| {
                        let channel = ChannelId(entry.channel);
                        let limit = limits
                            .get(channel)
                            .ok_or(EngineError::InvalidChannel(entry.channel))?;
                        Ok(ChannelExecutionConfig {
                            channel,
                            spec: entry.spec()?,
                            current_limit: entry
                                .current_limit
                                .unwrap_or(limit.default_current_limit),
                            settle_time: entry
                                .settle_time_ms
                                .map(Duration::from_millis)
                                .unwrap_or_else(|| settings.engine.default_settle_time()),
                        })
                    })
                    .collect::<EngineResult<Vec<_>>>()?;
                Ok(RunRequest::Multi {
                    configs,
                    point_duration,
                })
            }
        }
    }
}

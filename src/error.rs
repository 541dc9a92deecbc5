//! Custom error types for the engine.
//!
//! `EngineError` covers everything that is reported synchronously to a caller:
//! configuration problems found before a run touches hardware, settings that fail
//! to load, and attempts to start a second run on a busy supply.
//!
//! ## What is *not* here
//!
//! Device failures during a run are never returned as `EngineError`. A run executes
//! on its own worker thread, so a failing driver call is caught inside the executor,
//! triggers the safety shutdown, and surfaces as `RunOutcome::Failed` plus an error
//! status message. Driver methods themselves return `anyhow::Result`, matching the
//! capability-trait convention in [`crate::hardware::capabilities`].

use thiserror::Error;

/// Convenience alias for results using the engine error type.
pub type EngineResult<T> = std::result::Result<T, EngineError>;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid channel id {0}")]
    InvalidChannel(u8),

    #[error("Channel {channel}: requested {requested:.3} V exceeds the {ceiling:.1} V hardware ceiling")]
    VoltageAboveCeiling {
        channel: u8,
        requested: f64,
        ceiling: f64,
    },

    #[error("Unknown waveform type '{0}'")]
    UnknownWaveform(String),

    #[error("A waveform run is already active on this supply")]
    AlreadyRunning,

    #[error("Settings error: {0}")]
    Settings(#[from] Box<figment::Error>),

    #[error("Run plan error: {0}")]
    Plan(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for EngineError {
    fn from(value: figment::Error) -> Self {
        EngineError::Settings(Box::new(value))
    }
}

impl EngineError {
    /// True for errors raised by request validation, before any hardware side effect.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            EngineError::Configuration(_)
                | EngineError::InvalidChannel(_)
                | EngineError::VoltageAboveCeiling { .. }
                | EngineError::UnknownWaveform(_)
        )
    }
}

//! # PSU Waveform Engine
//!
//! Synthesizes voltage waveforms and plays them on a programmable bench power
//! supply at a fixed per-point cadence, on one channel or several in lock-step.
//! Runs execute on a dedicated worker thread, can be cancelled cooperatively,
//! and always leave every touched output at 0 V and switched off.
//!
//! ## Crate Structure
//!
//! - **`waveform`**: the 19 waveform kinds, their formulas, and the pure
//!   `generate(&WaveformSpec) -> Profile` function.
//! - **`hardware`**: the `PowerSupply` capability trait that drivers implement,
//!   channel limits, a serializing wrapper, and a simulated supply.
//! - **`execution`**: single- and multi-channel executors, pacing, records,
//!   cancellation, and the safety shutdown.
//! - **`engine`**: `WaveformEngine`, the start/stop/status surface used by
//!   front ends.
//! - **`config`**: layered settings (TOML + environment) and run plans.
//! - **`logging`**: tracing subscriber setup.
//! - **`error`**: the `EngineError` type for synchronous failures.

pub mod config;
pub mod engine;
pub mod error;
pub mod execution;
pub mod hardware;
pub mod logging;
pub mod waveform;

pub use engine::{RunRequest, WaveformEngine};
pub use error::{EngineError, EngineResult};
pub use execution::{ExecutionRecord, RunOutcome};
pub use waveform::{generate, Profile, WaveformKind, WaveformSpec};

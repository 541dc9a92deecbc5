//! Waveform synthesis.
//!
//! Turns a [`WaveformSpec`] into a [`Profile`] of `(time, voltage)` samples. Nothing
//! here touches hardware or clocks, so both executors and the CLI preview share it.

pub mod kind;
pub mod profile;
pub mod shapes;
pub mod spec;

pub use kind::WaveformKind;
pub use profile::{generate, Profile, ProfilePoint};
pub use spec::{WaveformSpec, MAX_TARGET_VOLTAGE};

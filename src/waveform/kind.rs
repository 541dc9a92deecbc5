//! Waveform kinds.
//!
//! `WaveformKind` is a closed set. Each variant maps to exactly one unit-amplitude
//! shape function in [`super::shapes`], so adding a variant without a formula is a
//! compile error rather than a silent 0 V output.

use crate::error::EngineError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Voltage profile shape applied over one cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaveformKind {
    /// Half-period sine, 0 → V → 0.
    #[default]
    Sine,
    /// Full voltage for the first half of the cycle, 0 V after.
    Square,
    /// Linear rise to V at mid-cycle, linear fall back to 0.
    Triangle,
    /// Linear 0 → V.
    RampUp,
    /// Linear V → 0.
    RampDown,
    /// ECG-like P-QRS-T complex built from Gaussian bumps.
    Cardiac,
    /// Rectified sine with exponential decay.
    DampedSine,
    /// Normalized exponential rise, 0 → V.
    ExponentialRaise,
    /// Exponential decay from V.
    ExponentialFall,
    /// Single Gaussian pulse centred mid-cycle.
    GaussianPulse,
    /// Action-potential-like spike with a small pre-bump and undershoot.
    NeuralSpike,
    /// Eight equal discrete steps, 0 → V.
    Staircase,
    /// Ten pulses per cycle with linearly growing duty cycle.
    Pwm,
    /// Rectified sine sweeping upward in frequency.
    Chirp,
    /// Short burst of eight rectified sine periods, then idle.
    BurstMode,
    /// Full voltage, sag to 30 %, hold, recover.
    Brownout,
    /// RC capacitor charging curve.
    RcCharge,
    /// Rectified sinc centred mid-cycle.
    Sinc,
    /// Raised cosine, 0 → V → 0.
    Breathing,
}

impl WaveformKind {
    /// Every variant, in display order.
    pub const ALL: [WaveformKind; 19] = [
        WaveformKind::Sine,
        WaveformKind::Square,
        WaveformKind::Triangle,
        WaveformKind::RampUp,
        WaveformKind::RampDown,
        WaveformKind::Cardiac,
        WaveformKind::DampedSine,
        WaveformKind::ExponentialRaise,
        WaveformKind::ExponentialFall,
        WaveformKind::GaussianPulse,
        WaveformKind::NeuralSpike,
        WaveformKind::Staircase,
        WaveformKind::Pwm,
        WaveformKind::Chirp,
        WaveformKind::BurstMode,
        WaveformKind::Brownout,
        WaveformKind::RcCharge,
        WaveformKind::Sinc,
        WaveformKind::Breathing,
    ];

    /// Human-readable name, as shown in operator-facing listings.
    pub fn label(self) -> &'static str {
        match self {
            WaveformKind::Sine => "Sine",
            WaveformKind::Square => "Square",
            WaveformKind::Triangle => "Triangle",
            WaveformKind::RampUp => "Ramp Up",
            WaveformKind::RampDown => "Ramp Down",
            WaveformKind::Cardiac => "Cardiac",
            WaveformKind::DampedSine => "Damped Sine",
            WaveformKind::ExponentialRaise => "Exponential Raise",
            WaveformKind::ExponentialFall => "Exponential Fall",
            WaveformKind::GaussianPulse => "Gaussian Pulse",
            WaveformKind::NeuralSpike => "Neural Spike",
            WaveformKind::Staircase => "Staircase",
            WaveformKind::Pwm => "PWM",
            WaveformKind::Chirp => "Chirp",
            WaveformKind::BurstMode => "Burst Mode",
            WaveformKind::Brownout => "Brownout",
            WaveformKind::RcCharge => "RC Charge",
            WaveformKind::Sinc => "Sinc",
            WaveformKind::Breathing => "Breathing",
        }
    }
}

impl fmt::Display for WaveformKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Lowercase with spaces, dashes and underscores removed.
fn normalize(name: &str) -> String {
    name.chars()
        .filter(|c| !matches!(c, ' ' | '-' | '_'))
        .flat_map(char::to_lowercase)
        .collect()
}

impl FromStr for WaveformKind {
    type Err = EngineError;

    /// Accepts labels ("Ramp Up"), snake case ("ramp_up") and the
    /// `ecg` / `exponential_rise` aliases, case-insensitively.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = normalize(s);
        match wanted.as_str() {
            "ecg" => return Ok(WaveformKind::Cardiac),
            "exponentialrise" => return Ok(WaveformKind::ExponentialRaise),
            _ => {}
        }
        WaveformKind::ALL
            .into_iter()
            .find(|kind| normalize(kind.label()) == wanted)
            .ok_or_else(|| EngineError::UnknownWaveform(s.to_string()))
    }
}

//! Run request value type.

use super::kind::WaveformKind;
use serde::Serialize;
use std::time::Duration;

/// Absolute ceiling for any generated sample, in volts.
pub const MAX_TARGET_VOLTAGE: f64 = 30.0;

/// Shortest accepted cycle duration, in seconds.
pub const MIN_CYCLE_DURATION: f64 = 0.001;

/// Longest accepted cycle duration, in seconds (one day).
pub const MAX_CYCLE_DURATION: f64 = 86_400.0;

/// Parameters of one channel's waveform.
///
/// Construction never fails: out-of-range inputs are clamped to the nearest
/// valid value, the same permissive contract the operator front-ends rely on.
/// The fields are private so a constructed spec cannot be pushed back out of range.
///
/// # Example
///
/// ```
/// use psu_waveform::waveform::{WaveformKind, WaveformSpec};
///
/// let spec = WaveformSpec::new(WaveformKind::Sine, 42.0, 0, 50, 8.0);
/// assert_eq!(spec.target_voltage(), 30.0);
/// assert_eq!(spec.cycles(), 1);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct WaveformSpec {
    kind: WaveformKind,
    target_voltage: f64,
    cycles: u32,
    points_per_cycle: u32,
    cycle_duration: f64,
}

impl WaveformSpec {
    /// Build a spec, clamping every parameter into its valid range.
    ///
    /// * `target_voltage` - clamped to `[0, 30]` V; NaN becomes 0
    /// * `cycles`, `points_per_cycle` - at least 1
    /// * `cycle_duration` - seconds, clamped to `[1 ms, 1 day]`; non-positive or
    ///   non-finite values become 1 ms
    pub fn new(
        kind: WaveformKind,
        target_voltage: f64,
        cycles: u32,
        points_per_cycle: u32,
        cycle_duration: f64,
    ) -> Self {
        let target_voltage = if target_voltage.is_nan() {
            0.0
        } else {
            target_voltage.clamp(0.0, MAX_TARGET_VOLTAGE)
        };
        let cycle_duration = if cycle_duration.is_finite() && cycle_duration > 0.0 {
            cycle_duration.clamp(MIN_CYCLE_DURATION, MAX_CYCLE_DURATION)
        } else {
            MIN_CYCLE_DURATION
        };

        Self {
            kind,
            target_voltage,
            cycles: cycles.max(1),
            points_per_cycle: points_per_cycle.max(1),
            cycle_duration,
        }
    }

    /// Waveform shape.
    pub fn kind(&self) -> WaveformKind {
        self.kind
    }

    /// Peak voltage, already clamped to `[0, 30]`.
    pub fn target_voltage(&self) -> f64 {
        self.target_voltage
    }

    /// Number of cycles, at least 1.
    pub fn cycles(&self) -> u32 {
        self.cycles
    }

    /// Samples per cycle, at least 1.
    pub fn points_per_cycle(&self) -> u32 {
        self.points_per_cycle
    }

    /// Duration of one cycle in seconds.
    pub fn cycle_duration(&self) -> f64 {
        self.cycle_duration
    }

    /// Upper bound for every sample of this spec.
    pub fn voltage_ceiling(&self) -> f64 {
        self.target_voltage.min(MAX_TARGET_VOLTAGE)
    }

    /// Profile length, `cycles × points_per_cycle`.
    pub fn total_points(&self) -> usize {
        self.cycles as usize * self.points_per_cycle as usize
    }

    /// Wall-clock budget per point that makes the run last `cycles × cycle_duration`.
    pub fn point_interval(&self) -> Duration {
        Duration::from_secs_f64(self.cycle_duration / f64::from(self.points_per_cycle))
    }

    /// Over-voltage protection level to program for this spec: 2 V of headroom,
    /// capped at 35 V.
    pub fn ovp_level(&self) -> f64 {
        (self.target_voltage + 2.0).min(35.0)
    }
}

impl Default for WaveformSpec {
    /// The operator defaults: 3 V sine, 3 cycles of 50 points over 8 s.
    fn default() -> Self {
        Self::new(WaveformKind::Sine, 3.0, 3, 50, 8.0)
    }
}

//! Profile generation.

use super::shapes::shape_of;
use super::spec::WaveformSpec;
use serde::Serialize;

/// One sample of a profile.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ProfilePoint {
    /// Offset from the start of the run, in seconds.
    pub time: f64,
    /// Commanded output, in volts.
    pub voltage: f64,
}

/// Ordered samples for one channel, generated once and never modified.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Profile {
    points: Vec<ProfilePoint>,
    points_per_cycle: usize,
    cycles: usize,
}

impl Profile {
    /// All samples in execution order.
    pub fn points(&self) -> &[ProfilePoint] {
        &self.points
    }

    /// Sample at `index`, if any.
    pub fn get(&self, index: usize) -> Option<&ProfilePoint> {
        self.points.get(index)
    }

    /// Sample at `index`, or the final sample once the profile is exhausted.
    ///
    /// Returns `None` only for an empty profile, which `generate` never produces.
    pub fn hold_last(&self, index: usize) -> Option<&ProfilePoint> {
        self.points.get(index).or_else(|| self.points.last())
    }

    /// Number of samples.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// True when the profile has no samples.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Samples per cycle used to derive cycle / point-in-cycle indices.
    pub fn points_per_cycle(&self) -> usize {
        self.points_per_cycle
    }

    /// Number of cycles.
    pub fn cycles(&self) -> usize {
        self.cycles
    }

    /// `(cycle, point_in_cycle)` of a flat point index.
    pub fn position_of(&self, index: usize) -> (usize, usize) {
        let per_cycle = self.points_per_cycle.max(1);
        (index / per_cycle, index % per_cycle)
    }

    /// Time of the last sample, in seconds.
    pub fn duration(&self) -> f64 {
        self.points.last().map_or(0.0, |p| p.time)
    }
}

fn round_micro(value: f64) -> f64 {
    (value * 1e6).round() / 1e6
}

/// Generate the profile described by `spec`.
///
/// Pure and deterministic: the same spec always yields a bit-identical profile.
/// The result has exactly `cycles × points_per_cycle` samples, times are
/// non-decreasing, and every voltage lies in `[0, spec.voltage_ceiling()]`.
/// Both coordinates are rounded to microsecond / microvolt precision.
///
/// # Example
///
/// ```
/// use psu_waveform::waveform::{generate, WaveformKind, WaveformSpec};
///
/// let profile = generate(&WaveformSpec::new(WaveformKind::RampUp, 10.0, 1, 3, 3.0));
/// let volts: Vec<f64> = profile.points().iter().map(|p| p.voltage).collect();
/// assert_eq!(volts, vec![0.0, 5.0, 10.0]);
/// ```
pub fn generate(spec: &WaveformSpec) -> Profile {
    let shape = shape_of(spec.kind());
    let target = spec.target_voltage();
    let ceiling = spec.voltage_ceiling();
    let cycle_duration = spec.cycle_duration();
    let points_per_cycle = spec.points_per_cycle() as usize;
    let cycles = spec.cycles() as usize;

    let mut points = Vec::with_capacity(spec.total_points());
    for cycle in 0..cycles {
        for point in 0..points_per_cycle {
            let pos = if points_per_cycle > 1 {
                point as f64 / (points_per_cycle - 1) as f64
            } else {
                0.0
            };
            let time = cycle as f64 * cycle_duration + pos * cycle_duration;
            let voltage = (shape(pos) * target).clamp(0.0, ceiling);

            points.push(ProfilePoint {
                time: round_micro(time),
                // Rounding may nudge a peak sample past a non-round ceiling.
                voltage: round_micro(voltage).clamp(0.0, ceiling),
            });
        }
    }

    Profile {
        points,
        points_per_cycle,
        cycles,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::waveform::WaveformKind;

    #[test]
    fn single_point_cycles_sit_at_phase_zero() {
        let profile = generate(&WaveformSpec::new(WaveformKind::RampDown, 4.0, 3, 1, 2.0));
        let times: Vec<f64> = profile.points().iter().map(|p| p.time).collect();
        assert_eq!(times, vec![0.0, 2.0, 4.0]);
        assert!(profile.points().iter().all(|p| p.voltage == 4.0));
    }

    #[test]
    fn hold_last_freezes_final_sample() {
        let profile = generate(&WaveformSpec::new(WaveformKind::RampUp, 6.0, 1, 4, 3.0));
        assert_eq!(profile.hold_last(2).map(|p| p.voltage), Some(4.0));
        assert_eq!(profile.hold_last(3).map(|p| p.voltage), Some(6.0));
        assert_eq!(profile.hold_last(50).map(|p| p.voltage), Some(6.0));
    }

    #[test]
    fn position_of_splits_cycles() {
        let profile = generate(&WaveformSpec::new(WaveformKind::Sine, 1.0, 3, 4, 1.0));
        assert_eq!(profile.position_of(0), (0, 0));
        assert_eq!(profile.position_of(5), (1, 1));
        assert_eq!(profile.position_of(11), (2, 3));
        assert_eq!(profile.duration(), 3.0);
    }

    #[test]
    fn non_round_ceiling_is_never_exceeded() {
        let spec = WaveformSpec::new(WaveformKind::Square, 3.123_456_78, 1, 4, 1.0);
        let profile = generate(&spec);
        assert!(profile
            .points()
            .iter()
            .all(|p| p.voltage <= spec.voltage_ceiling()));
    }
}

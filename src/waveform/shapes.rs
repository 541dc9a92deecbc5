//! Unit-amplitude shape functions.
//!
//! Every function takes the normalized phase `pos ∈ [0, 1]` within a cycle and
//! returns a factor that the generator multiplies by the target voltage. The
//! generator clamps afterwards, so individual shapes may briefly leave [0, 1].
//!
//! The constants are fixed reproductions of the bench profiles operators already
//! use; they are not meant to be tuned per run.

use super::kind::WaveformKind;
use std::f64::consts::{PI, TAU};

/// Signature shared by every shape.
pub type ShapeFn = fn(f64) -> f64;

/// Shape function for a waveform kind.
pub fn shape_of(kind: WaveformKind) -> ShapeFn {
    match kind {
        WaveformKind::Sine => sine,
        WaveformKind::Square => square,
        WaveformKind::Triangle => triangle,
        WaveformKind::RampUp => ramp_up,
        WaveformKind::RampDown => ramp_down,
        WaveformKind::Cardiac => cardiac,
        WaveformKind::DampedSine => damped_sine,
        WaveformKind::ExponentialRaise => exponential_raise,
        WaveformKind::ExponentialFall => exponential_fall,
        WaveformKind::GaussianPulse => gaussian_pulse,
        WaveformKind::NeuralSpike => neural_spike,
        WaveformKind::Staircase => staircase,
        WaveformKind::Pwm => pwm,
        WaveformKind::Chirp => chirp,
        WaveformKind::BurstMode => burst_mode,
        WaveformKind::Brownout => brownout,
        WaveformKind::RcCharge => rc_charge,
        WaveformKind::Sinc => sinc,
        WaveformKind::Breathing => breathing,
    }
}

fn sine(pos: f64) -> f64 {
    (pos * PI).sin()
}

fn square(pos: f64) -> f64 {
    if pos < 0.5 {
        1.0
    } else {
        0.0
    }
}

fn triangle(pos: f64) -> f64 {
    if pos < 0.5 {
        2.0 * pos
    } else {
        2.0 - 2.0 * pos
    }
}

fn ramp_up(pos: f64) -> f64 {
    pos
}

fn ramp_down(pos: f64) -> f64 {
    1.0 - pos
}

// P, Q, R, S, T waves: (centre angle, amplitude, width), angles in radians.
const CARDIAC_WAVES: [(f64, f64, f64); 5] = [
    (-0.25 * PI, 0.12, 0.20),
    (-0.05 * PI, -0.20, 0.10),
    (0.0, 1.00, 0.04),
    (0.05 * PI, -0.25, 0.12),
    (0.30 * PI, 0.35, 0.40),
];

/// Smallest signed angular distance from `to` to `from`, in (-π, π].
fn angular_distance(from: f64, to: f64) -> f64 {
    let delta = (from - to + PI).rem_euclid(TAU) - PI;
    if delta <= -PI {
        delta + TAU
    } else {
        delta
    }
}

fn cardiac(pos: f64) -> f64 {
    let theta = pos * TAU;
    let sum: f64 = CARDIAC_WAVES
        .iter()
        .map(|&(centre, amplitude, width)| {
            let d = angular_distance(theta, centre) / width;
            amplitude * (-0.5 * d * d).exp()
        })
        .sum();
    sum.max(0.0)
}

fn damped_sine(pos: f64) -> f64 {
    ((TAU * pos).sin() * (-3.0 * pos).exp()).abs()
}

fn exponential_raise(pos: f64) -> f64 {
    ((5.0 * pos).exp() - 1.0) / (5.0_f64.exp() - 1.0)
}

fn exponential_fall(pos: f64) -> f64 {
    (-5.0 * pos).exp()
}

fn gaussian_pulse(pos: f64) -> f64 {
    const SIGMA: f64 = 0.12;
    (-(pos - 0.5).powi(2) / (2.0 * SIGMA * SIGMA)).exp()
}

/// `exp(-(pos - mu)^2 / variance)`
fn bump(pos: f64, mu: f64, variance: f64) -> f64 {
    (-(pos - mu).powi(2) / variance).exp()
}

fn neural_spike(pos: f64) -> f64 {
    let v = 0.2 * bump(pos, 0.30, 0.004) + bump(pos, 0.50, 0.0004)
        - 0.3 * bump(pos, 0.60, 0.001);
    v.max(0.0)
}

fn staircase(pos: f64) -> f64 {
    const STEPS: f64 = 8.0;
    let step = (pos * STEPS).floor().min(STEPS - 1.0);
    step / (STEPS - 1.0)
}

fn pwm(pos: f64) -> f64 {
    const PULSES_PER_CYCLE: f64 = 10.0;
    // Duty cycle tracks pos, so the output widens from 0 % to 100 %.
    if (pos * PULSES_PER_CYCLE).fract() < pos {
        1.0
    } else {
        0.0
    }
}

fn chirp(pos: f64) -> f64 {
    (TAU * (pos + 2.5 * pos * pos)).sin().abs()
}

fn burst_mode(pos: f64) -> f64 {
    const BURST_END: f64 = 0.2;
    const BURST_PERIODS: f64 = 8.0;
    if pos < BURST_END {
        (TAU * BURST_PERIODS * pos / BURST_END).sin().abs()
    } else {
        0.0
    }
}

fn brownout(pos: f64) -> f64 {
    const SAG_LEVEL: f64 = 0.3;
    if pos < 0.3 {
        1.0
    } else if pos < 0.5 {
        let sag_pos = (pos - 0.3) / 0.2;
        SAG_LEVEL + (1.0 - SAG_LEVEL) * (-5.0 * sag_pos).exp()
    } else if pos < 0.7 {
        SAG_LEVEL
    } else {
        let rec_pos = (pos - 0.7) / 0.3;
        SAG_LEVEL + (1.0 - SAG_LEVEL) * (1.0 - (-5.0 * rec_pos).exp())
    }
}

fn rc_charge(pos: f64) -> f64 {
    const TIME_CONSTANT: f64 = 0.2;
    1.0 - (-pos / TIME_CONSTANT).exp()
}

fn sinc(pos: f64) -> f64 {
    let x = (pos - 0.5) * 10.0;
    if x.abs() < 0.01 {
        1.0
    } else {
        ((PI * x).sin() / (PI * x)).abs()
    }
}

fn breathing(pos: f64) -> f64 {
    (1.0 - (TAU * pos).cos()) / 2.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn angular_distance_wraps_to_shortest_arc() {
        assert!(close(angular_distance(0.1, 0.0), 0.1));
        assert!(close(angular_distance(TAU - 0.1, 0.0), -0.1));
        assert!(close(angular_distance(PI, 0.0), PI));
        assert!(close(angular_distance(0.0, 0.30 * PI), -0.30 * PI));
    }

    #[test]
    fn cardiac_peaks_at_r_wave() {
        // R wave sits at theta = 0, i.e. the cycle boundaries.
        let r = cardiac(0.0);
        assert!(r > 0.8 && r < 1.1, "R peak was {r}");
        assert!(cardiac(0.5) < 0.05);
        assert!(cardiac(0.15) > 0.3, "T wave missing");
    }

    #[test]
    fn staircase_has_eight_levels() {
        assert!(close(staircase(0.0), 0.0));
        assert!(close(staircase(0.125), 1.0 / 7.0));
        assert!(close(staircase(0.99), 1.0));
        assert!(close(staircase(1.0), 1.0));
    }

    #[test]
    fn pwm_duty_grows_with_phase() {
        assert!(close(pwm(0.0), 0.0));
        // Late in the cycle the pulse is on for most of each period.
        assert!(close(pwm(0.93), 1.0));
        assert!(close(pwm(0.05), 0.0));
    }

    #[test]
    fn brownout_segments() {
        assert!(close(brownout(0.1), 1.0));
        assert!(close(brownout(0.3), 1.0));
        assert!(close(brownout(0.6), 0.3));
        assert!(brownout(0.45) < 1.0 && brownout(0.45) > 0.3);
        let end = brownout(1.0);
        assert!(end > 0.99 && end < 1.0);
    }

    #[test]
    fn sinc_is_unity_at_centre() {
        assert!(close(sinc(0.5), 1.0));
        assert!(close(sinc(0.6), 0.0));
    }

    #[test]
    fn exponential_raise_spans_unit_interval() {
        assert!(close(exponential_raise(0.0), 0.0));
        assert!(close(exponential_raise(1.0), 1.0));
    }

    #[test]
    fn burst_is_idle_after_window() {
        assert!(close(burst_mode(0.5), 0.0));
        assert!(burst_mode(0.00625) > 0.99);
    }
}

//! Per-point pacing and timing telemetry.
//!
//! Pacing is best effort: each point measures how long its device writes took
//! and sleeps the remainder of the budget. Overruns are not made up later; they
//! show up in [`TimingStats`] instead.

use serde::Serialize;
use std::fmt;
use std::thread;
use std::time::{Duration, Instant};

/// Holds a constant per-point cadence regardless of device-call latency.
#[derive(Debug, Clone, Copy)]
pub struct PointPacer {
    budget: Duration,
}

impl PointPacer {
    /// Pacer with a fixed per-point budget.
    pub fn new(budget: Duration) -> Self {
        Self { budget }
    }

    /// Per-point budget.
    pub fn budget(&self) -> Duration {
        self.budget
    }

    /// Sleep until `budget` has passed since `started`, returning the total
    /// wall time of the point.
    pub fn finish(&self, started: Instant) -> Duration {
        let elapsed = started.elapsed();
        if let Some(remaining) = self.budget.checked_sub(elapsed) {
            if !remaining.is_zero() {
                thread::sleep(remaining);
            }
        }
        started.elapsed()
    }
}

/// Effective per-point budget: the slower of the requested cadence and the
/// settle time.
pub fn effective_budget(per_point: Duration, settle: Duration) -> Duration {
    per_point.max(settle)
}

/// Running statistics over measured point durations.
#[derive(Debug, Clone, Default)]
pub struct TimingStats {
    count: usize,
    total: Duration,
    min: Option<Duration>,
    max: Option<Duration>,
    sum_sq_secs: f64,
}

impl TimingStats {
    /// Empty statistics.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one measured point duration.
    pub fn record(&mut self, duration: Duration) {
        self.count += 1;
        self.total += duration;
        self.min = Some(self.min.map_or(duration, |m| m.min(duration)));
        self.max = Some(self.max.map_or(duration, |m| m.max(duration)));
        let secs = duration.as_secs_f64();
        self.sum_sq_secs += secs * secs;
    }

    /// Number of recorded points.
    pub fn count(&self) -> usize {
        self.count
    }

    /// Sum of recorded durations.
    pub fn total(&self) -> Duration {
        self.total
    }

    /// Mean point duration, zero when empty.
    pub fn mean(&self) -> Duration {
        if self.count == 0 {
            return Duration::ZERO;
        }
        nanos_to_duration(self.total.as_nanos() / self.count as u128)
    }

    /// Shortest point.
    pub fn min(&self) -> Duration {
        self.min.unwrap_or_default()
    }

    /// Longest point.
    pub fn max(&self) -> Duration {
        self.max.unwrap_or_default()
    }

    /// Population standard deviation of point durations.
    pub fn std_dev(&self) -> Duration {
        if self.count < 2 {
            return Duration::ZERO;
        }
        let n = self.count as f64;
        let mean = self.total.as_secs_f64() / n;
        let variance = (self.sum_sq_secs / n - mean * mean).max(0.0);
        Duration::from_secs_f64(variance.sqrt())
    }

    /// One-line completion summary used as the final status message.
    pub fn summary(&self, elapsed: Duration) -> String {
        format!(
            "Completed {} points in {:.2}s (per point: mean {:.1} ms, min {:.1} ms, max {:.1} ms, std-dev {:.1} ms)",
            self.count,
            elapsed.as_secs_f64(),
            millis(self.mean()),
            millis(self.min()),
            millis(self.max()),
            millis(self.std_dev()),
        )
    }
}

fn nanos_to_duration(nanos: u128) -> Duration {
    Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
}

fn millis(duration: Duration) -> f64 {
    duration.as_secs_f64() * 1000.0
}

/// Snapshot of a run's progress.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Progress {
    /// Points finished so far.
    pub completed: usize,
    /// Points in the whole run.
    pub total: usize,
    /// `completed / total` as a percentage.
    pub percent: f64,
    /// Wall time since the first point.
    pub elapsed: Duration,
    /// Mean measured point duration so far.
    pub average: Duration,
    /// `remaining points × average`.
    pub eta: Duration,
}

impl fmt::Display for Progress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Progress: {:.1}% ({}/{}), elapsed {:.2}s, avg {:.1} ms/point, ETA {:.2}s",
            self.percent,
            self.completed,
            self.total,
            self.elapsed.as_secs_f64(),
            millis(self.average),
            self.eta.as_secs_f64(),
        )
    }
}

/// Decides when to emit progress telemetry and builds the snapshot.
#[derive(Debug, Clone)]
pub struct ProgressTracker {
    total: usize,
    interval: usize,
    started: Instant,
}

impl ProgressTracker {
    /// Report every `fraction` of `total` points, and at least every point.
    pub fn new(total: usize, fraction: f64) -> Self {
        let interval = ((total as f64) * fraction).floor() as usize;
        Self {
            total,
            interval: interval.max(1),
            started: Instant::now(),
        }
    }

    /// Number of points between reports.
    pub fn interval(&self) -> usize {
        self.interval
    }

    /// Wall time since the tracker was created.
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Progress after `completed` points, if a report is due.
    pub fn update(&self, completed: usize, stats: &TimingStats) -> Option<Progress> {
        if completed == 0 || completed % self.interval != 0 {
            return None;
        }
        Some(self.snapshot(completed, stats))
    }

    /// Unconditional progress snapshot.
    pub fn snapshot(&self, completed: usize, stats: &TimingStats) -> Progress {
        let average = stats.mean();
        let remaining = self.total.saturating_sub(completed);
        let percent = if self.total == 0 {
            100.0
        } else {
            completed as f64 / self.total as f64 * 100.0
        };
        Progress {
            completed,
            total: self.total,
            percent,
            elapsed: self.started.elapsed(),
            average,
            eta: nanos_to_duration(average.as_nanos().saturating_mul(remaining as u128)),
        }
    }
}

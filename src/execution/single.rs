//! Single-channel executor.

use super::pacing::{effective_budget, PointPacer, ProgressTracker, TimingStats};
use super::safety::safe_shutdown;
use super::{
    advance, read_back, CancelToken, ExecutionRecord, ExecutionTiming, RecordCollector,
    RunOutcome, RunState, StatusBoard,
};
use crate::hardware::{ChannelId, ChannelSelector, PowerSupply};
use crate::waveform::Profile;
use anyhow::{Context, Result};
use chrono::Utc;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{error, info};

/// Plays one profile on one channel at a fixed cadence.
pub struct SingleChannelExecutor<D: ?Sized> {
    supply: Arc<D>,
    collector: RecordCollector,
    status: StatusBoard,
    timing: ExecutionTiming,
}

impl<D: PowerSupply + ?Sized> SingleChannelExecutor<D> {
    /// Executor writing records to `collector` and progress to `status`.
    pub fn new(
        supply: Arc<D>,
        collector: RecordCollector,
        status: StatusBoard,
        timing: ExecutionTiming,
    ) -> Self {
        Self {
            supply,
            collector,
            status,
            timing,
        }
    }

    /// Run `profile` on `channel`.
    ///
    /// Each point takes `max(per_point, settle)`. The collector is cleared first.
    /// The channel is left at 0 V with its output off on return, whatever the
    /// outcome.
    pub fn run(
        &self,
        channel: ChannelId,
        profile: &Profile,
        settle: Duration,
        per_point: Duration,
        cancel: &CancelToken,
    ) -> RunOutcome {
        self.collector.clear();
        let mut state = RunState::Idle;
        let mut stats = TimingStats::new();
        let started = Instant::now();
        let pacer = PointPacer::new(effective_budget(per_point, settle));

        info!(
            %channel,
            points = profile.len(),
            budget_ms = pacer.budget().as_millis() as u64,
            "Starting single-channel run"
        );

        let outcome = match self.drive(channel, profile, &pacer, cancel, &mut state, &mut stats) {
            Ok(outcome) => outcome,
            Err(err) => {
                let reason = format!("{err:#}");
                error!(%channel, error = %reason, "Single-channel run failed");
                RunOutcome::Failed(reason)
            }
        };
        advance(&mut state, outcome.terminal_state());

        let failures = safe_shutdown(self.supply.as_ref(), &[channel]);
        if !failures.is_empty() {
            error!(%channel, count = failures.len(), "Safety shutdown incomplete");
        }

        match &outcome {
            RunOutcome::Completed => {
                let summary = stats.summary(started.elapsed());
                info!(%channel, "{summary}");
                self.status.set(summary);
            }
            RunOutcome::Aborted => {
                let message = format!(
                    "Aborted on {channel} after {} of {} points",
                    stats.count(),
                    profile.len()
                );
                info!("{message}");
                self.status.set(message);
            }
            RunOutcome::Failed(reason) => self.status.set_error(reason),
        }
        outcome
    }

    fn drive(
        &self,
        channel: ChannelId,
        profile: &Profile,
        pacer: &PointPacer,
        cancel: &CancelToken,
        state: &mut RunState,
        stats: &mut TimingStats,
    ) -> Result<RunOutcome> {
        advance(state, RunState::Enabling);
        self.status.set(format!("Enabling {channel}"));
        self.supply
            .clear_protection(ChannelSelector::One(channel))
            .with_context(|| format!("clear_protection({channel}) failed"))?;
        self.supply
            .enable_output(channel)
            .with_context(|| format!("enable_output({channel}) failed"))?;
        thread::sleep(self.timing.enable_settle);

        advance(state, RunState::Running);
        self.status
            .set(format!("Running {channel}: {} points", profile.len()));
        let progress = ProgressTracker::new(profile.len(), self.timing.progress_fraction);

        for (index, point) in profile.points().iter().enumerate() {
            if cancel.is_cancelled() {
                info!(%channel, index, "Cancellation requested");
                return Ok(RunOutcome::Aborted);
            }
            let (cycle_number, point_in_cycle) = profile.position_of(index);
            let point_started = Instant::now();
            let timestamp = Utc::now();

            self.supply
                .set_voltage(channel, point.voltage)
                .with_context(|| {
                    format!(
                        "set_voltage({channel}, {:.3} V) failed at point {index}",
                        point.voltage
                    )
                })?;
            let (measured_voltage, measured_current) = read_back(
                self.supply.as_ref(),
                channel,
                point.voltage,
                self.timing.readback,
            );

            let point_duration = pacer.finish(point_started);
            stats.record(point_duration);
            self.collector.push(ExecutionRecord {
                timestamp,
                channel,
                set_voltage: point.voltage,
                measured_voltage,
                measured_current,
                cycle_number,
                point_in_cycle,
                point_index: index,
                point_duration,
            });

            if let Some(report) = progress.update(index + 1, stats) {
                info!(
                    %channel,
                    percent = report.percent,
                    elapsed_s = report.elapsed.as_secs_f64(),
                    avg_ms = report.average.as_secs_f64() * 1000.0,
                    eta_s = report.eta.as_secs_f64(),
                    "Progress"
                );
                self.status.set(report.to_string());
            }
        }
        Ok(RunOutcome::Completed)
    }
}

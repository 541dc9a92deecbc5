//! Multi-channel executor.
//!
//! All channels share one instrument bus, so a single loop advances every
//! channel by point index and commands them strictly in configuration order.
//! Profiles may differ in length; a channel that runs out holds its last
//! sample until the longest profile finishes.

use super::pacing::{effective_budget, PointPacer, ProgressTracker, TimingStats};
use super::safety::safe_shutdown;
use super::{
    advance, read_back, CancelToken, ExecutionRecord, ExecutionTiming, RecordCollector,
    RunOutcome, RunState, StatusBoard,
};
use crate::hardware::{ChannelId, ChannelSelector, ChannelSettings, PowerSupply};
use crate::waveform::{generate, Profile, WaveformSpec};
use anyhow::{Context, Result};
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{error, info};

/// One channel's part of a multi-channel run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChannelExecutionConfig {
    /// Output to drive.
    pub channel: ChannelId,
    /// Waveform for this channel.
    pub spec: WaveformSpec,
    /// Current limit programmed during setup, in amperes.
    pub current_limit: f64,
    /// Minimum time per point for this channel.
    pub settle_time: Duration,
}

/// Plays several profiles in lock-step, one point index at a time.
pub struct MultiChannelExecutor<D: ?Sized> {
    supply: Arc<D>,
    collector: RecordCollector,
    status: StatusBoard,
    timing: ExecutionTiming,
}

impl<D: PowerSupply + ?Sized> MultiChannelExecutor<D> {
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

    /// Run every config together.
    ///
    /// Each point index takes `max(per_point, largest settle_time)`, covering
    /// the writes to all channels. The collector is cleared first. Every
    /// configured channel is left at 0 V with its output off on return.
    pub fn run(
        &self,
        configs: &[ChannelExecutionConfig],
        per_point: Duration,
        cancel: &CancelToken,
    ) -> RunOutcome {
        self.collector.clear();
        let channels: Vec<ChannelId> = configs.iter().map(|c| c.channel).collect();
        let profiles: Vec<Profile> = configs.iter().map(|c| generate(&c.spec)).collect();
        let max_points = profiles.iter().map(Profile::len).max().unwrap_or(0);
        let settle = configs
            .iter()
            .map(|c| c.settle_time)
            .max()
            .unwrap_or_default();
        let pacer = PointPacer::new(effective_budget(per_point, settle));

        let mut state = RunState::Idle;
        let mut stats = TimingStats::new();
        let started = Instant::now();

        info!(
            channels = ?channels,
            max_points,
            budget_ms = pacer.budget().as_millis() as u64,
            "Starting multi-channel run"
        );

        let outcome = match self.drive(
            configs,
            &profiles,
            max_points,
            &pacer,
            cancel,
            &mut state,
            &mut stats,
        ) {
            Ok(outcome) => outcome,
            Err(err) => {
                let reason = format!("{err:#}");
                error!(error = %reason, "Multi-channel run failed");
                RunOutcome::Failed(reason)
            }
        };
        advance(&mut state, outcome.terminal_state());

        let failures = safe_shutdown(self.supply.as_ref(), &channels);
        if !failures.is_empty() {
            error!(count = failures.len(), "Safety shutdown incomplete");
        }

        match &outcome {
            RunOutcome::Completed => {
                let summary = format!(
                    "{} across {} channels",
                    stats.summary(started.elapsed()),
                    channels.len()
                );
                info!("{summary}");
                self.status.set(summary);
            }
            RunOutcome::Aborted => {
                let message = format!(
                    "Aborted after {} of {} points on {} channels",
                    stats.count(),
                    max_points,
                    channels.len()
                );
                info!("{message}");
                self.status.set(message);
            }
            RunOutcome::Failed(reason) => self.status.set_error(reason),
        }
        outcome
    }

    #[allow(clippy::too_many_arguments)]
    fn drive(
        &self,
        configs: &[ChannelExecutionConfig],
        profiles: &[Profile],
        max_points: usize,
        pacer: &PointPacer,
        cancel: &CancelToken,
        state: &mut RunState,
        stats: &mut TimingStats,
    ) -> Result<RunOutcome> {
        advance(state, RunState::Enabling);
        self.status
            .set(format!("Configuring {} channels", configs.len()));
        self.supply
            .clear_protection(ChannelSelector::All)
            .context("clear_protection(all) failed")?;
        for config in configs {
            let channel = config.channel;
            self.supply
                .configure_channel(
                    channel,
                    ChannelSettings {
                        voltage: 0.0,
                        current_limit: config.current_limit,
                        ovp_level: config.spec.ovp_level(),
                        enable_output: true,
                    },
                )
                .with_context(|| format!("configure_channel({channel}) failed"))?;
            thread::sleep(self.timing.channel_setup_delay);
        }

        advance(state, RunState::Running);
        self.status.set(format!(
            "Running {} channels: {max_points} points",
            configs.len()
        ));
        let progress = ProgressTracker::new(max_points, self.timing.progress_fraction);

        for index in 0..max_points {
            if cancel.is_cancelled() {
                info!(index, "Cancellation requested");
                return Ok(RunOutcome::Aborted);
            }
            let point_started = Instant::now();

            for (config, profile) in configs.iter().zip(profiles) {
                let channel = config.channel;
                let Some(point) = profile.hold_last(index) else {
                    continue;
                };
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
                let own_index = index.min(profile.len() - 1);
                let (cycle_number, point_in_cycle) = profile.position_of(own_index);
                self.collector.push(ExecutionRecord {
                    timestamp,
                    channel,
                    set_voltage: point.voltage,
                    measured_voltage,
                    measured_current,
                    cycle_number,
                    point_in_cycle,
                    point_index: index,
                    point_duration: point_started.elapsed(),
                });
            }

            stats.record(pacer.finish(point_started));
            if let Some(report) = progress.update(index + 1, stats) {
                info!(
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

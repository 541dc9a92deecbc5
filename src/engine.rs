//! Waveform engine.
//!
//! The controller-facing surface: start a run, request a stop, poll the status
//! line and the records. A run executes on its own named worker thread.
//!
//! At most one run is active per supply connection. The connection is the
//! shared `Arc<D>` handed to [`WaveformEngine`]: every engine built from a clone
//! of that `Arc` competes for the same run claim, and a start while another
//! engine's run holds it fails with [`EngineError::AlreadyRunning`]. Separate
//! driver instances that open the same instrument are not detected.
//!
//! Requests are validated synchronously. A request naming an unknown channel or
//! a voltage above a channel's ceiling is rejected with an [`EngineError`]
//! before the worker starts and before any device call.
//!
//! # Example
//!
//! ```no_run
//! use psu_waveform::engine::WaveformEngine;
//! use psu_waveform::hardware::{mock::MockPowerSupply, ChannelId};
//! use psu_waveform::waveform::{WaveformKind, WaveformSpec};
//! use std::sync::Arc;
//!
//! let engine = WaveformEngine::new(Arc::new(MockPowerSupply::new()));
//! let spec = WaveformSpec::new(WaveformKind::Sine, 3.0, 3, 50, 8.0);
//! let run_id = engine.start_single(ChannelId(1), spec).unwrap();
//! println!("{run_id}: {}", engine.status_message());
//! let outcome = engine.wait();
//! ```

use crate::config::Settings;
use crate::error::{EngineError, EngineResult};
use crate::execution::safety::{safe_shutdown, ShutdownFailure};
use crate::execution::{
    CancelToken, ChannelExecutionConfig, ExecutionRecord, ExecutionTiming, MultiChannelExecutor,
    RecordCollector, RunOutcome, SingleChannelExecutor, StatusBoard,
};
use crate::hardware::{ChannelId, ChannelLimits, PowerSupply};
use crate::waveform::{generate, WaveformSpec};
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeSet, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{error, info, info_span, warn};
use uuid::Uuid;

/// Settle time used when a single-channel request does not give one.
pub const DEFAULT_SETTLE_TIME: Duration = Duration::from_millis(50);

/// What to run.
#[derive(Debug, Clone, PartialEq)]
pub enum RunRequest {
    /// One waveform on one channel.
    Single {
        /// Output to drive.
        channel: ChannelId,
        /// Waveform parameters.
        spec: WaveformSpec,
        /// Minimum time per point; engine default when `None`.
        settle_time: Option<Duration>,
        /// Target time per point; `cycle_duration / points_per_cycle` when `None`.
        point_duration: Option<Duration>,
    },
    /// Several channels advanced together.
    Multi {
        /// One entry per channel, in command order.
        configs: Vec<ChannelExecutionConfig>,
        /// Target time per point index; the shortest channel interval when `None`.
        point_duration: Option<Duration>,
    },
}

impl RunRequest {
    fn mode(&self) -> &'static str {
        match self {
            RunRequest::Single { .. } => "single",
            RunRequest::Multi { .. } => "multi",
        }
    }
}

/// Supply connections with an active run, keyed by the address of the shared
/// driver. An entry is held by a [`RunningGuard`]; the claiming engine keeps the
/// driver alive until the entry is removed, so an address cannot be reused
/// while it is claimed.
static CLAIMED_SUPPLIES: Mutex<BTreeSet<usize>> = parking_lot::const_mutex(BTreeSet::new());

fn supply_key<D: ?Sized>(supply: &Arc<D>) -> usize {
    Arc::as_ptr(supply).cast::<()>() as usize
}

/// Holds the supply's run claim and the engine's running flag. Both are
/// released when the worker exits, including by panic.
struct RunningGuard {
    running: Arc<AtomicBool>,
    supply: usize,
}

impl RunningGuard {
    /// Claim `supply` for one run; `None` if a run already holds it.
    fn claim(supply: usize, running: &Arc<AtomicBool>) -> Option<Self> {
        if !CLAIMED_SUPPLIES.lock().insert(supply) {
            return None;
        }
        running.store(true, Ordering::SeqCst);
        Some(Self {
            running: Arc::clone(running),
            supply,
        })
    }
}

impl Drop for RunningGuard {
    fn drop(&mut self) {
        CLAIMED_SUPPLIES.lock().remove(&self.supply);
        self.running.store(false, Ordering::SeqCst);
    }
}

/// Runs waveforms against one supply, one run at a time per connection.
pub struct WaveformEngine<D: PowerSupply + ?Sized + 'static> {
    supply: Arc<D>,
    limits: ChannelLimits,
    timing: ExecutionTiming,
    default_settle: Duration,
    collector: RecordCollector,
    status: StatusBoard,
    cancel: Mutex<CancelToken>,
    running: Arc<AtomicBool>,
    worker: Mutex<Option<JoinHandle<RunOutcome>>>,
    run_id: RwLock<Option<String>>,
    last_outcome: Arc<RwLock<Option<RunOutcome>>>,
}

impl<D: PowerSupply + ?Sized + 'static> WaveformEngine<D> {
    /// Engine with the default three-channel limit table and timing.
    pub fn new(supply: Arc<D>) -> Self {
        Self::with_limits(supply, ChannelLimits::default(), ExecutionTiming::default())
    }

    /// Engine with explicit channel limits and timing.
    pub fn with_limits(supply: Arc<D>, limits: ChannelLimits, timing: ExecutionTiming) -> Self {
        Self {
            supply,
            limits,
            timing,
            default_settle: DEFAULT_SETTLE_TIME,
            collector: RecordCollector::new(),
            status: StatusBoard::new(),
            cancel: Mutex::new(CancelToken::new()),
            running: Arc::new(AtomicBool::new(false)),
            worker: Mutex::new(None),
            run_id: RwLock::new(None),
            last_outcome: Arc::new(RwLock::new(None)),
        }
    }

    /// Engine configured from loaded settings.
    pub fn from_settings(supply: Arc<D>, settings: &Settings) -> Self {
        let mut engine = Self::with_limits(supply, settings.channel_limits(), settings.timing());
        engine.default_settle = settings.engine.default_settle_time();
        engine
    }

    /// Channel table requests are validated against.
    pub fn limits(&self) -> &ChannelLimits {
        &self.limits
    }

    /// Start a single-channel run with default settle and point duration.
    pub fn start_single(&self, channel: ChannelId, spec: WaveformSpec) -> EngineResult<String> {
        self.start(RunRequest::Single {
            channel,
            spec,
            settle_time: None,
            point_duration: None,
        })
    }

    /// Start a multi-channel run with the default point duration.
    pub fn start_multi(&self, configs: Vec<ChannelExecutionConfig>) -> EngineResult<String> {
        self.start(RunRequest::Multi {
            configs,
            point_duration: None,
        })
    }

    /// Validate `request` and start it on a worker thread. Returns the run id.
    ///
    /// # Errors
    ///
    /// Configuration errors and [`EngineError::AlreadyRunning`] (this or
    /// another engine on the same supply is running) are returned before any
    /// device call. [`EngineError::Io`] if the thread cannot spawn.
    pub fn start(&self, request: RunRequest) -> EngineResult<String> {
        self.validate(&request)?;

        let Some(guard) = RunningGuard::claim(supply_key(&self.supply), &self.running) else {
            warn!("Rejected run request: a run is already active on this supply");
            return Err(EngineError::AlreadyRunning);
        };

        // The previous worker has already cleared the running flag; reap it.
        if let Some(previous) = self.worker.lock().take() {
            if previous.join().is_err() {
                warn!("Previous run worker had panicked");
            }
        }

        let run_id = Uuid::new_v4().to_string();
        let cancel = CancelToken::new();
        *self.cancel.lock() = cancel.clone();
        *self.run_id.write() = Some(run_id.clone());
        *self.last_outcome.write() = None;
        self.status.set(format!("Starting run {run_id}"));

        let mode = request.mode();
        info!(%run_id, mode, "Starting waveform run");

        let supply = Arc::clone(&self.supply);
        let collector = self.collector.clone();
        let status = self.status.clone();
        let timing = self.timing;
        let default_settle = self.default_settle;
        let last_outcome = Arc::clone(&self.last_outcome);
        let span = info_span!("waveform_run", run_id = %run_id, mode);

        let handle = thread::Builder::new()
            .name("waveform-run".into())
            .spawn(move || {
                let _guard = guard;
                let _entered = span.enter();
                let outcome = match request {
                    RunRequest::Single {
                        channel,
                        spec,
                        settle_time,
                        point_duration,
                    } => {
                        let profile = generate(&spec);
                        let per_point = point_duration.unwrap_or_else(|| spec.point_interval());
                        let settle = settle_time.unwrap_or(default_settle);
                        SingleChannelExecutor::new(supply, collector, status, timing)
                            .run(channel, &profile, settle, per_point, &cancel)
                    }
                    RunRequest::Multi {
                        configs,
                        point_duration,
                    } => {
                        let per_point =
                            point_duration.unwrap_or_else(|| shortest_interval(&configs));
                        MultiChannelExecutor::new(supply, collector, status, timing)
                            .run(&configs, per_point, &cancel)
                    }
                };
                info!(%outcome, "Waveform run finished");
                *last_outcome.write() = Some(outcome.clone());
                outcome
            })
            .map_err(|err| {
                error!(error = %err, "Failed to spawn run worker");
                self.status.set_error(format!("Failed to start run: {err}"));
                err
            })?;

        *self.worker.lock() = Some(handle);
        Ok(run_id)
    }

    /// Request cooperative cancellation of the active run. The worker notices
    /// at the next point and shuts the outputs down.
    pub fn stop(&self) {
        if self.is_running() {
            info!("Stop requested");
        }
        self.cancel.lock().cancel();
    }

    /// Cancel any run and immediately force every configured channel to 0 V
    /// with its output off, from the calling thread.
    ///
    /// Device calls may interleave with the worker's in-flight point, so the
    /// supply must serialize access itself (see [`crate::hardware::SerializedSupply`]).
    pub fn emergency_stop(&self) -> Vec<ShutdownFailure> {
        warn!("Emergency stop");
        self.cancel.lock().cancel();
        let channels: Vec<ChannelId> = self.limits.channels().collect();
        let failures = safe_shutdown(self.supply.as_ref(), &channels);
        if failures.is_empty() {
            self.status.set_error("Emergency stop: all outputs off");
        } else {
            self.status.set_error(format!(
                "Emergency stop: {} shutdown step(s) failed",
                failures.len()
            ));
        }
        failures
    }

    /// Whether a run is active.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Snapshot of the records of the current or last run.
    pub fn records(&self) -> Vec<ExecutionRecord> {
        self.collector.snapshot()
    }

    /// Current status line: progress, completion summary, or `ERROR: ...`.
    pub fn status_message(&self) -> String {
        self.status.get()
    }

    /// Id of the current or last run.
    pub fn run_id(&self) -> Option<String> {
        self.run_id.read().clone()
    }

    /// Outcome of the last finished run.
    pub fn last_outcome(&self) -> Option<RunOutcome> {
        self.last_outcome.read().clone()
    }

    /// Block until the active run finishes and return its outcome. Returns the
    /// last outcome (or `None`) when nothing is running.
    pub fn wait(&self) -> Option<RunOutcome> {
        let handle = self.worker.lock().take();
        match handle {
            Some(handle) => match handle.join() {
                Ok(outcome) => Some(outcome),
                Err(_) => {
                    let outcome = RunOutcome::Failed("run worker panicked".into());
                    error!("Run worker panicked");
                    self.status.set_error("run worker panicked");
                    *self.last_outcome.write() = Some(outcome.clone());
                    Some(outcome)
                }
            },
            None => self.last_outcome(),
        }
    }

    fn validate(&self, request: &RunRequest) -> EngineResult<()> {
        match request {
            RunRequest::Single { channel, spec, .. } => {
                self.limits.check(*channel, spec.target_voltage())?;
            }
            RunRequest::Multi { configs, .. } => {
                if configs.is_empty() {
                    return Err(EngineError::Configuration(
                        "multi-channel run needs at least one channel".into(),
                    ));
                }
                let mut seen = HashSet::new();
                for config in configs {
                    if !seen.insert(config.channel) {
                        return Err(EngineError::Configuration(format!(
                            "{} configured more than once",
                            config.channel
                        )));
                    }
                    self.limits
                        .check(config.channel, config.spec.target_voltage())?;
                    if !(config.current_limit.is_finite() && config.current_limit > 0.0) {
                        return Err(EngineError::Configuration(format!(
                            "{}: current limit must be positive, got {}",
                            config.channel, config.current_limit
                        )));
                    }
                }
            }
        }
        Ok(())
    }
}

fn shortest_interval(configs: &[ChannelExecutionConfig]) -> Duration {
    configs
        .iter()
        .map(|c| c.spec.point_interval())
        .min()
        .unwrap_or_default()
}

impl<D: PowerSupply + ?Sized + 'static> Drop for WaveformEngine<D> {
    fn drop(&mut self) {
        if self.is_running() {
            warn!("Engine dropped during a run; cancelling");
            self.cancel.lock().cancel();
            if let Some(handle) = self.worker.lock().take() {
                let _ = handle.join();
            }
        }
    }
}

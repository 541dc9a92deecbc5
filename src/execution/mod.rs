//! Paced execution of waveform profiles against a power supply.
//!
//! Both executors run synchronously on the calling thread; [`crate::engine`]
//! puts them on a dedicated worker. They never return an error: every run ends
//! in a [`RunOutcome`], and every terminal path goes through
//! [`safety::safe_shutdown`] first.

pub mod cancel;
pub mod multi;
pub mod pacing;
pub mod record;
pub mod safety;
pub mod single;
pub mod state;
pub mod status;

pub use cancel::CancelToken;
pub use multi::{ChannelExecutionConfig, MultiChannelExecutor};
pub use pacing::{Progress, TimingStats};
pub use record::{ExecutionRecord, RecordCollector};
pub use single::SingleChannelExecutor;
pub use state::{RunOutcome, RunState};
pub use status::StatusBoard;

use crate::hardware::{ChannelId, PowerSupply};
use std::time::Duration;
use tracing::{debug, warn};

/// Fixed delays and switches shared by both executors.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExecutionTiming {
    /// Wait after enabling an output before trusting commands.
    pub enable_settle: Duration,
    /// Wait after each channel's configure call in a multi-channel run.
    pub channel_setup_delay: Duration,
    /// Progress is reported every this fraction of the points.
    pub progress_fraction: f64,
    /// Measure voltage and current after each setpoint.
    pub readback: bool,
}

impl Default for ExecutionTiming {
    fn default() -> Self {
        Self {
            enable_settle: Duration::from_millis(100),
            channel_setup_delay: Duration::from_millis(50),
            progress_fraction: 0.10,
            readback: false,
        }
    }
}

/// Move the run state machine forward, logging the edge.
pub(crate) fn advance(state: &mut RunState, next: RunState) {
    if !state.can_transition_to(next) {
        warn!(from = %state, to = %next, "Unexpected run state transition");
    }
    debug!(from = %state, to = %next, "Run state");
    *state = next;
}

/// Measured voltage and current for a record.
///
/// Without readback the setpoint and 0 A are reported. Measurement errors are
/// not fatal to the run and fall back the same way.
pub(crate) fn read_back<D>(
    supply: &D,
    channel: ChannelId,
    setpoint: f64,
    enabled: bool,
) -> (f64, f64)
where
    D: PowerSupply + ?Sized,
{
    if !enabled {
        return (setpoint, 0.0);
    }
    let voltage = supply.measure_voltage(channel).unwrap_or_else(|error| {
        warn!(%channel, error = %error, "Voltage readback failed; using setpoint");
        setpoint
    });
    let current = supply.measure_current(channel).unwrap_or_else(|error| {
        warn!(%channel, error = %error, "Current readback failed");
        0.0
    });
    (voltage, current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::mock::{FaultScenario, MockPowerSupply, Operation};

    #[test]
    fn readback_off_reports_setpoint() {
        let psu = MockPowerSupply::new();
        assert_eq!(read_back(&psu, ChannelId(1), 2.5, false), (2.5, 0.0));
        assert!(psu.calls().is_empty());
    }

    #[test]
    fn readback_failure_falls_back() {
        let psu = MockPowerSupply::new().with_fault(FaultScenario::FailAfterN {
            operation: Operation::Measure,
            count: 0,
        });
        assert_eq!(read_back(&psu, ChannelId(1), 4.0, true), (4.0, 0.0));
        assert_eq!(psu.calls().len(), 2);
    }
}

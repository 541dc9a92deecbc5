//! Safety shutdown.
//!
//! Every terminal path of a run ends here: each channel is commanded to 0 V and
//! then its output is switched off. Failures are logged and collected, never
//! propagated, and a failed `set_voltage` does not skip the `disable_output`.

use crate::hardware::{ChannelId, PowerSupply};
use tracing::{debug, warn};

/// A shutdown step that failed.
#[derive(Debug)]
pub struct ShutdownFailure {
    /// Channel being shut down.
    pub channel: ChannelId,
    /// Which step failed.
    pub step: &'static str,
    /// Driver error.
    pub error: anyhow::Error,
}

/// Force `channels` to a safe state, best effort. Returns the steps that failed.
pub fn safe_shutdown<D>(supply: &D, channels: &[ChannelId]) -> Vec<ShutdownFailure>
where
    D: PowerSupply + ?Sized,
{
    let mut failures = Vec::new();
    for &channel in channels {
        if let Err(error) = supply.set_voltage(channel, 0.0) {
            warn!(%channel, error = %error, "Safety shutdown: failed to zero voltage");
            failures.push(ShutdownFailure {
                channel,
                step: "set_voltage",
                error,
            });
        }
        if let Err(error) = supply.disable_output(channel) {
            warn!(%channel, error = %error, "Safety shutdown: failed to disable output");
            failures.push(ShutdownFailure {
                channel,
                step: "disable_output",
                error,
            });
        }
        debug!(%channel, "Safety shutdown issued");
    }
    failures
}

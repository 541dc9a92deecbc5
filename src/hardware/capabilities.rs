//! Power supply capability trait and channel model.
//!
//! The executors talk to hardware exclusively through [`PowerSupply`]. The real
//! SCPI/VISA driver lives outside this crate; [`super::mock::MockPowerSupply`]
//! implements the same trait for tests and the demo CLI.
//!
//! # Design Philosophy
//!
//! - Methods are synchronous: pacing happens on a dedicated worker thread, and a
//!   bench supply answers one command at a time anyway.
//! - Methods take `&self`; implementations use interior mutability.
//! - Errors are `anyhow::Result`, so drivers can attach whatever context their
//!   transport produces.
//! - Measurement is optional. The default implementations report "not supported".

use crate::error::{EngineError, EngineResult};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Output channel number as printed on the front panel (1-based).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelId(pub u8);

impl ChannelId {
    /// Raw channel number.
    pub fn get(self) -> u8 {
        self.0
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CH{}", self.0)
    }
}

/// Target of a protection-clear command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelSelector {
    /// A single output.
    One(ChannelId),
    /// Every output of the supply.
    All,
}

/// Full channel setup issued in one call before a multi-channel run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChannelSettings {
    /// Initial output voltage in volts.
    pub voltage: f64,
    /// Current limit in amperes.
    pub current_limit: f64,
    /// Over-voltage protection trip level in volts.
    pub ovp_level: f64,
    /// Whether to switch the output on after configuring.
    pub enable_output: bool,
}

/// Capability: programmable DC power supply.
///
/// # Contract
/// - `set_voltage` changes the setpoint immediately; it does not wait for the
///   output to settle
/// - `enable_output` / `disable_output` switch the output relay
/// - `clear_protection` resets latched OVP/OCP trips
/// - Callers must not assume concurrent calls are safe; wrap shared drivers in
///   [`super::shared::SerializedSupply`]
pub trait PowerSupply: Send + Sync {
    /// Program the output voltage of `channel`.
    fn set_voltage(&self, channel: ChannelId, volts: f64) -> Result<()>;

    /// Switch `channel`'s output on.
    fn enable_output(&self, channel: ChannelId) -> Result<()>;

    /// Switch `channel`'s output off.
    fn disable_output(&self, channel: ChannelId) -> Result<()>;

    /// Clear latched protection trips.
    fn clear_protection(&self, target: ChannelSelector) -> Result<()>;

    /// Apply voltage, current limit and OVP in one step, optionally enabling the output.
    fn configure_channel(&self, channel: ChannelId, settings: ChannelSettings) -> Result<()>;

    /// Read back the output voltage.
    ///
    /// # Default Implementation
    /// Returns an error indicating readback is not supported.
    fn measure_voltage(&self, channel: ChannelId) -> Result<f64> {
        anyhow::bail!("Voltage readback not supported on {channel}")
    }

    /// Read back the output current.
    ///
    /// # Default Implementation
    /// Returns an error indicating readback is not supported.
    fn measure_current(&self, channel: ChannelId) -> Result<f64> {
        anyhow::bail!("Current readback not supported on {channel}")
    }
}

impl<T: PowerSupply + ?Sized> PowerSupply for std::sync::Arc<T> {
    fn set_voltage(&self, channel: ChannelId, volts: f64) -> Result<()> {
        (**self).set_voltage(channel, volts)
    }

    fn enable_output(&self, channel: ChannelId) -> Result<()> {
        (**self).enable_output(channel)
    }

    fn disable_output(&self, channel: ChannelId) -> Result<()> {
        (**self).disable_output(channel)
    }

    fn clear_protection(&self, target: ChannelSelector) -> Result<()> {
        (**self).clear_protection(target)
    }

    fn configure_channel(&self, channel: ChannelId, settings: ChannelSettings) -> Result<()> {
        (**self).configure_channel(channel, settings)
    }

    fn measure_voltage(&self, channel: ChannelId) -> Result<f64> {
        (**self).measure_voltage(channel)
    }

    fn measure_current(&self, channel: ChannelId) -> Result<f64> {
        (**self).measure_current(channel)
    }
}

/// Hardware limits of one output.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChannelLimit {
    /// Channel number.
    pub id: ChannelId,
    /// Highest voltage the output can source.
    pub max_voltage: f64,
    /// Current limit used when a request does not specify one.
    #[serde(default = "default_current_limit")]
    pub default_current_limit: f64,
}

fn default_current_limit() -> f64 {
    1.0
}

/// Per-channel hardware ceilings used to validate run requests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelLimits(Vec<ChannelLimit>);

impl ChannelLimits {
    /// Build from an explicit table.
    pub fn new(limits: Vec<ChannelLimit>) -> Self {
        Self(limits)
    }

    /// Look up a channel.
    pub fn get(&self, channel: ChannelId) -> Option<&ChannelLimit> {
        self.0.iter().find(|limit| limit.id == channel)
    }

    /// Every configured channel, in table order.
    pub fn channels(&self) -> impl Iterator<Item = ChannelId> + '_ {
        self.0.iter().map(|limit| limit.id)
    }

    /// All entries.
    pub fn entries(&self) -> &[ChannelLimit] {
        &self.0
    }

    /// Reject unknown channels and voltages above the channel's ceiling.
    pub fn check(&self, channel: ChannelId, target_voltage: f64) -> EngineResult<&ChannelLimit> {
        let limit = self
            .get(channel)
            .ok_or(EngineError::InvalidChannel(channel.get()))?;
        if target_voltage > limit.max_voltage {
            return Err(EngineError::VoltageAboveCeiling {
                channel: channel.get(),
                requested: target_voltage,
                ceiling: limit.max_voltage,
            });
        }
        Ok(limit)
    }
}

impl Default for ChannelLimits {
    /// Three-output bench supply: two 30 V rails and a 5 V rail on channel 3.
    fn default() -> Self {
        Self(vec![
            ChannelLimit {
                id: ChannelId(1),
                max_voltage: 30.0,
                default_current_limit: 1.0,
            },
            ChannelLimit {
                id: ChannelId(2),
                max_voltage: 30.0,
                default_current_limit: 1.0,
            },
            ChannelLimit {
                id: ChannelId(3),
                max_voltage: 5.0,
                default_current_limit: 1.0,
            },
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_table_caps_channel_three_at_five_volts() {
        let limits = ChannelLimits::default();
        assert!(limits.check(ChannelId(1), 30.0).is_ok());
        assert!(limits.check(ChannelId(3), 5.0).is_ok());
        let err = limits.check(ChannelId(3), 5.5).unwrap_err();
        assert!(matches!(
            err,
            EngineError::VoltageAboveCeiling { channel: 3, .. }
        ));
    }

    #[test]
    fn unknown_channel_is_rejected() {
        let err = ChannelLimits::default().check(ChannelId(4), 1.0).unwrap_err();
        assert!(matches!(err, EngineError::InvalidChannel(4)));
    }

    #[test]
    fn channel_id_displays_front_panel_name() {
        assert_eq!(ChannelId(2).to_string(), "CH2");
    }
}

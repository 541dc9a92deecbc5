//! Serialized access to one instrument connection.
//!
//! A bench supply sits behind a single VISA session. Commands from the worker
//! thread, an emergency stop issued from the UI thread, and status polling must
//! never interleave on the wire, so every call goes through one mutex.

use super::capabilities::{ChannelId, ChannelSelector, ChannelSettings, PowerSupply};
use anyhow::Result;
use parking_lot::{Mutex, MutexGuard};

/// Wraps a driver so that at most one device call is in flight at a time.
pub struct SerializedSupply<D> {
    inner: Mutex<D>,
}

impl<D: PowerSupply> SerializedSupply<D> {
    /// Take ownership of a driver.
    pub fn new(driver: D) -> Self {
        Self {
            inner: Mutex::new(driver),
        }
    }

    /// Hold the bus for a sequence of commands that must not be split.
    pub fn lock(&self) -> MutexGuard<'_, D> {
        self.inner.lock()
    }

    /// Give the driver back.
    pub fn into_inner(self) -> D {
        self.inner.into_inner()
    }
}

impl<D: PowerSupply> PowerSupply for SerializedSupply<D> {
    fn set_voltage(&self, channel: ChannelId, volts: f64) -> Result<()> {
        self.inner.lock().set_voltage(channel, volts)
    }

    fn enable_output(&self, channel: ChannelId) -> Result<()> {
        self.inner.lock().enable_output(channel)
    }

    fn disable_output(&self, channel: ChannelId) -> Result<()> {
        self.inner.lock().disable_output(channel)
    }

    fn clear_protection(&self, target: ChannelSelector) -> Result<()> {
        self.inner.lock().clear_protection(target)
    }

    fn configure_channel(&self, channel: ChannelId, settings: ChannelSettings) -> Result<()> {
        self.inner.lock().configure_channel(channel, settings)
    }

    fn measure_voltage(&self, channel: ChannelId) -> Result<f64> {
        self.inner.lock().measure_voltage(channel)
    }

    fn measure_current(&self, channel: ChannelId) -> Result<f64> {
        self.inner.lock().measure_current(channel)
    }
}

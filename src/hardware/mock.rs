//! Mock Power Supply
//!
//! Simulated bench supply for testing without physical hardware.
//!
//! `MockPowerSupply` keeps a journal of every attempted device call (including
//! calls that were made to fail), tracks per-channel setpoint and output state,
//! and supports scripted failures and per-call latency.
//!
//! # Example
//!
//! ```
//! use psu_waveform::hardware::mock::{DeviceCall, FaultScenario, MockPowerSupply, Operation};
//! use psu_waveform::hardware::{ChannelId, PowerSupply};
//!
//! let psu = MockPowerSupply::new()
//!     .with_fault(FaultScenario::FailAfterN { operation: Operation::SetVoltage, count: 1 });
//! assert!(psu.set_voltage(ChannelId(1), 1.0).is_ok());
//! assert!(psu.set_voltage(ChannelId(1), 2.0).is_err());
//! assert_eq!(psu.calls().len(), 2);
//! ```

use super::capabilities::{ChannelId, ChannelSelector, ChannelSettings, PowerSupply};
use anyhow::{bail, Result};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::thread;
use std::time::Duration;
use tracing::trace;

/// One attempted device call, in issue order.
#[derive(Debug, Clone, Copy, PartialEq)]
#[allow(missing_docs)]
pub enum DeviceCall {
    SetVoltage(ChannelId, f64),
    EnableOutput(ChannelId),
    DisableOutput(ChannelId),
    ClearProtection(ChannelSelector),
    ConfigureChannel(ChannelId, ChannelSettings),
    MeasureVoltage(ChannelId),
    MeasureCurrent(ChannelId),
}

impl DeviceCall {
    /// Operation class of this call.
    pub fn operation(&self) -> Operation {
        match self {
            DeviceCall::SetVoltage(..) => Operation::SetVoltage,
            DeviceCall::EnableOutput(_) => Operation::EnableOutput,
            DeviceCall::DisableOutput(_) => Operation::DisableOutput,
            DeviceCall::ClearProtection(_) => Operation::ClearProtection,
            DeviceCall::ConfigureChannel(..) => Operation::ConfigureChannel,
            DeviceCall::MeasureVoltage(_) | DeviceCall::MeasureCurrent(_) => Operation::Measure,
        }
    }
}

/// Device operation classes used for fault targeting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// `set_voltage`
    SetVoltage,
    /// `enable_output`
    EnableOutput,
    /// `disable_output`
    DisableOutput,
    /// `clear_protection`
    ClearProtection,
    /// `configure_channel`
    ConfigureChannel,
    /// Either readback call
    Measure,
}

/// Scripted failure behaviour.
#[derive(Debug, Clone, Copy)]
pub enum FaultScenario {
    /// Every call of `operation` after the first `count` fails.
    #[allow(missing_docs)]
    FailAfterN { operation: Operation, count: usize },
    /// Only the call of `operation` with zero-based index `index` fails.
    #[allow(missing_docs)]
    FailNth { operation: Operation, index: usize },
    /// Every call fails, as if the VISA session dropped.
    CommunicationLoss,
}

type CallHook = Box<dyn Fn(&DeviceCall) + Send + Sync>;

#[derive(Debug, Default, Clone, Copy)]
struct ChannelState {
    voltage: f64,
    enabled: bool,
}

#[derive(Default)]
struct MockState {
    calls: Vec<DeviceCall>,
    counts: HashMap<Operation, usize>,
    channels: HashMap<ChannelId, ChannelState>,
}

/// Simulated programmable supply.
pub struct MockPowerSupply {
    state: Mutex<MockState>,
    faults: Vec<FaultScenario>,
    latency: Duration,
    load_ohms: f64,
    hook: Option<CallHook>,
}

impl MockPowerSupply {
    /// Fault-free supply with no latency and a 100 Ω load on every output.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState::default()),
            faults: Vec::new(),
            latency: Duration::ZERO,
            load_ohms: 100.0,
            hook: None,
        }
    }

    /// Add a failure scenario.
    pub fn with_fault(mut self, fault: FaultScenario) -> Self {
        self.faults.push(fault);
        self
    }

    /// Sleep this long inside every call, simulating bus round-trip time.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Resistive load used to compute readback current.
    pub fn with_load_resistance(mut self, ohms: f64) -> Self {
        self.load_ohms = ohms;
        self
    }

    /// Run `hook` on every call after it is journaled (e.g. to request cancellation
    /// at a precise point in a test).
    pub fn with_hook<F>(mut self, hook: F) -> Self
    where
        F: Fn(&DeviceCall) + Send + Sync + 'static,
    {
        self.hook = Some(Box::new(hook));
        self
    }

    /// Snapshot of the call journal.
    pub fn calls(&self) -> Vec<DeviceCall> {
        self.state.lock().calls.clone()
    }

    /// Voltages passed to `set_voltage` for one channel, in order.
    pub fn voltages_for(&self, channel: ChannelId) -> Vec<f64> {
        self.state
            .lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                DeviceCall::SetVoltage(ch, v) if *ch == channel => Some(*v),
                _ => None,
            })
            .collect()
    }

    /// Last successfully programmed voltage.
    pub fn voltage(&self, channel: ChannelId) -> f64 {
        self.channel_state(channel).voltage
    }

    /// Output relay state.
    pub fn is_output_enabled(&self, channel: ChannelId) -> bool {
        self.channel_state(channel).enabled
    }

    /// Forget the journal and counters; channel state is kept.
    pub fn clear_journal(&self) {
        let mut state = self.state.lock();
        state.calls.clear();
        state.counts.clear();
    }

    fn channel_state(&self, channel: ChannelId) -> ChannelState {
        self.state
            .lock()
            .channels
            .get(&channel)
            .copied()
            .unwrap_or_default()
    }

    /// Journal the call, apply latency, then decide whether it fails.
    fn attempt(&self, call: DeviceCall) -> Result<()> {
        let operation = call.operation();
        let index = {
            let mut state = self.state.lock();
            state.calls.push(call);
            let counter = state.counts.entry(operation).or_insert(0);
            let index = *counter;
            *counter += 1;
            index
        };
        trace!(?call, index, "mock supply call");

        if let Some(hook) = &self.hook {
            hook(&call);
        }
        if !self.latency.is_zero() {
            thread::sleep(self.latency);
        }

        for fault in &self.faults {
            match *fault {
                FaultScenario::CommunicationLoss => bail!("Communication lost ({call:?})"),
                FaultScenario::FailAfterN {
                    operation: op,
                    count,
                } if op == operation && index >= count => {
                    bail!("Injected failure after {count} {operation:?} calls")
                }
                FaultScenario::FailNth { operation: op, index: nth }
                    if op == operation && index == nth =>
                {
                    bail!("Injected failure on {operation:?} call #{nth}")
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn update(&self, channel: ChannelId, apply: impl FnOnce(&mut ChannelState)) {
        let mut state = self.state.lock();
        apply(state.channels.entry(channel).or_default());
    }
}

impl Default for MockPowerSupply {
    fn default() -> Self {
        Self::new()
    }
}

impl PowerSupply for MockPowerSupply {
    fn set_voltage(&self, channel: ChannelId, volts: f64) -> Result<()> {
        self.attempt(DeviceCall::SetVoltage(channel, volts))?;
        self.update(channel, |ch| ch.voltage = volts);
        Ok(())
    }

    fn enable_output(&self, channel: ChannelId) -> Result<()> {
        self.attempt(DeviceCall::EnableOutput(channel))?;
        self.update(channel, |ch| ch.enabled = true);
        Ok(())
    }

    fn disable_output(&self, channel: ChannelId) -> Result<()> {
        self.attempt(DeviceCall::DisableOutput(channel))?;
        self.update(channel, |ch| ch.enabled = false);
        Ok(())
    }

    fn clear_protection(&self, target: ChannelSelector) -> Result<()> {
        self.attempt(DeviceCall::ClearProtection(target))
    }

    fn configure_channel(&self, channel: ChannelId, settings: ChannelSettings) -> Result<()> {
        self.attempt(DeviceCall::ConfigureChannel(channel, settings))?;
        self.update(channel, |ch| {
            ch.voltage = settings.voltage;
            ch.enabled = settings.enable_output;
        });
        Ok(())
    }

    fn measure_voltage(&self, channel: ChannelId) -> Result<f64> {
        self.attempt(DeviceCall::MeasureVoltage(channel))?;
        let ch = self.channel_state(channel);
        Ok(if ch.enabled { ch.voltage } else { 0.0 })
    }

    fn measure_current(&self, channel: ChannelId) -> Result<f64> {
        self.attempt(DeviceCall::MeasureCurrent(channel))?;
        let ch = self.channel_state(channel);
        if !ch.enabled || self.load_ohms <= 0.0 {
            return Ok(0.0);
        }
        Ok(ch.voltage / self.load_ohms)
    }
}

//! Hardware seam.
//!
//! Capability trait for programmable supplies, a mutex wrapper that serializes
//! access to one instrument connection, and a simulated supply.

pub mod capabilities;
pub mod mock;
pub mod shared;

pub use capabilities::{
    ChannelId, ChannelLimit, ChannelLimits, ChannelSelector, ChannelSettings, PowerSupply,
};
pub use shared::SerializedSupply;

//! Per-point execution records.

use crate::hardware::ChannelId;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

/// What happened at one (point, channel) during a run. Never mutated after append.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionRecord {
    /// Wall-clock time the setpoint was issued.
    pub timestamp: DateTime<Utc>,
    /// Channel the command went to.
    pub channel: ChannelId,
    /// Commanded voltage.
    pub set_voltage: f64,
    /// Readback voltage, or the setpoint when readback is off.
    pub measured_voltage: f64,
    /// Readback current, or 0 when readback is off.
    pub measured_current: f64,
    /// Zero-based cycle of the point.
    pub cycle_number: usize,
    /// Zero-based position inside the cycle.
    pub point_in_cycle: usize,
    /// Zero-based flat index into the profile.
    pub point_index: usize,
    /// Measured wall time spent on this point. In a multi-channel run this is
    /// the time since the point started, up to this channel's command.
    pub point_duration: Duration,
}

/// Append-only record log shared between the worker and readers.
///
/// The worker is the only writer. Readers either take a [`snapshot`](Self::snapshot)
/// after the run or poll while it grows; both are fine because records are
/// immutable once appended.
#[derive(Debug, Clone, Default)]
pub struct RecordCollector {
    records: Arc<RwLock<Vec<ExecutionRecord>>>,
}

impl RecordCollector {
    /// Empty collector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop all records. Called at the start of every run.
    pub fn clear(&self) {
        self.records.write().clear();
    }

    /// Append one record.
    pub fn push(&self, record: ExecutionRecord) {
        self.records.write().push(record);
    }

    /// Copy of every record so far.
    pub fn snapshot(&self) -> Vec<ExecutionRecord> {
        self.records.read().clone()
    }

    /// Records of one channel, in append order.
    pub fn for_channel(&self, channel: ChannelId) -> Vec<ExecutionRecord> {
        self.records
            .read()
            .iter()
            .filter(|record| record.channel == channel)
            .cloned()
            .collect()
    }

    /// Most recent record.
    pub fn last(&self) -> Option<ExecutionRecord> {
        self.records.read().last().cloned()
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// True when nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(channel: u8, index: usize) -> ExecutionRecord {
        ExecutionRecord {
            timestamp: Utc::now(),
            channel: ChannelId(channel),
            set_voltage: index as f64,
            measured_voltage: index as f64,
            measured_current: 0.0,
            cycle_number: 0,
            point_in_cycle: index,
            point_index: index,
            point_duration: Duration::from_millis(10),
        }
    }

    #[test]
    fn clones_share_one_log() {
        let collector = RecordCollector::new();
        let reader = collector.clone();
        collector.push(record(1, 0));
        collector.push(record(2, 0));
        collector.push(record(1, 1));

        assert_eq!(reader.len(), 3);
        assert_eq!(reader.for_channel(ChannelId(1)).len(), 2);
        assert_eq!(reader.last().map(|r| r.channel), Some(ChannelId(1)));

        collector.clear();
        assert!(reader.is_empty());
    }

    #[test]
    fn snapshot_is_detached() {
        let collector = RecordCollector::new();
        collector.push(record(1, 0));
        let snapshot = collector.snapshot();
        collector.push(record(1, 1));
        assert_eq!(snapshot.len(), 1);
        assert_eq!(collector.len(), 2);
    }
}

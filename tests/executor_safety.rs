//! Integration tests for executor safety guarantees
//!
//! Every terminal path (completion, cancellation, device failure) must leave
//! each touched output commanded to 0 V and switched off. These tests drive the
//! executors directly against the simulated supply and inspect its call journal.

use psu_waveform::execution::{
    CancelToken, ChannelExecutionConfig, ExecutionTiming, MultiChannelExecutor, RecordCollector,
    RunOutcome, SingleChannelExecutor, StatusBoard,
};
use psu_waveform::hardware::mock::{DeviceCall, FaultScenario, MockPowerSupply, Operation};
use psu_waveform::hardware::{ChannelId, ChannelSelector, SerializedSupply};
use psu_waveform::waveform::{generate, WaveformKind, WaveformSpec};
use std::sync::Arc;
use std::time::{Duration, Instant};

fn instant_timing() -> ExecutionTiming {
    ExecutionTiming {
        enable_settle: Duration::ZERO,
        channel_setup_delay: Duration::ZERO,
        progress_fraction: 0.10,
        readback: false,
    }
}

fn single(psu: &Arc<MockPowerSupply>) -> (SingleChannelExecutor<MockPowerSupply>, RecordCollector) {
    let collector = RecordCollector::new();
    let exec = SingleChannelExecutor::new(
        Arc::clone(psu),
        collector.clone(),
        StatusBoard::new(),
        instant_timing(),
    );
    (exec, collector)
}

fn multi(psu: &Arc<MockPowerSupply>) -> (MultiChannelExecutor<MockPowerSupply>, RecordCollector, StatusBoard) {
    let collector = RecordCollector::new();
    let status = StatusBoard::new();
    let exec = MultiChannelExecutor::new(
        Arc::clone(psu),
        collector.clone(),
        status.clone(),
        instant_timing(),
    );
    (exec, collector, status)
}

fn channel_config(channel: u8, kind: WaveformKind, cycles: u32, points: u32) -> ChannelExecutionConfig {
    ChannelExecutionConfig {
        channel: ChannelId(channel),
        spec: WaveformSpec::new(kind, 4.0, cycles, points, 0.01),
        current_limit: 0.1,
        settle_time: Duration::ZERO,
    }
}

// =============================================================================
// Single channel
// =============================================================================

#[test]
fn test_abort_before_first_point() {
    let psu = Arc::new(MockPowerSupply::new());
    let (exec, collector) = single(&psu);
    let ch = ChannelId(1);
    let cancel = CancelToken::new();
    cancel.cancel();

    let profile = generate(&WaveformSpec::new(WaveformKind::Sine, 5.0, 2, 20, 1.0));
    let outcome = exec.run(ch, &profile, Duration::ZERO, Duration::from_millis(5), &cancel);

    assert_eq!(outcome, RunOutcome::Aborted);
    assert!(collector.is_empty());
    let set_calls: Vec<DeviceCall> = psu
        .calls()
        .into_iter()
        .filter(|c| matches!(c, DeviceCall::SetVoltage(..)))
        .collect();
    assert_eq!(set_calls, vec![DeviceCall::SetVoltage(ch, 0.0)]);
    let calls = psu.calls();
    assert_eq!(
        &calls[calls.len() - 2..],
        &[DeviceCall::SetVoltage(ch, 0.0), DeviceCall::DisableOutput(ch)]
    );
}

#[test]
fn test_failure_on_point_k_keeps_k_records() {
    for k in [0usize, 1, 7, 19] {
        let psu = Arc::new(MockPowerSupply::new().with_fault(FaultScenario::FailNth {
            operation: Operation::SetVoltage,
            index: k,
        }));
        let (exec, collector) = single(&psu);
        let ch = ChannelId(2);
        let profile = generate(&WaveformSpec::new(WaveformKind::Triangle, 3.0, 1, 20, 1.0));

        let outcome = exec.run(ch, &profile, Duration::ZERO, Duration::ZERO, &CancelToken::new());

        assert!(outcome.is_failed(), "k = {k}");
        assert_eq!(collector.len(), k, "k = {k}");
        assert!(!psu.is_output_enabled(ch));
        assert_eq!(psu.calls().last(), Some(&DeviceCall::DisableOutput(ch)));
    }
}

#[test]
fn test_shutdown_survives_failing_zero_command() {
    // Every set_voltage fails, including the shutdown's; disable must still go out.
    let psu = Arc::new(MockPowerSupply::new().with_fault(FaultScenario::FailAfterN {
        operation: Operation::SetVoltage,
        count: 0,
    }));
    let (exec, _) = single(&psu);
    let ch = ChannelId(1);
    let profile = generate(&WaveformSpec::default());

    let outcome = exec.run(ch, &profile, Duration::ZERO, Duration::ZERO, &CancelToken::new());

    assert!(outcome.is_failed());
    assert_eq!(psu.calls().last(), Some(&DeviceCall::DisableOutput(ch)));
    assert!(!psu.is_output_enabled(ch));
}

#[test]
fn test_pacing_holds_cadence_despite_latency() {
    let psu = Arc::new(MockPowerSupply::new().with_latency(Duration::from_millis(2)));
    let (exec, collector) = single(&psu);
    let profile = generate(&WaveformSpec::new(WaveformKind::Sine, 2.0, 1, 10, 1.0));

    let started = Instant::now();
    let outcome = exec.run(
        ChannelId(1),
        &profile,
        Duration::ZERO,
        Duration::from_millis(10),
        &CancelToken::new(),
    );

    assert!(outcome.is_completed());
    assert!(started.elapsed() >= Duration::from_millis(100));
    for record in collector.snapshot() {
        assert!(record.point_duration >= Duration::from_millis(10));
        assert!(record.point_duration < Duration::from_millis(250));
    }
}

// =============================================================================
// Multi channel
// =============================================================================

#[test]
fn test_hold_last_for_shorter_profiles() {
    let psu = Arc::new(MockPowerSupply::new());
    let (exec, collector, _) = multi(&psu);
    let configs = vec![
        channel_config(1, WaveformKind::Sine, 3, 8),
        channel_config(2, WaveformKind::RampUp, 1, 5),
    ];
    let short = generate(&configs[1].spec);
    let last = short.points()[short.len() - 1].voltage;

    let outcome = exec.run(&configs, Duration::ZERO, &CancelToken::new());

    assert_eq!(outcome, RunOutcome::Completed);
    let ch2 = collector.for_channel(ChannelId(2));
    assert_eq!(ch2.len(), 24);
    for record in &ch2[short.len()..] {
        assert_eq!(record.set_voltage, last);
    }
    let indices: Vec<usize> = ch2.iter().map(|r| r.point_index).collect();
    assert_eq!(indices, (0..24).collect::<Vec<_>>());
}

#[test]
fn test_channels_commanded_in_configuration_order() {
    let psu = Arc::new(MockPowerSupply::new());
    let (exec, collector, _) = multi(&psu);
    let configs = vec![
        channel_config(3, WaveformKind::Square, 1, 4),
        channel_config(1, WaveformKind::Square, 1, 4),
    ];
    exec.run(&configs, Duration::ZERO, &CancelToken::new());

    let order: Vec<ChannelId> = collector.snapshot().iter().map(|r| r.channel).collect();
    assert_eq!(order.len(), 8);
    assert!(order
        .chunks(2)
        .all(|pair| pair == [ChannelId(3), ChannelId(1)]));
}

#[test]
fn test_multi_failure_shuts_down_all_channels() {
    let psu = Arc::new(MockPowerSupply::new().with_fault(FaultScenario::FailNth {
        operation: Operation::SetVoltage,
        index: 5,
    }));
    let (exec, collector, status) = multi(&psu);
    let configs = vec![
        channel_config(1, WaveformKind::Sine, 1, 10),
        channel_config(2, WaveformKind::Sine, 1, 10),
        channel_config(3, WaveformKind::Sine, 1, 10),
    ];

    let outcome = exec.run(&configs, Duration::ZERO, &CancelToken::new());

    assert!(outcome.is_failed());
    assert_eq!(collector.len(), 5);
    assert!(status.is_error());
    for id in [1, 2, 3] {
        let ch = ChannelId(id);
        assert!(!psu.is_output_enabled(ch), "{ch} left on");
        assert_eq!(psu.voltage(ch), 0.0);
        assert!(psu.calls().contains(&DeviceCall::DisableOutput(ch)));
    }
}

#[test]
fn test_configure_failure_still_shuts_down() {
    let psu = Arc::new(MockPowerSupply::new().with_fault(FaultScenario::FailNth {
        operation: Operation::ConfigureChannel,
        index: 1,
    }));
    let (exec, collector, _) = multi(&psu);
    let configs = vec![
        channel_config(1, WaveformKind::Sine, 1, 4),
        channel_config(2, WaveformKind::Sine, 1, 4),
    ];

    let outcome = exec.run(&configs, Duration::ZERO, &CancelToken::new());

    assert!(matches!(outcome, RunOutcome::Failed(ref reason) if reason.contains("configure_channel(CH2)")));
    assert!(collector.is_empty());
    assert!(!psu.is_output_enabled(ChannelId(1)));
    assert_eq!(psu.calls()[0], DeviceCall::ClearProtection(ChannelSelector::All));
}

#[test]
fn test_serialized_supply_runs_multi_channel() {
    let psu = Arc::new(SerializedSupply::new(MockPowerSupply::new()));
    let collector = RecordCollector::new();
    let exec = MultiChannelExecutor::new(
        Arc::clone(&psu),
        collector.clone(),
        StatusBoard::new(),
        instant_timing(),
    );
    let configs = vec![
        channel_config(1, WaveformKind::Breathing, 2, 6),
        channel_config(2, WaveformKind::Chirp, 2, 6),
    ];

    assert!(exec.run(&configs, Duration::ZERO, &CancelToken::new()).is_completed());
    assert_eq!(collector.len(), 24);
    assert!(!psu.lock().is_output_enabled(ChannelId(2)));
}

//! Integration tests for the engine's start/stop/status surface.

use psu_waveform::engine::{RunRequest, WaveformEngine};
use psu_waveform::error::EngineError;
use psu_waveform::execution::{ChannelExecutionConfig, ExecutionTiming, RunOutcome};
use psu_waveform::hardware::mock::{DeviceCall, FaultScenario, MockPowerSupply, Operation};
use psu_waveform::hardware::{ChannelId, ChannelLimits, SerializedSupply};
use psu_waveform::waveform::{WaveformKind, WaveformSpec};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

fn quick_timing() -> ExecutionTiming {
    ExecutionTiming {
        enable_settle: Duration::from_millis(1),
        channel_setup_delay: Duration::from_millis(1),
        progress_fraction: 0.10,
        readback: false,
    }
}

fn engine_with(psu: &Arc<MockPowerSupply>) -> WaveformEngine<MockPowerSupply> {
    WaveformEngine::with_limits(Arc::clone(psu), ChannelLimits::default(), quick_timing())
}

fn single_request(channel: u8, target: f64, point_ms: u64) -> RunRequest {
    RunRequest::Single {
        channel: ChannelId(channel),
        spec: WaveformSpec::new(WaveformKind::Sine, target, 2, 10, 0.1),
        settle_time: Some(Duration::ZERO),
        point_duration: Some(Duration::from_millis(point_ms)),
    }
}

fn wait_until(deadline: Duration, condition: impl Fn() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    condition()
}

#[test]
fn test_run_to_completion() {
    let psu = Arc::new(MockPowerSupply::new());
    let engine = engine_with(&psu);

    let run_id = engine.start(single_request(1, 5.0, 1)).unwrap();
    assert_eq!(run_id.len(), 36);
    assert_eq!(engine.run_id().as_deref(), Some(run_id.as_str()));

    assert_eq!(engine.wait(), Some(RunOutcome::Completed));
    assert!(!engine.is_running());
    assert_eq!(engine.records().len(), 20);
    assert_eq!(engine.last_outcome(), Some(RunOutcome::Completed));

    let status = engine.status_message();
    assert!(status.starts_with("Completed 20 points"), "{status}");
    assert!(status.contains("std-dev"));
}

#[test]
fn test_second_start_is_rejected_while_running() {
    let psu = Arc::new(MockPowerSupply::new());
    let engine = engine_with(&psu);

    engine.start(single_request(1, 2.0, 20)).unwrap();
    assert!(engine.is_running());
    let err = engine.start(single_request(2, 2.0, 1)).unwrap_err();
    assert!(matches!(err, EngineError::AlreadyRunning));

    engine.stop();
    assert_eq!(engine.wait(), Some(RunOutcome::Aborted));
    assert!(psu
        .calls()
        .iter()
        .all(|call| !matches!(call, DeviceCall::SetVoltage(ChannelId(2), _))));

    // The engine accepts a new run once the previous one has ended.
    engine.start(single_request(2, 2.0, 1)).unwrap();
    assert_eq!(engine.wait(), Some(RunOutcome::Completed));
}

#[test]
fn test_engines_sharing_a_supply_run_one_at_a_time() {
    let psu = Arc::new(MockPowerSupply::new());
    let first = engine_with(&psu);
    let second = engine_with(&psu);

    first.start(single_request(1, 2.0, 20)).unwrap();
    let err = second.start(single_request(1, 3.0, 1)).unwrap_err();
    assert!(matches!(err, EngineError::AlreadyRunning));
    assert!(!second.is_running());
    assert_eq!(second.run_id(), None);

    first.stop();
    assert_eq!(first.wait(), Some(RunOutcome::Aborted));
    assert!(psu
        .calls()
        .iter()
        .all(|call| !matches!(call, DeviceCall::SetVoltage(_, v) if *v == 3.0)));

    // The claim is released with the first run.
    second.start(single_request(1, 3.0, 1)).unwrap();
    assert_eq!(second.wait(), Some(RunOutcome::Completed));

    // A separate supply is unaffected by a run on this one.
    first.start(single_request(1, 2.0, 20)).unwrap();
    let other = engine_with(&Arc::new(MockPowerSupply::new()));
    other.start(single_request(1, 1.0, 1)).unwrap();
    assert_eq!(other.wait(), Some(RunOutcome::Completed));
    first.stop();
    assert_eq!(first.wait(), Some(RunOutcome::Aborted));
}

#[test]
fn test_very_long_cycle_duration_runs_and_aborts_cleanly() {
    let psu = Arc::new(MockPowerSupply::new());
    let timing = ExecutionTiming {
        enable_settle: Duration::from_millis(300),
        ..quick_timing()
    };
    let engine = WaveformEngine::with_limits(Arc::clone(&psu), ChannelLimits::default(), timing);
    let spec = WaveformSpec::new(WaveformKind::Sine, 3.0, 1, 2, 1e30);

    engine.start_single(ChannelId(1), spec).unwrap();
    assert!(engine.is_running());
    engine.stop();

    assert_eq!(engine.wait(), Some(RunOutcome::Aborted));
    let status = engine.status_message();
    assert!(status.starts_with("Aborted on CH1 after 0 of 2 points"), "{status}");
    assert!(engine.records().is_empty());
    assert!(!psu.is_output_enabled(ChannelId(1)));
}

#[test]
fn test_stop_aborts_and_shuts_down() {
    let psu = Arc::new(MockPowerSupply::new());
    let engine = engine_with(&psu);
    let ch = ChannelId(1);

    engine.start(single_request(1, 3.0, 20)).unwrap();
    assert!(wait_until(Duration::from_secs(2), || engine.records().len() >= 2));
    engine.stop();

    assert_eq!(engine.wait(), Some(RunOutcome::Aborted));
    let recorded = engine.records().len();
    assert!(recorded < 20, "run was not cut short: {recorded}");
    assert!(engine.status_message().starts_with("Aborted"));
    assert!(!psu.is_output_enabled(ch));
    assert_eq!(psu.calls().last(), Some(&DeviceCall::DisableOutput(ch)));
}

#[test]
fn test_configuration_errors_precede_side_effects() {
    let psu = Arc::new(MockPowerSupply::new());
    let engine = engine_with(&psu);

    let err = engine.start(single_request(3, 12.0, 1)).unwrap_err();
    assert!(matches!(
        err,
        EngineError::VoltageAboveCeiling { channel: 3, ceiling, .. } if ceiling == 5.0
    ));

    let err = engine.start(single_request(9, 1.0, 1)).unwrap_err();
    assert!(matches!(err, EngineError::InvalidChannel(9)));

    let err = engine.start_multi(Vec::new()).unwrap_err();
    assert!(err.is_configuration());

    let bad_current = ChannelExecutionConfig {
        channel: ChannelId(1),
        spec: WaveformSpec::default(),
        current_limit: 0.0,
        settle_time: Duration::ZERO,
    };
    assert!(engine.start_multi(vec![bad_current]).is_err());

    assert!(psu.calls().is_empty());
    assert!(!engine.is_running());
    assert_eq!(engine.run_id(), None);
}

#[test]
fn test_device_failure_reported_through_status() {
    let psu = Arc::new(MockPowerSupply::new().with_fault(FaultScenario::FailNth {
        operation: Operation::SetVoltage,
        index: 4,
    }));
    let engine = engine_with(&psu);

    engine.start(single_request(2, 4.0, 1)).unwrap();
    let outcome = engine.wait();

    assert!(matches!(outcome, Some(RunOutcome::Failed(_))));
    assert_eq!(engine.records().len(), 4);
    let status = engine.status_message();
    assert!(status.starts_with("ERROR: "), "{status}");
    assert!(status.contains("CH2"));
    assert!(!psu.is_output_enabled(ChannelId(2)));
}

#[test]
fn test_multi_channel_run() {
    let psu = Arc::new(MockPowerSupply::new());
    let engine = engine_with(&psu);
    let configs = vec![
        ChannelExecutionConfig {
            channel: ChannelId(1),
            spec: WaveformSpec::new(WaveformKind::Triangle, 12.0, 2, 5, 0.02),
            current_limit: 0.5,
            settle_time: Duration::ZERO,
        },
        ChannelExecutionConfig {
            channel: ChannelId(3),
            spec: WaveformSpec::new(WaveformKind::Cardiac, 5.0, 1, 5, 0.02),
            current_limit: 0.2,
            settle_time: Duration::ZERO,
        },
    ];

    engine.start_multi(configs).unwrap();
    assert_eq!(engine.wait(), Some(RunOutcome::Completed));

    let records = engine.records();
    assert_eq!(records.len(), 20);
    assert!(records.iter().all(|r| r.set_voltage <= 12.0));
    assert!(records
        .iter()
        .filter(|r| r.channel == ChannelId(3))
        .all(|r| r.set_voltage <= 5.0));
    assert!(!psu.is_output_enabled(ChannelId(1)));
    assert!(!psu.is_output_enabled(ChannelId(3)));
}

#[test]
fn test_emergency_stop_forces_every_channel_off() {
    let supply = Arc::new(SerializedSupply::new(MockPowerSupply::new()));
    let engine =
        WaveformEngine::with_limits(Arc::clone(&supply), ChannelLimits::default(), quick_timing());

    engine.start(single_request(1, 3.0, 20)).unwrap();
    assert!(wait_until(Duration::from_secs(2), || !engine.records().is_empty()));

    let failures = engine.emergency_stop();
    assert!(failures.is_empty());

    assert_eq!(engine.wait(), Some(RunOutcome::Aborted));
    let psu = supply.lock();
    for id in [1, 2, 3] {
        assert!(psu.calls().contains(&DeviceCall::DisableOutput(ChannelId(id))));
        assert!(!psu.is_output_enabled(ChannelId(id)));
    }
}

#[test]
fn test_emergency_stop_when_idle() {
    let psu = Arc::new(MockPowerSupply::new());
    let engine = engine_with(&psu);

    assert!(engine.emergency_stop().is_empty());
    assert_eq!(
        engine.status_message(),
        "ERROR: Emergency stop: all outputs off"
    );
    assert_eq!(psu.calls().len(), 6);
    assert_eq!(engine.wait(), None);
}

mod support;

use core::time::Duration;

use collector_core::collector::{
    ActuatorState, CycleOutcome, Device, DeviceError, DeviceHealth, FaultKind, SensorError,
};
use collector_core::telemetry::{TelemetryEventKind, TelemetryPayload};

use support::{FakeScheduler, MockInstant, Recorder, ScriptedAltimeter, controller, run_cycles};

#[test]
fn transient_read_fault_recovers_without_commanding() {
    let mut altimeter = ScriptedAltimeter::with_readings(&[19_000.0]);
    altimeter.push(Err(SensorError::Transient));
    altimeter.push(Ok(Some(18_500.0)));
    let mut controller = controller(altimeter);
    let mut recorder = Recorder::new();
    let now = MockInstant::secs(0);

    controller.run_cycle(now, &mut recorder);

    let report = controller.run_cycle(MockInstant::secs(15), &mut recorder);
    assert_eq!(report.outcome, CycleOutcome::ReadSkipped(FaultKind::TransientIo));
    assert_eq!(report.pauses.as_slice(), &[Duration::from_secs(5)]);
    assert_eq!(controller.health(Device::Altimeter), DeviceHealth::Faulted);
    assert_eq!(controller.health(Device::Actuator), DeviceHealth::Ready);

    let report = controller.run_cycle(MockInstant::secs(20), &mut recorder);
    assert_eq!(report.outcome, CycleOutcome::Held { altitude_m: 18_500.0 });
    assert_eq!(controller.health(Device::Altimeter), DeviceHealth::Ready);
    assert_eq!(controller.altimeter().init_calls, 2);
    assert!(controller.actuator().commands_after_startup().is_empty());
    assert_eq!(controller.state(), ActuatorState::Closed);

    let recovered = recorder
        .oldest_first()
        .find(|record| record.event == TelemetryEventKind::FaultRecovered(Device::Altimeter))
        .expect("recovery event missing");
    match recovered.details {
        TelemetryPayload::Recovery(recovery) => {
            assert_eq!(recovery.faults_cleared, 1);
            assert_eq!(recovery.downtime, Some(Duration::from_secs(5)));
        }
        other => panic!("unexpected payload: {other:?}"),
    }
}

#[test]
fn indeterminate_reading_skips_cycle_without_mutation() {
    let mut altimeter = ScriptedAltimeter::with_readings(&[21_000.0]);
    altimeter.push(Ok(None));
    let mut controller = controller(altimeter);
    let mut recorder = Recorder::new();

    controller.run_cycle(MockInstant::secs(0), &mut recorder);
    assert_eq!(controller.state(), ActuatorState::Open);
    let commands_before = controller.actuator().commands.len();

    let report = controller.run_cycle(MockInstant::secs(15), &mut recorder);

    assert_eq!(
        report.outcome,
        CycleOutcome::ReadSkipped(FaultKind::IndeterminateReading)
    );
    assert_eq!(report.pauses.as_slice(), &[Duration::from_secs(10)]);
    assert_eq!(controller.state(), ActuatorState::Open);
    assert_eq!(controller.actuator().commands.len(), commands_before);
    assert_eq!(controller.health(Device::Altimeter), DeviceHealth::Ready);

    let latest = recorder.latest().expect("fault event missing");
    assert_eq!(latest.event, TelemetryEventKind::FaultDetected(Device::Altimeter));
}

#[test]
fn non_finite_reading_is_indeterminate() {
    let mut altimeter = ScriptedAltimeter::default();
    altimeter.push(Ok(Some(f64::NAN)));
    let mut controller = controller(altimeter);
    let mut recorder = Recorder::new();

    let report = controller.run_cycle(MockInstant::secs(0), &mut recorder);

    assert_eq!(
        report.outcome,
        CycleOutcome::ReadSkipped(FaultKind::IndeterminateReading)
    );
    assert_eq!(controller.state(), ActuatorState::Closed);
}

#[test]
fn unclassified_error_resets_both_devices_and_preserves_state() {
    let mut altimeter = ScriptedAltimeter::with_readings(&[21_000.0]);
    altimeter.push(Err(SensorError::Unclassified));
    altimeter.push(Ok(Some(19_000.0)));
    let mut controller = controller(altimeter);
    let mut recorder = Recorder::new();

    controller.run_cycle(MockInstant::secs(0), &mut recorder);
    assert_eq!(controller.state(), ActuatorState::Open);

    let report = controller.run_cycle(MockInstant::secs(15), &mut recorder);
    assert_eq!(report.outcome, CycleOutcome::ReadSkipped(FaultKind::Unclassified));
    assert_eq!(report.pauses.as_slice(), &[Duration::from_secs(10)]);
    assert_eq!(controller.health(Device::Altimeter), DeviceHealth::Faulted);
    assert_eq!(controller.health(Device::Actuator), DeviceHealth::Faulted);
    assert_eq!(controller.state(), ActuatorState::Open);

    // Recovery re-inits both devices; the actuator re-asserts the safe position.
    let report = controller.run_cycle(MockInstant::secs(25), &mut recorder);
    assert_eq!(report.outcome, CycleOutcome::Held { altitude_m: 19_000.0 });
    assert_eq!(controller.health(Device::Altimeter), DeviceHealth::Ready);
    assert_eq!(controller.health(Device::Actuator), DeviceHealth::Ready);
    assert_eq!(controller.actuator().init_calls, 2);
    assert_eq!(
        controller.actuator().commands_after_startup(),
        &[ActuatorState::Open, ActuatorState::Closed]
    );
    assert_eq!(controller.state(), ActuatorState::Closed);
    assert_eq!(recorder.count(TelemetryEventKind::FaultRecovered(Device::Actuator)), 1);
}

#[test]
fn failed_reinit_costs_short_plus_long() {
    let mut altimeter = ScriptedAltimeter::with_readings(&[1_000.0]);
    altimeter.fail_next_inits(2);
    let mut controller = controller(altimeter);
    let mut recorder = Recorder::new();
    let mut scheduler = FakeScheduler::default();

    run_cycles(&mut controller, &mut recorder, &mut scheduler, 2);

    assert_eq!(
        scheduler.sleeps.as_slice(),
        &[
            Duration::from_secs(5),
            Duration::from_secs(25),
            Duration::from_secs(5),
            Duration::from_secs(25),
        ]
    );
    assert_eq!(controller.altimeter().reads, 0, "no read while the sensor is down");
    assert_eq!(controller.actuator().init_calls, 0, "step 2 skipped after step 1 fails");
    assert_eq!(recorder.count(TelemetryEventKind::ReinitFailed(Device::Altimeter)), 2);
    assert_eq!(controller.status(Device::Altimeter).consecutive_faults(), 2);

    run_cycles(&mut controller, &mut recorder, &mut scheduler, 1);
    assert_eq!(controller.health(Device::Altimeter), DeviceHealth::Ready);
    assert_eq!(controller.altimeter().reads, 1);
    assert_eq!(
        recorder.count(TelemetryEventKind::DeviceReady(Device::Altimeter)),
        1,
        "first successful init is reported as ready, not recovered"
    );
}

#[test]
fn actuator_reinit_failure_backs_off() {
    let mut controller = controller(ScriptedAltimeter::with_readings(&[1_000.0]));
    controller.actuator_mut().fail_next_inits(1);
    let mut recorder = Recorder::new();

    let report = controller.run_cycle(MockInstant::secs(0), &mut recorder);

    assert_eq!(report.outcome, CycleOutcome::ReinitFailed(Device::Actuator));
    assert_eq!(report.total_pause(), Duration::from_secs(30));
    assert_eq!(controller.health(Device::Altimeter), DeviceHealth::Ready);
    assert_eq!(controller.altimeter().reads, 0);

    match recorder.latest().map(|record| record.details) {
        Some(TelemetryPayload::Backoff(backoff)) => {
            assert_eq!(backoff.attempt, 1);
            assert_eq!(backoff.retry_in, Duration::from_secs(30));
        }
        other => panic!("unexpected payload: {other:?}"),
    }
}

#[test]
fn failed_safety_close_keeps_actuator_faulted() {
    let mut controller = controller(ScriptedAltimeter::with_readings(&[1_000.0]));
    controller.actuator_mut().fail_next_commands(1);
    let mut recorder = Recorder::new();

    let report = controller.run_cycle(MockInstant::secs(0), &mut recorder);

    assert_eq!(report.outcome, CycleOutcome::ReinitFailed(Device::Actuator));
    assert_eq!(
        report.pauses.as_slice(),
        &[Duration::from_secs(5), Duration::from_secs(25)]
    );
    assert_eq!(controller.health(Device::Actuator), DeviceHealth::Faulted);

    let latest = recorder.latest().expect("re-init failure recorded");
    assert_eq!(latest.event, TelemetryEventKind::ReinitFailed(Device::Actuator));
    match latest.details {
        TelemetryPayload::Backoff(backoff) => {
            assert_eq!(backoff.attempt, 1);
            assert_eq!(backoff.retry_in, Duration::from_secs(30));
            assert_eq!(backoff.error, DeviceError::Bus);
        }
        other => panic!("unexpected payload: {other:?}"),
    }

    let report = controller.run_cycle(MockInstant::secs(30), &mut recorder);
    assert_eq!(report.outcome, CycleOutcome::Held { altitude_m: 1_000.0 });
    assert_eq!(controller.actuator().commands.as_slice(), &[ActuatorState::Closed]);
}

#[test]
fn rejected_open_command_retries_after_reinit() {
    let mut controller = controller(ScriptedAltimeter::with_readings(&[
        1_000.0, 21_000.0, 21_000.0,
    ]));
    let mut recorder = Recorder::new();
    let mut scheduler = FakeScheduler::default();

    run_cycles(&mut controller, &mut recorder, &mut scheduler, 1);
    controller.actuator_mut().fail_next_commands(1);

    run_cycles(&mut controller, &mut recorder, &mut scheduler, 1);
    assert_eq!(controller.state(), ActuatorState::Closed);
    assert_eq!(controller.health(Device::Actuator), DeviceHealth::Faulted);

    run_cycles(&mut controller, &mut recorder, &mut scheduler, 1);
    assert_eq!(controller.state(), ActuatorState::Open);
    assert_eq!(
        controller.actuator().commands_after_startup(),
        &[ActuatorState::Closed, ActuatorState::Open]
    );
    assert!(recorder.oldest_first().any(|record| matches!(
        record.details,
        TelemetryPayload::Fault(fault) if fault.kind == FaultKind::CommandFailure
    )));
}

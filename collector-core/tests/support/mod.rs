#![allow(dead_code)]

use core::ops::Add;
use core::time::Duration;

use collector_core::collector::{
    ActuatorDriver, ActuatorState, AltitudeSource, DeviceError, Scheduler, SensorError,
    ThresholdActuatorController,
};
use collector_core::config::ControllerConfig;
use collector_core::telemetry::{TelemetryInstant, TelemetryRecorder};
use heapless::{Deque, Vec as HeaplessVec};

pub type Controller = ThresholdActuatorController<ScriptedAltimeter, RecordingActuator, MockInstant>;
pub type Recorder = TelemetryRecorder<MockInstant, 64>;

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct MockInstant(pub u64);

impl MockInstant {
    pub fn secs(value: u64) -> Self {
        Self(value * 1_000_000)
    }
}

impl Add<Duration> for MockInstant {
    type Output = Self;

    fn add(self, rhs: Duration) -> Self::Output {
        Self(self.0 + rhs.as_micros() as u64)
    }
}

impl TelemetryInstant for MockInstant {
    fn saturating_duration_since(&self, earlier: Self) -> Duration {
        Duration::from_micros(self.0.saturating_sub(earlier.0))
    }
}

/// Altimeter that replays a script of readings; an exhausted script reports no data.
#[derive(Default)]
pub struct ScriptedAltimeter {
    readings: Deque<Result<Option<f64>, SensorError>, 32>,
    init_failures: u8,
    pub init_calls: u16,
    pub reads: u16,
}

impl ScriptedAltimeter {
    pub fn with_readings(readings: &[f64]) -> Self {
        let mut altimeter = Self::default();
        for reading in readings {
            altimeter.push(Ok(Some(*reading)));
        }
        altimeter
    }

    pub fn push(&mut self, reading: Result<Option<f64>, SensorError>) {
        self.readings
            .push_back(reading)
            .expect("reading script capacity");
    }

    pub fn fail_next_inits(&mut self, count: u8) {
        self.init_failures = count;
    }
}

impl AltitudeSource for ScriptedAltimeter {
    fn initialize(&mut self) -> Result<(), DeviceError> {
        self.init_calls += 1;
        if self.init_failures > 0 {
            self.init_failures -= 1;
            return Err(DeviceError::NotResponding);
        }
        Ok(())
    }

    fn read(&mut self) -> Result<Option<f64>, SensorError> {
        self.reads += 1;
        self.readings.pop_front().unwrap_or(Ok(None))
    }
}

/// Actuator that records every accepted command.
#[derive(Default)]
pub struct RecordingActuator {
    pub commands: HeaplessVec<ActuatorState, 32>,
    init_failures: u8,
    command_failures: u8,
    pub init_calls: u16,
}

impl RecordingActuator {
    pub fn fail_next_inits(&mut self, count: u8) {
        self.init_failures = count;
    }

    pub fn fail_next_commands(&mut self, count: u8) {
        self.command_failures = count;
    }

    /// Commands issued after startup's safety close.
    pub fn commands_after_startup(&self) -> &[ActuatorState] {
        self.commands.get(1..).unwrap_or(&[])
    }
}

impl ActuatorDriver for RecordingActuator {
    fn initialize(&mut self) -> Result<(), DeviceError> {
        self.init_calls += 1;
        if self.init_failures > 0 {
            self.init_failures -= 1;
            return Err(DeviceError::Bus);
        }
        Ok(())
    }

    fn command(&mut self, target: ActuatorState) -> Result<(), DeviceError> {
        if self.command_failures > 0 {
            self.command_failures -= 1;
            return Err(DeviceError::Bus);
        }
        self.commands.push(target).expect("command log capacity");
        Ok(())
    }
}

/// Scheduler that advances a mock clock instead of sleeping.
#[derive(Default)]
pub struct FakeScheduler {
    pub now: MockInstant,
    pub sleeps: HeaplessVec<Duration, 64>,
}

impl FakeScheduler {
    pub fn slept(&self) -> Duration {
        self.sleeps.iter().copied().sum()
    }
}

impl Scheduler for FakeScheduler {
    type Instant = MockInstant;

    fn now(&self) -> MockInstant {
        self.now
    }

    fn sleep(&mut self, duration: Duration) {
        self.sleeps.push(duration).expect("sleep log capacity");
        self.now = self.now + duration;
    }
}

pub fn controller(altimeter: ScriptedAltimeter) -> Controller {
    ThresholdActuatorController::new(
        ControllerConfig::default(),
        altimeter,
        RecordingActuator::default(),
    )
}

/// Runs `cycles` cycles back to back, advancing the clock by each report's pauses.
pub fn run_cycles(
    controller: &mut Controller,
    recorder: &mut Recorder,
    scheduler: &mut FakeScheduler,
    cycles: usize,
) {
    for _ in 0..cycles {
        let report = controller.run_cycle(scheduler.now(), recorder);
        for pause in &report.pauses {
            scheduler.sleep(*pause);
        }
    }
}

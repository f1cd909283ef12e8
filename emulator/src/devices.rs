use std::cell::Cell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use collector_core::collector::{
    ActuatorDriver, ActuatorState, AltitudeSource, DeviceError, Scheduler, SensorError,
};
use collector_core::servo::ServoCalibration;

use crate::flight::{Fault, FlightProfile, Injection};

/// Shared simulated mission clock.
#[derive(Clone, Debug, Default)]
pub struct SimClock {
    elapsed: Rc<Cell<Duration>>,
}

impl SimClock {
    pub fn now(&self) -> Duration {
        self.elapsed.get()
    }

    fn advance(&self, by: Duration) {
        self.elapsed.set(self.elapsed.get().saturating_add(by));
    }
}

/// Scheduler that jumps the simulated clock and flags touchdown.
pub struct SimScheduler {
    clock: SimClock,
    landing_at: Duration,
    landed: Rc<AtomicBool>,
}

impl SimScheduler {
    pub fn new(clock: SimClock, landing_at: Duration) -> Self {
        Self {
            clock,
            landing_at,
            landed: Rc::new(AtomicBool::new(false)),
        }
    }

    /// Cancellation flag raised once the flight is over.
    pub fn landed(&self) -> Rc<AtomicBool> {
        Rc::clone(&self.landed)
    }
}

impl Scheduler for SimScheduler {
    type Instant = Duration;

    fn now(&self) -> Duration {
        self.clock.now()
    }

    fn sleep(&mut self, duration: Duration) {
        self.clock.advance(duration);
        if self.clock.now() >= self.landing_at {
            self.landed.store(true, Ordering::Release);
        }
    }
}

/// Injections waiting for their time, plus the ones already armed.
struct FaultQueue {
    scheduled: VecDeque<Injection>,
}

impl FaultQueue {
    fn new(injections: impl IntoIterator<Item = Injection>) -> Self {
        Self {
            scheduled: injections.into_iter().collect(),
        }
    }

    fn take_due(&mut self, now: Duration) -> Vec<Fault> {
        let mut due = Vec::new();
        while let Some(next) = self.scheduled.front() {
            if next.at > now {
                break;
            }
            if let Some(injection) = self.scheduled.pop_front() {
                due.push(injection.fault);
            }
        }
        due
    }
}

/// Altimeter flying a [`FlightProfile`] with scripted faults.
pub struct SimAltimeter {
    clock: SimClock,
    profile: FlightProfile,
    faults: FaultQueue,
    armed_reads: VecDeque<Fault>,
    init_failures: u8,
    pub last_altitude_m: Option<f64>,
}

impl SimAltimeter {
    pub fn new(clock: SimClock, profile: FlightProfile) -> Self {
        let injections = profile
            .injections()
            .into_iter()
            .filter(|injection| injection.fault.targets_altimeter());
        Self {
            clock,
            profile,
            faults: FaultQueue::new(injections),
            armed_reads: VecDeque::new(),
            init_failures: 0,
            last_altitude_m: None,
        }
    }

    fn arm_due_faults(&mut self) {
        for fault in self.faults.take_due(self.clock.now()) {
            match fault {
                Fault::AltimeterInitFailures(count) => {
                    self.init_failures = self.init_failures.saturating_add(count);
                }
                other => self.armed_reads.push_back(other),
            }
        }
    }
}

impl AltitudeSource for SimAltimeter {
    fn initialize(&mut self) -> Result<(), DeviceError> {
        self.arm_due_faults();
        if self.init_failures > 0 {
            self.init_failures -= 1;
            return Err(DeviceError::NotResponding);
        }
        Ok(())
    }

    fn read(&mut self) -> Result<Option<f64>, SensorError> {
        self.arm_due_faults();
        match self.armed_reads.pop_front() {
            Some(Fault::SensorTransient) => Err(SensorError::Transient),
            Some(Fault::SensorUnclassified) => Err(SensorError::Unclassified),
            Some(_) => Ok(None),
            None => {
                let altitude = self.profile.altitude_at(self.clock.now());
                self.last_altitude_m = Some(altitude);
                Ok(Some(altitude))
            }
        }
    }
}

/// Servo model that tracks the horn angle it was last driven to.
pub struct SimServo {
    clock: SimClock,
    calibration: ServoCalibration,
    faults: FaultQueue,
    init_failures: u8,
    command_failures: u8,
    angle_deg: Option<u16>,
    pub moves: u32,
}

impl SimServo {
    pub fn new(clock: SimClock, profile: FlightProfile) -> Self {
        let injections = profile
            .injections()
            .into_iter()
            .filter(|injection| !injection.fault.targets_altimeter());
        Self {
            clock,
            calibration: ServoCalibration::default(),
            faults: FaultQueue::new(injections),
            init_failures: 0,
            command_failures: 0,
            angle_deg: None,
            moves: 0,
        }
    }

    /// Horn angle after the last accepted command.
    pub fn angle_deg(&self) -> Option<u16> {
        self.angle_deg
    }

    pub fn calibration(&self) -> &ServoCalibration {
        &self.calibration
    }

    fn arm_due_faults(&mut self) {
        for fault in self.faults.take_due(self.clock.now()) {
            match fault {
                Fault::ServoCommandFailures(count) => {
                    self.command_failures = self.command_failures.saturating_add(count);
                }
                Fault::ServoInitFailures(count) => {
                    self.init_failures = self.init_failures.saturating_add(count);
                }
                _ => {}
            }
        }
    }
}

impl ActuatorDriver for SimServo {
    fn initialize(&mut self) -> Result<(), DeviceError> {
        self.arm_due_faults();
        if self.init_failures > 0 {
            self.init_failures -= 1;
            return Err(DeviceError::NotResponding);
        }
        Ok(())
    }

    fn command(&mut self, target: ActuatorState) -> Result<(), DeviceError> {
        self.arm_due_faults();
        if self.command_failures > 0 {
            self.command_failures -= 1;
            return Err(DeviceError::Bus);
        }

        let angle = self.calibration.angle_for(target);
        if self.angle_deg != Some(angle) {
            self.moves += 1;
        }
        self.angle_deg = Some(angle);
        Ok(())
    }
}

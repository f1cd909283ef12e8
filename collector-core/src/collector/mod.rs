//! Altitude-triggered actuator controller shared by firmware and host targets.
//!
//! The controller polls an [`AltitudeSource`], applies a hysteresis rule
//! against the last commanded [`ActuatorState`], and drives an
//! [`ActuatorDriver`] when the collector door has to move. Device failures are
//! classified into [`FaultKind`]s and recovered locally with a two-tier
//! backoff, so the loop never terminates on its own.
//!
//! Sleeping is left to the caller. Each call to
//! [`ThresholdActuatorController::run_cycle`] returns a [`CycleReport`] listing
//! the pauses to observe before the next cycle; firmware awaits them on an
//! Embassy timer while host tooling feeds them to a [`Scheduler`].

use core::{fmt, mem, ops::ControlFlow, time::Duration};

use heapless::Vec;

use crate::config::{ControllerConfig, Thresholds};
use crate::telemetry::{
    AltitudeTelemetry, BackoffTelemetry, EventSink, FaultTelemetry, RecoveryTelemetry,
    TelemetryEventKind, TelemetryInstant, TelemetryPayload, TransitionReason,
    TransitionTelemetry,
};

pub mod scheduler;

pub use scheduler::{CancelSignal, CycleBudget, NeverCancel, Scheduler};

/// Logical position of the collector door.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ActuatorState {
    Open,
    Closed,
}

impl ActuatorState {
    /// Returns `true` for [`ActuatorState::Open`].
    pub const fn is_open(self) -> bool {
        matches!(self, ActuatorState::Open)
    }

    /// Short lowercase label used in logs and transcripts.
    pub const fn label(self) -> &'static str {
        match self {
            ActuatorState::Open => "open",
            ActuatorState::Closed => "closed",
        }
    }
}

impl fmt::Display for ActuatorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Whether the controller currently trusts a device.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum DeviceHealth {
    Ready,
    Faulted,
}

impl DeviceHealth {
    pub const fn is_ready(self) -> bool {
        matches!(self, DeviceHealth::Ready)
    }
}

impl fmt::Display for DeviceHealth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceHealth::Ready => f.write_str("ready"),
            DeviceHealth::Faulted => f.write_str("faulted"),
        }
    }
}

/// External capabilities owned by the controller.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Device {
    Altimeter,
    Actuator,
}

impl Device {
    /// Every device in initialization order.
    pub const ALL: [Device; 2] = [Device::Altimeter, Device::Actuator];

    /// Deterministic index used for telemetry codes.
    pub const fn as_index(self) -> usize {
        match self {
            Device::Altimeter => 0,
            Device::Actuator => 1,
        }
    }

    /// Attempts to construct a [`Device`] from a raw index.
    pub const fn from_index(index: usize) -> Option<Self> {
        match index {
            0 => Some(Device::Altimeter),
            1 => Some(Device::Actuator),
            _ => None,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Device::Altimeter => "altimeter",
            Device::Actuator => "actuator",
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Classification applied to every failure the controller observes.
///
/// The kind decides how long the controller backs off and which devices are
/// marked [`DeviceHealth::Faulted`].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum FaultKind {
    /// Communication hiccup on the altimeter bus.
    TransientIo,
    /// The altimeter answered but had no usable reading.
    IndeterminateReading,
    /// The actuator rejected a command.
    CommandFailure,
    /// Anything else; both devices are reset.
    Unclassified,
}

impl FaultKind {
    pub const fn label(self) -> &'static str {
        match self {
            FaultKind::TransientIo => "transient-io",
            FaultKind::IndeterminateReading => "indeterminate-reading",
            FaultKind::CommandFailure => "command-failure",
            FaultKind::Unclassified => "unclassified",
        }
    }
}

impl fmt::Display for FaultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Error reported by [`AltitudeSource::read`].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SensorError {
    /// Bus-level failure that a re-initialization is expected to clear.
    Transient,
    /// Failure the adapter could not attribute to the bus.
    Unclassified,
}

impl SensorError {
    /// Maps the adapter error onto the controller fault taxonomy.
    pub const fn fault_kind(self) -> FaultKind {
        match self {
            SensorError::Transient => FaultKind::TransientIo,
            SensorError::Unclassified => FaultKind::Unclassified,
        }
    }
}

impl fmt::Display for SensorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SensorError::Transient => f.write_str("transient sensor error"),
            SensorError::Unclassified => f.write_str("unclassified sensor error"),
        }
    }
}

/// Error reported by device initialization and actuator commands.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum DeviceError {
    /// Bus transaction failed.
    Bus,
    /// Device did not answer or reported an unexpected identity.
    NotResponding,
    /// Device cannot perform the request in its current configuration.
    Unsupported,
}

impl DeviceError {
    pub const fn label(self) -> &'static str {
        match self {
            DeviceError::Bus => "bus",
            DeviceError::NotResponding => "not-responding",
            DeviceError::Unsupported => "unsupported",
        }
    }
}

impl fmt::Display for DeviceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Capability that reports the current altitude.
pub trait AltitudeSource {
    /// Brings the sensor into a readable state.
    fn initialize(&mut self) -> Result<(), DeviceError>;

    /// Reads the current altitude in metres.
    ///
    /// `Ok(None)` means the sensor answered without a usable value this call.
    fn read(&mut self) -> Result<Option<f64>, SensorError>;
}

/// Capability that moves the collector door.
pub trait ActuatorDriver {
    /// Brings the actuator into a commandable state.
    fn initialize(&mut self) -> Result<(), DeviceError>;

    /// Drives the door toward `target`. Position is never read back.
    fn command(&mut self, target: ActuatorState) -> Result<(), DeviceError>;
}

impl<T: AltitudeSource + ?Sized> AltitudeSource for &mut T {
    fn initialize(&mut self) -> Result<(), DeviceError> {
        (**self).initialize()
    }

    fn read(&mut self) -> Result<Option<f64>, SensorError> {
        (**self).read()
    }
}

impl<T: ActuatorDriver + ?Sized> ActuatorDriver for &mut T {
    fn initialize(&mut self) -> Result<(), DeviceError> {
        (**self).initialize()
    }

    fn command(&mut self, target: ActuatorState) -> Result<(), DeviceError> {
        (**self).command(target)
    }
}

/// Health bookkeeping tracked per device.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct DeviceStatus<I> {
    health: DeviceHealth,
    consecutive_faults: u16,
    faulted_since: Option<I>,
    ever_ready: bool,
}

impl<I: Copy> DeviceStatus<I> {
    /// Devices start faulted so the first cycle performs startup initialization.
    const fn uninitialized() -> Self {
        Self {
            health: DeviceHealth::Faulted,
            consecutive_faults: 0,
            faulted_since: None,
            ever_ready: false,
        }
    }

    pub const fn health(&self) -> DeviceHealth {
        self.health
    }

    /// Faults and failed re-initializations observed since the device was last ready.
    pub const fn consecutive_faults(&self) -> u16 {
        self.consecutive_faults
    }

    /// Timestamp of the first fault in the current outage, if any.
    pub const fn faulted_since(&self) -> Option<I> {
        self.faulted_since
    }

    /// Returns `true` once the device has initialized successfully at least once.
    pub const fn has_been_ready(&self) -> bool {
        self.ever_ready
    }

    fn mark_faulted(&mut self, now: I) -> u16 {
        self.health = DeviceHealth::Faulted;
        if self.faulted_since.is_none() {
            self.faulted_since = Some(now);
        }
        self.consecutive_faults = self.consecutive_faults.saturating_add(1);
        self.consecutive_faults
    }

    fn mark_ready(&mut self) -> (u16, Option<I>) {
        self.health = DeviceHealth::Ready;
        self.ever_ready = true;
        let cleared = mem::take(&mut self.consecutive_faults);
        (cleared, self.faulted_since.take())
    }
}

/// Longest pause plan a single cycle can request (the re-init backoff).
pub const MAX_CYCLE_PAUSES: usize = 2;

/// Ordered pauses the caller must observe after a cycle.
pub type Pauses = Vec<Duration, MAX_CYCLE_PAUSES>;

/// What a single control cycle did.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum CycleOutcome {
    /// Reading evaluated, no command required.
    Held { altitude_m: f64 },
    /// Door commanded and acknowledged by the driver.
    Commanded {
        target: ActuatorState,
        altitude_m: f64,
    },
    /// Driver rejected the command; state left unchanged.
    CommandFailed {
        target: ActuatorState,
        altitude_m: f64,
    },
    /// Altitude could not be used this cycle.
    ReadSkipped(FaultKind),
    /// A faulted device could not be brought back.
    ReinitFailed(Device),
}

/// Result of [`ThresholdActuatorController::run_cycle`].
#[derive(Clone, Debug, PartialEq)]
pub struct CycleReport {
    pub outcome: CycleOutcome,
    pub pauses: Pauses,
}

impl CycleReport {
    fn after(outcome: CycleOutcome, pause: Duration) -> Self {
        let mut pauses = Pauses::new();
        let _ = pauses.push(pause);
        Self { outcome, pauses }
    }

    fn after_backoff(outcome: CycleOutcome, short: Duration, long: Duration) -> Self {
        let mut pauses = Pauses::new();
        let _ = pauses.push(short);
        let _ = pauses.push(long);
        Self { outcome, pauses }
    }

    /// Sum of every pause requested by the cycle.
    pub fn total_pause(&self) -> Duration {
        self.pauses.iter().copied().sum()
    }
}

/// Applies the hysteresis rule to a reading.
///
/// Returns the state to command, or `None` while the reading keeps the door
/// where it is. Both comparisons are strict.
pub fn evaluate(
    state: ActuatorState,
    altitude_m: f64,
    thresholds: &Thresholds,
) -> Option<ActuatorState> {
    match state {
        ActuatorState::Closed if altitude_m > thresholds.open_m() => Some(ActuatorState::Open),
        ActuatorState::Open if altitude_m < thresholds.close_m() => Some(ActuatorState::Closed),
        _ => None,
    }
}

const fn door_event(target: ActuatorState) -> TelemetryEventKind {
    match target {
        ActuatorState::Open => TelemetryEventKind::DoorOpened,
        ActuatorState::Closed => TelemetryEventKind::DoorClosed,
    }
}

/// Single-threaded polling controller for the collector door.
pub struct ThresholdActuatorController<A, D, I> {
    config: ControllerConfig,
    altimeter: A,
    actuator: D,
    state: ActuatorState,
    altimeter_status: DeviceStatus<I>,
    actuator_status: DeviceStatus<I>,
}

impl<A, D, I> ThresholdActuatorController<A, D, I>
where
    A: AltitudeSource,
    D: ActuatorDriver,
    I: TelemetryInstant,
{
    /// Creates a controller with the door logically closed and both devices
    /// awaiting initialization.
    pub const fn new(config: ControllerConfig, altimeter: A, actuator: D) -> Self {
        Self {
            config,
            altimeter,
            actuator,
            state: ActuatorState::Closed,
            altimeter_status: DeviceStatus::uninitialized(),
            actuator_status: DeviceStatus::uninitialized(),
        }
    }

    /// Last successfully commanded door state.
    pub const fn state(&self) -> ActuatorState {
        self.state
    }

    pub const fn config(&self) -> &ControllerConfig {
        &self.config
    }

    pub const fn status(&self, device: Device) -> &DeviceStatus<I> {
        match device {
            Device::Altimeter => &self.altimeter_status,
            Device::Actuator => &self.actuator_status,
        }
    }

    pub const fn health(&self, device: Device) -> DeviceHealth {
        self.status(device).health
    }

    pub const fn altimeter(&self) -> &A {
        &self.altimeter
    }

    pub fn altimeter_mut(&mut self) -> &mut A {
        &mut self.altimeter
    }

    pub const fn actuator(&self) -> &D {
        &self.actuator
    }

    pub fn actuator_mut(&mut self) -> &mut D {
        &mut self.actuator
    }

    /// Consumes the controller and hands back the device adapters.
    pub fn into_parts(self) -> (A, D) {
        (self.altimeter, self.actuator)
    }

    /// Runs one control cycle.
    ///
    /// Re-initializes faulted devices, reads the altitude, applies the
    /// hysteresis rule and commands the door when required. Every failure is
    /// absorbed here; the returned report tells the caller how long to wait.
    pub fn run_cycle<S>(&mut self, now: I, sink: &mut S) -> CycleReport
    where
        S: EventSink<I> + ?Sized,
    {
        let (ControlFlow::Break(report) | ControlFlow::Continue(report)) = self.step(now, sink);
        report
    }

    /// Drives cycles until `cancel` fires, sleeping through `scheduler`.
    ///
    /// Cancellation is only observed at cycle boundaries. Returns the number of
    /// cycles executed.
    pub fn run_forever<T, C, S>(&mut self, scheduler: &mut T, cancel: &C, sink: &mut S) -> u64
    where
        T: Scheduler<Instant = I> + ?Sized,
        C: CancelSignal + ?Sized,
        S: EventSink<I> + ?Sized,
    {
        let mut cycles = 0u64;
        while !cancel.is_cancelled() {
            let report = self.run_cycle(scheduler.now(), sink);
            cycles = cycles.saturating_add(1);
            for pause in &report.pauses {
                scheduler.sleep(*pause);
            }
        }
        cycles
    }

    /// Commands the door closed before the controller is parked.
    ///
    /// Unlike the cycle path this is attempted even when the actuator is
    /// faulted; a failure marks the actuator faulted and is returned.
    pub fn close_for_shutdown<S>(&mut self, now: I, sink: &mut S) -> Result<(), DeviceError>
    where
        S: EventSink<I> + ?Sized,
    {
        match self.actuator.command(ActuatorState::Closed) {
            Ok(()) => {
                self.settle(ActuatorState::Closed, TransitionReason::Shutdown, None, now, sink);
                Ok(())
            }
            Err(error) => {
                self.record_fault(Device::Actuator, FaultKind::CommandFailure, Some(error), now, sink);
                Err(error)
            }
        }
    }

    fn step<S>(&mut self, now: I, sink: &mut S) -> ControlFlow<CycleReport, CycleReport>
    where
        S: EventSink<I> + ?Sized,
    {
        self.ensure_altimeter(now, sink)?;
        self.ensure_actuator(now, sink)?;
        let altitude_m = self.read_altitude(now, sink)?;

        let outcome = match evaluate(self.state, altitude_m, self.config.thresholds()) {
            Some(target) => self.drive(target, altitude_m, now, sink),
            None => {
                sink.record(
                    TelemetryEventKind::AltitudeSampled,
                    TelemetryPayload::Altitude(AltitudeTelemetry::new(altitude_m, self.state)),
                    now,
                );
                CycleOutcome::Held { altitude_m }
            }
        };

        ControlFlow::Continue(CycleReport::after(outcome, self.config.poll_interval()))
    }

    fn ensure_altimeter<S>(&mut self, now: I, sink: &mut S) -> ControlFlow<CycleReport>
    where
        S: EventSink<I> + ?Sized,
    {
        if self.altimeter_status.health.is_ready() {
            return ControlFlow::Continue(());
        }

        match self.altimeter.initialize() {
            Ok(()) => {
                self.record_ready(Device::Altimeter, now, sink);
                ControlFlow::Continue(())
            }
            Err(error) => ControlFlow::Break(self.reinit_failed(Device::Altimeter, error, now, sink)),
        }
    }

    fn ensure_actuator<S>(&mut self, now: I, sink: &mut S) -> ControlFlow<CycleReport>
    where
        S: EventSink<I> + ?Sized,
    {
        if self.actuator_status.health.is_ready() {
            return ControlFlow::Continue(());
        }

        if let Err(error) = self.actuator.initialize() {
            return ControlFlow::Break(self.reinit_failed(Device::Actuator, error, now, sink));
        }
        self.record_ready(Device::Actuator, now, sink);

        // A freshly initialized actuator is not trusted until it holds the door closed.
        match self.actuator.command(ActuatorState::Closed) {
            Ok(()) => {
                self.settle(ActuatorState::Closed, TransitionReason::SafetyDefault, None, now, sink);
                ControlFlow::Continue(())
            }
            Err(error) => ControlFlow::Break(self.reinit_failed(Device::Actuator, error, now, sink)),
        }
    }

    fn read_altitude<S>(&mut self, now: I, sink: &mut S) -> ControlFlow<CycleReport, f64>
    where
        S: EventSink<I> + ?Sized,
    {
        match self.altimeter.read() {
            Ok(Some(altitude_m)) if altitude_m.is_finite() => ControlFlow::Continue(altitude_m),
            Ok(_) => {
                // No data is not a device fault: health and counters stay untouched.
                let consecutive = self.altimeter_status.consecutive_faults;
                sink.record(
                    TelemetryEventKind::FaultDetected(Device::Altimeter),
                    TelemetryPayload::Fault(FaultTelemetry::new(
                        FaultKind::IndeterminateReading,
                        consecutive,
                        None,
                    )),
                    now,
                );
                ControlFlow::Break(CycleReport::after(
                    CycleOutcome::ReadSkipped(FaultKind::IndeterminateReading),
                    self.config.indeterminate_delay(),
                ))
            }
            Err(error) => {
                let kind = error.fault_kind();
                let pause = match kind {
                    FaultKind::Unclassified => {
                        self.record_fault(Device::Altimeter, kind, None, now, sink);
                        self.record_fault(Device::Actuator, kind, None, now, sink);
                        self.config.unclassified_delay()
                    }
                    _ => {
                        self.record_fault(Device::Altimeter, kind, None, now, sink);
                        self.config.short_retry_delay()
                    }
                };
                ControlFlow::Break(CycleReport::after(CycleOutcome::ReadSkipped(kind), pause))
            }
        }
    }

    fn drive<S>(
        &mut self,
        target: ActuatorState,
        altitude_m: f64,
        now: I,
        sink: &mut S,
    ) -> CycleOutcome
    where
        S: EventSink<I> + ?Sized,
    {
        let reason = match target {
            ActuatorState::Open => TransitionReason::AboveOpenThreshold,
            ActuatorState::Closed => TransitionReason::BelowCloseThreshold,
        };

        match self.actuator.command(target) {
            Ok(()) => {
                self.settle(target, reason, Some(altitude_m), now, sink);
                CycleOutcome::Commanded { target, altitude_m }
            }
            Err(error) => {
                self.record_fault(Device::Actuator, FaultKind::CommandFailure, Some(error), now, sink);
                CycleOutcome::CommandFailed { target, altitude_m }
            }
        }
    }

    fn settle<S>(
        &mut self,
        target: ActuatorState,
        reason: TransitionReason,
        altitude_m: Option<f64>,
        now: I,
        sink: &mut S,
    ) where
        S: EventSink<I> + ?Sized,
    {
        let from = mem::replace(&mut self.state, target);
        sink.record(
            door_event(target),
            TelemetryPayload::Transition(TransitionTelemetry::new(from, target, reason, altitude_m)),
            now,
        );
    }

    fn status_mut(&mut self, device: Device) -> &mut DeviceStatus<I> {
        match device {
            Device::Altimeter => &mut self.altimeter_status,
            Device::Actuator => &mut self.actuator_status,
        }
    }

    fn record_fault<S>(
        &mut self,
        device: Device,
        kind: FaultKind,
        detail: Option<DeviceError>,
        now: I,
        sink: &mut S,
    ) where
        S: EventSink<I> + ?Sized,
    {
        let consecutive = self.status_mut(device).mark_faulted(now);
        sink.record(
            TelemetryEventKind::FaultDetected(device),
            TelemetryPayload::Fault(FaultTelemetry::new(kind, consecutive, detail)),
            now,
        );
    }

    fn record_ready<S>(&mut self, device: Device, now: I, sink: &mut S)
    where
        S: EventSink<I> + ?Sized,
    {
        let status = self.status_mut(device);
        let first_time = !status.ever_ready;
        let (faults_cleared, faulted_since) = status.mark_ready();
        let downtime = faulted_since.map(|since| now.saturating_duration_since(since));

        let event = if first_time {
            TelemetryEventKind::DeviceReady(device)
        } else {
            TelemetryEventKind::FaultRecovered(device)
        };
        sink.record(
            event,
            TelemetryPayload::Recovery(RecoveryTelemetry::new(faults_cleared, downtime)),
            now,
        );
    }

    fn reinit_failed<S>(
        &mut self,
        device: Device,
        error: DeviceError,
        now: I,
        sink: &mut S,
    ) -> CycleReport
    where
        S: EventSink<I> + ?Sized,
    {
        let short = self.config.short_retry_delay();
        let long = self.config.long_retry_delay();
        let attempt = self.status_mut(device).mark_faulted(now);
        sink.record(
            TelemetryEventKind::ReinitFailed(device),
            TelemetryPayload::Backoff(BackoffTelemetry::new(
                attempt,
                short.saturating_add(long),
                error,
            )),
            now,
        );
        CycleReport::after_backoff(CycleOutcome::ReinitFailed(device), short, long)
    }
}

//! Telemetry event catalog and payload structures shared by firmware and host targets.
//!
//! Every door movement, fault, recovery and failed re-initialization the
//! controller observes is emitted through an [`EventSink`]. Event kinds encode
//! to compact numeric codes for transport over diagnostics channels, and the
//! [`TelemetryRecorder`] keeps the most recent records in a fixed-size ring so
//! the crate stays `no_std`.

use core::{fmt, time::Duration};

use heapless::{HistoryBuf, OldestOrdered};

use crate::collector::{ActuatorState, Device, DeviceError, FaultKind};

/// Identifier assigned to each recorded event.
pub type EventId = u32;

/// Discriminated telemetry events shared across all collector targets.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TelemetryEventKind {
    DoorOpened,
    DoorClosed,
    AltitudeSampled,
    FaultDetected(Device),
    FaultRecovered(Device),
    DeviceReady(Device),
    ReinitFailed(Device),
    Custom(u16),
}

impl fmt::Display for TelemetryEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TelemetryEventKind::DoorOpened => f.write_str("door-opened"),
            TelemetryEventKind::DoorClosed => f.write_str("door-closed"),
            TelemetryEventKind::AltitudeSampled => f.write_str("altitude-sampled"),
            TelemetryEventKind::FaultDetected(device) => write!(f, "fault-detected {device}"),
            TelemetryEventKind::FaultRecovered(device) => write!(f, "fault-recovered {device}"),
            TelemetryEventKind::DeviceReady(device) => write!(f, "device-ready {device}"),
            TelemetryEventKind::ReinitFailed(device) => write!(f, "reinit-failed {device}"),
            TelemetryEventKind::Custom(code) => write!(f, "custom({code})"),
        }
    }
}

impl TelemetryEventKind {
    const DOOR_OPENED_CODE: u16 = 0x0001;
    const DOOR_CLOSED_CODE: u16 = 0x0002;
    const ALTITUDE_SAMPLED_CODE: u16 = 0x0003;
    const FAULT_DETECTED_BASE: u16 = 0x0010;
    const FAULT_RECOVERED_BASE: u16 = 0x0014;
    const DEVICE_READY_BASE: u16 = 0x0018;
    const REINIT_FAILED_BASE: u16 = 0x001C;
    const DEVICE_SLOTS: u16 = 4;

    /// Encodes the event into a compact transport-friendly discriminant.
    #[must_use]
    pub const fn to_raw(self) -> u16 {
        match self {
            TelemetryEventKind::DoorOpened => Self::DOOR_OPENED_CODE,
            TelemetryEventKind::DoorClosed => Self::DOOR_CLOSED_CODE,
            TelemetryEventKind::AltitudeSampled => Self::ALTITUDE_SAMPLED_CODE,
            TelemetryEventKind::FaultDetected(device) => {
                Self::FAULT_DETECTED_BASE + device_code(device)
            }
            TelemetryEventKind::FaultRecovered(device) => {
                Self::FAULT_RECOVERED_BASE + device_code(device)
            }
            TelemetryEventKind::DeviceReady(device) => Self::DEVICE_READY_BASE + device_code(device),
            TelemetryEventKind::ReinitFailed(device) => {
                Self::REINIT_FAILED_BASE + device_code(device)
            }
            TelemetryEventKind::Custom(code) => code,
        }
    }

    /// Decodes a raw discriminant into a telemetry event, falling back to [`Custom`].
    ///
    /// [`Custom`]: TelemetryEventKind::Custom
    #[must_use]
    pub fn from_raw(code: u16) -> Self {
        let banded = |base: u16, make: fn(Device) -> Self| {
            device_from_code(code - base).map_or(TelemetryEventKind::Custom(code), make)
        };

        match code {
            Self::DOOR_OPENED_CODE => TelemetryEventKind::DoorOpened,
            Self::DOOR_CLOSED_CODE => TelemetryEventKind::DoorClosed,
            Self::ALTITUDE_SAMPLED_CODE => TelemetryEventKind::AltitudeSampled,
            value if (Self::FAULT_DETECTED_BASE..Self::FAULT_RECOVERED_BASE).contains(&value) => {
                banded(Self::FAULT_DETECTED_BASE, TelemetryEventKind::FaultDetected)
            }
            value if (Self::FAULT_RECOVERED_BASE..Self::DEVICE_READY_BASE).contains(&value) => {
                banded(Self::FAULT_RECOVERED_BASE, TelemetryEventKind::FaultRecovered)
            }
            value if (Self::DEVICE_READY_BASE..Self::REINIT_FAILED_BASE).contains(&value) => {
                banded(Self::DEVICE_READY_BASE, TelemetryEventKind::DeviceReady)
            }
            value
                if (Self::REINIT_FAILED_BASE..Self::REINIT_FAILED_BASE + Self::DEVICE_SLOTS)
                    .contains(&value) =>
            {
                banded(Self::REINIT_FAILED_BASE, TelemetryEventKind::ReinitFailed)
            }
            other => TelemetryEventKind::Custom(other),
        }
    }

    /// Returns `true` for events that report a problem.
    #[must_use]
    pub const fn is_fault(self) -> bool {
        matches!(
            self,
            TelemetryEventKind::FaultDetected(_) | TelemetryEventKind::ReinitFailed(_)
        )
    }
}

#[allow(clippy::cast_possible_truncation)]
const fn device_code(device: Device) -> u16 {
    device.as_index() as u16
}

fn device_from_code(offset: u16) -> Option<Device> {
    Device::from_index(usize::from(offset))
}

/// Why the controller moved the door.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TransitionReason {
    /// Altitude strictly exceeded the open threshold.
    AboveOpenThreshold,
    /// Altitude dropped strictly below the close threshold.
    BelowCloseThreshold,
    /// Closed command re-asserted after the actuator came back.
    SafetyDefault,
    /// Closed command issued while the controller was being parked.
    Shutdown,
}

impl TransitionReason {
    pub const fn label(self) -> &'static str {
        match self {
            TransitionReason::AboveOpenThreshold => "above-open-threshold",
            TransitionReason::BelowCloseThreshold => "below-close-threshold",
            TransitionReason::SafetyDefault => "safety-default",
            TransitionReason::Shutdown => "shutdown",
        }
    }
}

impl fmt::Display for TransitionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Payloads carried alongside telemetry events.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum TelemetryPayload {
    /// No additional metadata accompanies the event.
    None,
    /// Altitude evaluated without moving the door.
    Altitude(AltitudeTelemetry),
    /// Door movement acknowledged by the driver.
    Transition(TransitionTelemetry),
    /// Classified failure.
    Fault(FaultTelemetry),
    /// Device brought (back) to ready.
    Recovery(RecoveryTelemetry),
    /// Failed re-initialization and the wait before the next attempt.
    Backoff(BackoffTelemetry),
}

impl TelemetryPayload {
    /// Convenience constructor when no payload data is needed.
    #[must_use]
    pub const fn none() -> Self {
        TelemetryPayload::None
    }
}

impl fmt::Display for TelemetryPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TelemetryPayload::None => Ok(()),
            TelemetryPayload::Altitude(sample) => {
                write!(f, "altitude={:.1}m state={}", sample.altitude_m, sample.state)
            }
            TelemetryPayload::Transition(transition) => {
                write!(
                    f,
                    "from={} to={} reason={}",
                    transition.from, transition.to, transition.reason
                )?;
                if let Some(altitude_m) = transition.altitude_m {
                    write!(f, " altitude={altitude_m:.1}m")?;
                }
                Ok(())
            }
            TelemetryPayload::Fault(fault) => {
                write!(f, "kind={} consecutive={}", fault.kind, fault.consecutive)?;
                if let Some(detail) = fault.detail {
                    write!(f, " error={detail}")?;
                }
                Ok(())
            }
            TelemetryPayload::Recovery(recovery) => {
                write!(f, "faults_cleared={}", recovery.faults_cleared)?;
                if let Some(downtime) = recovery.downtime {
                    write!(f, " downtime_ms={}", downtime.as_millis())?;
                }
                Ok(())
            }
            TelemetryPayload::Backoff(backoff) => write!(
                f,
                "attempt={} retry_in_ms={} error={}",
                backoff.attempt,
                backoff.retry_in.as_millis(),
                backoff.error
            ),
        }
    }
}

/// Altitude sample payload.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct AltitudeTelemetry {
    pub altitude_m: f64,
    pub state: ActuatorState,
}

impl AltitudeTelemetry {
    #[must_use]
    pub const fn new(altitude_m: f64, state: ActuatorState) -> Self {
        Self { altitude_m, state }
    }
}

/// Door transition payload.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct TransitionTelemetry {
    pub from: ActuatorState,
    pub to: ActuatorState,
    pub reason: TransitionReason,
    pub altitude_m: Option<f64>,
}

impl TransitionTelemetry {
    #[must_use]
    pub const fn new(
        from: ActuatorState,
        to: ActuatorState,
        reason: TransitionReason,
        altitude_m: Option<f64>,
    ) -> Self {
        Self {
            from,
            to,
            reason,
            altitude_m,
        }
    }
}

/// Fault payload.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct FaultTelemetry {
    pub kind: FaultKind,
    /// Consecutive faults on the device, including this one.
    pub consecutive: u16,
    pub detail: Option<DeviceError>,
}

impl FaultTelemetry {
    #[must_use]
    pub const fn new(kind: FaultKind, consecutive: u16, detail: Option<DeviceError>) -> Self {
        Self {
            kind,
            consecutive,
            detail,
        }
    }
}

/// Recovery payload.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct RecoveryTelemetry {
    pub faults_cleared: u16,
    /// Time since the first fault of the outage, when one was recorded.
    pub downtime: Option<Duration>,
}

impl RecoveryTelemetry {
    #[must_use]
    pub const fn new(faults_cleared: u16, downtime: Option<Duration>) -> Self {
        Self {
            faults_cleared,
            downtime,
        }
    }
}

/// Re-initialization backoff payload.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct BackoffTelemetry {
    pub attempt: u16,
    pub retry_in: Duration,
    pub error: DeviceError,
}

impl BackoffTelemetry {
    #[must_use]
    pub const fn new(attempt: u16, retry_in: Duration, error: DeviceError) -> Self {
        Self {
            attempt,
            retry_in,
            error,
        }
    }
}

/// Total number of telemetry entries retained in memory.
pub const TELEMETRY_RING_CAPACITY: usize = 128;

/// Trait implemented by monotonic instant wrappers used for telemetry tracking.
pub trait TelemetryInstant: Copy {
    /// Returns the saturating duration from `earlier` to `self`.
    fn saturating_duration_since(&self, earlier: Self) -> Duration;
}

impl TelemetryInstant for Duration {
    fn saturating_duration_since(&self, earlier: Self) -> Duration {
        self.saturating_sub(earlier)
    }
}

/// Destination for events emitted by the controller.
pub trait EventSink<TInstant> {
    /// Records an event and returns its identifier.
    fn record(
        &mut self,
        event: TelemetryEventKind,
        payload: TelemetryPayload,
        timestamp: TInstant,
    ) -> EventId;
}

impl<TInstant, T> EventSink<TInstant> for &mut T
where
    T: EventSink<TInstant> + ?Sized,
{
    fn record(
        &mut self,
        event: TelemetryEventKind,
        payload: TelemetryPayload,
        timestamp: TInstant,
    ) -> EventId {
        (**self).record(event, payload, timestamp)
    }
}

/// Telemetry record stored in the ring buffer.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct TelemetryRecord<TInstant>
where
    TInstant: Copy,
{
    pub id: EventId,
    pub timestamp: TInstant,
    pub event: TelemetryEventKind,
    pub details: TelemetryPayload,
}

/// Telemetry ring buffer type alias.
pub type TelemetryRing<TInstant, const CAPACITY: usize = TELEMETRY_RING_CAPACITY> =
    HistoryBuf<TelemetryRecord<TInstant>, CAPACITY>;

/// Records telemetry events into a fixed-size ring buffer.
pub struct TelemetryRecorder<TInstant, const CAPACITY: usize = TELEMETRY_RING_CAPACITY>
where
    TInstant: Copy,
{
    ring: TelemetryRing<TInstant, CAPACITY>,
    next_event_id: EventId,
}

impl<TInstant, const CAPACITY: usize> TelemetryRecorder<TInstant, CAPACITY>
where
    TInstant: TelemetryInstant,
{
    /// Creates a new telemetry recorder with an empty history.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            ring: HistoryBuf::new(),
            next_event_id: 0,
        }
    }

    /// Returns an iterator over the recorded telemetry in chronological order.
    pub fn oldest_first(&self) -> OldestOrdered<'_, TelemetryRecord<TInstant>> {
        self.ring.oldest_ordered()
    }

    /// Returns the most recent telemetry record, if available.
    pub fn latest(&self) -> Option<&TelemetryRecord<TInstant>> {
        self.ring.recent()
    }

    /// Returns the number of records currently stored.
    pub fn len(&self) -> usize {
        self.ring.len()
    }

    /// Returns `true` when no telemetry records are stored.
    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    /// Counts retained records matching `event`.
    pub fn count(&self, event: TelemetryEventKind) -> usize {
        self.ring.iter().filter(|record| record.event == event).count()
    }

    /// Identifier that the next recorded event will receive.
    pub const fn next_event_id(&self) -> EventId {
        self.next_event_id
    }
}

impl<TInstant, const CAPACITY: usize> Default for TelemetryRecorder<TInstant, CAPACITY>
where
    TInstant: TelemetryInstant,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<TInstant, const CAPACITY: usize> EventSink<TInstant> for TelemetryRecorder<TInstant, CAPACITY>
where
    TInstant: TelemetryInstant,
{
    fn record(
        &mut self,
        event: TelemetryEventKind,
        payload: TelemetryPayload,
        timestamp: TInstant,
    ) -> EventId {
        let id = self.next_event_id;
        self.next_event_id = self.next_event_id.wrapping_add(1);

        self.ring.write(TelemetryRecord {
            id,
            timestamp,
            event,
            details: payload,
        });

        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Ord, PartialOrd)]
    struct MicrosInstant(u64);

    impl TelemetryInstant for MicrosInstant {
        fn saturating_duration_since(&self, earlier: Self) -> Duration {
            Duration::from_micros(self.0.saturating_sub(earlier.0))
        }
    }

    #[test]
    fn event_codes_round_trip() {
        let fixtures = [
            (TelemetryEventKind::DoorOpened, 0x01),
            (TelemetryEventKind::DoorClosed, 0x02),
            (TelemetryEventKind::AltitudeSampled, 0x03),
            (TelemetryEventKind::FaultDetected(Device::Altimeter), 0x10),
            (TelemetryEventKind::FaultDetected(Device::Actuator), 0x11),
            (TelemetryEventKind::FaultRecovered(Device::Actuator), 0x15),
            (TelemetryEventKind::DeviceReady(Device::Altimeter), 0x18),
            (TelemetryEventKind::ReinitFailed(Device::Actuator), 0x1D),
        ];

        for (event, code) in fixtures {
            assert_eq!(event.to_raw(), code, "{event}");
            assert_eq!(TelemetryEventKind::from_raw(code), event);
        }
    }

    #[test]
    fn unused_device_slots_decode_as_custom() {
        assert_eq!(
            TelemetryEventKind::from_raw(0x12),
            TelemetryEventKind::Custom(0x12)
        );
        assert_eq!(
            TelemetryEventKind::from_raw(0x1F),
            TelemetryEventKind::Custom(0x1F)
        );
        assert_eq!(
            TelemetryEventKind::from_raw(0x0400),
            TelemetryEventKind::Custom(0x0400)
        );
    }

    #[test]
    fn recorder_assigns_sequential_ids_and_keeps_order() {
        let mut recorder: TelemetryRecorder<MicrosInstant, 4> = TelemetryRecorder::new();
        assert!(recorder.is_empty());

        for step in 0..6u64 {
            recorder.record(
                TelemetryEventKind::AltitudeSampled,
                TelemetryPayload::none(),
                MicrosInstant(step),
            );
        }

        assert_eq!(recorder.len(), 4);
        assert_eq!(recorder.next_event_id(), 6);
        let ids: heapless::Vec<EventId, 4> = recorder.oldest_first().map(|r| r.id).collect();
        assert_eq!(ids.as_slice(), &[2, 3, 4, 5]);
        assert_eq!(recorder.latest().map(|r| r.timestamp), Some(MicrosInstant(5)));
    }

    #[test]
    fn duration_instants_saturate() {
        let earlier = Duration::from_secs(10);
        assert_eq!(
            Duration::from_secs(4).saturating_duration_since(earlier),
            Duration::ZERO
        );
        assert_eq!(
            Duration::from_secs(25).saturating_duration_since(earlier),
            Duration::from_secs(15)
        );
    }

    #[test]
    fn payload_display_is_compact() {
        let mut text: heapless::String<96> = heapless::String::new();
        let payload = TelemetryPayload::Transition(TransitionTelemetry::new(
            ActuatorState::Closed,
            ActuatorState::Open,
            TransitionReason::AboveOpenThreshold,
            Some(20_512.3),
        ));
        core::fmt::write(&mut text, format_args!("{payload}")).expect("fits");
        assert_eq!(
            text.as_str(),
            "from=closed to=open reason=above-open-threshold altitude=20512.3m"
        );
    }
}

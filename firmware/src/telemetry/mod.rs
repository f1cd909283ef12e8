//! Telemetry plumbing for the flight build.
//!
//! Controller events land in the shared fixed-capacity ring from
//! `collector-core` and are mirrored to defmt (or stdout on the host) as they
//! arrive so bench sessions can follow the door without a debugger attached.

#![cfg_attr(not(target_os = "none"), allow(dead_code))]

use core::time::Duration;

use collector_core::telemetry::{
    EventId, EventSink, TELEMETRY_RING_CAPACITY, TelemetryEventKind, TelemetryInstant,
    TelemetryPayload, TelemetryRecorder,
};
use embassy_time::Instant;

/// Embassy monotonic timestamp attached to telemetry records.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub struct FirmwareInstant(pub Instant);

impl FirmwareInstant {
    #[cfg(target_os = "none")]
    pub fn now() -> Self {
        Self(Instant::now())
    }

    pub fn as_micros(self) -> u64 {
        self.0.as_micros()
    }
}

impl TelemetryInstant for FirmwareInstant {
    fn saturating_duration_since(&self, earlier: Self) -> Duration {
        Duration::from_micros(self.0.saturating_duration_since(earlier.0).as_micros())
    }
}

/// Converts a controller pause into an Embassy duration, saturating on overflow.
pub fn to_embassy(duration: Duration) -> embassy_time::Duration {
    embassy_time::Duration::try_from(duration).unwrap_or(embassy_time::Duration::MAX)
}

/// Ring-backed sink that logs every record on its way in.
pub struct LoggingRecorder {
    ring: TelemetryRecorder<FirmwareInstant, TELEMETRY_RING_CAPACITY>,
}

impl LoggingRecorder {
    pub const fn new() -> Self {
        Self {
            ring: TelemetryRecorder::new(),
        }
    }

    #[allow(dead_code)]
    pub fn history(&self) -> &TelemetryRecorder<FirmwareInstant, TELEMETRY_RING_CAPACITY> {
        &self.ring
    }
}

impl Default for LoggingRecorder {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSink<FirmwareInstant> for LoggingRecorder {
    fn record(
        &mut self,
        event: TelemetryEventKind,
        payload: TelemetryPayload,
        timestamp: FirmwareInstant,
    ) -> EventId {
        let id = self.ring.record(event, payload, timestamp);
        emit_log(id, event, payload, timestamp.as_micros());
        id
    }
}

#[cfg(target_os = "none")]
fn emit_log(id: EventId, event: TelemetryEventKind, payload: TelemetryPayload, timestamp_us: u64) {
    if event.is_fault() {
        defmt::warn!(
            "telemetry:{} {} {} t={}us",
            id,
            defmt::Display2Format(&event),
            defmt::Display2Format(&payload),
            timestamp_us
        );
    } else {
        defmt::info!(
            "telemetry:{} {} {} t={}us",
            id,
            defmt::Display2Format(&event),
            defmt::Display2Format(&payload),
            timestamp_us
        );
    }
}

#[cfg(not(target_os = "none"))]
fn emit_log(id: EventId, event: TelemetryEventKind, payload: TelemetryPayload, timestamp_us: u64) {
    println!("telemetry:{id} {event} {payload} t={timestamp_us}us");
}

#[cfg(test)]
mod tests {
    use super::*;
    use collector_core::collector::ActuatorState;
    use collector_core::telemetry::{TransitionReason, TransitionTelemetry};

    fn micros(value: u64) -> FirmwareInstant {
        FirmwareInstant(Instant::from_micros(value))
    }

    #[test]
    fn keeps_records_in_the_shared_ring() {
        let mut recorder = LoggingRecorder::new();

        let opened = recorder.record(
            TelemetryEventKind::DoorOpened,
            TelemetryPayload::Transition(TransitionTelemetry::new(
                ActuatorState::Closed,
                ActuatorState::Open,
                TransitionReason::AboveOpenThreshold,
                Some(20_100.0),
            )),
            micros(1_000),
        );
        let closed = recorder.record(
            TelemetryEventKind::DoorClosed,
            TelemetryPayload::None,
            micros(9_000),
        );

        assert_eq!((opened, closed), (0, 1));
        assert_eq!(recorder.history().len(), 2);
        let latest = recorder.history().latest().copied().expect("latest record");
        assert_eq!(latest.event, TelemetryEventKind::DoorClosed);
        assert_eq!(
            latest.timestamp.saturating_duration_since(micros(1_000)),
            Duration::from_micros(8_000)
        );
    }

    #[test]
    fn pauses_convert_to_embassy_ticks() {
        assert_eq!(
            to_embassy(Duration::from_secs(25)),
            embassy_time::Duration::from_secs(25)
        );
        assert_eq!(
            to_embassy(Duration::from_secs(u64::MAX)),
            embassy_time::Duration::MAX
        );
    }

    #[test]
    fn elapsed_time_saturates_at_zero() {
        assert_eq!(
            micros(10).saturating_duration_since(micros(50)),
            Duration::ZERO
        );
    }
}

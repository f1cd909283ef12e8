use std::fs::{self, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::time::Duration;

use collector_core::collector::{ActuatorState, Device, ThresholdActuatorController};
use collector_core::config::ControllerConfig;
use collector_core::telemetry::{
    EventId, EventSink, TelemetryEventKind, TelemetryPayload, TelemetryRecorder,
};

use crate::devices::{SimAltimeter, SimClock, SimScheduler, SimServo};
use crate::flight::FlightProfile;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct TranscriptProfile(pub FlightProfile);

impl TranscriptProfile {
    pub fn log_path(self) -> String {
        format!("evidence/emulator-{}.log", self.0.tag())
    }

    pub fn header(self) -> String {
        format!("Meteorite collector emulator {} flight transcript", self.0.tag())
    }

    pub fn from_tag(tag: &str) -> Result<Self, String> {
        FlightProfile::from_tag(tag).map(Self)
    }
}

/// Totals printed once the balloon is on the ground.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FlightSummary {
    pub cycles: u64,
    pub openings: usize,
    pub closings: usize,
    pub faults: usize,
    pub recoveries: usize,
    pub reinit_failures: usize,
    pub time_open: Duration,
    pub flight_time: Duration,
    pub servo_moves: u32,
    pub final_state: Option<ActuatorState>,
}

impl FlightSummary {
    pub fn lines(&self) -> Vec<String> {
        vec![
            format!(
                "flight time {} over {} cycles",
                format_clock(self.flight_time),
                self.cycles
            ),
            format!(
                "door opened {}x, closed {}x, open for {}",
                self.openings,
                self.closings,
                format_clock(self.time_open)
            ),
            format!(
                "faults {}, recoveries {}, failed re-inits {}",
                self.faults, self.recoveries, self.reinit_failures
            ),
            format!(
                "servo moves {}, final state {}",
                self.servo_moves,
                self.final_state
                    .map_or_else(|| "unknown".to_string(), |state| state.to_string())
            ),
        ]
    }
}

pub struct Session {
    profile: TranscriptProfile,
    config: ControllerConfig,
    transcript: TranscriptLogger,
}

impl Session {
    pub fn new(profile: TranscriptProfile, config: ControllerConfig) -> io::Result<Self> {
        Self::with_log_path(profile, config, profile.log_path())
    }

    /// Like [`Session::new`] but writes the transcript to `log_path`.
    pub fn with_log_path(
        profile: TranscriptProfile,
        config: ControllerConfig,
        log_path: impl AsRef<Path>,
    ) -> io::Result<Self> {
        let mut transcript = TranscriptLogger::new(profile, log_path.as_ref())?;
        let thresholds = config.thresholds();
        let note = format!(
            "config open>{:.0}m close<{:.0}m poll={}s backoff={}s+{}s",
            thresholds.open_m(),
            thresholds.close_m(),
            config.poll_interval().as_secs(),
            config.short_retry_delay().as_secs(),
            config.long_retry_delay().as_secs(),
        );
        transcript.append_line(Duration::ZERO, TranscriptRole::Simulator, &note)?;

        Ok(Self {
            profile,
            config,
            transcript,
        })
    }

    /// Flies the profile to touchdown and returns the totals.
    pub fn fly(mut self) -> io::Result<FlightSummary> {
        let flight = self.profile.0;
        let clock = SimClock::default();
        let mut scheduler = SimScheduler::new(clock.clone(), flight.duration());
        let landed = scheduler.landed();

        let altimeter = SimAltimeter::new(clock.clone(), flight);
        let servo = SimServo::new(clock.clone(), flight);
        let mut controller = ThresholdActuatorController::new(self.config, altimeter, servo);

        let mut sink = TranscriptSink::new(&mut self.transcript);
        let cycles = controller.run_forever(&mut scheduler, landed.as_ref(), &mut sink);
        let landed_at = clock.now();
        if let Err(error) = controller.close_for_shutdown(landed_at, &mut sink) {
            sink.note(landed_at, &format!("shutdown close failed: {error}"));
        }
        sink.finish()?;

        let recorder = sink.recorder;
        let summary = FlightSummary {
            cycles,
            openings: recorder.count(TelemetryEventKind::DoorOpened),
            closings: recorder.count(TelemetryEventKind::DoorClosed),
            faults: sink.fault_total,
            recoveries: Device::ALL
                .into_iter()
                .map(|device| recorder.count(TelemetryEventKind::FaultRecovered(device)))
                .sum(),
            reinit_failures: Device::ALL
                .into_iter()
                .map(|device| recorder.count(TelemetryEventKind::ReinitFailed(device)))
                .sum(),
            time_open: sink.time_open,
            flight_time: landed_at,
            servo_moves: controller.actuator().moves,
            final_state: Some(controller.state()),
        };
        for line in summary.lines() {
            self.transcript
                .append_line(landed_at, TranscriptRole::Simulator, &line)?;
        }
        Ok(summary)
    }
}

/// Long enough to retain every record of the longest profile.
const SUMMARY_RING: usize = 4_096;

/// Forwards controller telemetry to the transcript while keeping counters.
struct TranscriptSink<'a> {
    transcript: &'a mut TranscriptLogger,
    recorder: TelemetryRecorder<Duration, SUMMARY_RING>,
    open_since: Option<Duration>,
    time_open: Duration,
    fault_total: usize,
    error: Option<io::Error>,
}

impl<'a> TranscriptSink<'a> {
    fn new(transcript: &'a mut TranscriptLogger) -> Self {
        Self {
            transcript,
            recorder: TelemetryRecorder::new(),
            open_since: None,
            time_open: Duration::ZERO,
            fault_total: 0,
            error: None,
        }
    }

    fn note(&mut self, at: Duration, line: &str) {
        self.write(at, TranscriptRole::Simulator, line);
    }

    fn write(&mut self, at: Duration, role: TranscriptRole, line: &str) {
        if self.error.is_some() {
            return;
        }
        if let Err(error) = self.transcript.append_line(at, role, line) {
            self.error = Some(error);
        }
    }

    /// Surfaces the first transcript write failure, if any.
    fn finish(&mut self) -> io::Result<()> {
        self.error.take().map_or(Ok(()), Err)
    }
}

impl EventSink<Duration> for TranscriptSink<'_> {
    fn record(
        &mut self,
        event: TelemetryEventKind,
        payload: TelemetryPayload,
        timestamp: Duration,
    ) -> EventId {
        match event {
            TelemetryEventKind::DoorOpened => {
                self.open_since.get_or_insert(timestamp);
            }
            TelemetryEventKind::DoorClosed => {
                if let Some(since) = self.open_since.take() {
                    self.time_open += timestamp.saturating_sub(since);
                }
            }
            TelemetryEventKind::FaultDetected(_) => self.fault_total += 1,
            _ => {}
        }

        let line = match payload {
            TelemetryPayload::None => event.to_string(),
            details => format!("{event} {details}"),
        };
        let role = if event.is_fault() {
            TranscriptRole::Fault
        } else {
            TranscriptRole::Controller
        };
        self.write(timestamp, role, &line);

        self.recorder.record(event, payload, timestamp)
    }
}

struct TranscriptLogger {
    writer: BufWriter<fs::File>,
}

impl TranscriptLogger {
    fn new(profile: TranscriptProfile, path: &Path) -> io::Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;

        let mut logger = Self {
            writer: BufWriter::new(file),
        };

        logger.write_header(profile)?;
        Ok(logger)
    }

    fn write_header(&mut self, profile: TranscriptProfile) -> io::Result<()> {
        writeln!(self.writer, "# {}", profile.header())?;
        writeln!(
            self.writer,
            "# Timestamps are simulated mission time since launch"
        )?;
        writeln!(self.writer)?;
        self.writer.flush()
    }

    fn append_line(
        &mut self,
        elapsed: Duration,
        role: TranscriptRole,
        line: &str,
    ) -> io::Result<()> {
        let entry = format!("[T+{}] {} {}", format_clock(elapsed), role.prefix(), line);
        println!("{entry}");
        writeln!(self.writer, "{entry}")?;
        self.writer.flush()
    }
}

#[derive(Clone, Copy)]
enum TranscriptRole {
    Controller,
    Fault,
    Simulator,
}

impl TranscriptRole {
    fn prefix(self) -> &'static str {
        match self {
            TranscriptRole::Controller => "CTRL>",
            TranscriptRole::Fault => "FLT >",
            TranscriptRole::Simulator => "SIM <",
        }
    }
}

fn format_clock(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    format!("{:02}:{:02}:{:02}", secs / 3_600, (secs / 60) % 60, secs % 60)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clock_format_is_hours_minutes_seconds() {
        assert_eq!(format_clock(Duration::from_secs(0)), "00:00:00");
        assert_eq!(format_clock(Duration::from_secs(4_000)), "01:06:40");
    }

    fn fly_to_scratch(flight: FlightProfile) -> FlightSummary {
        let path = std::env::temp_dir().join(format!(
            "collector-emulator-{}-{}.log",
            flight.tag(),
            std::process::id()
        ));
        let session =
            Session::with_log_path(TranscriptProfile(flight), ControllerConfig::default(), &path)
                .expect("transcript opens");
        let summary = session.fly().expect("flight completes");

        let transcript = fs::read_to_string(&path).expect("transcript readable");
        assert!(transcript.starts_with("# Meteorite collector emulator"));
        let _ = fs::remove_file(&path);
        summary
    }

    #[test]
    fn nominal_flight_opens_once_and_lands_closed() {
        let summary = fly_to_scratch(FlightProfile::Nominal);

        assert_eq!(summary.final_state, Some(ActuatorState::Closed));
        assert_eq!(summary.openings, 1);
        assert_eq!(summary.faults, 0);
        assert_eq!(summary.recoveries, 0);
        assert!(summary.time_open > Duration::ZERO);
        assert!(summary.flight_time >= FlightProfile::Nominal.duration());
    }

    #[test]
    fn dropout_flight_recovers_every_sensor_fault() {
        let summary = fly_to_scratch(FlightProfile::Dropout);

        assert_eq!(summary.final_state, Some(ActuatorState::Closed));
        // Three altimeter outages plus the actuator reset by the unclassified error.
        assert_eq!(summary.recoveries, 4);
        assert_eq!(summary.reinit_failures, 2);
        assert!(summary.openings >= 1);
        assert!(summary.time_open > Duration::ZERO);
    }

    #[test]
    fn servo_fault_flight_recovers_and_lands_closed() {
        let summary = fly_to_scratch(FlightProfile::ServoFault);

        assert_eq!(summary.final_state, Some(ActuatorState::Closed));
        assert_eq!(summary.recoveries, 3);
        // One failed init on ascent, one rejected safety close on descent.
        assert_eq!(summary.reinit_failures, 2);
        assert_eq!(summary.openings, 1);
        assert!(summary.time_open > Duration::ZERO);
    }

    #[test]
    fn profile_paths_are_per_flight() {
        let profile = TranscriptProfile::from_tag("servo-fault").expect("known profile");
        assert_eq!(profile.log_path(), "evidence/emulator-servo-fault.log");
    }
}

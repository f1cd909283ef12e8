use std::f64::consts::TAU;
use std::time::Duration;

pub const ASCENT_RATE_MPS: f64 = 5.0;
pub const DESCENT_RATE_MPS: f64 = 9.0;
pub const BURST_ALTITUDE_M: f64 = 30_000.0;

const FLOAT_ALTITUDE_M: f64 = 19_000.0;
const FLOAT_SWING_M: f64 = 1_500.0;
const FLOAT_PERIOD: Duration = Duration::from_secs(1_800);
const FLOAT_HOLD: Duration = Duration::from_secs(4 * 3_600);

/// Balloon trajectories the emulator can fly.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FlightProfile {
    /// Clean ascent to burst and descent.
    Nominal,
    /// Nominal trajectory with altimeter faults of every kind.
    Dropout,
    /// Nominal trajectory with a misbehaving servo.
    ServoFault,
    /// Ascent to a float altitude that drifts across both thresholds.
    Float,
}

impl FlightProfile {
    pub const ALL: [FlightProfile; 4] = [
        FlightProfile::Nominal,
        FlightProfile::Dropout,
        FlightProfile::ServoFault,
        FlightProfile::Float,
    ];

    pub fn tag(self) -> &'static str {
        match self {
            FlightProfile::Nominal => "nominal",
            FlightProfile::Dropout => "dropout",
            FlightProfile::ServoFault => "servo-fault",
            FlightProfile::Float => "float",
        }
    }

    pub fn from_tag(tag: &str) -> Result<Self, String> {
        Self::ALL
            .into_iter()
            .find(|profile| profile.tag().eq_ignore_ascii_case(tag))
            .ok_or_else(|| format!("Unknown flight profile `{tag}`"))
    }

    /// Altitude at `elapsed` since launch, clamped to the ground.
    pub fn altitude_at(self, elapsed: Duration) -> f64 {
        let t = elapsed.as_secs_f64();
        match self {
            FlightProfile::Nominal | FlightProfile::Dropout | FlightProfile::ServoFault => {
                burst_trajectory(t)
            }
            FlightProfile::Float => float_trajectory(t),
        }
    }

    /// Time from launch to landing.
    pub fn duration(self) -> Duration {
        match self {
            FlightProfile::Nominal | FlightProfile::Dropout | FlightProfile::ServoFault => {
                Duration::from_secs_f64(
                    BURST_ALTITUDE_M / ASCENT_RATE_MPS + BURST_ALTITUDE_M / DESCENT_RATE_MPS,
                )
            }
            FlightProfile::Float => {
                Duration::from_secs_f64(float_ascent_secs() + float_descent_secs())
                    + FLOAT_HOLD
            }
        }
    }

    /// Faults injected during the flight, ordered by time.
    pub fn injections(self) -> Vec<Injection> {
        let at = |secs: u64, fault: Fault| Injection {
            at: Duration::from_secs(secs),
            fault,
        };

        match self {
            FlightProfile::Nominal | FlightProfile::Float => Vec::new(),
            FlightProfile::Dropout => vec![
                at(1_800, Fault::SensorTransient),
                at(3_000, Fault::SensorIndeterminate),
                at(4_200, Fault::SensorUnclassified),
                at(4_200, Fault::AltimeterInitFailures(2)),
                at(7_000, Fault::SensorTransient),
                at(8_400, Fault::SensorIndeterminate),
            ],
            FlightProfile::ServoFault => vec![
                at(3_990, Fault::ServoCommandFailures(1)),
                at(3_990, Fault::ServoInitFailures(1)),
                at(7_300, Fault::ServoCommandFailures(2)),
            ],
        }
    }
}

/// A fault that becomes armed once simulated time reaches `at`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Injection {
    pub at: Duration,
    pub fault: Fault,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Fault {
    /// Next altimeter read fails with a transient bus error.
    SensorTransient,
    /// Next altimeter read returns no data.
    SensorIndeterminate,
    /// Next altimeter read fails with an unclassified error.
    SensorUnclassified,
    /// Following altimeter initializations fail.
    AltimeterInitFailures(u8),
    /// Following servo commands are rejected.
    ServoCommandFailures(u8),
    /// Following servo initializations fail.
    ServoInitFailures(u8),
}

impl Fault {
    pub fn targets_altimeter(self) -> bool {
        matches!(
            self,
            Fault::SensorTransient
                | Fault::SensorIndeterminate
                | Fault::SensorUnclassified
                | Fault::AltimeterInitFailures(_)
        )
    }
}

fn burst_trajectory(t: f64) -> f64 {
    let ascent_secs = BURST_ALTITUDE_M / ASCENT_RATE_MPS;
    if t <= ascent_secs {
        t * ASCENT_RATE_MPS
    } else {
        (BURST_ALTITUDE_M - (t - ascent_secs) * DESCENT_RATE_MPS).max(0.0)
    }
}

fn float_ascent_secs() -> f64 {
    FLOAT_ALTITUDE_M / ASCENT_RATE_MPS
}

fn float_descent_secs() -> f64 {
    FLOAT_ALTITUDE_M / DESCENT_RATE_MPS
}

fn float_trajectory(t: f64) -> f64 {
    let ascent = float_ascent_secs();
    let hold = FLOAT_HOLD.as_secs_f64();
    if t <= ascent {
        t * ASCENT_RATE_MPS
    } else if t <= ascent + hold {
        let phase = (t - ascent) / FLOAT_PERIOD.as_secs_f64();
        FLOAT_ALTITUDE_M + FLOAT_SWING_M * (phase * TAU).sin()
    } else {
        (FLOAT_ALTITUDE_M - (t - ascent - hold) * DESCENT_RATE_MPS).max(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nominal_flight_bursts_and_lands() {
        let profile = FlightProfile::Nominal;
        assert_eq!(profile.altitude_at(Duration::ZERO), 0.0);
        assert_eq!(profile.altitude_at(Duration::from_secs(6_000)), BURST_ALTITUDE_M);
        assert!(profile.altitude_at(profile.duration()) < 1.0);
    }

    #[test]
    fn float_swings_across_both_thresholds() {
        let profile = FlightProfile::Float;
        let start = Duration::from_secs_f64(float_ascent_secs());
        let quarter = FLOAT_PERIOD / 4;
        let peak = profile.altitude_at(start + quarter);
        let trough = profile.altitude_at(start + quarter * 3);
        assert!(peak > 20_000.0, "peak {peak}");
        assert!(trough < 18_000.0, "trough {trough}");
    }

    #[test]
    fn tags_round_trip() {
        for profile in FlightProfile::ALL {
            assert_eq!(FlightProfile::from_tag(profile.tag()), Ok(profile));
        }
        assert!(FlightProfile::from_tag("orbit").is_err());
    }
}

//! Hobby servo pulse calibration for the collector door.
//!
//! A standard servo expects a pulse every 20 ms whose width maps linearly onto
//! the horn angle. With the defaults below 0° is a 2.5 % duty cycle, 90° is
//! 7.5 % and 180° is 12.5 %.

use core::time::Duration;

use crate::collector::ActuatorState;

/// Largest angle the horn accepts.
pub const MAX_ANGLE_DEG: u16 = 180;

/// Pulse timing and door angles for one servo.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ServoCalibration {
    pub open_angle_deg: u16,
    pub closed_angle_deg: u16,
    pub period: Duration,
    pub min_pulse: Duration,
    pub max_pulse: Duration,
    /// Time the horn needs to reach position before the pulse train is dropped.
    pub settle: Duration,
}

impl Default for ServoCalibration {
    fn default() -> Self {
        Self {
            open_angle_deg: 90,
            closed_angle_deg: 0,
            period: Duration::from_millis(20),
            min_pulse: Duration::from_micros(500),
            max_pulse: Duration::from_micros(2_500),
            settle: Duration::from_secs(1),
        }
    }
}

impl ServoCalibration {
    /// Horn angle for a door state.
    #[must_use]
    pub const fn angle_for(&self, state: ActuatorState) -> u16 {
        match state {
            ActuatorState::Open => self.open_angle_deg,
            ActuatorState::Closed => self.closed_angle_deg,
        }
    }

    /// Pulse width for `angle_deg`, clamped to the servo's travel.
    #[must_use]
    pub fn pulse_width(&self, angle_deg: u16) -> Duration {
        let angle = u32::from(angle_deg.min(MAX_ANGLE_DEG));
        let span = self.max_pulse.saturating_sub(self.min_pulse);
        self.min_pulse + span * angle / u32::from(MAX_ANGLE_DEG)
    }

    /// Duty cycle as `(pulse_us, period_us)`, ready for a PWM fraction setter.
    #[must_use]
    pub fn duty_fraction(&self, angle_deg: u16) -> (u32, u32) {
        let pulse = saturating_micros(self.pulse_width(angle_deg));
        let period = saturating_micros(self.period).max(1);
        (pulse.min(period), period)
    }

    /// Duty cycle in percent.
    #[allow(clippy::cast_precision_loss)]
    #[must_use]
    pub fn duty_percent(&self, angle_deg: u16) -> f32 {
        let (pulse, period) = self.duty_fraction(angle_deg);
        pulse as f32 * 100.0 / period as f32
    }
}

fn saturating_micros(duration: Duration) -> u32 {
    u32::try_from(duration.as_micros()).unwrap_or(u32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn door_angles_follow_state() {
        let servo = ServoCalibration::default();
        assert_eq!(servo.angle_for(ActuatorState::Open), 90);
        assert_eq!(servo.angle_for(ActuatorState::Closed), 0);
    }

    #[test]
    fn duty_spans_two_and_a_half_to_twelve_and_a_half_percent() {
        let servo = ServoCalibration::default();
        assert_eq!(servo.duty_fraction(0), (500, 20_000));
        assert_eq!(servo.duty_fraction(90), (1_500, 20_000));
        assert_eq!(servo.duty_fraction(180), (2_500, 20_000));
        assert!((servo.duty_percent(0) - 2.5).abs() < 1e-4);
        assert!((servo.duty_percent(90) - 7.5).abs() < 1e-4);
        assert!((servo.duty_percent(180) - 12.5).abs() < 1e-4);
    }

    #[test]
    fn angles_beyond_travel_are_clamped() {
        let servo = ServoCalibration::default();
        assert_eq!(servo.pulse_width(270), servo.pulse_width(180));
    }

    #[test]
    fn pulse_never_exceeds_period() {
        let servo = ServoCalibration {
            period: Duration::from_micros(1_000),
            ..ServoCalibration::default()
        };
        assert_eq!(servo.duty_fraction(180), (1_000, 1_000));
    }
}

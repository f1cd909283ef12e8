//! Board adapters for the collector payload.
//!
//! The BME280 hangs off I2C1 (PB6 SCL, PB7 SDA) and the door servo is driven
//! from TIM3 CH1 on PA6 at the standard 50 Hz frame rate.

use collector_core::collector::{ActuatorDriver, ActuatorState, DeviceError};
use collector_core::sensors::{BusFault, RegisterBus};
use collector_core::servo::ServoCalibration;
use embassy_stm32::i2c::{self, I2c};
use embassy_stm32::mode::Blocking;
use embassy_stm32::peripherals::TIM3;
use embassy_stm32::timer::simple_pwm::SimplePwm;

use crate::telemetry::to_embassy;

/// Register access over a blocking I2C peripheral.
pub struct I2cRegisterBus {
    i2c: I2c<'static, Blocking>,
    address: u8,
}

impl I2cRegisterBus {
    pub fn new(i2c: I2c<'static, Blocking>, address: u8) -> Self {
        Self { i2c, address }
    }
}

impl RegisterBus for I2cRegisterBus {
    fn read_registers(&mut self, register: u8, buffer: &mut [u8]) -> Result<(), BusFault> {
        self.i2c
            .blocking_write_read(self.address, &[register], buffer)
            .map_err(classify_i2c_error)
    }

    fn write_register(&mut self, register: u8, value: u8) -> Result<(), BusFault> {
        self.i2c
            .blocking_write(self.address, &[register, value])
            .map_err(classify_i2c_error)
    }

    fn pause(&mut self, duration: core::time::Duration) {
        embassy_time::block_for(to_embassy(duration));
    }
}

/// NACKs, lost arbitration and timeouts clear up on their own; anything else
/// needs the sensor re-initialized.
fn classify_i2c_error(error: i2c::Error) -> BusFault {
    match error {
        i2c::Error::Nack | i2c::Error::Arbitration | i2c::Error::Timeout | i2c::Error::Bus => {
            BusFault::Transient
        }
        _ => BusFault::Other,
    }
}

/// Hobby servo on a PWM channel. The pulse train is only driven while the
/// horn is moving so the servo does not buzz against the door stop.
pub struct ServoActuator {
    pwm: SimplePwm<'static, TIM3>,
    calibration: ServoCalibration,
}

impl ServoActuator {
    pub fn new(pwm: SimplePwm<'static, TIM3>, calibration: ServoCalibration) -> Self {
        Self { pwm, calibration }
    }
}

impl ActuatorDriver for ServoActuator {
    fn initialize(&mut self) -> Result<(), DeviceError> {
        let mut channel = self.pwm.ch1();
        channel.set_duty_cycle_fully_off();
        channel.enable();
        Ok(())
    }

    fn command(&mut self, target: ActuatorState) -> Result<(), DeviceError> {
        let angle = self.calibration.angle_for(target);
        let (pulse_us, period_us) = self.calibration.duty_fraction(angle);
        let pulse = u16::try_from(pulse_us).map_err(|_| DeviceError::Unsupported)?;
        let period = u16::try_from(period_us).map_err(|_| DeviceError::Unsupported)?;

        let mut channel = self.pwm.ch1();
        channel.set_duty_cycle_fraction(pulse, period);
        embassy_time::block_for(to_embassy(self.calibration.settle));
        channel.set_duty_cycle_fully_off();

        defmt::debug!("servo: {} at {}deg ({}us)", target.label(), angle, pulse_us);
        Ok(())
    }
}

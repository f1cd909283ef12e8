//! Bosch BME280 pressure sensor over a register bus.
//!
//! Only the temperature and pressure channels are used; the temperature is
//! needed to compensate the pressure reading. Compensation follows the integer
//! routines published in the datasheet, so results are bit-exact with the
//! vendor reference.

use core::{fmt, time::Duration};

use crate::collector::{AltitudeSource, DeviceError, SensorError};

use super::altimeter::{STANDARD_SEA_LEVEL_HPA, pressure_altitude_m};

/// Default 7-bit address with SDO tied to VDDIO.
pub const DEFAULT_ADDRESS: u8 = 0x77;
/// Alternate address with SDO tied to GND.
pub const SECONDARY_ADDRESS: u8 = 0x76;

pub const REG_CHIP_ID: u8 = 0xD0;
pub const REG_RESET: u8 = 0xE0;
pub const REG_STATUS: u8 = 0xF3;
pub const REG_CTRL_MEAS: u8 = 0xF4;
pub const REG_CONFIG: u8 = 0xF5;
pub const REG_DATA: u8 = 0xF7;
pub const REG_CALIBRATION: u8 = 0x88;

pub const CHIP_ID_BME280: u8 = 0x60;
pub const CHIP_ID_BMP280: u8 = 0x58;
pub const SOFT_RESET_COMMAND: u8 = 0xB6;

/// Temperature x1, pressure x1, normal mode.
pub const CTRL_MEAS_NORMAL: u8 = 0x27;
/// 1000 ms standby, filter off.
pub const CONFIG_STANDBY_1000MS: u8 = 0xA0;

/// Length of the temperature/pressure trim block at [`REG_CALIBRATION`].
pub const CALIBRATION_LEN: usize = 24;
/// Length of the pressure + temperature burst at [`REG_DATA`].
pub const SAMPLE_LEN: usize = 6;
/// ADC value reported for a channel that was not sampled.
pub const SKIPPED_SAMPLE: i32 = 0x80000;

const STATUS_IM_UPDATE: u8 = 0x01;
const NVM_COPY_POLLS: u8 = 16;
/// The chip does not answer on the bus for about 2 ms after a soft reset.
const RESET_STARTUP: Duration = Duration::from_millis(4);
const NVM_COPY_POLL_INTERVAL: Duration = Duration::from_millis(2);

/// Failure reported by a [`RegisterBus`] transaction.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum BusFault {
    /// NACK, arbitration loss, timeout or similar; retrying may succeed.
    Transient,
    /// Anything the adapter could not classify.
    Other,
}

impl fmt::Display for BusFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BusFault::Transient => f.write_str("transient bus fault"),
            BusFault::Other => f.write_str("bus fault"),
        }
    }
}

impl From<BusFault> for SensorError {
    fn from(fault: BusFault) -> Self {
        match fault {
            BusFault::Transient => SensorError::Transient,
            BusFault::Other => SensorError::Unclassified,
        }
    }
}

impl From<BusFault> for DeviceError {
    fn from(_: BusFault) -> Self {
        DeviceError::Bus
    }
}

/// Blocking register access to a single bus device.
pub trait RegisterBus {
    /// Writes `register` then reads `buffer.len()` bytes back.
    ///
    /// # Errors
    ///
    /// Returns the classified bus failure.
    fn read_registers(&mut self, register: u8, buffer: &mut [u8]) -> Result<(), BusFault>;

    /// Writes one byte to `register`.
    ///
    /// # Errors
    ///
    /// Returns the classified bus failure.
    fn write_register(&mut self, register: u8, value: u8) -> Result<(), BusFault>;

    /// Blocks for at least `duration`; used while the device restarts.
    fn pause(&mut self, duration: Duration);
}

impl<T: RegisterBus + ?Sized> RegisterBus for &mut T {
    fn read_registers(&mut self, register: u8, buffer: &mut [u8]) -> Result<(), BusFault> {
        (**self).read_registers(register, buffer)
    }

    fn write_register(&mut self, register: u8, value: u8) -> Result<(), BusFault> {
        (**self).write_register(register, value)
    }

    fn pause(&mut self, duration: Duration) {
        (**self).pause(duration);
    }
}

/// Factory trim values for the temperature and pressure channels.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Calibration {
    pub dig_t1: u16,
    pub dig_t2: i16,
    pub dig_t3: i16,
    pub dig_p1: u16,
    pub dig_p2: i16,
    pub dig_p3: i16,
    pub dig_p4: i16,
    pub dig_p5: i16,
    pub dig_p6: i16,
    pub dig_p7: i16,
    pub dig_p8: i16,
    pub dig_p9: i16,
}

impl Calibration {
    /// Decodes the little-endian trim block read from [`REG_CALIBRATION`].
    #[must_use]
    pub fn parse(raw: &[u8; CALIBRATION_LEN]) -> Self {
        let unsigned = |at: usize| u16::from_le_bytes([raw[at], raw[at + 1]]);
        let signed = |at: usize| i16::from_le_bytes([raw[at], raw[at + 1]]);

        Self {
            dig_t1: unsigned(0),
            dig_t2: signed(2),
            dig_t3: signed(4),
            dig_p1: unsigned(6),
            dig_p2: signed(8),
            dig_p3: signed(10),
            dig_p4: signed(12),
            dig_p5: signed(14),
            dig_p6: signed(16),
            dig_p7: signed(18),
            dig_p8: signed(20),
            dig_p9: signed(22),
        }
    }

    /// Fine temperature used by the pressure compensation, plus the
    /// temperature in hundredths of a degree Celsius.
    #[must_use]
    pub fn compensate_temperature(&self, adc_t: i32) -> (i32, i32) {
        let adc_t = i64::from(adc_t);
        let t1 = i64::from(self.dig_t1);
        let t2 = i64::from(self.dig_t2);
        let t3 = i64::from(self.dig_t3);

        let var1 = (((adc_t >> 3) - (t1 << 1)) * t2) >> 11;
        let delta = (adc_t >> 4) - t1;
        let var2 = (((delta * delta) >> 12) * t3) >> 14;
        let t_fine = var1 + var2;
        let centi_celsius = (t_fine * 5 + 128) >> 8;

        (saturate_i32(t_fine), saturate_i32(centi_celsius))
    }

    /// Pressure in pascal as unsigned Q24.8.
    ///
    /// Returns `None` when the trim values would divide by zero.
    #[must_use]
    pub fn compensate_pressure(&self, adc_p: i32, t_fine: i32) -> Option<u32> {
        let p1 = i64::from(self.dig_p1);
        let p2 = i64::from(self.dig_p2);
        let p3 = i64::from(self.dig_p3);
        let p4 = i64::from(self.dig_p4);
        let p5 = i64::from(self.dig_p5);
        let p6 = i64::from(self.dig_p6);
        let p7 = i64::from(self.dig_p7);
        let p8 = i64::from(self.dig_p8);
        let p9 = i64::from(self.dig_p9);

        let mut var1 = i64::from(t_fine) - 128_000;
        let mut var2 = var1 * var1 * p6;
        var2 += (var1 * p5) << 17;
        var2 += p4 << 35;
        var1 = ((var1 * var1 * p3) >> 8) + ((var1 * p2) << 12);
        var1 = (((1_i64 << 47) + var1) * p1) >> 33;
        if var1 == 0 {
            return None;
        }

        let mut pressure = 1_048_576 - i64::from(adc_p);
        pressure = (((pressure << 31) - var2) * 3125) / var1;
        var1 = (p9 * (pressure >> 13) * (pressure >> 13)) >> 25;
        var2 = (p8 * pressure) >> 19;
        pressure = ((pressure + var1 + var2) >> 8) + (p7 << 4);

        u32::try_from(pressure).ok()
    }
}

fn saturate_i32(value: i64) -> i32 {
    i32::try_from(value).unwrap_or(if value < 0 { i32::MIN } else { i32::MAX })
}

/// Raw ADC counts from one burst read.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct RawSample {
    pub adc_pressure: i32,
    pub adc_temperature: i32,
}

impl RawSample {
    /// Decodes the 20-bit pressure and temperature counts.
    ///
    /// Returns `None` if either channel was skipped by the sensor.
    #[must_use]
    pub fn parse(raw: &[u8; SAMPLE_LEN]) -> Option<Self> {
        let adc = |msb: u8, lsb: u8, xlsb: u8| {
            (i32::from(msb) << 12) | (i32::from(lsb) << 4) | (i32::from(xlsb) >> 4)
        };
        let adc_pressure = adc(raw[0], raw[1], raw[2]);
        let adc_temperature = adc(raw[3], raw[4], raw[5]);

        if adc_pressure == SKIPPED_SAMPLE || adc_temperature == SKIPPED_SAMPLE {
            return None;
        }

        Some(Self {
            adc_pressure,
            adc_temperature,
        })
    }
}

/// Compensated reading.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Measurement {
    pub centi_celsius: i32,
    /// Pressure in pascal, Q24.8.
    pub pressure_q24_8: u32,
}

impl Measurement {
    /// Runs both compensation routines over a raw sample.
    #[must_use]
    pub fn compensate(calibration: &Calibration, sample: RawSample) -> Option<Self> {
        let (t_fine, centi_celsius) = calibration.compensate_temperature(sample.adc_temperature);
        let pressure_q24_8 = calibration.compensate_pressure(sample.adc_pressure, t_fine)?;
        Some(Self {
            centi_celsius,
            pressure_q24_8,
        })
    }

    #[allow(clippy::cast_precision_loss)]
    #[must_use]
    pub fn pressure_pa(&self) -> f32 {
        self.pressure_q24_8 as f32 / 256.0
    }

    #[must_use]
    pub fn pressure_hpa(&self) -> f32 {
        self.pressure_pa() / 100.0
    }
}

/// BME280 altitude source.
pub struct Bme280<B> {
    bus: B,
    sea_level_hpa: f32,
    calibration: Option<Calibration>,
    last_measurement: Option<Measurement>,
}

impl<B: RegisterBus> Bme280<B> {
    #[must_use]
    pub const fn new(bus: B) -> Self {
        Self {
            bus,
            sea_level_hpa: STANDARD_SEA_LEVEL_HPA,
            calibration: None,
            last_measurement: None,
        }
    }

    /// Overrides the reference pressure used for altitude.
    #[must_use]
    pub const fn with_sea_level_hpa(mut self, sea_level_hpa: f32) -> Self {
        self.sea_level_hpa = sea_level_hpa;
        self
    }

    pub const fn calibration(&self) -> Option<&Calibration> {
        self.calibration.as_ref()
    }

    /// Last successfully compensated reading.
    pub const fn last_measurement(&self) -> Option<&Measurement> {
        self.last_measurement.as_ref()
    }

    pub fn bus_mut(&mut self) -> &mut B {
        &mut self.bus
    }

    pub fn release(self) -> B {
        self.bus
    }

    fn read_byte(&mut self, register: u8) -> Result<u8, BusFault> {
        let mut byte = [0u8; 1];
        self.bus.read_registers(register, &mut byte)?;
        Ok(byte[0])
    }

    /// Waits for the trim copy that follows a reset. NACKs while the chip is
    /// still booting count as busy rather than as a failed init.
    fn wait_for_nvm_copy(&mut self) -> Result<(), DeviceError> {
        self.bus.pause(RESET_STARTUP);
        let mut last = DeviceError::NotResponding;
        for _ in 0..NVM_COPY_POLLS {
            match self.read_byte(REG_STATUS) {
                Ok(status) if status & STATUS_IM_UPDATE == 0 => return Ok(()),
                Ok(_) => last = DeviceError::NotResponding,
                Err(BusFault::Transient) => last = DeviceError::Bus,
                Err(fault) => return Err(fault.into()),
            }
            self.bus.pause(NVM_COPY_POLL_INTERVAL);
        }
        Err(last)
    }
}

impl<B: RegisterBus> AltitudeSource for Bme280<B> {
    fn initialize(&mut self) -> Result<(), DeviceError> {
        self.calibration = None;

        match self.read_byte(REG_CHIP_ID)? {
            CHIP_ID_BME280 | CHIP_ID_BMP280 => {}
            _ => return Err(DeviceError::NotResponding),
        }

        self.bus.write_register(REG_RESET, SOFT_RESET_COMMAND)?;
        self.wait_for_nvm_copy()?;

        let mut trim = [0u8; CALIBRATION_LEN];
        self.bus.read_registers(REG_CALIBRATION, &mut trim)?;
        let calibration = Calibration::parse(&trim);
        if calibration.dig_p1 == 0 {
            return Err(DeviceError::Unsupported);
        }

        self.bus.write_register(REG_CONFIG, CONFIG_STANDBY_1000MS)?;
        self.bus.write_register(REG_CTRL_MEAS, CTRL_MEAS_NORMAL)?;
        self.calibration = Some(calibration);
        Ok(())
    }

    fn read(&mut self) -> Result<Option<f64>, SensorError> {
        let calibration = self.calibration.ok_or(SensorError::Unclassified)?;

        let mut raw = [0u8; SAMPLE_LEN];
        self.bus.read_registers(REG_DATA, &mut raw)?;

        let Some(measurement) =
            RawSample::parse(&raw).and_then(|sample| Measurement::compensate(&calibration, sample))
        else {
            return Ok(None);
        };
        self.last_measurement = Some(measurement);

        Ok(pressure_altitude_m(measurement.pressure_hpa(), self.sea_level_hpa))
    }
}

//! Altitude sensing: BME280 register protocol and barometric altitude.

pub mod altimeter;
pub mod bme280;

pub use altimeter::{STANDARD_SEA_LEVEL_HPA, pressure_altitude_m};
pub use bme280::{Bme280, BusFault, RegisterBus};

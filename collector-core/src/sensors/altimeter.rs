//! International barometric formula.

/// ISA mean sea-level pressure.
pub const STANDARD_SEA_LEVEL_HPA: f32 = 1013.25;

const ISA_SCALE_M: f64 = 44_330.0;
const ISA_EXPONENT: f64 = 1.0 / 5.255;

/// Converts static pressure into pressure altitude.
///
/// Evaluated in `f64` with `libm`, so the result tracks the closed-form
/// formula to well under a metre across the flight envelope.
///
/// Returns `None` for non-positive or non-finite inputs.
#[must_use]
pub fn pressure_altitude_m(pressure_hpa: f32, sea_level_hpa: f32) -> Option<f64> {
    if !(pressure_hpa.is_finite() && sea_level_hpa.is_finite()) {
        return None;
    }
    if pressure_hpa <= 0.0 || sea_level_hpa <= 0.0 {
        return None;
    }

    let ratio = f64::from(pressure_hpa) / f64::from(sea_level_hpa);
    Some(ISA_SCALE_M * (1.0 - libm::pow(ratio, ISA_EXPONENT)))
}

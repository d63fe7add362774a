//! Unit conversion and open-loop step arithmetic.
//!
//! All functions here are pure and total. Linear positions cross this module
//! in one of two unit systems: driver units (nanometers, what the upper layer
//! sees) and device units (picometers, what goes on the wire).

use crate::consts::{DEVICE_UNITS_PER_NM, MAX_STEP_FREQUENCY_HZ, MIN_STEP_FREQUENCY_HZ};

/// Convert a driver-unit position (nm) to device units (pm).
#[inline]
pub fn nm_to_pm(nm: f64) -> f64 {
    nm * DEVICE_UNITS_PER_NM
}

/// Convert a device-unit position (pm) back to driver units (nm).
#[inline]
pub fn pm_to_nm(pm: f64) -> f64 {
    pm / DEVICE_UNITS_PER_NM
}

/// Convert a signed position delta into an open-loop step count using the
/// calibrated per-step displacement.
///
/// The positioner travels a different distance per step depending on
/// direction, so the divisor is selected by the sign of the delta:
/// `step_size_forward_pm` for positive deltas, `step_size_reverse_pm` for
/// negative ones. The result keeps the sign of the delta and truncates
/// toward zero; a delta smaller than one step yields 0.
///
/// Both step sizes must be nonzero; callers gate on calibration presence
/// before taking this path.
pub fn steps_for_delta(delta_nm: f64, step_size_forward_pm: f64, step_size_reverse_pm: f64) -> i64 {
    let delta_pm = nm_to_pm(delta_nm);
    let step_size_pm = if delta_pm >= 0.0 {
        step_size_forward_pm
    } else {
        step_size_reverse_pm
    };
    (delta_pm / step_size_pm) as i64
}

/// Derive the step frequency that realizes `velocity_nm_s` with steps of
/// `step_size_pm`, clamped to the controller's operating range.
pub fn step_frequency_hz(velocity_nm_s: f64, step_size_pm: f64) -> u32 {
    clamp_step_frequency((nm_to_pm(velocity_nm_s) / step_size_pm) as u32)
}

/// Clamp a requested step frequency to the documented range of the device.
#[inline]
pub fn clamp_step_frequency(frequency_hz: u32) -> u32 {
    frequency_hz.clamp(MIN_STEP_FREQUENCY_HZ, MAX_STEP_FREQUENCY_HZ)
}

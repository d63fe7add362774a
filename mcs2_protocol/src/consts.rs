//! Protocol constants shared between the pure layer and the driver.

/// Device units (picometers) per driver unit (nanometer).
///
/// The controller reports linear positions in picometers. At picometer
/// resolution a 32-bit consumer of the readback would cap travel at about
/// ±2.1 mm, so the driver works in nanometers and scales by 1000 on the
/// wire, trading resolution for a ±2.1 m range. The same factor applies to
/// rotary positioners (nanodegrees on the wire, microdegrees in the driver).
pub const DEVICE_UNITS_PER_NM: f64 = 1000.0;

/// Lowest step frequency the controller accepts, in Hz.
pub const MIN_STEP_FREQUENCY_HZ: u32 = 1;

/// Highest step frequency the controller accepts, in Hz.
///
/// Requested frequencies at or above this value are clamped, not rejected.
pub const MAX_STEP_FREQUENCY_HZ: u32 = 20_000;

/// Hold-time sentinel: keep holding force applied indefinitely after a move.
pub const HOLD_FOREVER: u32 = 0xFFFF_FFFF;

/// Upper bound on channels a single controller addresses.
pub const MAX_CHANNELS: usize = 16;

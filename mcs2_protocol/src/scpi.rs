//! Command string synthesis and reply parsing.
//!
//! Outgoing commands follow a colon-delimited, leaf-addressed grammar:
//! channel-scoped properties as `:CHAN<n>:<LEAF> <args>`, channel-scoped bare
//! commands as `:MOVE<n> <value>`, `:STOP<n>`, `:REF<n>`, `:CAL<n>`, and
//! controller-scoped commands with no channel number. Queries end in `?`.
//! Line framing (CRLF both ways) is the transport's job, not this module's.

use crate::errors::ProtocolError;
use bitflags::bitflags;

/// Motion mode selector for `MMOD`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveMode {
    /// Closed-loop absolute positioning.
    Absolute,
    /// Closed-loop relative positioning.
    Relative,
    /// Open-loop step movement.
    Step,
}

impl MoveMode {
    /// Wire encoding of the mode.
    pub fn as_wire(self) -> u8 {
        match self {
            MoveMode::Absolute => 0,
            MoveMode::Relative => 1,
            MoveMode::Step => 4,
        }
    }
}

bitflags! {
    /// Option bits for the reference (homing) sequence, set via `REF:OPT`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ReferenceOptions: u16 {
        /// Search in the reverse direction first.
        const START_DIRECTION      = 0x0001;
        /// Invert the direction on retry.
        const REVERSE_DIRECTION    = 0x0002;
        /// Zero the position when the mark is found.
        const AUTO_ZERO            = 0x0004;
        /// Abort the sequence at an end stop.
        const ABORT_ON_END_STOP    = 0x0008;
        /// Keep moving after the mark is found.
        const CONTINUE_ON_REF_FOUND = 0x0010;
        /// Stop as soon as the mark is found.
        const STOP_ON_REF_FOUND    = 0x0020;
    }
}

impl ReferenceOptions {
    /// The option mask used for a homing request: always auto-zero, and
    /// search in reverse when the move is not forwards.
    pub fn for_homing(forwards: bool) -> Self {
        let mut opts = Self::AUTO_ZERO;
        if !forwards {
            opts |= Self::START_DIRECTION;
        }
        opts
    }
}

// ── Controller-scoped commands ──

/// Query the controller serial number.
pub fn query_serial_number() -> String {
    ":DEV:SNUM?".to_string()
}

/// Query the number of entries in the controller's error queue.
pub fn query_error_count() -> String {
    ":SYST:ERR:COUN?".to_string()
}

/// Pop the next entry from the controller's error queue.
pub fn query_next_error() -> String {
    ":SYST:ERR?".to_string()
}

// ── Channel-scoped queries ──

/// Query the channel status bitword.
pub fn query_channel_state(channel: usize) -> String {
    format!(":CHAN{channel}:STAT?")
}

/// Query the current position in device units.
pub fn query_position(channel: usize) -> String {
    format!(":CHAN{channel}:POS?")
}

/// Query the theoretical (commanded) target position in device units.
pub fn query_target_position(channel: usize) -> String {
    format!(":CHAN{channel}:POS:TARG?")
}

/// Query the drive amplifier state.
pub fn query_amplifier(channel: usize) -> String {
    format!(":CHAN{channel}:AMPL?")
}

/// Query the configured positioner type code.
pub fn query_positioner_type(channel: usize) -> String {
    format!(":CHAN{channel}:PTYP?")
}

/// Query the configured positioner type name.
pub fn query_positioner_name(channel: usize) -> String {
    format!(":CHAN{channel}:PTYP:NAME?")
}

/// Query the maximum closed-loop frequency.
pub fn query_max_closed_loop_frequency(channel: usize) -> String {
    format!(":CHAN{channel}:MCLF?")
}

/// Query the configured closed-loop velocity.
pub fn query_velocity(channel: usize) -> String {
    format!(":CHAN{channel}:VEL?")
}

/// Query the configured closed-loop acceleration.
pub fn query_acceleration(channel: usize) -> String {
    format!(":CHAN{channel}:ACC?")
}

/// Query the configured hold time.
pub fn query_hold_time(channel: usize) -> String {
    format!(":CHAN{channel}:HOLD?")
}

/// Query the current following error.
pub fn query_following_error(channel: usize) -> String {
    format!(":CHAN{channel}:FERR?")
}

/// Query the channel temperature.
pub fn query_temperature(channel: usize) -> String {
    format!(":CHAN{channel}:TEMP?")
}

/// Query the channel's last error code.
pub fn query_channel_error(channel: usize) -> String {
    format!(":CHAN{channel}:ERR?")
}

/// Query the lower range limit.
pub fn query_range_limit_min(channel: usize) -> String {
    format!(":CHAN{channel}:RLIM:MIN?")
}

/// Query the upper range limit.
pub fn query_range_limit_max(channel: usize) -> String {
    format!(":CHAN{channel}:RLIM:MAX?")
}

/// Query the in-position threshold.
pub fn query_in_position_threshold(channel: usize) -> String {
    format!(":CHAN{channel}:INP:THR?")
}

/// Query the in-position delay.
pub fn query_in_position_delay(channel: usize) -> String {
    format!(":CHAN{channel}:INP:DEL?")
}

/// Query the target-reached threshold.
pub fn query_target_reached_threshold(channel: usize) -> String {
    format!(":CHAN{channel}:TUN:THR:TRE?")
}

/// Query the open-loop step amplitude.
pub fn query_step_amplitude(channel: usize) -> String {
    format!(":CHAN{channel}:STEP:AMPL?")
}

/// Query the diagnostic maximum closed-loop frequency.
pub fn query_diag_clf_max(channel: usize) -> String {
    format!(":CHAN{channel}:DIAG:CLF:MAX?")
}

/// Query the diagnostic average closed-loop frequency.
pub fn query_diag_clf_average(channel: usize) -> String {
    format!(":CHAN{channel}:DIAG:CLF:AVER?")
}

// ── Channel-scoped setters ──

/// Select the motion mode for subsequent move commands.
pub fn set_move_mode(channel: usize, mode: MoveMode) -> String {
    format!(":CHAN{channel}:MMOD {}", mode.as_wire())
}

/// Set the closed-loop acceleration in device units.
pub fn set_acceleration(channel: usize, acceleration_pm: f64) -> String {
    format!(":CHAN{channel}:ACC {acceleration_pm}")
}

/// Set the closed-loop velocity in device units.
pub fn set_velocity(channel: usize, velocity_pm: f64) -> String {
    format!(":CHAN{channel}:VEL {velocity_pm}")
}

/// Redefine the current position (origin recalibration) in device units.
pub fn set_position(channel: usize, position_pm: f64) -> String {
    format!(":CHAN{channel}:POS {position_pm}")
}

/// Set the post-move hold time in milliseconds (`HOLD_FOREVER` for no timeout).
pub fn set_hold_time(channel: usize, hold_time_ms: u32) -> String {
    format!(":CHAN{channel}:HOLD {hold_time_ms}")
}

/// Enable or disable the drive amplifier.
pub fn set_amplifier(channel: usize, enabled: bool) -> String {
    format!(":CHAN{channel}:AMPL {}", if enabled { 1 } else { 0 })
}

/// Select the positioner type by code.
pub fn set_positioner_type(channel: usize, type_code: i32) -> String {
    format!(":CHAN{channel}:PTYP {type_code}")
}

/// Set the maximum closed-loop frequency.
pub fn set_max_closed_loop_frequency(channel: usize, frequency_hz: u32) -> String {
    format!(":CHAN{channel}:MCLF:CURR {frequency_hz}")
}

/// Set the open-loop step frequency.
pub fn set_step_frequency(channel: usize, frequency_hz: u32) -> String {
    format!(":CHAN{channel}:STEP:FREQ {frequency_hz}")
}

/// Set the reference-sequence options.
pub fn set_reference_options(channel: usize, options: ReferenceOptions) -> String {
    format!(":CHAN{channel}:REF:OPT {}", options.bits())
}

// ── Channel-scoped bare commands ──

/// Move to an absolute position in device units (closed loop).
pub fn move_absolute(channel: usize, position_pm: f64) -> String {
    format!(":MOVE{channel} {position_pm}")
}

/// Move by a signed number of open-loop steps.
pub fn move_steps(channel: usize, steps: i64) -> String {
    format!(":MOVE{channel} {steps}")
}

/// Start the reference (homing) sequence.
pub fn reference(channel: usize) -> String {
    format!(":REF{channel}")
}

/// Start the calibration sequence.
pub fn calibrate(channel: usize) -> String {
    format!(":CAL{channel}")
}

/// Stop any movement on the channel.
pub fn stop(channel: usize) -> String {
    format!(":STOP{channel}")
}

// ── Reply parsing ──

/// Parse a single-token integer reply.
pub fn parse_int_reply(reply: &str) -> Result<i64, ProtocolError> {
    reply
        .trim()
        .parse::<i64>()
        .map_err(|_| ProtocolError::BadInteger(reply.to_string()))
}

/// Parse a single-token numeric reply.
pub fn parse_float_reply(reply: &str) -> Result<f64, ProtocolError> {
    reply
        .trim()
        .parse::<f64>()
        .map_err(|_| ProtocolError::BadFloat(reply.to_string()))
}

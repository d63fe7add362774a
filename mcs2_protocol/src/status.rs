//! Channel status bitword decoding.
//!
//! The controller reports one unsigned bitword per channel (`:CHAN<n>:STAT?`).
//! Every bit is single-purpose; decoding is a bitwise AND per flag and no
//! flag depends on bits it does not own.

use bitflags::bitflags;

bitflags! {
    /// Raw channel state word as reported by the controller.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ChannelState: u32 {
        /// A movement is in progress.
        const ACTIVELY_MOVING         = 0x0000_0001;
        /// Closed-loop control is active.
        const CLOSED_LOOP_ACTIVE      = 0x0000_0002;
        /// A calibration sequence is running.
        const CALIBRATING             = 0x0000_0004;
        /// A reference (homing) sequence is running.
        const REFERENCING             = 0x0000_0008;
        /// A commanded move is delayed (hold time pending).
        const MOVE_DELAYED            = 0x0000_0010;
        /// A position sensor is attached to the channel.
        const SENSOR_PRESENT          = 0x0000_0020;
        /// The channel has valid calibration data.
        const IS_CALIBRATED           = 0x0000_0040;
        /// The channel has been referenced (homed).
        const IS_REFERENCED           = 0x0000_0080;
        /// A mechanical end stop was reached.
        const END_STOP_REACHED        = 0x0000_0100;
        /// The configured range limit was reached.
        const RANGE_LIMIT_REACHED     = 0x0000_0200;
        /// The following-error limit was exceeded.
        const FOLLOWING_LIMIT_REACHED = 0x0000_0400;
        /// The last movement failed.
        const MOVEMENT_FAILED         = 0x0000_0800;
        /// Streaming (scan) mode is active.
        const STREAMING               = 0x0000_1000;
        /// The positioner reported an overload condition.
        const POSITIONER_OVERLOAD     = 0x0000_2000;
        /// The channel is over temperature.
        const OVERTEMP                = 0x0000_4000;
        /// The channel is at the reference mark.
        const REFERENCE_MARK          = 0x0000_8000;
        /// Phasing has completed.
        const IS_PHASED               = 0x0001_0000;
        /// The positioner reported a fault.
        const POSITIONER_FAULT        = 0x0002_0000;
        /// The drive amplifier is enabled.
        const AMPLIFIER_ENABLED       = 0x0004_0000;
        /// The channel is within the in-position window.
        const IN_POSITION             = 0x0008_0000;
        /// The brake is engaged.
        const BRAKE_ENABLED           = 0x0010_0000;
    }
}

impl Default for ChannelState {
    fn default() -> Self {
        Self::empty()
    }
}

/// Semantic flags decoded from one channel state word.
///
/// Derived fresh on every poll and never persisted beyond it; the driver
/// keeps the most recent copy only for status-text synthesis.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusFlags {
    /// A movement is in progress.
    pub actively_moving: bool,
    /// Closed-loop control is active.
    pub closed_loop_active: bool,
    /// A calibration sequence is running.
    pub calibrating: bool,
    /// A reference sequence is running.
    pub referencing: bool,
    /// A position sensor is attached.
    pub sensor_present: bool,
    /// Calibration data is valid.
    pub is_calibrated: bool,
    /// The channel has been referenced.
    pub is_referenced: bool,
    /// An end stop was reached.
    pub end_stop_reached: bool,
    /// The following-error limit was exceeded.
    pub following_limit_reached: bool,
    /// The last movement failed.
    pub movement_failed: bool,
    /// The channel is at the reference mark.
    pub reference_mark_found: bool,
    /// The positioner reported a fault.
    pub positioner_fault: bool,
    /// The positioner reported an overload.
    pub positioner_overload: bool,
    /// The channel is over temperature.
    pub overtemp: bool,
}

impl StatusFlags {
    /// Decode a raw status word into semantic flags.
    pub fn decode(word: u32) -> Self {
        let state = ChannelState::from_bits_truncate(word);
        Self {
            actively_moving: state.contains(ChannelState::ACTIVELY_MOVING),
            closed_loop_active: state.contains(ChannelState::CLOSED_LOOP_ACTIVE),
            calibrating: state.contains(ChannelState::CALIBRATING),
            referencing: state.contains(ChannelState::REFERENCING),
            sensor_present: state.contains(ChannelState::SENSOR_PRESENT),
            is_calibrated: state.contains(ChannelState::IS_CALIBRATED),
            is_referenced: state.contains(ChannelState::IS_REFERENCED),
            end_stop_reached: state.contains(ChannelState::END_STOP_REACHED),
            following_limit_reached: state.contains(ChannelState::FOLLOWING_LIMIT_REACHED),
            movement_failed: state.contains(ChannelState::MOVEMENT_FAILED),
            reference_mark_found: state.contains(ChannelState::REFERENCE_MARK),
            positioner_fault: state.contains(ChannelState::POSITIONER_FAULT),
            positioner_overload: state.contains(ChannelState::POSITIONER_OVERLOAD),
            overtemp: state.contains(ChannelState::OVERTEMP),
        }
    }

    /// The motion-complete flag: the inverse of `actively_moving`.
    #[inline]
    pub fn done(&self) -> bool {
        !self.actively_moving
    }
}

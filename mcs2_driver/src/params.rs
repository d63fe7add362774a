//! Parameter store seam to the layer above.
//!
//! The driver does not own the user-facing parameter database. It pushes
//! decoded values into a store through this trait and lets the store dispatch
//! change callbacks. [`MemoryParamStore`] is a self-contained implementation
//! for tests and standalone use.

use std::collections::HashMap;

/// Identifier of one per-axis value the driver reads or publishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamId {
    /// Current position in user units (nm).
    Position,
    /// Theoretical target position in user units (nm).
    TargetPosition,
    /// Raw channel status bitword, as read.
    RawStatus,
    /// Movement finished flag.
    DoneMoving,
    /// Movement in progress flag.
    Moving,
    /// Axis has completed a reference sequence.
    Homed,
    /// Axis has completed a calibration sequence.
    Calibrated,
    /// Drive amplifier is powered.
    DrivePowerOn,
    /// A position sensor is attached to the channel.
    SensorPresent,
    /// Transport-level failure on the last exchange for this axis.
    CommunicationError,
    /// Controller-wide status problem (error-queue drain failed).
    StatusProblem,
    /// Human-readable condition text.
    StatusText,
    /// Maximum closed-loop frequency in Hz.
    MaxClosedLoopFrequency,
    /// Positioner type code.
    PositionerType,
    /// Positioner type name.
    PositionerName,
    /// Post-move hold time in ms.
    HoldTime,
    /// Open-loop step frequency in Hz.
    StepFrequency,
    /// Open-loop mode enable.
    OpenLoopEnable,
    /// Calibrated forward step size in device units.
    StepSizeForward,
    /// Calibrated reverse step size in device units.
    StepSizeReverse,
    /// Calibration trigger.
    Calibrate,
}

/// Upward interface to the generic parameter database.
pub trait ParameterStore {
    /// Store an integer value for one axis.
    fn set_integer(&mut self, axis: usize, id: ParamId, value: i32);
    /// Store a floating-point value for one axis.
    fn set_double(&mut self, axis: usize, id: ParamId, value: f64);
    /// Store a string value for one axis.
    fn set_string(&mut self, axis: usize, id: ParamId, value: &str);
    /// Read back a previously stored integer, if any.
    fn get_integer(&self, axis: usize, id: ParamId) -> Option<i32>;
    /// Dispatch change callbacks for one axis. Called exactly once per poll.
    fn notify_callbacks(&mut self, axis: usize);
}

/// In-memory parameter store.
#[derive(Debug, Default)]
pub struct MemoryParamStore {
    integers: HashMap<(usize, ParamId), i32>,
    doubles: HashMap<(usize, ParamId), f64>,
    strings: HashMap<(usize, ParamId), String>,
    notifications: HashMap<usize, u64>,
}

impl MemoryParamStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Read back a stored floating-point value.
    pub fn get_double(&self, axis: usize, id: ParamId) -> Option<f64> {
        self.doubles.get(&(axis, id)).copied()
    }

    /// Read back a stored string value.
    pub fn get_string(&self, axis: usize, id: ParamId) -> Option<&str> {
        self.strings.get(&(axis, id)).map(String::as_str)
    }

    /// How many times callbacks were dispatched for `axis`.
    pub fn notification_count(&self, axis: usize) -> u64 {
        self.notifications.get(&axis).copied().unwrap_or(0)
    }
}

impl ParameterStore for MemoryParamStore {
    fn set_integer(&mut self, axis: usize, id: ParamId, value: i32) {
        self.integers.insert((axis, id), value);
    }

    fn set_double(&mut self, axis: usize, id: ParamId, value: f64) {
        self.doubles.insert((axis, id), value);
    }

    fn set_string(&mut self, axis: usize, id: ParamId, value: &str) {
        self.strings.insert((axis, id), value.to_string());
    }

    fn get_integer(&self, axis: usize, id: ParamId) -> Option<i32> {
        self.integers.get(&(axis, id)).copied()
    }

    fn notify_callbacks(&mut self, axis: usize) {
        *self.notifications.entry(axis).or_insert(0) += 1;
    }
}

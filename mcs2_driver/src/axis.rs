//! Per-axis runtime state and the move/home/stop/poll algorithms.

use mcs2_protocol::consts::HOLD_FOREVER;
use mcs2_protocol::scpi::{self, MoveMode, ReferenceOptions};
use mcs2_protocol::units;
use mcs2_protocol::StatusFlags;
use tracing::{debug, info, warn};

use crate::error::DriverError;
use crate::params::{ParamId, ParameterStore};
use crate::transport::Transport;

/// One controller channel and its mutable runtime state.
///
/// The axis is a single-writer object: only its own move/home/stop/poll
/// calls mutate it, and all transport use is serialized by the controller.
pub struct Axis {
    index: usize,
    open_loop: bool,
    tracked_target_nm: f64,
    tracked_target_steps: i64,
    step_size_forward_pm: f64,
    step_size_reverse_pm: f64,
    hold_time_ms: u32,
    sensor_present: bool,
    initial_poll_completed: bool,
    last_status: StatusFlags,
}

/// Outcome of one poll cycle, consumed by the poll driver for cadence
/// selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollResult {
    /// Whether the axis reported active movement.
    pub moving: bool,
    /// Whether the cycle completed without a transport failure.
    pub ok: bool,
}

/// Snapshot of the diagnostic-only readbacks, for verbose reporting.
///
/// Each field is `None` when its query failed; a partially filled report is
/// still printable.
#[derive(Debug, Default)]
pub struct AxisReport {
    /// Axis index the report belongs to.
    pub axis: usize,
    /// Positioner type code.
    pub positioner_type: Option<i64>,
    /// Positioner type name.
    pub positioner_name: Option<String>,
    /// Raw channel status bitword.
    pub state: Option<i64>,
    /// Configured velocity in device units.
    pub velocity: Option<i64>,
    /// Configured acceleration in device units.
    pub acceleration: Option<i64>,
    /// Maximum closed-loop frequency in Hz.
    pub max_closed_loop_frequency: Option<i64>,
    /// Current following error.
    pub following_error: Option<i64>,
    /// Last channel error code.
    pub last_error: Option<i64>,
    /// Channel temperature.
    pub temperature: Option<i64>,
    /// Lower range limit.
    pub range_limit_min: Option<i64>,
    /// Upper range limit.
    pub range_limit_max: Option<i64>,
    /// In-position threshold.
    pub in_position_threshold: Option<i64>,
    /// In-position delay.
    pub in_position_delay: Option<i64>,
    /// Target-reached threshold.
    pub target_reached_threshold: Option<i64>,
    /// Post-move hold time.
    pub hold_time: Option<i64>,
    /// Open-loop step amplitude.
    pub step_amplitude: Option<i64>,
    /// Diagnostic maximum closed-loop frequency.
    pub diag_clf_max: Option<i64>,
    /// Diagnostic average closed-loop frequency.
    pub diag_clf_average: Option<i64>,
}

impl std::fmt::Display for AxisReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        fn cell(v: &Option<i64>) -> String {
            v.map_or_else(|| "?".to_string(), |v| v.to_string())
        }
        writeln!(f, "  axis {}", self.axis)?;
        writeln!(f, " positioner type {}", cell(&self.positioner_type))?;
        writeln!(
            f,
            " positioner name {}",
            self.positioner_name.as_deref().unwrap_or("?")
        )?;
        match self.state {
            Some(s) => writeln!(f, " state {s} {s:#X}")?,
            None => writeln!(f, " state ?")?,
        }
        writeln!(f, " rlimit_current_min {}", cell(&self.range_limit_min))?;
        writeln!(f, " rlimit_current_max {}", cell(&self.range_limit_max))?;
        writeln!(f, " in_position_threshold {}", cell(&self.in_position_threshold))?;
        writeln!(f, " in_position_delay {}", cell(&self.in_position_delay))?;
        writeln!(f, " target_reached_threshold {}", cell(&self.target_reached_threshold))?;
        writeln!(f, " hold_time {}", cell(&self.hold_time))?;
        writeln!(f, " step amplitude {}", cell(&self.step_amplitude))?;
        writeln!(f, " velocity {}", cell(&self.velocity))?;
        writeln!(f, " acceleration {}", cell(&self.acceleration))?;
        writeln!(f, " max closed loop frequency {}", cell(&self.max_closed_loop_frequency))?;
        writeln!(f, " diag closed loop frequency max {}", cell(&self.diag_clf_max))?;
        writeln!(f, " diag closed loop frequency average {}", cell(&self.diag_clf_average))?;
        writeln!(f, " following error {}", cell(&self.following_error))?;
        writeln!(f, " error {}", cell(&self.last_error))?;
        writeln!(f, " temp {}", cell(&self.temperature))
    }
}

impl Axis {
    /// Create the axis in closed-loop mode with an infinite hold time.
    pub fn new(index: usize, store: &mut dyn ParameterStore) -> Self {
        debug!(axis = index, "creating axis");
        store.set_integer(index, ParamId::HoldTime, HOLD_FOREVER as i32);
        store.notify_callbacks(index);
        Self {
            index,
            open_loop: false,
            tracked_target_nm: 0.0,
            tracked_target_steps: 0,
            step_size_forward_pm: 0.0,
            step_size_reverse_pm: 0.0,
            hold_time_ms: HOLD_FOREVER,
            sensor_present: false,
            initial_poll_completed: false,
            last_status: StatusFlags::default(),
        }
    }

    /// The channel index this axis addresses.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Last decoded status flags.
    pub fn last_status(&self) -> &StatusFlags {
        &self.last_status
    }

    /// Force the communications-fault flag for this axis without touching
    /// any other state. Used by the controller when the link as a whole goes
    /// down.
    pub fn mark_comms_fault(&mut self, store: &mut dyn ParameterStore) {
        store.set_integer(self.index, ParamId::CommunicationError, 1);
    }

    // ── Poll ──

    /// Poll the axis: read status, position, drive power and positioner
    /// type, push everything to the parameter store and dispatch callbacks
    /// exactly once. A transport failure aborts the remaining reads,
    /// re-arms the one-time initialization and surfaces as a
    /// communications fault rather than an error return.
    pub fn poll(
        &mut self,
        transport: &mut dyn Transport,
        store: &mut dyn ParameterStore,
    ) -> PollResult {
        let outcome = self.poll_cycle(transport, store);
        let ok = match &outcome {
            Ok(()) => true,
            Err(e) => {
                warn!(axis = self.index, error = %e, "poll failed");
                self.initial_poll_completed = false;
                false
            }
        };
        let moving = ok && self.last_status.actively_moving;

        store.set_integer(self.index, ParamId::CommunicationError, i32::from(!ok));
        store.set_string(self.index, ParamId::StatusText, self.condition_text(!ok));
        store.notify_callbacks(self.index);
        PollResult { moving, ok }
    }

    fn poll_cycle(
        &mut self,
        transport: &mut dyn Transport,
        store: &mut dyn ParameterStore,
    ) -> Result<(), DriverError> {
        // One-time push of the stored hold time before the first status read.
        if !self.initial_poll_completed {
            transport.write_line(&scpi::set_hold_time(self.index, self.hold_time_ms))?;
            self.initial_poll_completed = true;
        }

        let word = scpi::parse_int_reply(&transport.query_line(&scpi::query_channel_state(
            self.index,
        ))?)? as u32;
        let flags = StatusFlags::decode(word);
        let done = flags.done();
        self.last_status = flags;
        self.sensor_present = flags.sensor_present;

        store.set_integer(self.index, ParamId::RawStatus, word as i32);
        store.set_integer(self.index, ParamId::Moving, i32::from(!done));
        store.set_integer(self.index, ParamId::DoneMoving, i32::from(done));
        store.set_integer(self.index, ParamId::SensorPresent, i32::from(flags.sensor_present));
        store.set_integer(self.index, ParamId::Homed, i32::from(flags.is_referenced));

        // Position readbacks are only meaningful with a sensor attached.
        if flags.sensor_present {
            let pos_pm =
                scpi::parse_float_reply(&transport.query_line(&scpi::query_position(self.index))?)?;
            store.set_double(self.index, ParamId::Position, units::pm_to_nm(pos_pm));

            if !self.open_loop {
                let targ_pm = scpi::parse_float_reply(
                    &transport.query_line(&scpi::query_target_position(self.index))?,
                )?;
                store.set_double(self.index, ParamId::TargetPosition, units::pm_to_nm(targ_pm));
            }
        }

        let drive_on =
            scpi::parse_int_reply(&transport.query_line(&scpi::query_amplifier(self.index))?)?;
        store.set_integer(self.index, ParamId::DrivePowerOn, i32::from(drive_on != 0));

        let ptyp = scpi::parse_int_reply(
            &transport.query_line(&scpi::query_positioner_type(self.index))?,
        )?;
        store.set_integer(self.index, ParamId::PositionerType, ptyp as i32);

        // Calibration state and MCLF are only refreshed while idle.
        if done {
            store.set_integer(self.index, ParamId::Calibrated, i32::from(flags.is_calibrated));
            store.set_integer(self.index, ParamId::Homed, i32::from(flags.is_referenced));
            let mclf = scpi::parse_int_reply(
                &transport.query_line(&scpi::query_max_closed_loop_frequency(self.index))?,
            )?;
            store.set_integer(self.index, ParamId::MaxClosedLoopFrequency, mclf as i32);
        }

        Ok(())
    }

    /// Pick the single user-visible condition message, highest priority
    /// first. Homing and calibration complaints only apply when the axis
    /// operates a sensor in closed loop.
    fn condition_text(&self, comms_fault: bool) -> &'static str {
        let s = &self.last_status;
        let closed_loop_sensor = s.sensor_present && !self.open_loop;
        if comms_fault {
            "E: Communication"
        } else if closed_loop_sensor && !s.is_referenced {
            "E: Axis not homed"
        } else if closed_loop_sensor && !s.is_calibrated {
            "E: Not calibrated"
        } else if s.movement_failed {
            "E: movement failed"
        } else if s.following_limit_reached {
            "E: follow limit"
        } else if s.positioner_fault {
            "positioner fault"
        } else if s.positioner_overload {
            "positioner overload"
        } else if s.overtemp {
            "overtemperature"
        } else {
            ""
        }
    }

    // ── Motion ──

    /// Start a move. Closed-loop positioning is used when the axis has a
    /// sensor and open-loop mode is not forced; otherwise the move is
    /// issued as open-loop steps, with calibrated step sizes when they are
    /// known and legacy step accounting when they are not.
    pub fn move_to(
        &mut self,
        transport: &mut dyn Transport,
        store: &mut dyn ParameterStore,
        position_nm: f64,
        relative: bool,
        velocity_nm_s: f64,
        acceleration_nm_s2: f64,
    ) -> Result<(), DriverError> {
        if self.sensor_present && !self.open_loop {
            self.move_closed_loop(transport, position_nm, relative, velocity_nm_s, acceleration_nm_s2)
        } else if self.step_size_forward_pm > 0.0 && self.step_size_reverse_pm > 0.0 {
            self.move_open_loop_calibrated(transport, store, position_nm, relative, velocity_nm_s)
        } else {
            self.move_open_loop_legacy(transport, store, position_nm, relative, velocity_nm_s)
        }
    }

    fn move_closed_loop(
        &mut self,
        transport: &mut dyn Transport,
        position_nm: f64,
        relative: bool,
        velocity_nm_s: f64,
        acceleration_nm_s2: f64,
    ) -> Result<(), DriverError> {
        let mode = if relative { MoveMode::Relative } else { MoveMode::Absolute };
        info!(axis = self.index, position_nm, relative, "closed-loop move");
        transport.write_line(&scpi::set_move_mode(self.index, mode))?;
        transport.write_line(&scpi::set_acceleration(
            self.index,
            units::nm_to_pm(acceleration_nm_s2),
        ))?;
        transport.write_line(&scpi::set_velocity(self.index, units::nm_to_pm(velocity_nm_s)))?;
        transport.write_line(&scpi::move_absolute(self.index, units::nm_to_pm(position_nm)))?;
        Ok(())
    }

    fn move_open_loop_calibrated(
        &mut self,
        transport: &mut dyn Transport,
        store: &mut dyn ParameterStore,
        position_nm: f64,
        relative: bool,
        velocity_nm_s: f64,
    ) -> Result<(), DriverError> {
        let target_nm = if relative { self.tracked_target_nm + position_nm } else { position_nm };
        let delta_nm = target_nm - self.tracked_target_nm;
        self.tracked_target_nm = target_nm;
        store.set_double(self.index, ParamId::TargetPosition, target_nm);

        let steps =
            units::steps_for_delta(delta_nm, self.step_size_forward_pm, self.step_size_reverse_pm);
        if steps == 0 {
            debug!(axis = self.index, "zero step delta, skipping move");
            return Ok(());
        }
        let step_size = if delta_nm >= 0.0 {
            self.step_size_forward_pm
        } else {
            self.step_size_reverse_pm
        };
        let frequency =
            units::clamp_step_frequency(units::step_frequency_hz(velocity_nm_s, step_size));

        info!(axis = self.index, steps, frequency, "calibrated open-loop move");
        transport.write_line(&scpi::set_move_mode(self.index, MoveMode::Step))?;
        transport.write_line(&scpi::set_step_frequency(self.index, frequency))?;
        transport.write_line(&scpi::move_steps(self.index, steps))?;
        Ok(())
    }

    fn move_open_loop_legacy(
        &mut self,
        transport: &mut dyn Transport,
        store: &mut dyn ParameterStore,
        position: f64,
        relative: bool,
        velocity: f64,
    ) -> Result<(), DriverError> {
        // Without step-size calibration, position and velocity are already
        // in steps and Hz.
        let target = if relative {
            self.tracked_target_steps + position as i64
        } else {
            position as i64
        };
        let steps = target - self.tracked_target_steps;
        self.tracked_target_steps = target;
        store.set_double(self.index, ParamId::TargetPosition, target as f64);

        if steps == 0 {
            debug!(axis = self.index, "zero step delta, skipping move");
            return Ok(());
        }
        let frequency = units::clamp_step_frequency(velocity as u32);

        info!(axis = self.index, steps, frequency, "open-loop move");
        transport.write_line(&scpi::set_move_mode(self.index, MoveMode::Step))?;
        transport.write_line(&scpi::set_step_frequency(self.index, frequency))?;
        transport.write_line(&scpi::move_steps(self.index, steps))?;
        Ok(())
    }

    /// Start the reference sequence. Auto-zero is always requested; the
    /// search starts in reverse when `forwards` is false.
    pub fn home(
        &mut self,
        transport: &mut dyn Transport,
        forwards: bool,
        velocity_nm_s: f64,
        acceleration_nm_s2: f64,
    ) -> Result<(), DriverError> {
        let options = ReferenceOptions::for_homing(forwards);
        info!(axis = self.index, forwards, options = options.bits(), "homing");
        transport.write_line(&scpi::set_reference_options(self.index, options))?;
        transport.write_line(&scpi::set_acceleration(
            self.index,
            units::nm_to_pm(acceleration_nm_s2),
        ))?;
        transport.write_line(&scpi::set_velocity(self.index, units::nm_to_pm(velocity_nm_s)))?;
        transport.write_line(&scpi::reference(self.index))?;
        Ok(())
    }

    /// Stop any movement on the channel.
    pub fn stop(&mut self, transport: &mut dyn Transport) -> Result<(), DriverError> {
        transport.write_line(&scpi::stop(self.index))
    }

    /// Redefine the current position without moving.
    pub fn set_position(
        &mut self,
        transport: &mut dyn Transport,
        position_nm: f64,
    ) -> Result<(), DriverError> {
        transport.write_line(&scpi::set_position(self.index, units::nm_to_pm(position_nm)))
    }

    /// Enable or disable the drive amplifier.
    pub fn set_closed_loop(
        &mut self,
        transport: &mut dyn Transport,
        enabled: bool,
    ) -> Result<(), DriverError> {
        transport.write_line(&scpi::set_amplifier(self.index, enabled))
    }

    // ── Parameter writes ──

    /// Handle an integer parameter write from the layer above. A closed set
    /// of identifiers triggers a device command or updates local state; any
    /// other identifier is a plain store write. Callbacks are dispatched
    /// once either way.
    pub fn write_integer(
        &mut self,
        transport: &mut dyn Transport,
        store: &mut dyn ParameterStore,
        id: ParamId,
        value: i32,
    ) -> Result<(), DriverError> {
        store.set_integer(self.index, id, value);
        let result = match id {
            ParamId::MaxClosedLoopFrequency => {
                transport.write_line(&scpi::set_max_closed_loop_frequency(self.index, value as u32))
            }
            ParamId::PositionerType => {
                transport.write_line(&scpi::set_positioner_type(self.index, value))
            }
            ParamId::Calibrate => transport.write_line(&scpi::calibrate(self.index)),
            ParamId::HoldTime => {
                self.hold_time_ms = value as u32;
                info!(axis = self.index, hold = self.hold_time_ms, "hold time");
                transport.write_line(&scpi::set_hold_time(self.index, self.hold_time_ms))
            }
            ParamId::StepFrequency => {
                let frequency = units::clamp_step_frequency(value as u32);
                store.set_integer(self.index, id, frequency as i32);
                transport.write_line(&scpi::set_step_frequency(self.index, frequency))
            }
            ParamId::OpenLoopEnable => {
                self.open_loop = value != 0;
                Ok(())
            }
            _ => Ok(()),
        };
        store.notify_callbacks(self.index);
        result
    }

    /// Handle a floating-point parameter write. Step-size calibration values
    /// update local move accounting; everything else is a plain store write.
    pub fn write_double(&mut self, store: &mut dyn ParameterStore, id: ParamId, value: f64) {
        store.set_double(self.index, id, value);
        match id {
            ParamId::StepSizeForward => self.step_size_forward_pm = value,
            ParamId::StepSizeReverse => self.step_size_reverse_pm = value,
            _ => {}
        }
        store.notify_callbacks(self.index);
    }

    // ── Diagnostics ──

    /// Gather the diagnostic readbacks for verbose reporting. Individual
    /// query failures leave their field unset instead of aborting.
    pub fn report(&mut self, transport: &mut dyn Transport) -> AxisReport {
        let mut int = |cmd: String| -> Option<i64> {
            transport.query_line(&cmd).ok().and_then(|r| scpi::parse_int_reply(&r).ok())
        };
        let mut report = AxisReport {
            axis: self.index,
            positioner_type: int(scpi::query_positioner_type(self.index)),
            positioner_name: None,
            state: int(scpi::query_channel_state(self.index)),
            velocity: int(scpi::query_velocity(self.index)),
            acceleration: int(scpi::query_acceleration(self.index)),
            max_closed_loop_frequency: int(scpi::query_max_closed_loop_frequency(self.index)),
            following_error: int(scpi::query_following_error(self.index)),
            last_error: int(scpi::query_channel_error(self.index)),
            temperature: int(scpi::query_temperature(self.index)),
            range_limit_min: int(scpi::query_range_limit_min(self.index)),
            range_limit_max: int(scpi::query_range_limit_max(self.index)),
            in_position_threshold: int(scpi::query_in_position_threshold(self.index)),
            in_position_delay: int(scpi::query_in_position_delay(self.index)),
            target_reached_threshold: int(scpi::query_target_reached_threshold(self.index)),
            hold_time: int(scpi::query_hold_time(self.index)),
            step_amplitude: int(scpi::query_step_amplitude(self.index)),
            diag_clf_max: int(scpi::query_diag_clf_max(self.index)),
            diag_clf_average: int(scpi::query_diag_clf_average(self.index)),
        };
        report.positioner_name =
            transport.query_line(&scpi::query_positioner_name(self.index)).ok();
        report
    }
}

//! Controller-level coordination: axis ownership, connection health and the
//! device error queue.

use mcs2_protocol::{decode_error_code, scpi};
use tracing::{debug, info, warn};

use crate::axis::{Axis, AxisReport, PollResult};
use crate::config::ControllerConfig;
use crate::error::DriverError;
use crate::params::{ParamId, ParameterStore};
use crate::transport::Transport;

/// One positioner controller and its axes.
///
/// All transport use goes through this object, one exchange at a time, so
/// the single-outstanding-command discipline holds by construction.
pub struct Mcs2Controller<T: Transport, S: ParameterStore> {
    name: String,
    config: ControllerConfig,
    transport: T,
    store: S,
    axes: Vec<Option<Axis>>,
    serial_number: String,
    connected: bool,
}

impl<T: Transport, S: ParameterStore> Mcs2Controller<T, S> {
    /// Probe the controller, drain any stale errors and create the axes.
    pub fn new(
        name: &str,
        config: ControllerConfig,
        mut transport: T,
        mut store: S,
    ) -> Result<Self, DriverError> {
        let serial_number = transport.query_line(&scpi::query_serial_number())?;
        info!(controller = name, serial = serial_number.as_str(), "connected");

        let axes = (0..config.num_axes)
            .map(|i| {
                if config.unused_axis_mask & (1u32 << i) != 0 {
                    None
                } else {
                    Some(Axis::new(i, &mut store))
                }
            })
            .collect();
        let mut controller = Self {
            name: name.to_string(),
            config,
            transport,
            store,
            axes,
            serial_number,
            connected: true,
        };
        controller.drain_errors();
        Ok(controller)
    }

    /// Controller serial number, read once at startup.
    pub fn serial_number(&self) -> &str {
        &self.serial_number
    }

    /// The configuration the controller was created with.
    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    /// The parameter store, for readback by the layer above.
    pub fn store(&self) -> &S {
        &self.store
    }

    fn axis_mut(axes: &mut [Option<Axis>], index: usize) -> Result<&mut Axis, DriverError> {
        axes.get_mut(index)
            .and_then(Option::as_mut)
            .ok_or(DriverError::AxisNotConfigured(index))
    }

    /// Record one transport outcome and act on state edges: a
    /// connected-to-disconnected edge marks every axis with a
    /// communications fault; the recovery edge takes no axis-wide action
    /// since each axis clears its own fault on its next successful poll.
    fn handle_transport_outcome(&mut self, ok: bool) {
        if !ok && self.connected {
            self.connected = false;
            warn!(controller = self.name.as_str(), "controller link lost");
            for axis in self.axes.iter_mut().flatten() {
                axis.mark_comms_fault(&mut self.store);
                self.store.notify_callbacks(axis.index());
            }
        } else if ok && !self.connected {
            self.connected = true;
            info!(controller = self.name.as_str(), "controller link restored");
        }
        self.store.notify_callbacks(0);
    }

    fn finish_operation(&mut self, result: Result<(), DriverError>) -> Result<(), DriverError> {
        if let Err(e) = &result {
            self.handle_transport_outcome(!e.is_communication());
        } else {
            self.handle_transport_outcome(true);
        }
        result
    }

    // ── Polling ──

    /// Poll one axis.
    pub fn poll_axis(&mut self, index: usize) -> Result<PollResult, DriverError> {
        let axis = Self::axis_mut(&mut self.axes, index)?;
        let result = axis.poll(&mut self.transport, &mut self.store);
        self.handle_transport_outcome(result.ok);
        Ok(result)
    }

    /// Poll every axis in order. Returns true when any axis is moving,
    /// which selects the faster poll cadence.
    pub fn poll_all(&mut self) -> bool {
        let mut any_moving = false;
        for index in 0..self.axes.len() {
            if self.axes[index].is_none() {
                continue;
            }
            match self.poll_axis(index) {
                Ok(result) => any_moving |= result.moving,
                Err(e) => debug!(axis = index, error = %e, "poll dispatch failed"),
            }
        }
        any_moving
    }

    // ── User operations ──

    /// Move one axis.
    pub fn move_axis(
        &mut self,
        index: usize,
        position_nm: f64,
        relative: bool,
        velocity_nm_s: f64,
        acceleration_nm_s2: f64,
    ) -> Result<(), DriverError> {
        let axis = Self::axis_mut(&mut self.axes, index)?;
        let result = axis.move_to(
            &mut self.transport,
            &mut self.store,
            position_nm,
            relative,
            velocity_nm_s,
            acceleration_nm_s2,
        );
        self.finish_operation(result)
    }

    /// Home one axis, then drain the error queue the sequence may have
    /// produced.
    pub fn home_axis(
        &mut self,
        index: usize,
        forwards: bool,
        velocity_nm_s: f64,
        acceleration_nm_s2: f64,
    ) -> Result<(), DriverError> {
        let axis = Self::axis_mut(&mut self.axes, index)?;
        let result = axis.home(&mut self.transport, forwards, velocity_nm_s, acceleration_nm_s2);
        let result = self.finish_operation(result);
        self.drain_errors();
        result
    }

    /// Stop one axis.
    pub fn stop_axis(&mut self, index: usize) -> Result<(), DriverError> {
        let axis = Self::axis_mut(&mut self.axes, index)?;
        let result = axis.stop(&mut self.transport);
        self.finish_operation(result)
    }

    /// Redefine one axis's current position.
    pub fn set_axis_position(&mut self, index: usize, position_nm: f64) -> Result<(), DriverError> {
        let axis = Self::axis_mut(&mut self.axes, index)?;
        let result = axis.set_position(&mut self.transport, position_nm);
        self.finish_operation(result)
    }

    /// Enable or disable one axis's drive amplifier.
    pub fn set_axis_closed_loop(&mut self, index: usize, enabled: bool) -> Result<(), DriverError> {
        let axis = Self::axis_mut(&mut self.axes, index)?;
        let result = axis.set_closed_loop(&mut self.transport, enabled);
        self.finish_operation(result)
    }

    /// Write an integer parameter for one axis.
    pub fn write_axis_integer(
        &mut self,
        index: usize,
        id: ParamId,
        value: i32,
    ) -> Result<(), DriverError> {
        let axis = Self::axis_mut(&mut self.axes, index)?;
        let result = axis.write_integer(&mut self.transport, &mut self.store, id, value);
        self.finish_operation(result)
    }

    /// Write a floating-point parameter for one axis.
    pub fn write_axis_double(
        &mut self,
        index: usize,
        id: ParamId,
        value: f64,
    ) -> Result<(), DriverError> {
        let axis = Self::axis_mut(&mut self.axes, index)?;
        axis.write_double(&mut self.store, id, value);
        Ok(())
    }

    // ── Error queue ──

    /// Drain the controller's error queue, decoding each entry to text.
    /// Returns the decoded messages; a failure of the initiating count
    /// query drains nothing and raises the controller-wide status-problem
    /// flag instead.
    pub fn drain_errors(&mut self) -> Vec<String> {
        let mut messages = Vec::new();
        let count = self
            .transport
            .query_line(&scpi::query_error_count())
            .and_then(|r| scpi::parse_int_reply(&r).map_err(DriverError::from));
        let count = match count {
            Ok(n) => n,
            Err(e) => {
                warn!(controller = self.name.as_str(), error = %e, "error count query failed");
                self.store.set_integer(0, ParamId::StatusProblem, 1);
                self.store.notify_callbacks(0);
                self.handle_transport_outcome(!e.is_communication());
                return messages;
            }
        };

        let mut problem = false;
        for _ in 0..count {
            let code = self
                .transport
                .query_line(&scpi::query_next_error())
                .and_then(|r| scpi::parse_int_reply(&r).map_err(DriverError::from));
            match code {
                Ok(code) => {
                    let message = decode_error_code(code as i32);
                    warn!(controller = self.name.as_str(), code, message = message.as_str(), "device error");
                    messages.push(message);
                }
                Err(e) => {
                    warn!(controller = self.name.as_str(), error = %e, "error drain stopped early");
                    problem = true;
                    self.handle_transport_outcome(!e.is_communication());
                    break;
                }
            }
        }
        self.store.set_integer(0, ParamId::StatusProblem, i32::from(problem));
        self.store.notify_callbacks(0);
        messages
    }

    // ── Diagnostics ──

    /// Verbose diagnostic snapshot of one axis, followed by an error-queue
    /// drain since diagnostic queries can themselves queue device errors.
    pub fn axis_report(&mut self, index: usize) -> Result<AxisReport, DriverError> {
        let axis = Self::axis_mut(&mut self.axes, index)?;
        let report = axis.report(&mut self.transport);
        self.drain_errors();
        Ok(report)
    }
}

impl<T: Transport, S: ParameterStore> std::fmt::Display for Mcs2Controller<T, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "MCS2 motor driver {}, numAxes={}, moving poll period={}ms, idle poll period={}ms",
            self.name,
            self.config.num_axes,
            self.config.moving_poll_period_ms,
            self.config.idle_poll_period_ms
        )
    }
}

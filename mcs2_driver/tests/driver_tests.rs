//! Integration tests driving a controller against a scripted transport.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;

use mcs2_driver::{
    ControllerConfig, DriverError, MemoryParamStore, Mcs2Controller, ParamId, ParameterStore,
    TcpTransport, Transport,
};

/// Transport double: replies come from a per-command script, every sent line
/// is recorded, and failures can be injected per command or globally.
#[derive(Clone, Default)]
struct MockTransport {
    replies: Rc<RefCell<HashMap<String, VecDeque<String>>>>,
    sent: Rc<RefCell<Vec<String>>>,
    fail_all: Rc<Cell<bool>>,
    fail_commands: Rc<RefCell<Vec<String>>>,
    fail_after: Rc<RefCell<HashMap<String, usize>>>,
}

impl MockTransport {
    fn new() -> Self {
        let transport = Self::default();
        transport.reply(":DEV:SNUM?", "MCS2-00001234");
        transport.reply(":SYST:ERR:COUN?", "0");
        transport
    }

    /// Script a reply for `command`. The last scripted reply repeats.
    fn reply(&self, command: &str, reply: &str) {
        self.replies
            .borrow_mut()
            .entry(command.to_string())
            .or_default()
            .push_back(reply.to_string());
    }

    fn set_reply(&self, command: &str, reply: &str) {
        self.replies
            .borrow_mut()
            .insert(command.to_string(), VecDeque::from([reply.to_string()]));
    }

    fn fail_command(&self, command: &str) {
        self.fail_commands.borrow_mut().push(command.to_string());
    }

    /// Let `command` succeed `allowed` more times, then time out.
    fn fail_command_after(&self, command: &str, allowed: usize) {
        self.fail_after.borrow_mut().insert(command.to_string(), allowed);
    }

    fn sent_lines(&self) -> Vec<String> {
        self.sent.borrow().clone()
    }

    fn count_sent(&self, line: &str) -> usize {
        self.sent.borrow().iter().filter(|s| s.as_str() == line).count()
    }

    fn check_failure(&self, command: &str) -> Result<(), DriverError> {
        if self.fail_all.get() || self.fail_commands.borrow().iter().any(|c| c == command) {
            return Err(DriverError::Timeout(command.to_string()));
        }
        if let Some(remaining) = self.fail_after.borrow_mut().get_mut(command) {
            if *remaining == 0 {
                return Err(DriverError::Timeout(command.to_string()));
            }
            *remaining -= 1;
        }
        Ok(())
    }
}

impl Transport for MockTransport {
    fn write_line(&mut self, line: &str) -> Result<(), DriverError> {
        self.check_failure(line)?;
        self.sent.borrow_mut().push(line.to_string());
        Ok(())
    }

    fn query_line(&mut self, line: &str) -> Result<String, DriverError> {
        self.check_failure(line)?;
        self.sent.borrow_mut().push(line.to_string());
        let mut replies = self.replies.borrow_mut();
        let queue = replies
            .get_mut(line)
            .unwrap_or_else(|| panic!("no scripted reply for {line:?}"));
        if queue.len() > 1 {
            Ok(queue.pop_front().unwrap())
        } else {
            Ok(queue.front().cloned().unwrap())
        }
    }
}

fn controller(
    num_axes: usize,
    transport: &MockTransport,
) -> Mcs2Controller<MockTransport, MemoryParamStore> {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let config = ControllerConfig { num_axes, ..Default::default() };
    Mcs2Controller::new("mcs2", config, transport.clone(), MemoryParamStore::new())
        .expect("construction against scripted transport")
}

// Status words built from the documented bit assignments.
const IDLE_READY: &str = "226"; // closed loop + sensor + calibrated + referenced
const MOVING_READY: &str = "225"; // actively moving + sensor + calibrated + referenced
const SENSOR_ONLY: &str = "32";

fn script_poll(transport: &MockTransport, axis: usize, state: &str) {
    transport.set_reply(&format!(":CHAN{axis}:STAT?"), state);
    transport.set_reply(&format!(":CHAN{axis}:POS?"), "123456750");
    transport.set_reply(&format!(":CHAN{axis}:POS:TARG?"), "123456000");
    transport.set_reply(&format!(":CHAN{axis}:AMPL?"), "1");
    transport.set_reply(&format!(":CHAN{axis}:PTYP?"), "301");
    transport.set_reply(&format!(":CHAN{axis}:MCLF?"), "6000");
}

#[test]
fn construction_reads_serial_number() {
    let transport = MockTransport::new();
    let controller = controller(1, &transport);
    assert_eq!(controller.serial_number(), "MCS2-00001234");
    assert!(transport.sent_lines().contains(&":DEV:SNUM?".to_string()));
    assert_eq!(controller.store().get_integer(0, ParamId::StatusProblem), Some(0));
}

#[test]
fn poll_publishes_decoded_state() {
    let transport = MockTransport::new();
    let mut controller = controller(1, &transport);
    script_poll(&transport, 0, IDLE_READY);

    let result = controller.poll_axis(0).unwrap();
    assert!(result.ok);
    assert!(!result.moving);

    let store = controller.store();
    assert_eq!(store.get_integer(0, ParamId::RawStatus), Some(226));
    assert_eq!(store.get_integer(0, ParamId::DoneMoving), Some(1));
    assert_eq!(store.get_integer(0, ParamId::Moving), Some(0));
    assert_eq!(store.get_integer(0, ParamId::SensorPresent), Some(1));
    assert_eq!(store.get_integer(0, ParamId::Homed), Some(1));
    assert_eq!(store.get_integer(0, ParamId::Calibrated), Some(1));
    assert_eq!(store.get_integer(0, ParamId::DrivePowerOn), Some(1));
    assert_eq!(store.get_integer(0, ParamId::PositionerType), Some(301));
    assert_eq!(store.get_integer(0, ParamId::MaxClosedLoopFrequency), Some(6000));
    assert_eq!(store.get_integer(0, ParamId::CommunicationError), Some(0));
    assert_eq!(store.get_double(0, ParamId::Position), Some(123456.75));
    assert_eq!(store.get_double(0, ParamId::TargetPosition), Some(123456.0));
    assert_eq!(store.get_string(0, ParamId::StatusText), Some(""));

    // The stored hold time is pushed once before the first status read.
    assert_eq!(transport.count_sent(":CHAN0:HOLD 4294967295"), 1);
}

#[test]
fn poll_while_moving_skips_idle_only_reads() {
    let transport = MockTransport::new();
    let mut controller = controller(1, &transport);
    script_poll(&transport, 0, MOVING_READY);

    let result = controller.poll_axis(0).unwrap();
    assert!(result.moving);
    assert_eq!(controller.store().get_integer(0, ParamId::DoneMoving), Some(0));
    assert_eq!(transport.count_sent(":CHAN0:MCLF?"), 0);
}

#[test]
fn unreferenced_axis_reports_not_homed() {
    let transport = MockTransport::new();
    let mut controller = controller(1, &transport);
    script_poll(&transport, 0, SENSOR_ONLY);

    controller.poll_axis(0).unwrap();
    assert_eq!(controller.store().get_string(0, ParamId::StatusText), Some("E: Axis not homed"));
    assert_eq!(controller.store().get_integer(0, ParamId::Homed), Some(0));
}

#[test]
fn poll_failure_repeats_initialization_on_recovery() {
    let transport = MockTransport::new();
    let mut controller = controller(1, &transport);
    script_poll(&transport, 0, IDLE_READY);

    assert!(controller.poll_axis(0).unwrap().ok);
    assert_eq!(transport.count_sent(":CHAN0:HOLD 4294967295"), 1);

    transport.fail_all.set(true);
    let result = controller.poll_axis(0).unwrap();
    assert!(!result.ok);
    assert!(!result.moving);
    assert_eq!(controller.store().get_integer(0, ParamId::CommunicationError), Some(1));
    assert_eq!(controller.store().get_string(0, ParamId::StatusText), Some("E: Communication"));

    // Recovery repeats the one-time hold-time push.
    transport.fail_all.set(false);
    assert!(controller.poll_axis(0).unwrap().ok);
    assert_eq!(transport.count_sent(":CHAN0:HOLD 4294967295"), 2);
    assert_eq!(controller.store().get_integer(0, ParamId::CommunicationError), Some(0));
}

#[test]
fn link_loss_marks_every_axis() {
    let transport = MockTransport::new();
    let mut controller = controller(3, &transport);
    script_poll(&transport, 0, IDLE_READY);

    assert!(controller.poll_axis(0).unwrap().ok);
    let counts_before: Vec<u64> =
        (0..3).map(|axis| controller.store().notification_count(axis)).collect();

    transport.fail_all.set(true);
    controller.poll_axis(0).unwrap();

    // Axes 1 and 2 were never polled, yet the edge marks them too, and each
    // flag change comes with its own callback dispatch.
    for axis in 0..3 {
        assert_eq!(
            controller.store().get_integer(axis, ParamId::CommunicationError),
            Some(1),
            "axis {axis}"
        );
        assert!(
            controller.store().notification_count(axis) > counts_before[axis],
            "axis {axis} flag changed without a callback dispatch"
        );
    }
}

#[test]
fn closed_loop_move_command_sequence() {
    let transport = MockTransport::new();
    let mut controller = controller(1, &transport);
    script_poll(&transport, 0, IDLE_READY);
    controller.poll_axis(0).unwrap();

    controller.move_axis(0, 500.0, false, 1000.0, 10000.0).unwrap();

    let sent = transport.sent_lines();
    let tail: Vec<&str> = sent.iter().rev().take(4).rev().map(String::as_str).collect();
    assert_eq!(
        tail,
        [":CHAN0:MMOD 0", ":CHAN0:ACC 10000000", ":CHAN0:VEL 1000000", ":MOVE0 500000"]
    );
}

#[test]
fn relative_closed_loop_move_selects_relative_mode() {
    let transport = MockTransport::new();
    let mut controller = controller(1, &transport);
    script_poll(&transport, 0, IDLE_READY);
    controller.poll_axis(0).unwrap();

    controller.move_axis(0, -50.0, true, 1000.0, 10000.0).unwrap();
    assert_eq!(transport.count_sent(":CHAN0:MMOD 1"), 1);
    assert_eq!(transport.count_sent(":MOVE0 -50000"), 1);
}

#[test]
fn calibrated_open_loop_move_uses_asymmetric_step_sizes() {
    let transport = MockTransport::new();
    let mut controller = controller(1, &transport);

    controller.write_axis_integer(0, ParamId::OpenLoopEnable, 1).unwrap();
    controller.write_axis_double(0, ParamId::StepSizeForward, 50.0).unwrap();
    controller.write_axis_double(0, ParamId::StepSizeReverse, 40.0).unwrap();

    // +200 nm forward at 50 pm per step.
    controller.move_axis(0, 200.0, false, 500.0, 0.0).unwrap();
    assert_eq!(transport.count_sent(":CHAN0:MMOD 4"), 1);
    assert_eq!(transport.count_sent(":CHAN0:STEP:FREQ 10000"), 1);
    assert_eq!(transport.count_sent(":MOVE0 4000"), 1);

    // -200 nm reverse at 40 pm per step.
    controller.move_axis(0, -200.0, true, 500.0, 0.0).unwrap();
    assert_eq!(transport.count_sent(":MOVE0 -5000"), 1);
    assert_eq!(transport.count_sent(":CHAN0:STEP:FREQ 12500"), 1);
}

#[test]
fn zero_delta_open_loop_move_issues_no_commands() {
    let transport = MockTransport::new();
    let mut controller = controller(1, &transport);

    controller.write_axis_integer(0, ParamId::OpenLoopEnable, 1).unwrap();
    controller.write_axis_double(0, ParamId::StepSizeForward, 50.0).unwrap();
    controller.write_axis_double(0, ParamId::StepSizeReverse, 40.0).unwrap();

    controller.move_axis(0, 200.0, false, 500.0, 0.0).unwrap();
    let issued = transport.sent_lines().len();

    // Same absolute target again: nothing goes out.
    controller.move_axis(0, 200.0, false, 500.0, 0.0).unwrap();
    assert_eq!(transport.sent_lines().len(), issued);
    assert_eq!(controller.store().get_double(0, ParamId::TargetPosition), Some(200.0));
}

#[test]
fn legacy_open_loop_move_clamps_frequency() {
    let transport = MockTransport::new();
    let mut controller = controller(1, &transport);
    controller.write_axis_integer(0, ParamId::OpenLoopEnable, 1).unwrap();

    // No step-size calibration: position and velocity pass through as
    // steps and Hz, with the frequency clamped to the device ceiling.
    controller.move_axis(0, 3000.0, false, 50000.0, 0.0).unwrap();
    assert_eq!(transport.count_sent(":CHAN0:STEP:FREQ 20000"), 1);
    assert_eq!(transport.count_sent(":MOVE0 3000"), 1);
}

#[test]
fn home_command_sequence() {
    let transport = MockTransport::new();
    let mut controller = controller(1, &transport);

    controller.home_axis(0, false, 1000.0, 10000.0).unwrap();
    assert_eq!(transport.count_sent(":CHAN0:REF:OPT 5"), 1);
    assert_eq!(transport.count_sent(":REF0"), 1);

    controller.home_axis(0, true, 1000.0, 10000.0).unwrap();
    assert_eq!(transport.count_sent(":CHAN0:REF:OPT 4"), 1);
}

#[test]
fn stop_and_set_position() {
    let transport = MockTransport::new();
    let mut controller = controller(1, &transport);

    controller.stop_axis(0).unwrap();
    assert_eq!(transport.count_sent(":STOP0"), 1);

    controller.set_axis_position(0, 1500.0).unwrap();
    assert_eq!(transport.count_sent(":CHAN0:POS 1500000"), 1);

    controller.set_axis_closed_loop(0, true).unwrap();
    assert_eq!(transport.count_sent(":CHAN0:AMPL 1"), 1);
}

#[test]
fn parameter_writes_dispatch_device_commands() {
    let transport = MockTransport::new();
    let mut controller = controller(1, &transport);

    controller.write_axis_integer(0, ParamId::HoldTime, 100).unwrap();
    assert_eq!(transport.count_sent(":CHAN0:HOLD 100"), 1);

    controller.write_axis_integer(0, ParamId::Calibrate, 1).unwrap();
    assert_eq!(transport.count_sent(":CAL0"), 1);

    controller.write_axis_integer(0, ParamId::MaxClosedLoopFrequency, 6000).unwrap();
    assert_eq!(transport.count_sent(":CHAN0:MCLF:CURR 6000"), 1);

    controller.write_axis_integer(0, ParamId::PositionerType, 301).unwrap();
    assert_eq!(transport.count_sent(":CHAN0:PTYP 301"), 1);

    // Step frequency writes are clamped before going out.
    controller.write_axis_integer(0, ParamId::StepFrequency, 30000).unwrap();
    assert_eq!(transport.count_sent(":CHAN0:STEP:FREQ 20000"), 1);
    assert_eq!(controller.store().get_integer(0, ParamId::StepFrequency), Some(20000));

    // Unhandled identifiers are plain store writes, no device traffic.
    let issued = transport.sent_lines().len();
    controller.write_axis_integer(0, ParamId::Homed, 1).unwrap();
    assert_eq!(transport.sent_lines().len(), issued);
}

#[test]
fn drain_decodes_queued_errors() {
    let transport = MockTransport::new();
    let mut controller = controller(1, &transport);

    transport.set_reply(":SYST:ERR:COUN?", "2");
    transport.reply(":SYST:ERR?", "259");
    transport.reply(":SYST:ERR?", "-113");

    let messages = controller.drain_errors();
    assert_eq!(messages, ["No sensor present", "Command not exist"]);
    assert_eq!(controller.store().get_integer(0, ParamId::StatusProblem), Some(0));
}

#[test]
fn drain_pop_failure_raises_status_problem() {
    let transport = MockTransport::new();
    let mut controller = controller(1, &transport);

    transport.set_reply(":SYST:ERR:COUN?", "2");
    transport.reply(":SYST:ERR?", "259");
    transport.fail_command_after(":SYST:ERR?", 1);

    // First pop decodes, second times out: the partial drain still counts
    // as a failed one.
    let messages = controller.drain_errors();
    assert_eq!(messages, ["No sensor present"]);
    assert_eq!(controller.store().get_integer(0, ParamId::StatusProblem), Some(1));
}

#[test]
fn drain_count_failure_raises_status_problem() {
    let transport = MockTransport::new();
    let mut controller = controller(1, &transport);

    transport.fail_command(":SYST:ERR:COUN?");
    let messages = controller.drain_errors();
    assert!(messages.is_empty());
    assert_eq!(controller.store().get_integer(0, ParamId::StatusProblem), Some(1));
}

#[test]
fn masked_axis_is_never_created() {
    let transport = MockTransport::new();
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let config =
        ControllerConfig { num_axes: 2, unused_axis_mask: 0b10, ..Default::default() };
    let mut controller =
        Mcs2Controller::new("mcs2", config, transport.clone(), MemoryParamStore::new()).unwrap();

    assert!(matches!(controller.stop_axis(1), Err(DriverError::AxisNotConfigured(1))));
    assert_eq!(controller.store().get_integer(1, ParamId::HoldTime), None);

    // poll_all only touches the configured axis.
    script_poll(&transport, 0, IDLE_READY);
    assert!(!controller.poll_all());
}

#[test]
fn operations_on_unknown_axis_are_rejected() {
    let transport = MockTransport::new();
    let mut controller = controller(1, &transport);
    assert!(matches!(controller.stop_axis(5), Err(DriverError::AxisNotConfigured(5))));
    assert!(matches!(controller.poll_axis(1), Err(DriverError::AxisNotConfigured(1))));
}

#[test]
fn poll_loop_exits_when_cleared() {
    use std::sync::Arc;
    use std::sync::atomic::AtomicBool;

    let transport = MockTransport::new();
    let mut controller = controller(1, &transport);
    let running = Arc::new(AtomicBool::new(false));
    mcs2_driver::poller::run_poll_loop(&mut controller, &running);
}

#[test]
fn tcp_transport_uses_configured_timeout() {
    use std::time::{Duration, Instant};

    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap().to_string();

    let config = ControllerConfig { command_timeout_ms: 50, ..Default::default() };
    let mut transport = TcpTransport::connect_with_config(&addr, &config).unwrap();
    let (_peer, _) = listener.accept().unwrap();

    // The peer never replies: the query has to time out after the
    // configured 50 ms, not block.
    let start = Instant::now();
    let err = transport.query_line(":DEV:SNUM?").unwrap_err();
    assert!(matches!(err, DriverError::Timeout(_)));
    assert!(start.elapsed() < Duration::from_secs(2));
}

#[test]
fn axis_report_collects_diagnostics() {
    let transport = MockTransport::new();
    let mut controller = controller(1, &transport);
    script_poll(&transport, 0, IDLE_READY);
    transport.set_reply(":CHAN0:PTYP:NAME?", "SL...S1SS");
    transport.set_reply(":CHAN0:VEL?", "1000000");
    transport.set_reply(":CHAN0:ACC?", "10000000");
    transport.set_reply(":CHAN0:FERR?", "12");
    transport.set_reply(":CHAN0:ERR?", "0");
    transport.set_reply(":CHAN0:TEMP?", "29");
    transport.set_reply(":CHAN0:RLIM:MIN?", "-5000000000");
    transport.set_reply(":CHAN0:RLIM:MAX?", "5000000000");
    transport.set_reply(":CHAN0:INP:THR?", "100");
    transport.set_reply(":CHAN0:INP:DEL?", "50");
    transport.set_reply(":CHAN0:TUN:THR:TRE?", "200");
    transport.set_reply(":CHAN0:HOLD?", "4294967295");
    transport.set_reply(":CHAN0:STEP:AMPL?", "65535");
    transport.set_reply(":CHAN0:DIAG:CLF:MAX?", "5800");
    transport.set_reply(":CHAN0:DIAG:CLF:AVER?", "4100");

    let report = controller.axis_report(0).unwrap();
    assert_eq!(report.positioner_type, Some(301));
    assert_eq!(report.positioner_name.as_deref(), Some("SL...S1SS"));
    assert_eq!(report.state, Some(226));
    assert_eq!(report.temperature, Some(29));
    assert_eq!(report.range_limit_max, Some(5000000000));
    assert_eq!(report.step_amplitude, Some(65535));

    let text = report.to_string();
    assert!(text.contains("axis 0"));
    assert!(text.contains("positioner name SL...S1SS"));
    assert!(text.contains("state 226 0xE2"));
}

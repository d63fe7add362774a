//! Poll loop driving a controller at a movement-dependent cadence.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::controller::Mcs2Controller;
use crate::params::ParameterStore;
use crate::transport::Transport;

/// Run the poll loop until `running` is cleared. Polls every axis each
/// cycle, then sleeps the remainder of the moving or idle period depending
/// on whether anything is in motion.
pub fn run_poll_loop<T: Transport, S: ParameterStore>(
    controller: &mut Mcs2Controller<T, S>,
    running: &Arc<AtomicBool>,
) {
    let moving_period = Duration::from_millis(controller.config().moving_poll_period_ms);
    let idle_period = Duration::from_millis(controller.config().idle_poll_period_ms);
    info!(?moving_period, ?idle_period, "poll loop started");

    while running.load(Ordering::Relaxed) {
        let cycle_start = Instant::now();
        let any_moving = controller.poll_all();
        let period = if any_moving { moving_period } else { idle_period };

        let elapsed = cycle_start.elapsed();
        if elapsed < period {
            std::thread::sleep(period - elapsed);
        } else {
            debug!(?elapsed, ?period, "poll cycle overran its period");
        }
    }
    info!("poll loop stopped");
}

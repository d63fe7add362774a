//! Driver-level error type.

use mcs2_protocol::ProtocolError;
use thiserror::Error;

/// Errors surfaced by the driver layer.
#[derive(Debug, Error)]
pub enum DriverError {
    /// Socket-level failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The controller did not reply within the configured timeout.
    #[error("Timed out waiting for reply to {0:?}")]
    Timeout(String),

    /// The connection to the controller is down.
    #[error("Controller disconnected")]
    Disconnected,

    /// The controller replied with something we could not decode.
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Invalid or unreadable configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// An operation addressed an axis that was never created.
    #[error("Axis {0} is not configured")]
    AxisNotConfigured(usize),
}

impl DriverError {
    /// Whether this error indicates the controller link itself is unhealthy,
    /// as opposed to a single malformed exchange.
    pub fn is_communication(&self) -> bool {
        matches!(
            self,
            DriverError::Io(_) | DriverError::Timeout(_) | DriverError::Disconnected
        )
    }
}

//! Device error-code table and reply parse errors.

use thiserror::Error;

/// Errors produced while interpreting a reply line from the controller.
#[derive(Debug, Clone, Error)]
pub enum ProtocolError {
    /// The reply could not be parsed as an integer.
    #[error("Expected integer reply, got {0:?}")]
    BadInteger(String),

    /// The reply could not be parsed as a floating-point number.
    #[error("Expected numeric reply, got {0:?}")]
    BadFloat(String),
}

/// Decode a device error code into a human-readable message.
///
/// The controller pushes diagnostic codes into an error queue that the
/// driver drains with `:SYST:ERR?`. This table covers the codes the driver
/// has been observed to raise; anything else falls through to a generic
/// message carrying the raw code. Total, never fails.
pub fn decode_error_code(code: i32) -> String {
    match code {
        0 => "No error".to_string(),
        34 => "Invalid channel index".to_string(),
        259 => "No sensor present".to_string(),
        -101 => "Invalid character".to_string(),
        -103 => "Invalid separator".to_string(),
        -104 => "Data type error".to_string(),
        -108 => "Parameter not allowed".to_string(),
        -109 => "Missing parameter".to_string(),
        -113 => "Command not exist".to_string(),
        -151 => "Invalid string".to_string(),
        -350 => "Queue overflow".to_string(),
        -363 => "Buffer overrun".to_string(),
        other => format!("Unable to decode {other}"),
    }
}

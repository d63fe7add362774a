//! # MCS2 Protocol Library
//!
//! Pure protocol layer for the MCS2 multi-axis positioner controller.
//!
//! The controller speaks a line-oriented ASCII protocol: colon-delimited,
//! channel-addressed commands terminated by CRLF, single-token replies.
//! This crate contains everything about that protocol that needs no I/O
//! and no mutable state:
//!
//! # Module Structure
//!
//! - [`consts`] - Protocol constants (unit scaling, frequency bounds, sentinels)
//! - [`units`] - User-unit / device-unit conversion and open-loop step arithmetic
//! - [`status`] - Channel status bitword decoding
//! - [`errors`] - Device error-code table and reply parse errors
//! - [`scpi`] - Command string synthesis and reply parsing
//!
//! The stateful side (transport, axis controller, poll cycle) lives in the
//! `mcs2_driver` crate.

#![deny(warnings)]
#![deny(missing_docs)]

pub mod consts;
pub mod errors;
pub mod scpi;
pub mod status;
pub mod units;

// Re-export key types for convenience
pub use crate::errors::{decode_error_code, ProtocolError};
pub use crate::scpi::{MoveMode, ReferenceOptions};
pub use crate::status::{ChannelState, StatusFlags};

//! Motion driver for multi-axis piezo positioner controllers speaking a
//! line-oriented, SCPI-style ASCII protocol over TCP.
//!
//! The driver sits between a generic parameter store above and the raw
//! line transport below:
//!
//! ```text
//!   parameter store (values + callbacks)
//!            ▲
//!            │ set/get/notify
//!   ┌────────┴─────────┐
//!   │  Mcs2Controller  │  connection health, error queue
//!   │   ┌──────────┐   │
//!   │   │  Axis ×N │   │  poll / move / home / stop
//!   │   └──────────┘   │
//!   └────────┬─────────┘
//!            │ one command line in flight at a time
//!            ▼
//!   transport (CRLF-framed TCP)
//! ```
//!
//! Command synthesis, status decoding and unit scaling live in the
//! `mcs2_protocol` crate; this crate owns the runtime state and the
//! algorithms that tie them together.

#![deny(warnings)]
#![deny(missing_docs)]

pub mod axis;
pub mod config;
pub mod controller;
pub mod error;
pub mod params;
pub mod poller;
pub mod transport;

pub use crate::axis::{Axis, AxisReport, PollResult};
pub use crate::config::ControllerConfig;
pub use crate::controller::Mcs2Controller;
pub use crate::error::DriverError;
pub use crate::params::{MemoryParamStore, ParamId, ParameterStore};
pub use crate::transport::{TcpTransport, Transport};

//! Line-oriented transport to the controller.
//!
//! The protocol is ASCII with CRLF framing in both directions. The transport
//! is deliberately dumb: it ships one line out and optionally reads one line
//! back, leaving command synthesis and reply decoding to the layers above.

use std::io::{BufRead, BufReader, Write};
use std::net::TcpStream;
use std::time::Duration;

use tracing::trace;

use crate::config::ControllerConfig;
use crate::error::DriverError;

/// A bidirectional line channel to the controller.
pub trait Transport {
    /// Send one command line. Framing is added here.
    fn write_line(&mut self, line: &str) -> Result<(), DriverError>;

    /// Send one query line and read the single reply line, stripped of
    /// framing.
    fn query_line(&mut self, line: &str) -> Result<String, DriverError>;
}

/// TCP transport with a per-exchange read timeout.
pub struct TcpTransport {
    stream: TcpStream,
    reader: BufReader<TcpStream>,
}

impl TcpTransport {
    /// Connect to the controller at `addr` (e.g. `"192.168.1.200:55551"`).
    pub fn connect(addr: &str, timeout: Duration) -> Result<Self, DriverError> {
        let stream = TcpStream::connect(addr)?;
        stream.set_read_timeout(Some(timeout))?;
        stream.set_nodelay(true)?;
        let reader = BufReader::new(stream.try_clone()?);
        Ok(Self { stream, reader })
    }

    /// Connect using the reply timeout from `config`.
    pub fn connect_with_config(addr: &str, config: &ControllerConfig) -> Result<Self, DriverError> {
        Self::connect(addr, Duration::from_millis(config.command_timeout_ms))
    }

    fn read_reply(&mut self, command: &str) -> Result<String, DriverError> {
        let mut line = String::new();
        let n = match self.reader.read_line(&mut line) {
            Ok(n) => n,
            Err(e)
                if e.kind() == std::io::ErrorKind::WouldBlock
                    || e.kind() == std::io::ErrorKind::TimedOut =>
            {
                return Err(DriverError::Timeout(command.to_string()));
            }
            Err(e) => return Err(DriverError::Io(e)),
        };
        if n == 0 {
            return Err(DriverError::Disconnected);
        }
        Ok(line.trim_end_matches(['\r', '\n']).to_string())
    }
}

impl Transport for TcpTransport {
    fn write_line(&mut self, line: &str) -> Result<(), DriverError> {
        trace!(command = line, "tx");
        self.stream.write_all(line.as_bytes())?;
        self.stream.write_all(b"\r\n")?;
        Ok(())
    }

    fn query_line(&mut self, line: &str) -> Result<String, DriverError> {
        self.write_line(line)?;
        let reply = self.read_reply(line)?;
        trace!(command = line, reply = reply.as_str(), "rx");
        Ok(reply)
    }
}

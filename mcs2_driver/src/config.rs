//! Controller configuration, loaded from a TOML file.

use std::path::Path;

use mcs2_protocol::consts::MAX_CHANNELS;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::DriverError;

fn default_moving_poll_period_ms() -> u64 {
    250
}

fn default_idle_poll_period_ms() -> u64 {
    1000
}

fn default_command_timeout_ms() -> u64 {
    1000
}

fn default_unused_axis_mask() -> u32 {
    0
}

/// Static configuration of one controller instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerConfig {
    /// Number of channels to drive.
    pub num_axes: usize,

    /// Poll period while any axis is moving.
    #[serde(default = "default_moving_poll_period_ms")]
    pub moving_poll_period_ms: u64,

    /// Poll period while every axis is idle.
    #[serde(default = "default_idle_poll_period_ms")]
    pub idle_poll_period_ms: u64,

    /// Per-exchange reply timeout.
    #[serde(default = "default_command_timeout_ms")]
    pub command_timeout_ms: u64,

    /// Bitmask of axes to skip while polling, bit N for axis N.
    #[serde(default = "default_unused_axis_mask")]
    pub unused_axis_mask: u32,
}

impl ControllerConfig {
    /// Load and validate a configuration file.
    pub fn load(path: &Path) -> Result<Self, DriverError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| DriverError::Config(format!("cannot read {}: {e}", path.display())))?;
        let config: Self = toml::from_str(&text)
            .map_err(|e| DriverError::Config(format!("cannot parse {}: {e}", path.display())))?;
        config.validate()?;
        info!(path = %path.display(), num_axes = config.num_axes, "configuration loaded");
        Ok(config)
    }

    /// Check invariants that serde cannot express.
    pub fn validate(&self) -> Result<(), DriverError> {
        if self.num_axes == 0 || self.num_axes > MAX_CHANNELS {
            return Err(DriverError::Config(format!(
                "num_axes must be in 1..={MAX_CHANNELS}, got {}",
                self.num_axes
            )));
        }
        if self.moving_poll_period_ms == 0 || self.idle_poll_period_ms == 0 {
            return Err(DriverError::Config("poll periods must be nonzero".to_string()));
        }
        if self.command_timeout_ms == 0 {
            return Err(DriverError::Config("command_timeout_ms must be nonzero".to_string()));
        }
        Ok(())
    }
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            num_axes: 1,
            moving_poll_period_ms: default_moving_poll_period_ms(),
            idle_poll_period_ms: default_idle_poll_period_ms(),
            command_timeout_ms: default_command_timeout_ms(),
            unused_axis_mask: default_unused_axis_mask(),
        }
    }
}

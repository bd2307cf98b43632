//! Configuration loading using Figment
//!
//! Configuration is loaded from:
//! 1. `config/rot2prog.toml` (or an explicit path)
//! 2. Environment variables prefixed with `ROT2PROG_`, nested keys split on `__`
//!
//! Every section has defaults, so a missing or empty file yields a usable
//! configuration.
//!
//! # Example
//! ```no_run
//! use rot2prog_tracker::config::RotorConfig;
//!
//! let config = RotorConfig::load()?;
//! config.validate()?;
//! println!("Serial port: {}", config.serial.port);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! Override from the environment:
//! `ROT2PROG_SERIAL__PORT=/dev/ttyUSB1 ROT2PROG_LIMITS__MAX_EL=90 rot2prog status`

use crate::error::{RotorError, RotorResult};
use crate::hardware::rot2prog::{Limits, LinkTiming};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default configuration file location.
pub const DEFAULT_CONFIG_PATH: &str = "config/rot2prog.toml";

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RotorConfig {
    /// Application settings
    pub application: ApplicationConfig,
    /// Serial line settings
    pub serial: SerialConfig,
    /// Software travel limits
    pub limits: Limits,
    /// Connection establishment
    pub supervisor: SupervisorConfig,
    /// Trajectory execution
    pub tracking: TrackingConfig,
    /// Periodic position reporting
    pub status: StatusConfig,
}

/// Application-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplicationConfig {
    /// Logging level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Log output format (pretty, compact, json)
    pub log_format: String,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
        }
    }
}

/// Serial line configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    /// Serial port path (e.g., "/dev/ttyUSB0", "COM3")
    pub port: String,
    /// Baud rate
    pub baud_rate: u32,
    /// Response timeout in milliseconds
    pub timeout_ms: u64,
    /// Inter-byte timeout in milliseconds
    pub inter_byte_timeout_ms: u64,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: "/dev/ttyUSB0".to_string(),
            baud_rate: 9600,
            timeout_ms: 5000,
            inter_byte_timeout_ms: 100,
        }
    }
}

/// Connection supervisor configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisorConfig {
    /// Delay between connection attempts in milliseconds
    pub retry_delay_ms: u64,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            retry_delay_ms: 5000,
        }
    }
}

/// Tracking scheduler configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
    /// Waypoint polling interval in milliseconds
    pub poll_interval_ms: u64,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1000,
        }
    }
}

/// Status monitor configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatusConfig {
    /// Status polling interval in milliseconds
    pub poll_interval_ms: u64,
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1000,
        }
    }
}

impl RotorConfig {
    /// Load configuration from the default file and environment variables
    pub fn load() -> Result<Self, figment::Error> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load configuration from a specific file path
    ///
    /// A missing file is not an error; defaults and environment still apply.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, figment::Error> {
        Figment::from(Serialized::defaults(RotorConfig::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("ROT2PROG_").split("__"))
            .extract()
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> RotorResult<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.application.log_level.to_lowercase().as_str()) {
            return Err(RotorError::Configuration(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                valid_levels.join(", ")
            )));
        }

        let valid_formats = ["pretty", "compact", "json"];
        if !valid_formats.contains(&self.application.log_format.to_lowercase().as_str()) {
            return Err(RotorError::Configuration(format!(
                "Invalid log_format '{}'. Must be one of: {}",
                self.application.log_format,
                valid_formats.join(", ")
            )));
        }

        if self.serial.port.trim().is_empty() {
            return Err(RotorError::Configuration("serial.port is empty".into()));
        }
        if self.serial.baud_rate == 0 {
            return Err(RotorError::Configuration(
                "serial.baud_rate must be positive".into(),
            ));
        }

        for (name, value) in [
            ("serial.timeout_ms", self.serial.timeout_ms),
            ("serial.inter_byte_timeout_ms", self.serial.inter_byte_timeout_ms),
            ("supervisor.retry_delay_ms", self.supervisor.retry_delay_ms),
            ("tracking.poll_interval_ms", self.tracking.poll_interval_ms),
            ("status.poll_interval_ms", self.status.poll_interval_ms),
        ] {
            if value == 0 {
                return Err(RotorError::Configuration(format!("{name} must be positive")));
            }
        }

        let limits = &self.limits;
        if !(limits.min_az <= limits.max_az) {
            return Err(RotorError::Configuration(format!(
                "limits.min_az ({}) exceeds limits.max_az ({})",
                limits.min_az, limits.max_az
            )));
        }
        if !(limits.min_el <= limits.max_el) {
            return Err(RotorError::Configuration(format!(
                "limits.min_el ({}) exceeds limits.max_el ({})",
                limits.min_el, limits.max_el
            )));
        }

        Ok(())
    }

    /// Serial read deadlines.
    pub fn link_timing(&self) -> LinkTiming {
        LinkTiming {
            response_timeout: Duration::from_millis(self.serial.timeout_ms),
            inter_byte_timeout: Duration::from_millis(self.serial.inter_byte_timeout_ms),
        }
    }

    /// Delay between connection attempts.
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.supervisor.retry_delay_ms)
    }

    /// Tracking scheduler polling cadence.
    pub fn tracking_interval(&self) -> Duration {
        Duration::from_millis(self.tracking.poll_interval_ms)
    }

    /// Status monitor polling cadence.
    pub fn status_interval(&self) -> Duration {
        Duration::from_millis(self.status.poll_interval_ms)
    }
}

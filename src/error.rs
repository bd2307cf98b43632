//! Error types for rotator control.
//!
//! `RotorError` keeps the three protocol-level failure kinds apart so callers can
//! branch on recoverability without inspecting message text:
//!
//! - **`ReadTimeout`**: nothing came back before the response deadline. The
//!   device is unreachable or busy; the caller may simply try again.
//! - **`Packet`**: bytes came back but they were not a valid response. This means
//!   the framing is out of step with the device; the controller drains the line
//!   before its next exchange.
//! - **`OutOfRange`**: the requested position violates the configured limits.
//!   This is a caller error and never reaches the wire.
//!
//! The remaining variants cover the channel itself (`Io`, `Connect`) and
//! configuration problems.

use std::fmt;
use thiserror::Error;

/// Convenience alias for results using the rotor error type.
pub type RotorResult<T> = std::result::Result<T, RotorError>;

/// Rotator axis, used to report which bound a request violated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    /// Horizontal pointing angle.
    Azimuth,
    /// Vertical pointing angle.
    Elevation,
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Axis::Azimuth => write!(f, "Azimuth"),
            Axis::Elevation => write!(f, "Elevation"),
        }
    }
}

/// Primary error type for rotator communication and control.
#[derive(Error, Debug)]
pub enum RotorError {
    /// No bytes arrived within the response deadline.
    #[error("Response timed out")]
    ReadTimeout,

    /// A response arrived but was incomplete or carried an invalid resolution.
    #[error("Packet error: {0}")]
    Packet(String),

    /// Requested position is outside the configured limits.
    #[error("{axis} of {value}° is out of range [{min}°, {max}°]")]
    OutOfRange {
        /// Offending axis.
        axis: Axis,
        /// Requested angle in degrees.
        value: f64,
        /// Configured lower bound.
        min: f64,
        /// Configured upper bound.
        max: f64,
    },

    /// Position cannot be expressed as four ASCII digits at the current resolution.
    #[error("Encoded position {value} does not fit in four digits")]
    Unencodable {
        /// The scaled value that overflowed.
        value: i64,
    },

    /// Angle is NaN or infinite and has no wire encoding.
    #[error("Angle {value} is not a finite number")]
    NonFiniteAngle {
        /// The rejected angle.
        value: f64,
    },

    /// Write, flush or read failure on the serial channel.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The serial port could not be opened.
    #[error("Failed to open serial port: {0}")]
    Connect(String),

    /// Configuration values parsed but are not usable.
    #[error("Configuration validation error: {0}")]
    Configuration(String),
}

impl RotorError {
    /// Whether repeating the same request later can reasonably succeed.
    ///
    /// Timeouts and channel failures are transient. Malformed packets point at a
    /// framing desync and out-of-range requests will fail identically every time.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RotorError::ReadTimeout | RotorError::Io(_) | RotorError::Connect(_)
        )
    }
}

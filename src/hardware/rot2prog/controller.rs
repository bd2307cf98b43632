//! ROT2Prog rotator controller
//!
//! `RotorController` is the only component that talks to the device. Every
//! operation runs as one exclusive exchange on the serial channel: write a
//! command packet, then (for commands the device answers) read exactly one
//! response packet within the configured deadline. Callers queue on the
//! exchange lock; bytes from two requests never interleave.
//!
//! The controller never retries. Timeouts and malformed packets go straight
//! back to the caller, who decides whether to try again.
//!
//! # Example Usage
//!
//! ```no_run
//! use rot2prog_tracker::hardware::rot2prog::{LinkTiming, Limits, RotorController};
//! use rot2prog_tracker::hardware::serial::open_serial_async;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let port = open_serial_async("/dev/ttyUSB0", 9600).await?;
//!     let rotor = RotorController::new(Box::new(port), Limits::default(), LinkTiming::default());
//!
//!     let position = rotor.status().await?;
//!     println!("Az {:.1}° El {:.1}°", position.azimuth, position.elevation);
//!
//!     rotor.set(180.0, 45.0).await?;
//!     Ok(())
//! }
//! ```

use super::limits::{Limits, LimitsGuard};
use super::protocol::{self, Command, JogDirection, ResponsePacket, Resolution, RESPONSE_LEN};
use crate::error::{RotorError, RotorResult};
use crate::hardware::capabilities::Positioner;
use crate::hardware::serial::{drain_serial_buffer, DynSerial};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::Serialize;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::sync::Mutex;
use tracing::instrument;

/// Antenna pointing angles in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Position {
    /// Azimuth in degrees.
    pub azimuth: f64,
    /// Elevation in degrees.
    pub elevation: f64,
}

/// Last state reported by the device.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RotorState {
    /// Last reported azimuth.
    pub azimuth: f64,
    /// Last reported elevation.
    pub elevation: f64,
    /// Last reported resolution; 1 until the first successful response.
    pub resolution: Resolution,
}

impl Default for RotorState {
    fn default() -> Self {
        Self {
            azimuth: 0.0,
            elevation: 0.0,
            resolution: Resolution::default(),
        }
    }
}

/// Serial read deadlines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkTiming {
    /// Time allowed for the first response byte.
    pub response_timeout: Duration,
    /// Gap after which a partial packet is abandoned.
    pub inter_byte_timeout: Duration,
}

impl Default for LinkTiming {
    fn default() -> Self {
        Self {
            response_timeout: Duration::from_secs(5),
            inter_byte_timeout: Duration::from_millis(100),
        }
    }
}

struct Link {
    port: DynSerial,
    /// Set while an exchange is in flight or after it failed; the next
    /// exchange drains the line first.
    desynced: bool,
}

/// Driver for a ROT2Prog azimuth/elevation controller.
///
/// Share it behind an `Arc`; all methods take `&self`.
pub struct RotorController {
    link: Mutex<Link>,
    state: RwLock<RotorState>,
    limits: LimitsGuard,
    timing: LinkTiming,
}

impl RotorController {
    /// Wrap an open serial channel.
    pub fn new(port: DynSerial, limits: Limits, timing: LinkTiming) -> Self {
        Self {
            link: Mutex::new(Link {
                port,
                desynced: false,
            }),
            state: RwLock::new(RotorState::default()),
            limits: LimitsGuard::new(limits),
            timing,
        }
    }

    /// Query the current position. Refreshes the stored resolution.
    #[instrument(skip(self), level = "debug")]
    pub async fn status(&self) -> RotorResult<Position> {
        self.query(Command::Status).await
    }

    /// Stop in place and report where the rotator stopped.
    #[instrument(skip(self), level = "debug")]
    pub async fn stop(&self) -> RotorResult<Position> {
        self.query(Command::Stop).await
    }

    /// Command an absolute position.
    ///
    /// Checked against the limits first; a violation returns `OutOfRange` and
    /// nothing is written. The device does not answer set commands, so this
    /// returns as soon as the packet is on the wire.
    #[instrument(skip(self), level = "debug")]
    pub async fn set(&self, azimuth: f64, elevation: f64) -> RotorResult<()> {
        self.limits.validate(azimuth, elevation)?;
        self.exchange(Command::Set { azimuth, elevation }).await?;
        Ok(())
    }

    /// Start driving the motors in a direction until `jog_stop`.
    #[instrument(skip(self), level = "debug")]
    pub async fn jog(&self, direction: JogDirection) -> RotorResult<Position> {
        self.query(Command::Jog(direction)).await
    }

    /// Stop a jog.
    #[instrument(skip(self), level = "debug")]
    pub async fn jog_stop(&self) -> RotorResult<Position> {
        self.query(Command::JogStop).await
    }

    /// Set motor power in percent. Values are clamped to 0..=100.
    #[instrument(skip(self), level = "debug")]
    pub async fn set_motor_power(&self, motor1: i32, motor2: i32) -> RotorResult<()> {
        let motor1 = motor1.clamp(0, 100) as u8;
        let motor2 = motor2.clamp(0, 100) as u8;
        self.exchange(Command::MotorPower { motor1, motor2 }).await?;
        tracing::info!(motor1, motor2, "Motor power set");
        Ok(())
    }

    /// Reset all controller settings.
    #[instrument(skip(self), level = "debug")]
    pub async fn clear_all_settings(&self) -> RotorResult<()> {
        self.exchange(Command::ClearSettings).await?;
        tracing::info!("Controller settings cleared");
        Ok(())
    }

    /// Current software limits.
    pub fn limits(&self) -> Limits {
        self.limits.get()
    }

    /// Replace the software limits.
    pub fn set_limits(&self, limits: Limits) {
        self.limits.set(limits);
    }

    /// Last observed resolution in pulses per degree.
    pub fn resolution(&self) -> Resolution {
        self.state.read().resolution
    }

    /// Last state reported by the device.
    pub fn state(&self) -> RotorState {
        *self.state.read()
    }

    async fn query(&self, command: Command) -> RotorResult<Position> {
        match self.exchange(command).await? {
            Some(response) => Ok(Position {
                azimuth: response.azimuth,
                elevation: response.elevation,
            }),
            None => Err(RotorError::Packet(format!(
                "No response decoded for {command:?}"
            ))),
        }
    }

    /// One request/response round trip under the exchange lock.
    async fn exchange(&self, command: Command) -> RotorResult<Option<ResponsePacket>> {
        let mut link = self.link.lock().await;

        if link.desynced {
            let discarded = drain_serial_buffer(
                &mut link.port,
                self.timing.inter_byte_timeout,
                self.timing.response_timeout,
            )
            .await;
            tracing::debug!(discarded, "Drained serial line before exchange");
            link.desynced = false;
        }

        // Read under the exchange lock so no response can land in between
        let resolution = self.state.read().resolution;
        let packet = command.encode(resolution)?;

        // Stays set if this future is dropped between the write and the reply,
        // so a late response is drained instead of answering the next command
        link.desynced = true;
        let result = Self::transact(&mut link.port, &packet, command, &self.timing).await;
        if result.is_ok() {
            link.desynced = false;
        }

        let Some(response) = result? else {
            return Ok(None);
        };
        let mut state = self.state.write();
        state.azimuth = response.azimuth;
        state.elevation = response.elevation;
        state.resolution = response.resolution;
        tracing::debug!(
            azimuth = response.azimuth,
            elevation = response.elevation,
            resolution = response.resolution.pulses_per_degree(),
            "Received response"
        );
        Ok(Some(response))
    }

    async fn transact(
        port: &mut DynSerial,
        packet: &protocol::CommandPacket,
        command: Command,
        timing: &LinkTiming,
    ) -> RotorResult<Option<ResponsePacket>> {
        port.write_all(packet.as_bytes()).await?;
        port.flush().await?;
        tracing::debug!(packet = %packet, "Command packet sent");

        if !command.expects_response() {
            return Ok(None);
        }

        let bytes = read_response(port, timing).await?;
        tracing::trace!(bytes = ?bytes, "Response packet received");
        protocol::decode(&bytes).map(Some)
    }
}

#[async_trait]
impl Positioner for RotorController {
    async fn point(&self, azimuth: f64, elevation: f64) -> RotorResult<()> {
        self.set(azimuth, elevation).await
    }
}

/// Read up to one response packet.
///
/// The first byte gets the full response timeout; after that, a gap longer than
/// the inter-byte timeout ends the read so a truncated packet is reported
/// instead of waiting out the full deadline.
async fn read_response<R: AsyncRead + Unpin>(
    port: &mut R,
    timing: &LinkTiming,
) -> RotorResult<Vec<u8>> {
    let mut buf = [0u8; RESPONSE_LEN];
    let mut filled = 0;

    while filled < RESPONSE_LEN {
        let deadline = if filled == 0 {
            timing.response_timeout
        } else {
            timing.inter_byte_timeout
        };

        match tokio::time::timeout(deadline, port.read(&mut buf[filled..])).await {
            Ok(Ok(0)) => break,
            Ok(Ok(n)) => filled += n,
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::TimedOut => break,
            Ok(Err(e)) => return Err(e.into()),
            Err(_) => break,
        }
    }

    Ok(buf[..filled].to_vec())
}

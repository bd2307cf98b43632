//! Connection establishment.
//!
//! The supervisor opens the serial port and performs one status round trip.
//! Any failure (open error, timeout, malformed packet) waits a fixed delay and
//! tries again, forever: a controller that is still powering up eventually
//! answers. Only a controller that has answered is handed out.
//!
//! ```text
//! Disconnected -> Connecting -> Connected
//!       ^             |
//!       +-- failure --+
//! ```

use crate::config::RotorConfig;
use crate::error::RotorResult;
use crate::hardware::rot2prog::{Limits, LinkTiming, Position, RotorController};
use crate::hardware::serial::{open_serial_async, DynSerial};
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};

/// Link state as seen by the supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ConnectionState {
    /// No link, or the last attempt failed.
    Disconnected,
    /// An attempt is in progress.
    Connecting,
    /// The controller answered a status query.
    Connected,
}

/// Something that can produce a fresh serial channel.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Open the channel.
    async fn open(&self) -> RotorResult<DynSerial>;

    /// Human-readable target for logs.
    fn describe(&self) -> String;
}

/// Opens a real serial port.
#[derive(Debug, Clone)]
pub struct SerialConnector {
    port: String,
    baud_rate: u32,
}

impl SerialConnector {
    /// Connector for `port` at `baud_rate`.
    pub fn new(port: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            port: port.into(),
            baud_rate,
        }
    }
}

#[async_trait]
impl Connector for SerialConnector {
    async fn open(&self) -> RotorResult<DynSerial> {
        let stream = open_serial_async(&self.port, self.baud_rate).await?;
        Ok(Box::new(stream))
    }

    fn describe(&self) -> String {
        format!("{} @ {} baud", self.port, self.baud_rate)
    }
}

/// Brings up the link to the controller.
pub struct ConnectionSupervisor<C> {
    connector: C,
    limits: Limits,
    timing: LinkTiming,
    retry_delay: Duration,
    state: watch::Sender<ConnectionState>,
}

impl ConnectionSupervisor<SerialConnector> {
    /// Supervisor for the serial port named in the configuration.
    pub fn from_config(config: &RotorConfig) -> Self {
        Self::new(
            SerialConnector::new(config.serial.port.clone(), config.serial.baud_rate),
            config.limits,
            config.link_timing(),
            config.retry_delay(),
        )
    }
}

impl<C: Connector> ConnectionSupervisor<C> {
    /// Create a supervisor.
    pub fn new(connector: C, limits: Limits, timing: LinkTiming, retry_delay: Duration) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            connector,
            limits,
            timing,
            retry_delay,
            state,
        }
    }

    /// Current link state.
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Follow link state changes. The receiver keeps the final state after
    /// `connect` returns.
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Retry until the controller answers, then hand it out.
    ///
    /// Consumes the supervisor: the link is established once per process.
    pub async fn connect(self) -> Arc<RotorController> {
        let target = self.connector.describe();
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            self.state.send_replace(ConnectionState::Connecting);
            info!(attempt, target = %target, "Connecting to rotor controller");

            match self.try_connect().await {
                Ok((controller, position)) => {
                    self.state.send_replace(ConnectionState::Connected);
                    info!(
                        attempt,
                        azimuth = position.azimuth,
                        elevation = position.elevation,
                        resolution = %controller.resolution(),
                        "Rotor controller connected"
                    );
                    return Arc::new(controller);
                }
                Err(e) => {
                    self.state.send_replace(ConnectionState::Disconnected);
                    warn!(
                        attempt,
                        target = %target,
                        error = %e,
                        retry_in_ms = self.retry_delay.as_millis() as u64,
                        "Connection attempt failed"
                    );
                    tokio::time::sleep(self.retry_delay).await;
                }
            }
        }
    }

    async fn try_connect(&self) -> RotorResult<(RotorController, Position)> {
        let port = self.connector.open().await?;
        let controller = RotorController::new(port, self.limits, self.timing);
        let position = controller.status().await?;
        Ok((controller, position))
    }
}

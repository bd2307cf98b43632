//! Periodic position reporting.
//!
//! Polls `status()` at a fixed interval and publishes the position on a
//! `watch` channel, only when it differs from the last published one.
//! Failed polls are logged and skipped; the next tick tries again.

use crate::hardware::rot2prog::{Position, RotorController};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info_span, warn, Instrument};

/// Background status poller.
pub struct StatusMonitor {
    positions: watch::Receiver<Option<Position>>,
    shutdown: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

impl StatusMonitor {
    /// Start polling `controller` every `poll_interval`.
    pub fn spawn(controller: Arc<RotorController>, poll_interval: Duration) -> Self {
        let (positions_tx, positions) = watch::channel(None);
        let (shutdown, mut shutdown_rx) = oneshot::channel();

        let handle = tokio::spawn(async move {
            let mut ticker = interval(poll_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    _ = ticker.tick() => {}
                }

                match controller.status().await {
                    Ok(position) => {
                        let changed = positions_tx.send_if_modified(|current| {
                            if *current == Some(position) {
                                false
                            } else {
                                *current = Some(position);
                                true
                            }
                        });
                        if changed {
                            debug!(
                                azimuth = position.azimuth,
                                elevation = position.elevation,
                                "Rotor position changed"
                            );
                        }
                    }
                    Err(e) => warn!(error = %e, "Status poll failed"),
                }
            }
            debug!("Status monitor stopped");
        }
        .instrument(info_span!("status_monitor")));

        Self {
            positions,
            shutdown,
            handle,
        }
    }

    /// Receiver that wakes on every position change.
    pub fn subscribe(&self) -> watch::Receiver<Option<Position>> {
        self.positions.clone()
    }

    /// Most recently published position.
    pub fn latest(&self) -> Option<Position> {
        *self.positions.borrow()
    }

    /// Stop polling. An in-flight status exchange completes first.
    pub async fn stop(self) {
        let _ = self.shutdown.send(());
        if let Err(e) = self.handle.await {
            warn!(error = %e, "Status monitor task ended abnormally");
        }
    }
}

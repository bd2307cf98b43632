//! Time sources for waypoint scheduling.

use chrono::{DateTime, Utc};
use std::fmt::Debug;
use tokio::time::Instant;

/// Source of "now" for comparing against waypoint timestamps.
pub trait Clock: Send + Sync + Debug {
    /// Current wall-clock time.
    fn now(&self) -> DateTime<Utc>;
}

/// The system wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Wall time anchored at creation and advanced by tokio's monotonic clock.
///
/// Immune to wall-clock steps during a pass, and follows paused/advanced
/// time under `tokio::time::pause`.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    wall_anchor: DateTime<Utc>,
    mono_anchor: Instant,
}

impl MonotonicClock {
    /// Anchor at the current wall time.
    pub fn new() -> Self {
        Self::starting_at(Utc::now())
    }

    /// Anchor at an arbitrary wall time.
    pub fn starting_at(wall_anchor: DateTime<Utc>) -> Self {
        Self {
            wall_anchor,
            mono_anchor: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> DateTime<Utc> {
        let elapsed = chrono::Duration::from_std(self.mono_anchor.elapsed())
            .unwrap_or_else(|_| chrono::Duration::zero());
        self.wall_anchor + elapsed
    }
}

//! Trajectory execution.
//!
//! A [`TrackingScheduler`] runs at most one job per positioner. A job points
//! at its first waypoint immediately, then wakes every poll interval and
//! commands each remaining waypoint whose time has come, in the order given.
//!
//! Starting a job while another runs cancels the old one and waits for its
//! task to finish before the new job issues anything, so two jobs never
//! command the rotor concurrently.

use crate::hardware::capabilities::Positioner;
use crate::tracking::clock::Clock;
use crate::tracking::waypoint::Waypoint;
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

/// Identifier of a tracking job.
pub type JobId = Uuid;

/// Lifecycle of a tracking job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum JobState {
    /// No job has been started.
    Idle,
    /// Commanding waypoints.
    Running,
    /// Every waypoint was processed.
    Completed,
    /// Stopped before the last waypoint.
    Cancelled,
}

impl JobState {
    /// Whether the job has stopped issuing commands.
    pub fn is_finished(self) -> bool {
        matches!(self, JobState::Completed | JobState::Cancelled)
    }
}

/// Progress and outcome of a job.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackingReport {
    /// Job this report belongs to.
    pub job_id: JobId,
    /// Current state.
    pub state: JobState,
    /// Waypoints commanded successfully.
    pub commanded: usize,
    /// Waypoints whose command failed.
    pub failed: usize,
    /// Waypoints not yet processed.
    pub remaining: usize,
}

struct ActiveJob {
    id: JobId,
    cancel: watch::Sender<bool>,
    handle: JoinHandle<TrackingReport>,
    progress: watch::Receiver<TrackingReport>,
}

impl ActiveJob {
    async fn cancel_and_join(self) -> TrackingReport {
        // Receiver gone means the task already returned
        let _ = self.cancel.send(true);
        match self.handle.await {
            Ok(report) => report,
            Err(e) => {
                warn!(job = %self.id, error = %e, "Tracking task ended abnormally");
                let mut report = self.progress.borrow().clone();
                report.state = JobState::Cancelled;
                report
            }
        }
    }
}

/// Runs tracking jobs against a single positioner.
pub struct TrackingScheduler {
    positioner: Arc<dyn Positioner>,
    clock: Arc<dyn Clock>,
    poll_interval: Duration,
    active: Mutex<Option<ActiveJob>>,
    progress: RwLock<Option<watch::Receiver<TrackingReport>>>,
}

impl std::fmt::Debug for TrackingScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrackingScheduler")
            .field("clock", &self.clock)
            .field("poll_interval", &self.poll_interval)
            .field("state", &self.state())
            .finish()
    }
}

impl TrackingScheduler {
    /// Create a scheduler that drives `positioner`, comparing waypoint times
    /// against `clock` every `poll_interval`.
    pub fn new(
        positioner: Arc<dyn Positioner>,
        clock: Arc<dyn Clock>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            positioner,
            clock,
            poll_interval,
            active: Mutex::new(None),
            progress: RwLock::new(None),
        }
    }

    /// Start a job, replacing any job already running.
    ///
    /// The previous job is cancelled and has stopped commanding before this
    /// returns. The rotor stays wherever the previous job left it.
    pub async fn start(&self, waypoints: Vec<Waypoint>) -> JobId {
        let mut active = self.active.lock().await;

        if let Some(previous) = active.take() {
            let id = previous.id;
            let report = previous.cancel_and_join().await;
            info!(job = %id, state = ?report.state, "Replaced tracking job");
        }

        let id = Uuid::new_v4();
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let (progress_tx, progress_rx) = watch::channel(TrackingReport {
            job_id: id,
            state: JobState::Running,
            commanded: 0,
            failed: 0,
            remaining: waypoints.len(),
        });

        let job = Job {
            waypoints,
            positioner: Arc::clone(&self.positioner),
            clock: Arc::clone(&self.clock),
            poll_interval: self.poll_interval,
            cancel: cancel_rx,
            progress: progress_tx,
        };
        let handle = tokio::spawn(job.run().instrument(info_span!("tracking", job = %id)));

        *self.progress.write() = Some(progress_rx.clone());
        *active = Some(ActiveJob {
            id,
            cancel: cancel_tx,
            handle,
            progress: progress_rx,
        });

        id
    }

    /// Cancel the running job and wait until it stops.
    ///
    /// Returns the final report of the job, or `None` if no job was ever
    /// started. A job that already finished reports its own outcome.
    pub async fn cancel(&self) -> Option<TrackingReport> {
        let mut active = self.active.lock().await;
        match active.take() {
            Some(job) => Some(job.cancel_and_join().await),
            None => self.progress(),
        }
    }

    /// Wait for the current job to finish on its own (or be cancelled).
    pub async fn wait(&self) -> Option<TrackingReport> {
        let mut rx = self.progress.read().clone()?;
        let finished = rx
            .wait_for(|report| report.state.is_finished())
            .await
            .map(|report| report.clone());
        Some(finished.unwrap_or_else(|_| rx.borrow().clone()))
    }

    /// State of the most recent job, `Idle` if none.
    pub fn state(&self) -> JobState {
        self.progress
            .read()
            .as_ref()
            .map(|rx| rx.borrow().state)
            .unwrap_or(JobState::Idle)
    }

    /// Live progress of the most recent job.
    pub fn progress(&self) -> Option<TrackingReport> {
        self.progress.read().as_ref().map(|rx| rx.borrow().clone())
    }
}

struct Job {
    waypoints: Vec<Waypoint>,
    positioner: Arc<dyn Positioner>,
    clock: Arc<dyn Clock>,
    poll_interval: Duration,
    cancel: watch::Receiver<bool>,
    progress: watch::Sender<TrackingReport>,
}

impl Job {
    async fn run(mut self) -> TrackingReport {
        let mut report = self.progress.borrow().clone();
        let mut pending = std::mem::take(&mut self.waypoints);
        info!(waypoints = pending.len(), "Tracking started");

        // Head toward the first target right away, whatever its time
        if !pending.is_empty() {
            let first = pending.remove(0);
            self.command(&first, &mut report).await;
            report.remaining = pending.len();
            self.progress.send_replace(report.clone());
        }

        let mut cancelled = false;
        'track: loop {
            if cancelled || *self.cancel.borrow() {
                cancelled = true;
                break;
            }
            if pending.is_empty() {
                break;
            }

            let now = self.clock.now();
            let mut i = 0;
            while i < pending.len() {
                if now >= pending[i].time {
                    let waypoint = pending.remove(i);
                    self.command(&waypoint, &mut report).await;
                    report.remaining = pending.len();
                    self.progress.send_replace(report.clone());
                } else {
                    i += 1;
                }

                if *self.cancel.borrow() {
                    cancelled = true;
                    break 'track;
                }
            }

            if pending.is_empty() {
                break;
            }

            tokio::select! {
                _ = tokio::time::sleep(self.poll_interval) => {}
                changed = self.cancel.changed() => {
                    // Scheduler dropped: nobody can cancel or observe us any more
                    if changed.is_err() {
                        cancelled = true;
                    }
                }
            }
        }

        report.remaining = pending.len();
        report.state = if cancelled {
            JobState::Cancelled
        } else {
            JobState::Completed
        };

        match report.state {
            JobState::Cancelled => info!(
                commanded = report.commanded,
                failed = report.failed,
                remaining = report.remaining,
                "Tracking cancelled"
            ),
            _ => info!(
                commanded = report.commanded,
                failed = report.failed,
                "Tracking completed"
            ),
        }

        self.progress.send_replace(report.clone());
        report
    }

    async fn command(&self, waypoint: &Waypoint, report: &mut TrackingReport) {
        debug!(
            time = %waypoint.time,
            azimuth = waypoint.azimuth,
            elevation = waypoint.elevation,
            "Commanding waypoint"
        );
        match self
            .positioner
            .point(waypoint.azimuth, waypoint.elevation)
            .await
        {
            Ok(()) => report.commanded += 1,
            Err(e) => {
                report.failed += 1;
                warn!(
                    time = %waypoint.time,
                    azimuth = waypoint.azimuth,
                    elevation = waypoint.elevation,
                    error = %e,
                    "Waypoint command failed, continuing"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{RotorError, RotorResult};
    use crate::tracking::clock::MonotonicClock;
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use tracing_test::traced_test;

    #[derive(Default)]
    struct Recorder {
        calls: parking_lot::Mutex<Vec<(f64, f64)>>,
    }

    #[async_trait]
    impl Positioner for Recorder {
        async fn point(&self, azimuth: f64, elevation: f64) -> RotorResult<()> {
            self.calls.lock().push((azimuth, elevation));
            if azimuth < 0.0 {
                return Err(RotorError::ReadTimeout);
            }
            Ok(())
        }
    }

    fn scheduler(recorder: &Arc<Recorder>) -> (TrackingScheduler, chrono::DateTime<Utc>) {
        let t0 = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let scheduler = TrackingScheduler::new(
            recorder.clone(),
            Arc::new(MonotonicClock::starting_at(t0)),
            Duration::from_secs(1),
        );
        (scheduler, t0)
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_before_first_job() {
        let recorder = Arc::new(Recorder::default());
        let (scheduler, _) = scheduler(&recorder);
        assert_eq!(scheduler.state(), JobState::Idle);
        assert!(scheduler.wait().await.is_none());
        assert!(scheduler.cancel().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_job_completes() {
        let recorder = Arc::new(Recorder::default());
        let (scheduler, _) = scheduler(&recorder);

        let id = scheduler.start(vec![]).await;
        let report = scheduler.wait().await.unwrap();
        assert_eq!(report.job_id, id);
        assert_eq!(report.state, JobState::Completed);
        assert!(recorder.calls.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    #[traced_test]
    async fn test_failed_waypoint_does_not_stop_job() {
        let recorder = Arc::new(Recorder::default());
        let (scheduler, t0) = scheduler(&recorder);

        scheduler
            .start(vec![
                Waypoint::new(t0, 10.0, 20.0),
                Waypoint::new(t0 + chrono::Duration::seconds(1), -1.0, 20.0),
                Waypoint::new(t0 + chrono::Duration::seconds(2), 12.0, 20.0),
            ])
            .await;

        let report = scheduler.wait().await.unwrap();
        assert_eq!(report.state, JobState::Completed);
        assert_eq!(report.commanded, 2);
        assert_eq!(report.failed, 1);
        assert_eq!(report.remaining, 0);
        assert_eq!(recorder.calls.lock().len(), 3);
        assert!(logs_contain("Waypoint command failed"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_overdue_waypoints_sent_in_given_order() {
        let recorder = Arc::new(Recorder::default());
        let (scheduler, t0) = scheduler(&recorder);
        let earlier = t0 - chrono::Duration::seconds(30);

        scheduler
            .start(vec![
                Waypoint::new(earlier, 1.0, 1.0),
                Waypoint::new(earlier + chrono::Duration::seconds(2), 3.0, 3.0),
                Waypoint::new(earlier + chrono::Duration::seconds(1), 2.0, 2.0),
            ])
            .await;

        scheduler.wait().await.unwrap();
        assert_eq!(
            *recorder.calls.lock(),
            vec![(1.0, 1.0), (3.0, 3.0), (2.0, 2.0)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_progress_tracks_remaining() {
        let recorder = Arc::new(Recorder::default());
        let (scheduler, t0) = scheduler(&recorder);

        scheduler
            .start(vec![
                Waypoint::new(t0, 1.0, 1.0),
                Waypoint::new(t0 + chrono::Duration::seconds(60), 2.0, 2.0),
            ])
            .await;
        tokio::time::sleep(Duration::from_millis(10)).await;

        let progress = scheduler.progress().unwrap();
        assert_eq!(progress.state, JobState::Running);
        assert_eq!(progress.commanded, 1);
        assert_eq!(progress.remaining, 1);

        let report = scheduler.cancel().await.unwrap();
        assert_eq!(report.state, JobState::Cancelled);
        assert_eq!(report.remaining, 1);
    }
}

//! Trajectory tracking: waypoints, time sources and the job scheduler.

pub mod clock;
pub mod scheduler;
pub mod waypoint;

pub use clock::{Clock, MonotonicClock, SystemClock};
pub use scheduler::{JobId, JobState, TrackingReport, TrackingScheduler};
pub use waypoint::{load_waypoints, parse_waypoints, GroundTrack, Waypoint};

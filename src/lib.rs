//! # ROT2Prog Tracker
//!
//! Control of a ROT2Prog-class azimuth/elevation antenna rotator over its
//! serial link, and execution of precomputed tracking passes.
//!
//! ## Crate Structure
//!
//! - **`hardware`**: The serial channel, the binary command/response protocol,
//!   software travel limits and [`RotorController`](hardware::rot2prog::RotorController),
//!   the single owner of the device link.
//! - **`supervisor`**: Brings the link up at startup, retrying until the
//!   controller answers.
//! - **`tracking`**: Waypoints, time sources and the
//!   [`TrackingScheduler`](tracking::TrackingScheduler) that commands them on time.
//! - **`status_monitor`**: Periodic status polling that publishes position changes.
//! - **`config`**: Figment-based configuration (TOML file + `ROT2PROG_` environment).
//! - **`logging`**: `tracing-subscriber` setup.
//! - **`error`**: The `RotorError` type shared by every layer.

pub mod config;
pub mod error;
pub mod hardware;
pub mod logging;
pub mod status_monitor;
pub mod supervisor;
pub mod tracking;

pub use error::{RotorError, RotorResult};

//! Hardware Capabilities
//!
//! Small capability traits that let higher layers drive a rotator without
//! depending on the concrete driver. The tracking scheduler only needs to
//! point the antenna, so it takes an `Arc<dyn Positioner>`; tests substitute
//! a recording implementation.

use crate::error::RotorResult;
use async_trait::async_trait;

/// Capability: Absolute Pointing
///
/// Devices that can be commanded to an azimuth/elevation position.
///
/// # Contract
/// - Angles are in degrees
/// - `point` initiates motion and may return before the device arrives
/// - Out-of-range requests fail without moving the device
///
/// # Thread Safety
/// - Requires `&self`; implementations serialise device access internally
#[async_trait]
pub trait Positioner: Send + Sync {
    /// Command the device toward an absolute position.
    async fn point(&self, azimuth: f64, elevation: f64) -> RotorResult<()>;
}

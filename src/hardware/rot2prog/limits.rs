//! Software travel limits checked before every set command.

use crate::error::{Axis, RotorError, RotorResult};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Allowed azimuth/elevation range in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Limits {
    /// Minimum azimuth.
    pub min_az: f64,
    /// Maximum azimuth.
    pub max_az: f64,
    /// Minimum elevation.
    pub min_el: f64,
    /// Maximum elevation.
    pub max_el: f64,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            min_az: -180.0,
            max_az: 540.0,
            min_el: -15.0,
            max_el: 195.0,
        }
    }
}

impl Limits {
    /// Check a position against these bounds. Bounds are inclusive.
    pub fn check(&self, azimuth: f64, elevation: f64) -> RotorResult<()> {
        // NaN fails both comparisons, so test for containment rather than violation
        if !(self.min_az..=self.max_az).contains(&azimuth) {
            return Err(RotorError::OutOfRange {
                axis: Axis::Azimuth,
                value: azimuth,
                min: self.min_az,
                max: self.max_az,
            });
        }
        if !(self.min_el..=self.max_el).contains(&elevation) {
            return Err(RotorError::OutOfRange {
                axis: Axis::Elevation,
                value: elevation,
                min: self.min_el,
                max: self.max_el,
            });
        }
        Ok(())
    }
}

/// Shared holder for the active limits.
///
/// Reads are frequent (one per set) and never wait on serial I/O.
#[derive(Debug, Default)]
pub struct LimitsGuard {
    limits: RwLock<Limits>,
}

impl LimitsGuard {
    /// Create a guard starting from the given bounds.
    pub fn new(limits: Limits) -> Self {
        Self {
            limits: RwLock::new(limits),
        }
    }

    /// Current bounds.
    pub fn get(&self) -> Limits {
        *self.limits.read()
    }

    /// Replace the bounds.
    pub fn set(&self, limits: Limits) {
        tracing::debug!(?limits, "Rotor limits updated");
        *self.limits.write() = limits;
    }

    /// Validate a requested position against the current bounds.
    pub fn validate(&self, azimuth: f64, elevation: f64) -> RotorResult<()> {
        self.limits.read().check(azimuth, elevation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_bounds() {
        let guard = LimitsGuard::default();
        assert_eq!(
            guard.get(),
            Limits {
                min_az: -180.0,
                max_az: 540.0,
                min_el: -15.0,
                max_el: 195.0
            }
        );
    }

    #[test]
    fn test_bounds_are_inclusive() {
        let guard = LimitsGuard::default();
        assert!(guard.validate(-180.0, -15.0).is_ok());
        assert!(guard.validate(540.0, 195.0).is_ok());
        assert!(guard.validate(0.0, 90.0).is_ok());
    }

    #[test]
    fn test_reports_violating_axis() {
        let guard = LimitsGuard::default();

        match guard.validate(540.1, 0.0) {
            Err(RotorError::OutOfRange { axis, value, max, .. }) => {
                assert_eq!(axis, Axis::Azimuth);
                assert_eq!(value, 540.1);
                assert_eq!(max, 540.0);
            }
            other => panic!("expected azimuth violation, got {other:?}"),
        }

        match guard.validate(0.0, -15.5) {
            Err(RotorError::OutOfRange { axis, min, .. }) => {
                assert_eq!(axis, Axis::Elevation);
                assert_eq!(min, -15.0);
            }
            other => panic!("expected elevation violation, got {other:?}"),
        }
    }

    #[test]
    fn test_nan_is_rejected() {
        let guard = LimitsGuard::default();
        assert!(guard.validate(f64::NAN, 0.0).is_err());
        assert!(guard.validate(0.0, f64::NAN).is_err());
    }

    #[test]
    fn test_reconfigured_bounds_apply() {
        let guard = LimitsGuard::default();
        guard.set(Limits {
            min_az: 0.0,
            max_az: 360.0,
            min_el: 0.0,
            max_el: 90.0,
        });

        assert!(guard.validate(-1.0, 10.0).is_err());
        assert!(guard.validate(10.0, 91.0).is_err());
        assert!(guard.validate(359.0, 89.0).is_ok());
    }
}

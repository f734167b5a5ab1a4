//! Semantic unit types for the solver's public inputs
//!
//! Newtype wrappers keep heights, speeds and time steps from being mixed up at
//! the API boundary. Inner loops work on raw `f32` arrays; these types only
//! appear where the host hands values in or reads diagnostics out.
//!
//! # Usage
//! ```
//! use microflow_core::core_types::units::{Meters, MetersPerSecond, Seconds};
//!
//! let height = Meters::new(10.0);
//! let speed = MetersPerSecond::new(4.0);
//! let dt: Seconds = height / speed;
//! assert!((*dt - 2.5).abs() < 1e-6);
//! ```

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::ops::{Deref, Div};

/// Compare f32 values with total ordering using Rust's built-in `total_cmp`
#[inline]
fn f32_total_cmp(a: f32, b: f32) -> Ordering {
    a.total_cmp(&b)
}

/// Implements the ordering and deref shared by every unit type
macro_rules! unit_common {
    ($name:ident) => {
        impl Eq for $name {}

        impl PartialOrd for $name {
            fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
                Some(self.cmp(other))
            }
        }

        impl Ord for $name {
            fn cmp(&self, other: &Self) -> Ordering {
                f32_total_cmp(self.0, other.0)
            }
        }

        impl Deref for $name {
            type Target = f32;
            #[inline]
            fn deref(&self) -> &f32 {
                &self.0
            }
        }
    };
}

// ============================================================================
// DISTANCE
// ============================================================================

/// Distance or height in meters (non-negative)
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[repr(transparent)]
pub struct Meters(f32);

unit_common!(Meters);

impl Meters {
    /// Create a new distance in meters
    #[inline]
    #[must_use]
    #[track_caller]
    pub const fn new(value: f32) -> Self {
        assert!(value >= 0.0, "Meters::new: negative distance is invalid");
        Meters(value)
    }
}

// Cross-type operation: distance / velocity = time
impl Div<MetersPerSecond> for Meters {
    type Output = Seconds;
    fn div(self, rhs: MetersPerSecond) -> Seconds {
        Seconds(self.0 / rhs.0)
    }
}

// ============================================================================
// VELOCITY
// ============================================================================

/// Velocity in meters per second (signed, component or speed)
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[repr(transparent)]
pub struct MetersPerSecond(f32);

unit_common!(MetersPerSecond);

impl MetersPerSecond {
    /// Create a new velocity
    #[inline]
    #[must_use]
    pub const fn new(value: f32) -> Self {
        MetersPerSecond(value)
    }

    /// Magnitude, never below `floor`
    #[inline]
    #[must_use]
    pub fn floored_abs(self, floor: f32) -> MetersPerSecond {
        MetersPerSecond(self.0.abs().max(floor))
    }
}

// ============================================================================
// TIME
// ============================================================================

/// Time span in seconds (non-negative)
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[repr(transparent)]
pub struct Seconds(f32);

unit_common!(Seconds);

impl Seconds {
    /// Create a new time span
    #[inline]
    #[must_use]
    #[track_caller]
    pub const fn new(value: f32) -> Self {
        assert!(value >= 0.0, "Seconds::new: negative time span is invalid");
        Seconds(value)
    }

    /// Get the raw f32 value
    #[inline]
    #[must_use]
    pub fn value(self) -> f32 {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_meters_ordering() {
        let a = Meters::new(3.0);
        let b = Meters::new(12.0);
        assert_eq!(a.max(b), b);
        assert!(a < b);
        assert_eq!(*b, 12.0);
    }

    #[test]
    fn test_distance_over_speed() {
        let dt = Meters::new(5.0) / MetersPerSecond::new(2.0);
        assert_eq!(dt, Seconds::new(2.5));
        assert_eq!(dt.min(Seconds::new(1.0)).value(), 1.0);
    }

    #[test]
    fn test_floored_speed() {
        assert_eq!(*MetersPerSecond::new(-0.001).floored_abs(0.01), 0.01);
        assert_eq!(*MetersPerSecond::new(-3.0).floored_abs(0.01), 3.0);
    }

    #[test]
    #[should_panic(expected = "negative distance")]
    fn test_negative_meters_rejected() {
        let _ = Meters::new(-1.0);
    }
}

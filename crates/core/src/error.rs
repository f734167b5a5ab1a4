//! Error types for solver construction and input validation.
//!
//! The solver stages themselves never fail: degenerate denominators are
//! floored and blocked columns are skipped. Errors only arise when the host
//! hands over inconsistent grids, observations or configuration.

use thiserror::Error;

/// Errors raised while building or validating solver inputs.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FlowError {
    /// Grid dimensions or spacings are unusable.
    #[error("Invalid grid: {0}")]
    InvalidGrid(String),

    /// An input array does not match the grid it is applied to.
    #[error("Dimension mismatch for {field}: expected {expected}, got {actual}")]
    DimensionMismatch {
        field: &'static str,
        expected: usize,
        actual: usize,
    },

    /// A wind observation is unusable for profile construction.
    #[error("Invalid observation: {0}")]
    InvalidObservation(String),

    /// Solver configuration is out of range.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A wind snapshot could not be decoded.
    #[error("Snapshot error: {0}")]
    Snapshot(String),
}

impl FlowError {
    /// Create a dimension mismatch error.
    pub fn dimension_mismatch(field: &'static str, expected: usize, actual: usize) -> Self {
        Self::DimensionMismatch {
            field,
            expected,
            actual,
        }
    }
}

/// Result alias used across the crate.
pub type FlowResult<T> = Result<T, FlowError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dimension_mismatch_message() {
        let err = FlowError::dimension_mismatch("building_heights", 16, 9);
        assert_eq!(
            err.to_string(),
            "Dimension mismatch for building_heights: expected 16, got 9"
        );
    }
}

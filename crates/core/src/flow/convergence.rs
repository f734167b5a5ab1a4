//! Convergence monitoring of the prognostic iterations

use crate::grid::{Field3, FlowState};
use serde::{Deserialize, Serialize};

/// How the prognostic loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ConvergenceStatus {
    /// The velocity change dropped below the tolerance
    Converged,
    /// The iteration budget ran out first
    #[default]
    IterationLimit,
}

/// Tracks the largest velocity change between successive iterations
#[derive(Debug, Clone)]
pub struct VelocityChange {
    u: Field3,
    v: Field3,
    w: Field3,
    history: Vec<f32>,
}

impl VelocityChange {
    /// Start tracking from the current velocities of `state`
    pub fn new(state: &FlowState) -> Self {
        Self {
            u: state.u.clone(),
            v: state.v.clone(),
            w: state.w.clone(),
            history: Vec::new(),
        }
    }

    /// Record the change since the last call and remember the new velocities
    pub fn update(&mut self, state: &FlowState) -> f32 {
        let change = state
            .u
            .max_abs_diff(&self.u)
            .max(state.v.max_abs_diff(&self.v))
            .max(state.w.max_abs_diff(&self.w));
        self.u.as_mut_slice().copy_from_slice(state.u.as_slice());
        self.v.as_mut_slice().copy_from_slice(state.v.as_slice());
        self.w.as_mut_slice().copy_from_slice(state.w.as_slice());
        self.history.push(change);
        change
    }

    /// Change recorded by the most recent update
    pub fn last(&self) -> Option<f32> {
        self.history.last().copied()
    }

    /// All recorded changes, oldest first
    pub fn history(&self) -> &[f32] {
        &self.history
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::GridGeometry;

    #[test]
    fn test_tracks_largest_component_change() {
        let geometry = GridGeometry::uniform(3, 3, 3, 1.0, 1.0, 1.0).unwrap();
        let mut state = FlowState::new(geometry);
        let mut tracker = VelocityChange::new(&state);
        assert_eq!(tracker.last(), None);

        state.u[(2, 2, 2)] = 0.5;
        state.w[(1, 1, 3)] = -1.5;
        assert_eq!(tracker.update(&state), 1.5);

        state.v[(2, 2, 2)] = 0.25;
        assert_eq!(tracker.update(&state), 0.25);
        assert_eq!(tracker.update(&state), 0.0);
        assert_eq!(tracker.history(), &[1.5, 0.25, 0.0]);
    }
}

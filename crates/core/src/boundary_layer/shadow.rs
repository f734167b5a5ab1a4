//! Obstacle shadow search
//!
//! Every free cell below the highest obstacle looks outward in the eight
//! compass directions for an obstacle column taller than the cell. The closest
//! hit in any direction reduces the initial horizontal wind of the cell by
//! `0.19·ln(10·(d + 0.5))`, capped at 1, where `d` is the gap between the cell
//! and the obstacle column.

use crate::grid::{Field3, FlowState};
use rayon::prelude::*;
use tracing::debug;

/// Maximum search distance (m)
pub const SHADOW_SEARCH_DISTANCE: f32 = 20.0;

/// Compass directions as `(di, dj)` steps
const DIRECTIONS: [(isize, isize); 8] = [
    (1, 0),
    (1, 1),
    (0, 1),
    (-1, 1),
    (-1, 0),
    (-1, -1),
    (0, -1),
    (1, -1),
];

/// Wind reduction factor at distance `distance` from an obstacle
#[inline]
pub fn shadow_factor(distance: f32) -> f32 {
    (0.19 * (10.0 * (distance + 0.5)).ln()).min(1.0)
}

/// Number of grid steps searched in each direction
pub fn search_steps(dx: f32, dy: f32) -> usize {
    ((SHADOW_SEARCH_DISTANCE / dx.min(dy)).round() as usize).max(1)
}

/// Scale U and V of shadowed cells up to layer `max_layer`
///
/// Returns the number of cells whose wind was reduced.
pub fn apply_obstacle_shadow(state: &mut FlowState, max_layer: usize) -> usize {
    if max_layer == 0 {
        return 0;
    }

    let mut factors = Field3::with_value(&state.geometry, 1.0);
    let view: &FlowState = state;
    let steps = search_steps(view.geometry.dx, view.geometry.dy);
    let top = max_layer.min(view.geometry.nk);

    factors.par_columns_mut().for_each(|(i, j, column)| {
        if !view.geometry.is_interior(i, j) {
            return;
        }
        for k in view.first_free(i, j)..=top {
            column[k] = column_shadow(view, i, j, k, steps);
        }
    });

    let mut shadowed = 0;
    let (ni, nj) = (state.geometry.ni, state.geometry.nj);
    for i in 1..=ni {
        for j in 1..=nj {
            for k in 1..=top {
                let factor = factors[(i, j, k)];
                if factor < 1.0 {
                    state.u[(i, j, k)] *= factor;
                    state.v[(i, j, k)] *= factor;
                    shadowed += 1;
                }
            }
        }
    }

    debug!("Shadow search: {} of {} cells reduced", shadowed, ni * nj * top);
    shadowed
}

fn column_shadow(state: &FlowState, i: usize, j: usize, k: usize, steps: usize) -> f32 {
    let g = &state.geometry;
    let height = g.layer_center(k);
    let mut factor = 1.0f32;

    for (di, dj) in DIRECTIONS {
        let step = if di != 0 && dj != 0 {
            g.dx.hypot(g.dy)
        } else if di != 0 {
            g.dx
        } else {
            g.dy
        };

        for n in 1..=steps {
            let offset = n as isize;
            let Some((ii, jj)) = g.neighbour(i, j, di * offset, dj * offset) else {
                break;
            };
            if state.cutk[(ii, jj)] > height && state.kkart[(ii, jj)] > 0 {
                let distance = (n - 1) as f32 * step;
                factor = factor.min(shadow_factor(distance));
                break;
            }
        }
    }
    factor.max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::{GridGeometry, ObstacleMap};
    use approx::assert_relative_eq;

    #[test]
    fn test_shadow_factor_curve() {
        assert_relative_eq!(shadow_factor(0.0), 0.19 * 5f32.ln(), epsilon = 1e-6);
        assert!(shadow_factor(2.0) > shadow_factor(1.0));
        assert_eq!(shadow_factor(1000.0), 1.0);
        assert_eq!(search_steps(2.0, 4.0), 10);
        assert_eq!(search_steps(50.0, 50.0), 1);
    }

    #[test]
    fn test_adjacent_cell_is_reduced() {
        let geometry = GridGeometry::uniform(7, 7, 6, 2.0, 2.0, 2.0).unwrap();
        let mut state = FlowState::new(geometry);
        let mut map = ObstacleMap::flat(7, 7);
        map.add_block(4, 4, 4, 4, 8.0);
        state.apply_obstacles(&map).unwrap();
        state.u.fill(5.0);
        state.v.fill(1.0);
        state.enforce_obstacles();

        let reduced = apply_obstacle_shadow(&mut state, 4);
        assert!(reduced > 0);

        let expected = 5.0 * shadow_factor(0.0);
        assert_relative_eq!(state.u[(3, 4, 1)], expected, epsilon = 1e-5);
        assert_relative_eq!(state.v[(3, 4, 1)], shadow_factor(0.0), epsilon = 1e-5);
        // Further away the reduction weakens
        assert!(state.u[(1, 4, 1)] > state.u[(2, 4, 1)]);
        // Above the obstacle nothing changes
        assert_eq!(state.u[(3, 4, 5)], 5.0);
    }

    #[test]
    fn test_no_obstacles_no_shadow() {
        let geometry = GridGeometry::uniform(4, 4, 4, 2.0, 2.0, 2.0).unwrap();
        let mut state = FlowState::new(geometry);
        state.u.fill(3.0);
        assert_eq!(apply_obstacle_shadow(&mut state, 0), 0);
        assert_eq!(state.u[(2, 2, 2)], 3.0);
    }
}

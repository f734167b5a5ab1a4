//! Column-wise reconstruction of W from the horizontal flux balance

use crate::grid::FlowState;
use rayon::prelude::*;

/// Rebuild W bottom-up so that every free cell conserves volume
///
/// W is zero at and below the ground face of each column; above it
/// `W[k + 1] = W[k] - (net horizontal outflow of cell k) / (dx·dy)`.
pub fn reconstruct_vertical_velocity(state: &mut FlowState) {
    let FlowState {
        geometry,
        u,
        v,
        w,
        kkart,
        ..
    } = state;
    let (dx, dy, nk) = (geometry.dx, geometry.dy, geometry.nk);
    let area = geometry.horizontal_area();

    w.par_columns_mut().for_each(|(i, j, column)| {
        if !geometry.is_interior(i, j) {
            return;
        }
        let ground = kkart[(i, j)] + 1;
        if ground > nk {
            column.fill(0.0);
            return;
        }
        column[..=ground].fill(0.0);
        for k in ground..=nk {
            let dz = geometry.dz(k);
            let outflow = (u[(i + 1, j, k)] - u[(i, j, k)]) * dy * dz
                + (v[(i, j + 1, k)] - v[(i, j, k)]) * dx * dz;
            column[k + 1] = column[k] - outflow / area;
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::{GridGeometry, ObstacleMap};
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_reconstruction_balances_every_cell() {
        let geometry = GridGeometry::stretched(6, 5, 6, 2.0, 3.0, 1.0, 1.2).unwrap();
        let mut state = FlowState::new(geometry);
        let mut map = ObstacleMap::flat(6, 5);
        map.add_block(3, 4, 2, 3, 3.0);
        state.apply_obstacles(&map).unwrap();

        for i in 1..=7 {
            for j in 1..=5 {
                for k in 1..=6 {
                    state.u[(i, j, k)] = 2.0 + 0.3 * i as f32 - 0.1 * k as f32;
                }
            }
        }
        for i in 1..=6 {
            for j in 1..=6 {
                for k in 1..=6 {
                    state.v[(i, j, k)] = 0.5 * j as f32;
                }
            }
        }
        state.enforce_obstacles();
        reconstruct_vertical_velocity(&mut state);

        assert_abs_diff_eq!(state.max_divergence(), 0.0, epsilon = 1e-3);
        for (i, j) in state.geometry.interior_columns() {
            let ground = state.first_free(i, j);
            assert_eq!(state.w[(i, j, ground)], 0.0);
        }
    }

    #[test]
    fn test_uniform_flow_keeps_w_zero() {
        let geometry = GridGeometry::uniform(4, 4, 4, 2.0, 2.0, 2.0).unwrap();
        let mut state = FlowState::new(geometry);
        state.u.fill(3.0);
        state.v.fill(-1.0);
        reconstruct_vertical_velocity(&mut state);
        assert_eq!(state.w.max_abs(), 0.0);
    }
}

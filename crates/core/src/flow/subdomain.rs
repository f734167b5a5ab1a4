//! Prognostic sub-domain (ADVDOM)
//!
//! In reduced-domain mode only columns close to buildings take part in the
//! momentum sweeps; everywhere else the diagnostic field is kept.

use crate::grid::FlowState;
use rayon::prelude::*;
use tracing::debug;

/// Mark the columns solved by the momentum sweeps and return how many there are
///
/// With `factor = Some(f)` a free column is active when its centre lies within
/// `f × h` of a building column of height `h`. Without a factor, or when the
/// domain holds no buildings, every free column is active. Columns blocked up
/// to the model top are never active.
pub fn compute_subdomain(state: &mut FlowState, factor: Option<f32>) -> usize {
    let g = &state.geometry;
    let nk = g.nk;
    let columns: Vec<(usize, usize)> = g.interior_columns().collect();
    let buildings: Vec<(usize, usize, f32)> = columns
        .iter()
        .filter(|&&(i, j)| state.building[(i, j)] > 0.0)
        .map(|&(i, j)| (i, j, state.building[(i, j)]))
        .collect();

    let reach = factor.filter(|_| !buildings.is_empty());
    let (dx, dy) = (g.dx, g.dy);
    let flags: Vec<bool> = columns
        .par_iter()
        .map(|&(i, j)| {
            if state.kkart[(i, j)] >= nk {
                return false;
            }
            let Some(factor) = reach else {
                return true;
            };
            buildings.iter().any(|&(bi, bj, height)| {
                let distance = ((i as f32 - bi as f32) * dx).hypot((j as f32 - bj as f32) * dy);
                distance <= factor * height
            })
        })
        .collect();

    state.advdom.fill(false);
    let mut active = 0;
    for (&(i, j), flag) in columns.iter().zip(flags) {
        state.advdom[(i, j)] = flag;
        active += usize::from(flag);
    }
    state.advdom.extend_edges();

    debug!(
        "Sub-domain: {} of {} columns active{}",
        active,
        columns.len(),
        if reach.is_some() { " (reduced)" } else { "" }
    );
    active
}

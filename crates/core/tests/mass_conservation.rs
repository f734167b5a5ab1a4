//! Mass conservation of the diagnostic pressure correction

mod common;

use common::{assert_obstacles_zeroed, state_with};
use microflow_core::boundary_layer::{apply_obstacle_shadow, initialise_profile, WindProfile};
use microflow_core::solver::{compute_divergence, DiagnosticSolver};
use microflow_core::{FlowState, ObstacleMap, SweepSchedule};

/// Building in a 10 × 8 domain with a shadowed, not yet balanced first guess
fn unbalanced_state() -> FlowState {
    let mut map = ObstacleMap::flat(10, 8);
    map.add_block(5, 6, 3, 5, 6.0);
    let mut state = state_with(&map, 8, 2.0, 2.0);

    let profile = WindProfile::new(&common::westerly(4.0)).unwrap();
    let max_layer = initialise_profile(&mut state, &profile);
    apply_obstacle_shadow(&mut state, max_layer);
    state
}

#[test]
fn converged_pass_removes_divergence() {
    let mut state = unbalanced_state();
    let report = DiagnosticSolver::new(400, SweepSchedule::Cyclic, true).run_pass(&mut state);

    assert!(report.initial.max > 1.0, "initial {}", report.initial.max);
    assert!(
        report.last.max < 1e-3 * report.initial.max,
        "divergence {} -> {}",
        report.initial.max,
        report.last.max
    );
    assert!(report.last.rms <= report.last.max);
    assert_obstacles_zeroed(&state);
}

#[test]
fn seeded_schedule_converges_too() {
    let mut state = unbalanced_state();
    let report = DiagnosticSolver::new(400, SweepSchedule::Seeded { seed: 7 }, true)
        .run_pass(&mut state);
    assert!(report.last.max < 1e-3 * report.initial.max);
}

#[test]
fn rerunning_a_converged_field_is_a_fixed_point() {
    let mut state = unbalanced_state();
    let solver = DiagnosticSolver::new(400, SweepSchedule::Cyclic, true);
    let first = solver.run_pass(&mut state);
    let converged = state.clone();

    let rerun = DiagnosticSolver::new(10, SweepSchedule::Cyclic, true).run_pass(&mut state);

    let tolerance = 1e-3 * first.initial.max;
    assert!(rerun.initial.max < tolerance);
    assert!(rerun.last.max < tolerance);
    assert!(state.u.max_abs_diff(&converged.u) < 1e-2);
    assert!(state.w.max_abs_diff(&converged.w) < 1e-2);
}

#[test]
fn divergence_field_matches_recomputed_fluxes() {
    let mut state = unbalanced_state();
    let stats = compute_divergence(&mut state);

    let mut max = 0.0f32;
    for (i, j) in state.geometry.interior_columns().collect::<Vec<_>>() {
        for k in state.first_free(i, j)..=state.geometry.nk {
            let direct = state.divergence_at(i, j, k);
            assert_eq!(state.div[(i, j, k)], direct);
            max = max.max(direct.abs());
        }
    }
    assert_eq!(stats.max, max);
    assert_eq!(state.max_divergence(), max);
}

//! End-to-end flow-field scenarios
//!
//! Run with logging: `RUST_LOG=debug cargo test --test scenarios -- --nocapture`

mod common;

use approx::assert_abs_diff_eq;
use common::{assert_mass_closed, assert_obstacles_zeroed, single_building, state_with, westerly};
use microflow_core::grid::{DISSIPATION_FLOOR, TKE_FLOOR};
use microflow_core::{
    ClosureKind, FlowFieldLevel, FlowFieldSolver, ObstacleMap, SolveMode, SolverConfig,
    SweepSchedule,
};

fn prognostic_config(closure: ClosureKind) -> SolverConfig {
    SolverConfig {
        level: FlowFieldLevel::Prognostic,
        closure,
        min_iterations: 2,
        max_iterations: 6,
        ..SolverConfig::default()
    }
}

#[test]
fn flat_westerly_follows_the_power_law_profile() {
    let map = ObstacleMap::flat(20, 10);
    let mut state = state_with(&map, 12, 5.0, 2.0);
    let solver = FlowFieldSolver::new(SolverConfig::default()).unwrap();

    let report = solver.solve(&mut state, &westerly(10.0)).unwrap();
    assert_eq!(report.mode, SolveMode::Diagnostic);

    // Layer 5 spans 8-10 m, its centre sits just below the measurement height
    let g = &state.geometry;
    for (i, j) in g.interior_columns() {
        assert_abs_diff_eq!(state.u[(i, j, 5)], 10.0, epsilon = 0.2);
        for k in 1..g.nk {
            assert!(state.u[(i, j, k + 1)] >= state.u[(i, j, k)]);
        }
        for k in 1..=g.nk {
            assert_abs_diff_eq!(state.v[(i, j, k)], 0.0, epsilon = 1e-5);
            assert_abs_diff_eq!(state.w[(i, j, k)], 0.0, epsilon = 1e-4);
        }
    }
    assert!(report.diagnostic.last.max < 1e-3);
}

#[test]
fn single_building_diagnostic_displaces_flow() {
    let mut state = state_with(&single_building(8.0), 10, 2.0, 2.0);
    let solver = FlowFieldSolver::new(SolverConfig::diagnostic(Default::default())).unwrap();

    let report = solver.solve(&mut state, &westerly(5.0)).unwrap();
    assert_eq!(report.mode, SolveMode::Diagnostic);
    assert_eq!(state.kkart[(6, 5)], 4);
    assert_obstacles_zeroed(&state);

    // Column directly in the lee of the block
    let lee = (1..=10).map(|k| state.w[(8, 6, k)].abs()).fold(0.0, f32::max);
    assert!(lee > 1e-3, "max |W| in the lee is {lee}");

    // Flux scale of one face: 5 m/s through 2 m × 2 m
    assert!(report.diagnostic.last.max < 1e-3 * 20.0);
}

#[test]
fn no_flow_field_level_still_conserves_mass() {
    let mut state = state_with(&single_building(6.0), 8, 2.0, 2.0);
    let config = SolverConfig {
        level: FlowFieldLevel::None,
        ..SolverConfig::default()
    };
    let solver = FlowFieldSolver::new(config).unwrap();

    let report = solver.solve(&mut state, &westerly(4.0)).unwrap();
    assert_eq!(report.mode, SolveMode::Diagnostic);
    assert_obstacles_zeroed(&state);
    assert!(report.diagnostic.last.max < 1e-3 * 16.0);
}

#[test]
fn prognostic_mixing_length_stays_bounded() {
    let mut state = state_with(&single_building(8.0), 10, 2.0, 2.0);
    let solver = FlowFieldSolver::new(prognostic_config(ClosureKind::MixingLength)).unwrap();

    let report = solver.solve(&mut state, &westerly(5.0)).unwrap();
    assert_eq!(report.mode, SolveMode::Prognostic);
    assert!((2..=6).contains(&report.iterations));
    assert!(report.kadvmax >= 5 && report.kadvmax <= 10);
    assert_eq!(report.active_columns, 16 * 12);
    assert!(report.last_change.is_some());

    assert_obstacles_zeroed(&state);
    for field in [&state.u, &state.v, &state.w, &state.visc] {
        assert!(field.as_slice().iter().all(|v| v.is_finite()));
    }
    assert!(state.max_horizontal_speed() < 50.0);
    assert_mass_closed(&state, &report);
}

#[test]
fn prognostic_k_epsilon_keeps_turbulence_positive() {
    let mut state = state_with(&single_building(8.0), 10, 2.0, 2.0);
    let solver = FlowFieldSolver::new(prognostic_config(ClosureKind::KEpsilon)).unwrap();

    let report = solver.solve(&mut state, &westerly(5.0)).unwrap();

    assert!(state.turb.as_slice().iter().all(|&k| k >= TKE_FLOOR && k.is_finite()));
    assert!(state
        .tdiss
        .as_slice()
        .iter()
        .all(|&e| e >= DISSIPATION_FLOOR && e.is_finite()));
    assert_obstacles_zeroed(&state);
    assert_mass_closed(&state, &report);
}

#[test]
fn standard_prognostic_solve_closes_mass_balance() {
    let mut state = state_with(&single_building(8.0), 10, 2.0, 2.0);
    let solver = FlowFieldSolver::new(SolverConfig::default()).unwrap();

    let report = solver.solve(&mut state, &westerly(5.0)).unwrap();
    assert_eq!(report.mode, SolveMode::Prognostic);
    assert!(report.diagnostic.iterations >= 5);
    assert!(report.diagnostic.last.max < report.diagnostic.initial.max);
    assert_mass_closed(&state, &report);
}

#[test]
fn hilly_prognostic_solve_closes_mass_balance() {
    let terrain = (0..16 * 12)
        .map(|n| {
            let (i, j) = ((n % 16) as f32, (n / 16) as f32);
            0.4 * i + 0.2 * j
        })
        .collect();
    let map = ObstacleMap::flat(16, 12).with_terrain(terrain).unwrap();
    let mut state = state_with(&map, 10, 2.0, 2.0);
    let solver = FlowFieldSolver::new(prognostic_config(ClosureKind::MixingLength)).unwrap();

    let report = solver.solve(&mut state, &westerly(5.0)).unwrap();
    assert_eq!(report.mode, SolveMode::Prognostic);
    assert_obstacles_zeroed(&state);
    assert_mass_closed(&state, &report);
}

#[test]
fn reduced_subdomain_limits_active_columns() {
    let mut state = state_with(&single_building(4.0), 8, 2.0, 2.0);
    let config = SolverConfig {
        subdomain_factor: Some(1.0),
        ..prognostic_config(ClosureKind::MixingLength)
    };
    let solver = FlowFieldSolver::new(config).unwrap();

    let report = solver.solve(&mut state, &westerly(5.0)).unwrap();
    assert!(report.active_columns > 6);
    assert!(report.active_columns < 16 * 12);
    assert!(state.advdom[(6, 5)]);
    assert!(!state.advdom[(1, 1)]);
}

#[test]
fn parallel_and_serial_solves_agree() {
    let run = |parallel: bool| {
        let mut state = state_with(&single_building(8.0), 10, 2.0, 2.0);
        let config = SolverConfig {
            parallel,
            ..prognostic_config(ClosureKind::KEpsilon)
        };
        FlowFieldSolver::new(config)
            .unwrap()
            .solve(&mut state, &westerly(5.0))
            .unwrap();
        state
    };
    let parallel = run(true);
    let serial = run(false);

    assert!(parallel.u.max_abs_diff(&serial.u) < 1e-6);
    assert!(parallel.v.max_abs_diff(&serial.v) < 1e-6);
    assert!(parallel.w.max_abs_diff(&serial.w) < 1e-6);
    assert!(parallel.turb.max_abs_diff(&serial.turb) < 1e-6);
}

#[test]
fn seeded_schedule_is_reproducible() {
    let run = || {
        let mut state = state_with(&single_building(6.0), 8, 2.0, 2.0);
        let config = SolverConfig {
            sweep_schedule: SweepSchedule::Seeded { seed: 42 },
            ..prognostic_config(ClosureKind::MixingLength)
        };
        FlowFieldSolver::new(config)
            .unwrap()
            .solve(&mut state, &westerly(5.0))
            .unwrap();
        state
    };
    let first = run();
    let second = run();
    assert_eq!(first.u.as_slice(), second.u.as_slice());
    assert_eq!(first.w.as_slice(), second.w.as_slice());
}

#[test]
fn solver_is_reusable_across_situations() {
    let mut state = state_with(&single_building(8.0), 10, 2.0, 2.0);
    let solver = FlowFieldSolver::new(SolverConfig::diagnostic(Default::default())).unwrap();

    solver.solve(&mut state, &westerly(5.0)).unwrap();
    let first = state.u.clone();
    solver.solve(&mut state, &westerly(8.0)).unwrap();
    solver.solve(&mut state, &westerly(5.0)).unwrap();

    assert!(state.u.max_abs_diff(&first) < 1e-6);
}

//! Shared fixtures for the integration tests

#![allow(dead_code)]

use microflow_core::solver::flux_scale;
use microflow_core::{
    BoundaryConditions, FlowState, GridGeometry, ObstacleMap, SolveReport, WindObservation,
};
use tracing_subscriber::EnvFilter;

#[ctor::ctor]
fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

/// Westerly wind of `speed` measured at 10 m, near-neutral stratification
pub fn westerly(speed: f32) -> BoundaryConditions {
    BoundaryConditions::single(WindObservation::new(10.0, speed, 0.0), 1.0e6, 0.3)
}

/// Uniform grid with `map` applied
pub fn state_with(map: &ObstacleMap, nk: usize, dx: f32, dz: f32) -> FlowState {
    let geometry = GridGeometry::uniform(map.ni(), map.nj(), nk, dx, dx, dz)
        .expect("valid test grid");
    let mut state = FlowState::new(geometry);
    state
        .apply_obstacles(map)
        .expect("obstacle map matches grid");
    state
}

/// 16 × 12 domain with a 2 × 3 column block of `height` metres
pub fn single_building(height: f32) -> ObstacleMap {
    let mut map = ObstacleMap::flat(16, 12);
    map.add_block(6, 7, 5, 7, height);
    map
}

/// Assert that no velocity component is non-zero on a face touching an obstacle
pub fn assert_obstacles_zeroed(state: &FlowState) {
    let g = &state.geometry;
    for i in 1..=g.ni {
        for j in 1..=g.nj {
            for k in 1..=state.kkart[(i, j)] {
                assert_eq!(state.u[(i, j, k)], 0.0, "U at ({i}, {j}, {k})");
                assert_eq!(state.u[(i + 1, j, k)], 0.0, "U at ({}, {j}, {k})", i + 1);
                assert_eq!(state.v[(i, j, k)], 0.0, "V at ({i}, {j}, {k})");
                assert_eq!(state.v[(i, j + 1, k)], 0.0, "V at ({i}, {}, {k})", j + 1);
                assert_eq!(state.w[(i, j, k)], 0.0, "W at ({i}, {j}, {k})");
            }
            assert_eq!(state.w[(i, j, state.kkart[(i, j)] + 1)], 0.0);
        }
    }
}

/// Assert the closing pass left less than 1e-3 of the flux scale in any cell
pub fn assert_mass_closed(state: &FlowState, report: &SolveReport) {
    let tolerance = report
        .diagnostic
        .tolerance
        .expect("closing pass runs to a tolerance");
    let scale = flux_scale(state);
    assert!(
        (tolerance - 1e-3 * scale).abs() <= 0.01 * tolerance,
        "tolerance {tolerance} for flux scale {scale}"
    );
    assert!(
        report.diagnostic.last.max <= tolerance,
        "max divergence {} above {tolerance} after {} iterations",
        report.diagnostic.last.max,
        report.diagnostic.iterations
    );
    assert!(state.max_divergence() <= tolerance);
}

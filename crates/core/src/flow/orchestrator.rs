//! Flow-field orchestration for one weather situation
//!
//! The solver chooses between two paths:
//!
//! - **Diagnostic**: initial profile, obstacle shadow, flux-balance W on
//!   flat terrain, then one pressure-correction pass
//! - **Prognostic**: initial profile, sub-domain and KADVMAX, then outer
//!   iterations of U/V/W sweeps, turbulence transport and one pressure
//!   correction each, until the velocity change settles or the budget runs out
//!
//! Both paths end with a diagnostic pass. After the prognostic path it runs
//! until the divergence meets `mass_tolerance` relative to the flux scale, so
//! the returned field is mass consistent no matter how far the prognostic
//! iterations got.

use super::config::{FlowFieldLevel, SolverConfig};
use super::convergence::{ConvergenceStatus, VelocityChange};
use super::subdomain::compute_subdomain;
use crate::boundary_layer::{
    apply_obstacle_shadow, initialise_profile, reconstruct_vertical_velocity, BoundaryConditions,
    WindProfile,
};
use crate::error::FlowResult;
use crate::grid::FlowState;
use crate::solver::{
    create_closure, flux_scale, solve_quantity, time_step, Axis, DiagnosticReport, DiagnosticSolver,
    HorizontalMomentum, MomentumParams, ProfilerScope, TurbulenceClosure, VerticalMomentum,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Terrain height spread below which the domain counts as flat (m)
const FLAT_TOLERANCE: f32 = 1e-3;

/// Path taken by a solve
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SolveMode {
    Diagnostic,
    Prognostic,
}

/// Summary of one solved weather situation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolveReport {
    pub mode: SolveMode,
    /// Prognostic outer iterations performed (0 on the diagnostic path)
    pub iterations: usize,
    pub status: ConvergenceStatus,
    /// Largest velocity change of the last prognostic iteration (m/s)
    pub last_change: Option<f32>,
    /// Top layer of the advection-active column
    pub kadvmax: usize,
    /// Columns inside the prognostic sub-domain
    pub active_columns: usize,
    /// Closing mass-conservation pass
    pub diagnostic: DiagnosticReport,
}

/// Solves the wind field of successive weather situations on one grid
pub struct FlowFieldSolver {
    config: SolverConfig,
    closure: Box<dyn TurbulenceClosure>,
    diagnostic: DiagnosticSolver,
}

impl FlowFieldSolver {
    /// Build a solver from a validated configuration
    ///
    /// # Errors
    ///
    /// Returns the validation error of `config`.
    pub fn new(config: SolverConfig) -> FlowResult<Self> {
        config.validate()?;
        let closure = create_closure(
            config.closure,
            config.viscosity_floor,
            config.turbulence_relaxation,
            config.building_roughness,
        );
        let diagnostic = DiagnosticSolver::new(
            config.fidelity.diagnostic_iterations(),
            config.sweep_schedule,
            config.parallel,
        );
        info!(
            "Flow-field solver: level {:?}, fidelity {:?}, {} diagnostic iterations",
            config.level,
            config.fidelity,
            diagnostic.iterations()
        );
        Ok(Self {
            config,
            closure,
            diagnostic,
        })
    }

    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    /// Path a solve of `state` would take
    pub fn mode_for(&self, state: &FlowState) -> SolveMode {
        let needs_momentum = has_buildings(state) || !terrain_is_flat(state);
        if self.config.level == FlowFieldLevel::Prognostic && needs_momentum {
            SolveMode::Prognostic
        } else {
            SolveMode::Diagnostic
        }
    }

    /// Solve one weather situation in place
    ///
    /// Obstacles and vegetation must already be loaded into `state`; every
    /// flow field is reset before the solve.
    ///
    /// # Errors
    ///
    /// Fails when `conditions` do not fit the grid or hold unusable observations.
    pub fn solve(
        &self,
        state: &mut FlowState,
        conditions: &BoundaryConditions,
    ) -> FlowResult<SolveReport> {
        conditions.validate(state.geometry.column_count())?;
        let profile = WindProfile::new(conditions)?;
        let g = &state.geometry;
        let _scope = ProfilerScope::new("flow-field solve").with_cells(g.ni * g.nj * g.nk);

        state.reset_situation();
        conditions.apply_surface_layer(state);
        let max_layer = initialise_profile(state, &profile);

        let mode = self.mode_for(state);
        info!(
            "Flow-field mode {:?} ({}x{}x{} cells, highest obstacle layer {})",
            mode, state.geometry.ni, state.geometry.nj, state.geometry.nk, max_layer
        );

        let report = match mode {
            SolveMode::Diagnostic => self.solve_diagnostic(state, max_layer),
            SolveMode::Prognostic => self.solve_prognostic(state, &profile, max_layer),
        };
        info!(
            "Flow field done: {:?} after {} iterations, KADVMAX {}, max divergence {:.3e}",
            report.status, report.iterations, report.kadvmax, report.diagnostic.last.max
        );
        Ok(report)
    }

    fn solve_diagnostic(&self, state: &mut FlowState, max_layer: usize) -> SolveReport {
        if self.config.level != FlowFieldLevel::None {
            apply_obstacle_shadow(state, max_layer);
        }
        if terrain_is_flat(state) {
            reconstruct_vertical_velocity(state);
        }
        state.kadvmax = state.geometry.nk;
        let diagnostic = self.diagnostic.run_pass(state);

        SolveReport {
            mode: SolveMode::Diagnostic,
            iterations: 0,
            status: ConvergenceStatus::Converged,
            last_change: None,
            kadvmax: state.kadvmax,
            active_columns: 0,
            diagnostic,
        }
    }

    fn solve_prognostic(
        &self,
        state: &mut FlowState,
        profile: &WindProfile,
        max_layer: usize,
    ) -> SolveReport {
        let config = &self.config;
        let active_columns = compute_subdomain(state, config.subdomain_factor);
        if config.subdomain_factor.is_some() {
            // Columns outside the sub-domain keep the diagnostic first guess
            apply_obstacle_shadow(state, max_layer);
            if terrain_is_flat(state) {
                reconstruct_vertical_velocity(state);
            }
        }
        state.kadvmax = advection_top(state, max_layer);
        debug!(
            "Prognostic domain: {} active columns, KADVMAX {}",
            active_columns, state.kadvmax
        );

        self.closure.initialise(state);
        let (geostrophic_u, geostrophic_v) = geostrophic_profile(state, profile);
        let mut params = MomentumParams {
            relaxation: config.velocity_relaxation,
            time_step: time_step(state),
            coriolis: config.coriolis,
            building_roughness: config.building_roughness,
            geostrophic_u,
            geostrophic_v,
        };

        let mut tracker = VelocityChange::new(state);
        let mut status = ConvergenceStatus::IterationLimit;
        let mut iterations = 0;
        for direction in config.sweep_schedule.directions(config.max_iterations) {
            params.time_step = time_step(state);
            self.closure.update_viscosity(state);

            for axis in [Axis::X, Axis::Y] {
                let momentum = HorizontalMomentum {
                    axis,
                    params: &params,
                };
                solve_quantity(state, &momentum, direction, config.parallel);
            }
            solve_quantity(
                state,
                &VerticalMomentum { params: &params },
                direction,
                config.parallel,
            );
            self.closure
                .transport(state, direction, params.time_step, config.parallel);

            self.diagnostic.iterate(state, params.time_step, direction);
            state.enforce_obstacles();

            iterations += 1;
            let change = tracker.update(state);
            debug!(
                "Prognostic iteration {}: DTIME {:.3} s, max velocity change {:.4} m/s",
                iterations, params.time_step, change
            );
            if iterations >= config.min_iterations && change < config.convergence_tolerance {
                status = ConvergenceStatus::Converged;
                break;
            }
        }

        let diagnostic = self.close_mass_balance(state);
        SolveReport {
            mode: SolveMode::Prognostic,
            iterations,
            status,
            last_change: tracker.last(),
            kadvmax: state.kadvmax,
            active_columns,
            diagnostic,
        }
    }

    /// Closing pressure correction after the prognostic iterations
    fn close_mass_balance(&self, state: &mut FlowState) -> DiagnosticReport {
        if terrain_is_flat(state) {
            reconstruct_vertical_velocity(state);
        }
        let tolerance = self.config.mass_tolerance * flux_scale(state);
        self.diagnostic
            .run_until(state, tolerance, self.config.max_closing_iterations)
    }
}

/// True when terrain height varies by less than [`FLAT_TOLERANCE`]
fn terrain_is_flat(state: &FlowState) -> bool {
    let (low, high) = state
        .geometry
        .interior_columns()
        .map(|(i, j)| state.ground[(i, j)])
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), h| {
            (lo.min(h), hi.max(h))
        });
    high - low < FLAT_TOLERANCE
}

fn has_buildings(state: &FlowState) -> bool {
    state
        .geometry
        .interior_columns()
        .any(|(i, j)| state.building[(i, j)] > 0.0)
}

/// Top layer solved by the momentum sweeps: twice the highest obstacle,
/// at least one layer above the highest blocked layer, at most the model top
fn advection_top(state: &FlowState, max_layer: usize) -> usize {
    let g = &state.geometry;
    let highest = g
        .interior_columns()
        .map(|(i, j)| state.cutk[(i, j)])
        .fold(0.0, f32::max);
    (max_layer + 1).max(g.layer_at_height(2.0 * highest)).min(g.nk)
}

/// Profile wind at every layer centre above the lowest terrain
fn geostrophic_profile(state: &FlowState, profile: &WindProfile) -> (Vec<f32>, Vec<f32>) {
    let g = &state.geometry;
    let base = g
        .interior_columns()
        .map(|(i, j)| state.ground[(i, j)])
        .fold(f32::INFINITY, f32::min);
    (0..g.nk + 2)
        .map(|k| {
            if k == 0 {
                (0.0, 0.0)
            } else {
                profile.at(g.layer_center(k) - base)
            }
        })
        .unzip()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boundary_layer::WindObservation;
    use crate::grid::{GridGeometry, ObstacleMap};
    use approx::assert_relative_eq;

    fn westerly() -> BoundaryConditions {
        BoundaryConditions::single(WindObservation::new(10.0, 5.0, 0.0), 0.0, 0.3)
    }

    fn state(map: &ObstacleMap) -> FlowState {
        let geometry = GridGeometry::uniform(map.ni(), map.nj(), 10, 2.0, 2.0, 2.0).unwrap();
        let mut state = FlowState::new(geometry);
        state.apply_obstacles(map).unwrap();
        state
    }

    #[test]
    fn test_mode_selection() {
        let solver = FlowFieldSolver::new(SolverConfig::default()).unwrap();
        let flat = state(&ObstacleMap::flat(6, 6));
        assert_eq!(solver.mode_for(&flat), SolveMode::Diagnostic);

        let mut map = ObstacleMap::flat(6, 6);
        map.set_building(3, 3, 4.0);
        let built = state(&map);
        assert_eq!(solver.mode_for(&built), SolveMode::Prognostic);

        let hilly = state(
            &ObstacleMap::flat(6, 6)
                .with_terrain((0..36).map(|n| n as f32 * 0.1).collect())
                .unwrap(),
        );
        assert_eq!(solver.mode_for(&hilly), SolveMode::Prognostic);

        let diagnostic = FlowFieldSolver::new(SolverConfig {
            level: FlowFieldLevel::Diagnostic,
            ..SolverConfig::default()
        })
        .unwrap();
        assert_eq!(diagnostic.mode_for(&built), SolveMode::Diagnostic);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = SolverConfig {
            max_iterations: 0,
            ..SolverConfig::default()
        };
        assert!(FlowFieldSolver::new(config).is_err());
    }

    #[test]
    fn test_conditions_must_fit_grid() {
        let solver = FlowFieldSolver::new(SolverConfig::default()).unwrap();
        let mut flat = state(&ObstacleMap::flat(4, 4));
        let mut conditions = westerly();
        conditions.obukhov_field = Some(vec![0.0; 3]);
        assert!(solver.solve(&mut flat, &conditions).is_err());
    }

    #[test]
    fn test_advection_top() {
        let mut map = ObstacleMap::flat(6, 6);
        map.set_building(3, 3, 6.0);
        let built = state(&map);
        // 6 m building on 2 m layers: 3 blocked, twice the height reaches layer 6
        assert_eq!(advection_top(&built, 3), 6);

        map.set_building(3, 3, 16.0);
        let tall = state(&map);
        assert_eq!(advection_top(&tall, 8), 10);
    }

    #[test]
    fn test_diagnostic_report() {
        let solver = FlowFieldSolver::new(SolverConfig::default()).unwrap();
        let mut flat = state(&ObstacleMap::flat(6, 6));
        let report = solver.solve(&mut flat, &westerly()).unwrap();

        assert_eq!(report.mode, SolveMode::Diagnostic);
        assert_eq!(report.iterations, 0);
        assert_eq!(report.kadvmax, 10);
        assert_eq!(report.diagnostic.iterations, 5);
        assert_eq!(report.diagnostic.tolerance, None);
    }

    #[test]
    fn test_prognostic_closing_pass_meets_tolerance() {
        let mut map = ObstacleMap::flat(10, 8)
            .with_terrain((0..80).map(|n| (n % 10) as f32 * 0.3).collect())
            .unwrap();
        map.set_building(5, 4, 6.0);
        let solver = FlowFieldSolver::new(SolverConfig {
            max_iterations: 8,
            ..SolverConfig::default()
        })
        .unwrap();
        let mut hilly = state(&map);
        let report = solver.solve(&mut hilly, &westerly()).unwrap();

        assert_eq!(report.mode, SolveMode::Prognostic);
        let tolerance = report.diagnostic.tolerance.unwrap();
        assert_relative_eq!(tolerance, 1e-3 * flux_scale(&hilly), max_relative = 0.01);
        assert!(
            report.diagnostic.last.max <= tolerance,
            "divergence {} above {}",
            report.diagnostic.last.max,
            tolerance
        );
        assert!(report.diagnostic.iterations >= 5);
    }
}

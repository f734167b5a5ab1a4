//! Diagnostic mass-conservation pass
//!
//! Each iteration computes the volume-flux imbalance of every free cell,
//! solves one Gauss-Seidel line sweep of the pressure-correction Poisson
//! equation (vertical columns by TDMA, horizontal coupling lagged) and
//! corrects the face velocities with the pressure-gradient increment:
//!
//! - `U += DTIME·(p[i-1] - p[i]) / dx`
//! - `V += DTIME·(p[j-1] - p[j]) / dy`
//! - `W += DTIME·(p[k-1] - p[k]) / (0.5·(dz[k-1] + dz[k]))`
//!
//! Ground, walls and lateral domain faces carry no correction; the pressure
//! correction is zero above the model top. The sweep direction of successive
//! iterations follows the configured [`SweepSchedule`].

use super::column::{solve_quantity, ColumnAssembler};
use super::profiler::ProfilerScope;
use super::sweep::{SweepDirection, SweepSchedule};
use super::tdma::ColumnSystem;
use crate::core_types::{Meters, MetersPerSecond, Seconds};
use crate::grid::{flux_imbalance, FlowState, Quantity};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Upper bound of the pseudo time step (s)
pub const MAX_TIME_STEP: f32 = 5.0;
/// Floor of the reference velocity in the time-step estimate (m/s)
pub const MIN_REFERENCE_SPEED: f32 = 0.01;

/// Pseudo time step `DTIME = min(0.5·min(dx, dy) / |V|max, 5 s)`
pub fn time_step(state: &FlowState) -> f32 {
    let g = &state.geometry;
    let half_cell = Meters::new(0.5 * g.dx.min(g.dy));
    let reference =
        MetersPerSecond::new(state.max_horizontal_speed()).floored_abs(MIN_REFERENCE_SPEED);
    (half_cell / reference).min(Seconds::new(MAX_TIME_STEP)).value()
}

/// Volume flux through the largest face at the peak horizontal speed (m³/s)
///
/// Divergence tolerances are expressed relative to this scale.
pub fn flux_scale(state: &FlowState) -> f32 {
    let g = &state.geometry;
    let dz_max = (1..=g.nk).map(|k| g.dz(k)).fold(0.0f32, f32::max);
    state.max_horizontal_speed().max(MIN_REFERENCE_SPEED) * dz_max * g.dx.max(g.dy)
}

/// Summary of the divergence field over free interior cells
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct DivergenceStats {
    /// Largest absolute imbalance (m³/s)
    pub max: f32,
    /// Root-mean-square imbalance (m³/s)
    pub rms: f32,
    /// Number of free cells evaluated
    pub cells: usize,
}

/// Fill `state.div` and summarise it
pub fn compute_divergence(state: &mut FlowState) -> DivergenceStats {
    let FlowState {
        geometry,
        u,
        v,
        w,
        div,
        kkart,
        ..
    } = state;
    let (geometry, u, v, w) = (&*geometry, &*u, &*v, &*w);
    let nk = geometry.nk;

    let (max, sum_sq, cells) = div
        .par_columns_mut()
        .map(|(i, j, column)| {
            column.fill(0.0);
            if !geometry.is_interior(i, j) {
                return (0.0f32, 0.0f64, 0usize);
            }
            let mut max = 0.0f32;
            let mut sum_sq = 0.0f64;
            let mut cells = 0;
            for k in kkart[(i, j)] + 1..=nk {
                let value = flux_imbalance(geometry, u, v, w, (i, j, k));
                column[k] = value;
                max = max.max(value.abs());
                sum_sq += f64::from(value) * f64::from(value);
                cells += 1;
            }
            (max, sum_sq, cells)
        })
        .reduce(|| (0.0, 0.0, 0), |a, b| (a.0.max(b.0), a.1 + b.1, a.2 + b.2));

    DivergenceStats {
        max,
        rms: rms(sum_sq, cells),
        cells,
    }
}

fn rms(sum_sq: f64, cells: usize) -> f32 {
    if cells == 0 {
        0.0
    } else {
        (sum_sq / cells as f64).sqrt() as f32
    }
}

/// Outcome of one diagnostic pass
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct DiagnosticReport {
    pub iterations: usize,
    /// Pseudo time step used for the corrections (s)
    pub time_step: f32,
    pub initial: DivergenceStats,
    pub last: DivergenceStats,
    /// Target of a pass run to tolerance (m³/s)
    pub tolerance: Option<f32>,
}

/// Pressure-correction Poisson rows of one column
struct PressureColumn {
    time_step: f32,
}

impl ColumnAssembler for PressureColumn {
    fn quantity(&self) -> Quantity {
        Quantity::PressureIncrement
    }

    fn rows(&self, state: &FlowState, i: usize, j: usize) -> Option<(usize, usize)> {
        let k_lo = state.first_free(i, j);
        let k_hi = state.geometry.nk;
        (k_lo <= k_hi).then_some((k_lo, k_hi))
    }

    fn assemble(
        &self,
        state: &FlowState,
        i: usize,
        j: usize,
        k_lo: usize,
        k_hi: usize,
        system: &mut ColumnSystem,
    ) {
        let g = &state.geometry;
        let p = &state.dpm_new;
        let area = g.horizontal_area();

        for k in k_lo..=k_hi {
            let dz = g.dz(k);
            let gx = g.dy * dz / g.dx;
            let gy = g.dx * dz / g.dy;

            let lateral = [
                (i < g.ni && !state.u_face_blocked(i + 1, j, k), gx, (i + 1, j)),
                (i > 1 && !state.u_face_blocked(i, j, k), gx, (i.saturating_sub(1), j)),
                (j < g.nj && !state.v_face_blocked(i, j + 1, k), gy, (i, j + 1)),
                (j > 1 && !state.v_face_blocked(i, j, k), gy, (i, j.saturating_sub(1))),
            ];
            let mut diagonal = 0.0;
            let mut source = -state.div[(i, j, k)] / self.time_step;
            for (open, conductance, (ni, nj)) in lateral {
                if open {
                    diagonal += conductance;
                    source += conductance * p[(ni, nj, k)];
                }
            }

            let top = area / g.center_spacing(k + 1);
            let bottom = if k > k_lo {
                area / g.center_spacing(k)
            } else {
                0.0
            };
            system.set(k, diagonal + top + bottom, top, bottom, source);
        }
    }
}

/// Apply the pressure-gradient correction of `state.dpm_new` and accumulate DPM
fn apply_correction(state: &mut FlowState, time_step: f32) {
    let FlowState {
        geometry,
        u,
        v,
        w,
        dpm,
        dpm_new,
        kkart,
        ..
    } = state;
    let (geometry, p) = (&*geometry, &*dpm_new);
    let (ni, nj, nk) = (geometry.ni, geometry.nj, geometry.nk);

    u.par_columns_mut().for_each(|(i, j, column)| {
        if !(2..=ni).contains(&i) || !(1..=nj).contains(&j) {
            return;
        }
        let floor = kkart[(i - 1, j)].max(kkart[(i, j)]);
        for k in floor + 1..=nk {
            column[k] += time_step * (p[(i - 1, j, k)] - p[(i, j, k)]) / geometry.dx;
        }
    });
    v.par_columns_mut().for_each(|(i, j, column)| {
        if !(1..=ni).contains(&i) || !(2..=nj).contains(&j) {
            return;
        }
        let floor = kkart[(i, j - 1)].max(kkart[(i, j)]);
        for k in floor + 1..=nk {
            column[k] += time_step * (p[(i, j - 1, k)] - p[(i, j, k)]) / geometry.dy;
        }
    });
    w.par_columns_mut().for_each(|(i, j, column)| {
        if !geometry.is_interior(i, j) {
            return;
        }
        // Ground face stays closed; the top face sees p = 0 above the model
        for k in kkart[(i, j)] + 2..=nk + 1 {
            column[k] +=
                time_step * (p[(i, j, k - 1)] - p[(i, j, k)]) / geometry.center_spacing(k);
        }
    });

    dpm.as_mut_slice()
        .par_iter_mut()
        .zip(p.as_slice().par_iter())
        .for_each(|(total, increment)| *total += increment);
}

/// Runs diagnostic passes with a fixed iteration count
#[derive(Debug, Clone, PartialEq)]
pub struct DiagnosticSolver {
    iterations: usize,
    schedule: SweepSchedule,
    parallel: bool,
}

impl DiagnosticSolver {
    pub fn new(iterations: usize, schedule: SweepSchedule, parallel: bool) -> Self {
        Self {
            iterations,
            schedule,
            parallel,
        }
    }

    pub fn iterations(&self) -> usize {
        self.iterations
    }

    /// One divergence → pressure sweep → correction cycle
    pub fn iterate(&self, state: &mut FlowState, time_step: f32, direction: SweepDirection) {
        compute_divergence(state);
        state.dpm_new.fill(0.0);
        solve_quantity(
            state,
            &PressureColumn { time_step },
            direction,
            self.parallel,
        );
        apply_correction(state, time_step);
    }

    /// Full pass: reset DPM, iterate, report divergence before and after
    pub fn run_pass(&self, state: &mut FlowState) -> DiagnosticReport {
        let g = &state.geometry;
        let _scope = ProfilerScope::new("diagnostic pass").with_cells(g.ni * g.nj * g.nk);
        state.dpm.fill(0.0);
        let dt = time_step(state);
        let initial = compute_divergence(state);

        for direction in self.schedule.directions(self.iterations) {
            self.iterate(state, dt, direction);
        }

        let last = compute_divergence(state);
        debug!(
            "Diagnostic pass: {} iterations, DTIME {:.3} s, max divergence {:.3e} -> {:.3e}",
            self.iterations, dt, initial.max, last.max
        );
        DiagnosticReport {
            iterations: self.iterations,
            time_step: dt,
            initial,
            last,
            tolerance: None,
        }
    }

    /// Iterate until the largest imbalance drops to `tolerance` (m³/s).
    ///
    /// Runs at least the configured iteration count and stops at
    /// `max_iterations`. The report carries the iterations actually run.
    pub fn run_until(
        &self,
        state: &mut FlowState,
        tolerance: f32,
        max_iterations: usize,
    ) -> DiagnosticReport {
        let g = &state.geometry;
        let _scope = ProfilerScope::new("closing pass").with_cells(g.ni * g.nj * g.nk);
        state.dpm.fill(0.0);
        let dt = time_step(state);
        let initial = compute_divergence(state);

        let mut last = initial;
        let mut iterations = 0;
        for direction in self.schedule.directions(max_iterations) {
            if iterations >= self.iterations && last.max <= tolerance {
                break;
            }
            self.iterate(state, dt, direction);
            iterations += 1;
            last = compute_divergence(state);
        }

        if last.max > tolerance {
            warn!(
                "Closing pass hit {} iterations at max divergence {:.3e} > {:.3e}",
                iterations, last.max, tolerance
            );
        } else {
            debug!(
                "Closing pass: {} iterations, max divergence {:.3e} -> {:.3e}",
                iterations, initial.max, last.max
            );
        }
        DiagnosticReport {
            iterations,
            time_step: dt,
            initial,
            last,
            tolerance: Some(tolerance),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::{GridGeometry, ObstacleMap};
    use approx::assert_relative_eq;

    fn perturbed_state() -> FlowState {
        let geometry = GridGeometry::uniform(10, 8, 8, 2.0, 2.0, 2.0).unwrap();
        let mut state = FlowState::new(geometry);
        let mut map = ObstacleMap::flat(10, 8);
        map.add_block(5, 6, 3, 5, 6.0);
        state.apply_obstacles(&map).unwrap();
        for i in 1..=11 {
            for j in 1..=8 {
                for k in 1..=9 {
                    state.u[(i, j, k)] = 3.0 + 0.2 * k as f32;
                }
            }
        }
        state.enforce_obstacles();
        state
    }

    #[test]
    fn test_time_step_formula() {
        let mut state = perturbed_state();
        let speed = state.max_horizontal_speed();
        assert_relative_eq!(time_step(&state), 0.5 * 2.0 / speed, epsilon = 1e-6);
        state.u.fill(0.0);
        assert_relative_eq!(time_step(&state), MAX_TIME_STEP);
    }

    #[test]
    fn test_divergence_stats_of_uniform_flow() {
        let geometry = GridGeometry::uniform(4, 4, 4, 1.0, 1.0, 1.0).unwrap();
        let mut state = FlowState::new(geometry);
        state.u.fill(2.0);
        let stats = compute_divergence(&mut state);
        assert_eq!(stats.max, 0.0);
        assert_eq!(stats.cells, 64);
    }

    #[test]
    fn test_many_iterations_converge() {
        let mut state = perturbed_state();
        let solver = DiagnosticSolver::new(400, SweepSchedule::Cyclic, true);
        let report = solver.run_pass(&mut state);

        assert!(report.initial.max > 1.0);
        assert!(
            report.last.max < 1e-3 * report.initial.max,
            "divergence {} -> {}",
            report.initial.max,
            report.last.max
        );
        // Obstacle faces stay closed
        assert_eq!(state.u[(5, 4, 2)], 0.0);
        assert_eq!(state.w[(5, 4, 3)], 0.0);
    }

    #[test]
    fn test_flux_scale_uses_largest_face() {
        let geometry = GridGeometry::from_layers(4, 4, 2.0, 3.0, &[1.0, 2.0, 4.0]).unwrap();
        let mut state = FlowState::new(geometry);
        state.u.fill(5.0);
        assert_relative_eq!(flux_scale(&state), 5.0 * 4.0 * 3.0, epsilon = 1e-4);
    }

    #[test]
    fn test_run_until_meets_tolerance() {
        let mut state = perturbed_state();
        let tolerance = 1e-3 * flux_scale(&state);
        let solver = DiagnosticSolver::new(5, SweepSchedule::Cyclic, true);
        let report = solver.run_until(&mut state, tolerance, 1000);

        assert!(report.initial.max > tolerance);
        assert!(report.iterations > 5 && report.iterations < 1000);
        assert!(report.last.max <= tolerance, "divergence {}", report.last.max);
        assert_eq!(report.tolerance, Some(tolerance));
        assert_relative_eq!(state.max_divergence(), report.last.max, epsilon = 1e-6);
    }

    #[test]
    fn test_run_until_respects_iteration_cap() {
        let mut state = perturbed_state();
        let solver = DiagnosticSolver::new(5, SweepSchedule::Cyclic, true);
        let report = solver.run_until(&mut state, 0.0, 12);
        assert_eq!(report.iterations, 12);
        assert!(report.last.max < report.initial.max);
    }

    #[test]
    fn test_standard_pass_reduces_divergence() {
        let mut state = perturbed_state();
        let solver = DiagnosticSolver::new(5, SweepSchedule::Cyclic, true);
        let report = solver.run_pass(&mut state);
        assert!(report.last.max < report.initial.max);
        assert!(report.last.rms < report.initial.rms);
    }

    #[test]
    fn test_parallel_and_serial_passes_agree() {
        let mut a = perturbed_state();
        let mut b = a.clone();
        DiagnosticSolver::new(6, SweepSchedule::Seeded { seed: 9 }, true).run_pass(&mut a);
        DiagnosticSolver::new(6, SweepSchedule::Seeded { seed: 9 }, false).run_pass(&mut b);
        assert_eq!(a.u, b.u);
        assert_eq!(a.w, b.w);
        assert_eq!(a.dpm, b.dpm);
    }

    #[test]
    fn test_divergence_free_field_is_unchanged() {
        let geometry = GridGeometry::uniform(5, 5, 5, 2.0, 2.0, 2.0).unwrap();
        let mut state = FlowState::new(geometry);
        state.u.fill(4.0);
        state.v.fill(-1.0);
        let before = state.u.clone();
        DiagnosticSolver::new(5, SweepSchedule::Cyclic, true).run_pass(&mut state);
        assert_eq!(state.u, before);
        assert_eq!(state.w.max_abs(), 0.0);
    }
}

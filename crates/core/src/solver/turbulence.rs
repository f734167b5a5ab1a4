//! Turbulence closures
//!
//! Two closures provide the eddy viscosity used by the momentum sweeps:
//!
//! - [`MixingLength`]: `ν = l²·√(0.5·((∂u/∂z)² + (∂v/∂z)²))` with
//!   `l = min(0.071·z, 100 m)`, capped at 15 m²/s, damped inside canopies
//! - [`KEpsilon`]: `ν = C·√k·z` with transported TKE and dissipation, wall
//!   functions at the first free cell and Monin-Obukhov buoyancy production
//!
//! Both clamp TKE ≥ 0.001 and ε ≥ 1e-7.

use super::column::{solve_quantity, ColumnAssembler};
use super::power_law::Stencil;
use super::sweep::SweepDirection;
use super::tdma::ColumnSystem;
use crate::grid::{cube, sq, Field3, FlowState, Quantity, DISSIPATION_FLOOR, TKE_FLOOR};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::f32::consts::E;
use tracing::info;

/// von Kármán constant
pub const VON_KARMAN: f32 = 0.4;
/// Upper bound for the mixing length (m)
pub const MAX_MIXING_LENGTH: f32 = 100.0;
/// Upper bound for the eddy viscosity (m²/s)
pub const MAX_VISCOSITY: f32 = 15.0;

const MIXING_LENGTH_SLOPE: f32 = 0.071;
const C_MU: f32 = 0.09;
const C_1: f32 = 1.44;
const C_2: f32 = 1.92;
const SIGMA_K: f32 = 1.0;
const SIGMA_EPSILON: f32 = 1.3;

/// Available turbulence closures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ClosureKind {
    #[default]
    MixingLength,
    KEpsilon,
}

/// Eddy-viscosity model used by the prognostic solver
pub trait TurbulenceClosure: Send + Sync {
    /// Human-readable name
    fn name(&self) -> &'static str;

    /// Set initial turbulence fields for a new situation
    fn initialise(&self, _state: &mut FlowState) {}

    /// Recompute `state.visc` from the current flow
    fn update_viscosity(&self, state: &mut FlowState);

    /// Advance transported turbulence quantities by one sweep
    fn transport(
        &self,
        _state: &mut FlowState,
        _direction: SweepDirection,
        _time_step: f32,
        _parallel: bool,
    ) {
    }
}

/// Create a turbulence closure
pub fn create_closure(
    kind: ClosureKind,
    viscosity_floor: f32,
    relaxation: f32,
    building_roughness: f32,
) -> Box<dyn TurbulenceClosure> {
    let closure: Box<dyn TurbulenceClosure> = match kind {
        ClosureKind::MixingLength => Box::new(MixingLength {
            floor: viscosity_floor,
        }),
        ClosureKind::KEpsilon => Box::new(KEpsilon {
            floor: viscosity_floor,
            relaxation,
            building_roughness,
        }),
    };
    info!("Turbulence closure: {}", closure.name());
    closure
}

/// Cell-centred value of velocity component `axis` (0 = u, 1 = v, 2 = w)
#[inline]
fn centred(state: &FlowState, axis: usize, i: usize, j: usize, k: usize) -> f32 {
    match axis {
        0 => 0.5 * (state.u[(i, j, k)] + state.u[(i + 1, j, k)]),
        1 => 0.5 * (state.v[(i, j, k)] + state.v[(i, j + 1, k)]),
        _ => 0.5 * (state.w[(i, j, k)] + state.w[(i, j, k + 1)]),
    }
}

/// Vertical derivative of a centred component, one-sided at the column ends
fn vertical_derivative(state: &FlowState, axis: usize, i: usize, j: usize, k: usize) -> f32 {
    let g = &state.geometry;
    let below = if k > state.first_free(i, j) { k - 1 } else { k };
    let above = if k < g.nk { k + 1 } else { k };
    if above == below {
        return 0.0;
    }
    let span = g.layer_center(above) - g.layer_center(below);
    (centred(state, axis, i, j, above) - centred(state, axis, i, j, below)) / span
}

/// Horizontal derivative of a centred component along x (`along_x`) or y
fn horizontal_derivative(
    state: &FlowState,
    axis: usize,
    i: usize,
    j: usize,
    k: usize,
    along_x: bool,
) -> f32 {
    let g = &state.geometry;
    let (di, dj, h) = if along_x { (1, 0, g.dx) } else { (0, 1, g.dy) };
    let free = |c: Option<(usize, usize)>| c.filter(|&(ci, cj)| !state.is_blocked(ci, cj, k));
    let plus = free(g.neighbour(i, j, di, dj));
    let minus = free(g.neighbour(i, j, -di, -dj));
    let (hi, hi_steps) = plus.map_or(((i, j), 0.0), |c| (c, 1.0));
    let (lo, lo_steps) = minus.map_or(((i, j), 0.0), |c| (c, 1.0));
    let steps = hi_steps + lo_steps;
    if steps == 0.0 {
        return 0.0;
    }
    (centred(state, axis, hi.0, hi.1, k) - centred(state, axis, lo.0, lo.1, k)) / (steps * h)
}

/// Vertical shear `(∂u/∂z, ∂v/∂z)` at a cell centre
pub fn vertical_shear(state: &FlowState, i: usize, j: usize, k: usize) -> (f32, f32) {
    (
        vertical_derivative(state, 0, i, j, k),
        vertical_derivative(state, 1, i, j, k),
    )
}

/// Squared strain-rate invariant `2·S_ij·S_ij` at a cell centre
pub fn strain_rate_squared(state: &FlowState, i: usize, j: usize, k: usize) -> f32 {
    let g = &state.geometry;
    let ux = (state.u[(i + 1, j, k)] - state.u[(i, j, k)]) / g.dx;
    let vy = (state.v[(i, j + 1, k)] - state.v[(i, j, k)]) / g.dy;
    let wz = (state.w[(i, j, k + 1)] - state.w[(i, j, k)]) / g.dz(k);
    let uy = horizontal_derivative(state, 0, i, j, k, false);
    let vx = horizontal_derivative(state, 1, i, j, k, true);
    let wx = horizontal_derivative(state, 2, i, j, k, true);
    let wy = horizontal_derivative(state, 2, i, j, k, false);
    let (uz, vz) = vertical_shear(state, i, j, k);

    2.0 * (sq(ux) + sq(vy) + sq(wz)) + sq(uy + vx) + sq(uz + wx) + sq(vz + wy)
}

/// Algebraic mixing-length closure
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MixingLength {
    pub floor: f32,
}

impl MixingLength {
    /// Eddy viscosity of one cell
    pub fn viscosity(&self, state: &FlowState, i: usize, j: usize, k: usize) -> f32 {
        let z = (state.geometry.layer_center(k) - state.cutk[(i, j)]).max(0.0);
        let length = (MIXING_LENGTH_SLOPE * z).min(MAX_MIXING_LENGTH);
        let (dudz, dvdz) = vertical_shear(state, i, j, k);
        let shear = (0.5 * (sq(dudz) + sq(dvdz))).sqrt();
        let nu = (sq(length) * shear).min(MAX_VISCOSITY);
        (nu * (1.0 - 0.5 * state.veg_cover[(i, j, k)])).max(self.floor)
    }
}

impl TurbulenceClosure for MixingLength {
    fn name(&self) -> &'static str {
        "mixing-length"
    }

    fn update_viscosity(&self, state: &mut FlowState) {
        let visc = fill_viscosity(state, self.floor, |view, i, j, k| self.viscosity(view, i, j, k));
        state.visc = visc;
    }
}

/// Evaluate `viscosity` on every free interior cell in parallel
fn fill_viscosity<F>(state: &FlowState, floor: f32, viscosity: F) -> Field3
where
    F: Fn(&FlowState, usize, usize, usize) -> f32 + Sync,
{
    let mut visc = Field3::with_value(&state.geometry, floor);
    visc.par_columns_mut().for_each(|(i, j, column)| {
        if !state.geometry.is_interior(i, j) {
            return;
        }
        for k in state.first_free(i, j)..=state.geometry.nk {
            column[k] = viscosity(state, i, j, k);
        }
    });
    visc
}

/// Two-equation closure transporting TKE and its dissipation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KEpsilon {
    pub floor: f32,
    pub relaxation: f32,
    pub building_roughness: f32,
}

impl KEpsilon {
    /// Length scale factor so that `ν = C_μ^¼·κ·z·√k`
    fn viscosity_factor() -> f32 {
        C_MU.sqrt().sqrt() * VON_KARMAN
    }

    /// Eddy viscosity of one cell
    pub fn viscosity(&self, state: &FlowState, i: usize, j: usize, k: usize) -> f32 {
        let z = (state.geometry.layer_center(k) - state.cutk[(i, j)])
            .clamp(0.0, MAX_MIXING_LENGTH);
        let nu = Self::viscosity_factor() * z * state.turb[(i, j, k)].max(0.0).sqrt();
        nu.clamp(self.floor, MAX_VISCOSITY.max(self.floor))
    }

    /// Wall-function values `(k, ε)` of the first free cell of a column
    pub fn wall_values(&self, state: &FlowState, i: usize, j: usize) -> (f32, f32) {
        let g = &state.geometry;
        let k0 = state.first_free(i, j);
        let distance = 0.5 * g.dz(k0.min(g.nk));
        let ustar = if state.building[(i, j)] > 0.0 {
            let c = state.cell_velocity(i, j, k0.min(g.nk));
            let ln = (distance / self.building_roughness.max(1e-4)).max(E).ln();
            VON_KARMAN * c.x.hypot(c.y) / ln
        } else {
            state.ustar[(i, j)]
        };
        (
            (sq(ustar) / C_MU.sqrt()).max(TKE_FLOOR),
            (cube(ustar) / (VON_KARMAN * distance)).max(DISSIPATION_FLOOR),
        )
    }
}

impl TurbulenceClosure for KEpsilon {
    fn name(&self) -> &'static str {
        "k-epsilon"
    }

    fn initialise(&self, state: &mut FlowState) {
        state.turb.fill(TKE_FLOOR);
        state.tdiss.fill(DISSIPATION_FLOOR);
        let columns: Vec<(usize, usize)> = state.geometry.interior_columns().collect();
        for (i, j) in columns {
            let ustar = state.ustar[(i, j)];
            let tke = (sq(ustar) / C_MU.sqrt()).max(TKE_FLOOR);
            for k in state.first_free(i, j)..=state.geometry.nk {
                let z = state.height_above_ground(i, j, k).max(0.5 * state.geometry.dz(k));
                state.turb[(i, j, k)] = tke;
                state.tdiss[(i, j, k)] = (cube(ustar) / (VON_KARMAN * z)).max(DISSIPATION_FLOOR);
            }
        }
    }

    fn update_viscosity(&self, state: &mut FlowState) {
        let visc = fill_viscosity(state, self.floor, |view, i, j, k| self.viscosity(view, i, j, k));
        state.visc = visc;
    }

    fn transport(
        &self,
        state: &mut FlowState,
        direction: SweepDirection,
        time_step: f32,
        parallel: bool,
    ) {
        let production = fill_viscosity(state, 0.0, |view, i, j, k| {
            view.visc[(i, j, k)] * strain_rate_squared(view, i, j, k)
        });

        for quantity in [Quantity::Tke, Quantity::Dissipation] {
            let assembler = ScalarTransport {
                quantity,
                closure: self,
                production: &production,
                time_step,
            };
            solve_quantity(state, &assembler, direction, parallel);
        }
        state.turb.clamp_min(TKE_FLOOR);
        state.tdiss.clamp_min(DISSIPATION_FLOOR);
    }
}

/// Transport equation of TKE or ε at cell centres
struct ScalarTransport<'a> {
    quantity: Quantity,
    closure: &'a KEpsilon,
    production: &'a Field3,
    time_step: f32,
}

impl ColumnAssembler for ScalarTransport<'_> {
    fn quantity(&self) -> Quantity {
        self.quantity
    }

    fn rows(&self, state: &FlowState, i: usize, j: usize) -> Option<(usize, usize)> {
        if !state.advdom[(i, j)] {
            return None;
        }
        let k_lo = state.first_free(i, j);
        let k_hi = state.kadvmax.min(state.geometry.nk);
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
        let field = state.field(self.quantity);
        let sigma = match self.quantity {
            Quantity::Tke => SIGMA_K,
            _ => SIGMA_EPSILON,
        };
        let neighbours = [
            g.neighbour(i, j, 1, 0),
            g.neighbour(i, j, -1, 0),
            g.neighbour(i, j, 0, 1),
            g.neighbour(i, j, 0, -1),
        ];
        let open = |n: usize, k: usize| {
            neighbours[n].is_some_and(|(ni, nj)| !state.is_blocked(ni, nj, k))
        };
        let face_nu = |n: usize, k: usize| {
            let own = state.visc[(i, j, k)];
            neighbours[n].map_or(own, |(ni, nj)| 0.5 * (own + state.visc[(ni, nj, k)]))
        };

        let (wall_tke, wall_dissipation) = self.closure.wall_values(state, i, j);
        system.set_fixed(
            k_lo,
            match self.quantity {
                Quantity::Tke => wall_tke,
                _ => wall_dissipation,
            },
        );
        if k_lo == k_hi {
            return;
        }

        let rows = k_hi - k_lo;
        let mut stencil = Stencil::with_rows(rows);
        for (row, k) in (k_lo + 1..=k_hi).enumerate() {
            let dz = g.dz(k);
            let (area_x, area_y, area_z) = (g.dy * dz, g.dx * dz, g.horizontal_area());
            let nu_top = 0.5 * (state.visc[(i, j, k)] + state.visc[(i, j, k + 1)]);
            let nu_bottom = 0.5 * (state.visc[(i, j, k)] + state.visc[(i, j, k - 1)]);

            stencil.east.set(
                row,
                face_nu(0, k) / sigma * area_x / g.dx,
                state.u[(i + 1, j, k)] * area_x,
                open(0, k),
            );
            stencil.west.set(
                row,
                face_nu(1, k) / sigma * area_x / g.dx,
                state.u[(i, j, k)] * area_x,
                open(1, k),
            );
            stencil.north.set(
                row,
                face_nu(2, k) / sigma * area_y / g.dy,
                state.v[(i, j + 1, k)] * area_y,
                open(2, k),
            );
            stencil.south.set(
                row,
                face_nu(3, k) / sigma * area_y / g.dy,
                state.v[(i, j, k)] * area_y,
                open(3, k),
            );
            stencil.top.set(
                row,
                nu_top / sigma * area_z / g.center_spacing(k + 1),
                state.w[(i, j, k + 1)] * area_z,
                true,
            );
            stencil.bottom.set(
                row,
                nu_bottom / sigma * area_z / g.center_spacing(k),
                state.w[(i, j, k)] * area_z,
                true,
            );
        }
        let coefficients = stencil.coefficients();

        let obukhov = state.obukhov[(i, j)];
        let buoyancy = if obukhov == 0.0 {
            0.0
        } else {
            -cube(state.ustar[(i, j)]) / (VON_KARMAN * obukhov)
        };

        for (row, k) in (k_lo + 1..=k_hi).enumerate() {
            let volume = g.cell_volume(k);
            let inertia = volume / self.time_step;
            let value = field[(i, j, k)];
            let tke = state.turb[(i, j, k)].max(TKE_FLOOR);
            let rate = state.tdiss[(i, j, k)].max(DISSIPATION_FLOOR) / tke;
            let production = self.production[(i, j, k)];

            let (mut source, sink) = match self.quantity {
                Quantity::Tke => {
                    let buoyancy_sink = if buoyancy < 0.0 { -buoyancy / tke } else { 0.0 };
                    (
                        (production + buoyancy.max(0.0)) * volume,
                        (rate + buoyancy_sink) * volume,
                    )
                }
                _ => (
                    C_1 * rate * (production + buoyancy.max(0.0)) * volume,
                    C_2 * rate * volume,
                ),
            };
            source += inertia * value;
            let lateral = [
                &coefficients.east,
                &coefficients.west,
                &coefficients.north,
                &coefficients.south,
            ];
            for (n, neighbour) in neighbours.iter().enumerate() {
                if let Some((ni, nj)) = *neighbour {
                    source += lateral[n][row] * field[(ni, nj, k)];
                }
            }

            system.set(
                k,
                coefficients.total(row) + sink + inertia,
                coefficients.top[row],
                coefficients.bottom[row],
                source,
            );
        }
    }

    fn relaxation(&self) -> f32 {
        self.closure.relaxation
    }

    fn floor(&self) -> Option<f32> {
        Some(match self.quantity {
            Quantity::Tke => TKE_FLOOR,
            _ => DISSIPATION_FLOOR,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::GridGeometry;
    use approx::assert_relative_eq;

    fn sheared_state() -> FlowState {
        let geometry = GridGeometry::uniform(4, 4, 10, 5.0, 5.0, 2.0).unwrap();
        let mut state = FlowState::new(geometry);
        for i in 1..=5 {
            for j in 1..=4 {
                for k in 1..=10 {
                    state.u[(i, j, k)] = 0.5 * k as f32;
                }
            }
        }
        state.advdom.fill(true);
        state.kadvmax = 10;
        state.set_surface_layer(0.4, 0.0);
        state
    }

    #[test]
    fn test_mixing_length_viscosity_from_shear() {
        let state = sheared_state();
        let closure = MixingLength { floor: 0.01 };
        // dU/dz = 0.25 1/s; z = 9 m
        let expected = sq(MIXING_LENGTH_SLOPE * 9.0) * (0.5 * sq(0.25f32)).sqrt();
        assert_relative_eq!(closure.viscosity(&state, 2, 2, 5), expected.max(0.01), epsilon = 1e-6);
    }

    #[test]
    fn test_mixing_length_caps_and_canopy_damping() {
        let mut state = sheared_state();
        for i in 1..=5 {
            for j in 1..=4 {
                for k in 1..=10 {
                    state.u[(i, j, k)] = 40.0 * k as f32;
                }
            }
        }
        let closure = MixingLength { floor: 0.01 };
        assert_relative_eq!(closure.viscosity(&state, 2, 2, 10), MAX_VISCOSITY);
        state.veg_cover[(2, 2, 10)] = 1.0;
        assert_relative_eq!(closure.viscosity(&state, 2, 2, 10), 0.5 * MAX_VISCOSITY);
    }

    #[test]
    fn test_mixing_length_floor_in_calm_air() {
        let geometry = GridGeometry::uniform(3, 3, 4, 2.0, 2.0, 2.0).unwrap();
        let mut state = FlowState::new(geometry);
        let closure = MixingLength { floor: 0.05 };
        closure.update_viscosity(&mut state);
        assert!(state.visc.as_slice().iter().all(|&nu| nu == 0.05));
    }

    #[test]
    fn test_k_epsilon_initial_fields_follow_wall_functions() {
        let mut state = sheared_state();
        let closure = KEpsilon {
            floor: 0.01,
            relaxation: 0.5,
            building_roughness: 0.01,
        };
        closure.initialise(&mut state);
        assert_relative_eq!(state.turb[(1, 1, 3)], 0.16 / 0.3, epsilon = 1e-5);
        assert_relative_eq!(state.tdiss[(1, 1, 3)], 0.064 / (0.4 * 5.0), epsilon = 1e-5);

        closure.update_viscosity(&mut state);
        let nu = state.visc[(1, 1, 3)];
        assert_relative_eq!(
            nu,
            KEpsilon::viscosity_factor() * 5.0 * (0.16f32 / 0.3).sqrt(),
            epsilon = 1e-5
        );
    }

    #[test]
    fn test_k_epsilon_transport_stays_positive() {
        let mut state = sheared_state();
        state.set_surface_layer(0.4, -20.0);
        let closure = KEpsilon {
            floor: 0.01,
            relaxation: 0.7,
            building_roughness: 0.01,
        };
        closure.initialise(&mut state);
        for direction in SweepDirection::ALL {
            closure.update_viscosity(&mut state);
            closure.transport(&mut state, direction, 2.0, true);
        }
        assert!(state.turb.as_slice().iter().all(|&k| k >= TKE_FLOOR && k.is_finite()));
        assert!(state
            .tdiss
            .as_slice()
            .iter()
            .all(|&e| e >= DISSIPATION_FLOOR && e.is_finite()));
        // Wall function pins the first free cell
        assert_relative_eq!(state.turb[(2, 2, 1)], 0.16 / 0.3, epsilon = 1e-5);
    }

    #[test]
    fn test_strain_rate_of_linear_shear() {
        let state = sheared_state();
        assert_relative_eq!(strain_rate_squared(&state, 2, 2, 5), sq(0.25), epsilon = 1e-6);
    }

    #[test]
    fn test_create_closure_selects_model() {
        let mixing = create_closure(ClosureKind::MixingLength, 0.01, 0.5, 0.01);
        assert_eq!(mixing.name(), "mixing-length");
        let k_epsilon = create_closure(ClosureKind::KEpsilon, 0.01, 0.5, 0.01);
        assert_eq!(k_epsilon.name(), "k-epsilon");
    }
}

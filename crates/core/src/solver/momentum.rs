//! Prognostic momentum equations for U, V and W
//!
//! Each face velocity gets a control volume centred on its face. Convection
//! and diffusion through the six control-volume faces are weighted with the
//! power-law scheme, the accumulated pressure correction DPM drives the
//! pressure-gradient source, and the pseudo time step DTIME adds inertia.
//! Vegetation drag, Coriolis nudging towards the geostrophic profile and
//! wall friction enter as implicit sinks on the diagonal.

use super::column::ColumnAssembler;
use super::power_law::Stencil;
use super::tdma::ColumnSystem;
use super::turbulence::VON_KARMAN;
use crate::grid::{sq, FlowState, Quantity};
use std::f32::consts::E;

/// Speed floor used in friction terms (m/s)
const MIN_SPEED: f32 = 0.01;

/// Inputs shared by the momentum sweeps of one iteration
#[derive(Debug, Clone, PartialEq)]
pub struct MomentumParams {
    /// Under-relaxation of the backward sweep
    pub relaxation: f32,
    /// Pseudo time step DTIME (s)
    pub time_step: f32,
    /// Coriolis parameter (1/s)
    pub coriolis: f32,
    /// Roughness length of building surfaces (m)
    pub building_roughness: f32,
    /// Geostrophic u per layer, length `nk + 2`
    pub geostrophic_u: Vec<f32>,
    /// Geostrophic v per layer, length `nk + 2`
    pub geostrophic_v: Vec<f32>,
}

/// Log-law wall friction per unit wall area for a cell `distance` from the wall
#[inline]
pub fn log_law_friction(speed: f32, distance: f32, roughness: f32) -> f32 {
    let ln = (distance / roughness.max(1e-4)).max(E).ln();
    sq(VON_KARMAN) * speed.max(MIN_SPEED) / sq(ln)
}

/// Horizontal axis of a face velocity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    X,
    Y,
}

impl Axis {
    /// `(along_i, along_j, cross_i, cross_j)` unit steps
    fn steps(self) -> (usize, usize, usize, usize) {
        match self {
            Self::X => (1, 0, 0, 1),
            Self::Y => (0, 1, 1, 0),
        }
    }
}

/// U (`Axis::X`) or V (`Axis::Y`) momentum
pub struct HorizontalMomentum<'a> {
    pub axis: Axis,
    pub params: &'a MomentumParams,
}

impl HorizontalMomentum<'_> {
    fn face_blocked(&self, state: &FlowState, i: usize, j: usize, k: usize) -> bool {
        match self.axis {
            Axis::X => state.u_face_blocked(i, j, k),
            Axis::Y => state.v_face_blocked(i, j, k),
        }
    }

    /// Cross-direction neighbour face, if it is an interior face of the same kind
    fn cross_neighbour(
        &self,
        state: &FlowState,
        i: usize,
        j: usize,
        up: bool,
    ) -> Option<(usize, usize)> {
        let g = &state.geometry;
        let (_, _, ci, cj) = self.axis.steps();
        let (di, dj) = if up {
            (ci as isize, cj as isize)
        } else {
            (-(ci as isize), -(cj as isize))
        };
        let ni = i.checked_add_signed(di)?;
        let nj = j.checked_add_signed(dj)?;
        match self.axis {
            Axis::X => ((1..=g.nj).contains(&nj)).then_some((ni, nj)),
            Axis::Y => ((1..=g.ni).contains(&ni)).then_some((ni, nj)),
        }
    }
}

impl ColumnAssembler for HorizontalMomentum<'_> {
    fn quantity(&self) -> Quantity {
        match self.axis {
            Axis::X => Quantity::U,
            Axis::Y => Quantity::V,
        }
    }

    fn rows(&self, state: &FlowState, i: usize, j: usize) -> Option<(usize, usize)> {
        let (ai, aj, _, _) = self.axis.steps();
        // Boundary faces are inflow/outflow values
        if i <= ai || j <= aj {
            return None;
        }
        let (mi, mj) = (i - ai, j - aj);
        if !(state.advdom[(i, j)] && state.advdom[(mi, mj)]) {
            return None;
        }
        let k_lo = state.kkart[(i, j)].max(state.kkart[(mi, mj)]) + 1;
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
        let p = self.params;
        let (ai, aj, ci, cj) = self.axis.steps();
        let (mi, mj) = (i - ai, j - aj);
        let (own, cross) = match self.axis {
            Axis::X => (&state.u, &state.v),
            Axis::Y => (&state.v, &state.u),
        };
        let geostrophic = match self.axis {
            Axis::X => &p.geostrophic_u,
            Axis::Y => &p.geostrophic_v,
        };
        let (h_along, h_cross) = match self.axis {
            Axis::X => (g.dx, g.dy),
            Axis::Y => (g.dy, g.dx),
        };
        let area_vert = h_along * h_cross;
        let north = self.cross_neighbour(state, i, j, true);
        let south = self.cross_neighbour(state, i, j, false);

        let rows = k_hi - k_lo + 1;
        let mut stencil = Stencil::with_rows(rows);
        for (row, k) in (k_lo..=k_hi).enumerate() {
            let dz = g.dz(k);
            let area_along = h_cross * dz;
            let area_cross = h_along * dz;
            let nu = 0.5 * (state.visc[(mi, mj, k)] + state.visc[(i, j, k)]);

            let d_along = nu * area_along / h_along;
            let d_cross = nu * area_cross / h_cross;
            let flux_east = 0.5 * (own[(i, j, k)] + own[(i + ai, j + aj, k)]) * area_along;
            let flux_west = 0.5 * (own[(mi, mj, k)] + own[(i, j, k)]) * area_along;
            let flux_north =
                0.5 * (cross[(mi + ci, mj + cj, k)] + cross[(i + ci, j + cj, k)]) * area_cross;
            let flux_south = 0.5 * (cross[(mi, mj, k)] + cross[(i, j, k)]) * area_cross;
            let flux_top = 0.5 * (state.w[(mi, mj, k + 1)] + state.w[(i, j, k + 1)]) * area_vert;
            let flux_bottom = 0.5 * (state.w[(mi, mj, k)] + state.w[(i, j, k)]) * area_vert;

            let north_open = north.is_some_and(|(ni, nj)| !self.face_blocked(state, ni, nj, k));
            let south_open = south.is_some_and(|(si, sj)| !self.face_blocked(state, si, sj, k));

            stencil.east.set(row, d_along, flux_east, true);
            stencil.west.set(row, d_along, flux_west, true);
            stencil.north.set(row, d_cross, flux_north, north_open);
            stencil.south.set(row, d_cross, flux_south, south_open);
            stencil.top.set(row, nu * area_vert / g.center_spacing(k + 1), flux_top, true);
            // The lowest row sits on a surface: friction replaces the bottom coupling
            stencil.bottom.set(
                row,
                nu * area_vert / g.center_spacing(k),
                flux_bottom,
                k > k_lo,
            );
        }
        let coefficients = stencil.coefficients();

        for (row, k) in (k_lo..=k_hi).enumerate() {
            let dz = g.dz(k);
            let volume = area_vert * dz;
            let area_along = h_cross * dz;
            let area_cross = h_along * dz;

            let value = own[(i, j, k)];
            let cross_mean = 0.25
                * (cross[(mi, mj, k)]
                    + cross[(i, j, k)]
                    + cross[(mi + ci, mj + cj, k)]
                    + cross[(i + ci, j + cj, k)]);
            let w_mean = 0.25
                * (state.w[(mi, mj, k)]
                    + state.w[(i, j, k)]
                    + state.w[(mi, mj, k + 1)]
                    + state.w[(i, j, k + 1)]);
            let horizontal_speed = value.hypot(cross_mean).max(MIN_SPEED);
            let speed = (sq(value) + sq(cross_mean) + sq(w_mean)).sqrt().max(MIN_SPEED);

            let mut sink = 0.0;
            let drag = 0.5 * (state.veg_drag[(mi, mj, k)] + state.veg_drag[(i, j, k)]);
            sink += drag * speed * volume;
            sink += p.coriolis * volume;

            for neighbour in [north, south].into_iter().flatten() {
                if self.face_blocked(state, neighbour.0, neighbour.1, k) {
                    sink += log_law_friction(horizontal_speed, 0.5 * h_cross, p.building_roughness)
                        * area_cross;
                }
            }
            if k == k_lo {
                sink += surface_friction(state, (mi, mj), (i, j), horizontal_speed, dz, p)
                    * area_vert;
            }

            let inertia = volume / p.time_step;
            let mut source = coefficients.east[row] * own[(i + ai, j + aj, k)]
                + coefficients.west[row] * own[(mi, mj, k)]
                + (state.dpm[(mi, mj, k)] - state.dpm[(i, j, k)]) * area_along
                + p.coriolis * geostrophic[k] * volume
                + inertia * value;
            if let Some((ni, nj)) = north {
                source += coefficients.north[row] * own[(ni, nj, k)];
            }
            if let Some((si, sj)) = south {
                source += coefficients.south[row] * own[(si, sj, k)];
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
        self.params.relaxation
    }
}

/// Friction per unit area under the lowest free face of a column pair
fn surface_friction(
    state: &FlowState,
    a: (usize, usize),
    b: (usize, usize),
    speed: f32,
    dz: f32,
    params: &MomentumParams,
) -> f32 {
    let on_roof = state.building[a] > 0.0 || state.building[b] > 0.0;
    if on_roof || state.kkart[a] != state.kkart[b] {
        log_law_friction(speed, 0.5 * dz, params.building_roughness)
    } else {
        let ustar = 0.5 * (state.ustar[a] + state.ustar[b]);
        sq(ustar) / speed.max(MIN_SPEED)
    }
}

/// W momentum on bottom faces
pub struct VerticalMomentum<'a> {
    pub params: &'a MomentumParams,
}

impl ColumnAssembler for VerticalMomentum<'_> {
    fn quantity(&self) -> Quantity {
        Quantity::W
    }

    fn rows(&self, state: &FlowState, i: usize, j: usize) -> Option<(usize, usize)> {
        if !state.advdom[(i, j)] {
            return None;
        }
        // Ground face stays zero
        let k_lo = state.kkart[(i, j)] + 2;
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
        let p = self.params;
        let (u, v, w) = (&state.u, &state.v, &state.w);
        let area_z = g.horizontal_area();
        let neighbours = [
            g.neighbour(i, j, 1, 0),
            g.neighbour(i, j, -1, 0),
            g.neighbour(i, j, 0, 1),
            g.neighbour(i, j, 0, -1),
        ];
        let open = |k: usize, n: usize| {
            neighbours[n].is_some_and(|(ni, nj)| !state.w_face_blocked(ni, nj, k))
        };

        let rows = k_hi - k_lo + 1;
        let mut stencil = Stencil::with_rows(rows);
        for (row, k) in (k_lo..=k_hi).enumerate() {
            let h = g.center_spacing(k);
            let (area_x, area_y) = (g.dy * h, g.dx * h);
            let nu = 0.5 * (state.visc[(i, j, k - 1)] + state.visc[(i, j, k)]);

            let flux_east = 0.5 * (u[(i + 1, j, k - 1)] + u[(i + 1, j, k)]) * area_x;
            let flux_west = 0.5 * (u[(i, j, k - 1)] + u[(i, j, k)]) * area_x;
            let flux_north = 0.5 * (v[(i, j + 1, k - 1)] + v[(i, j + 1, k)]) * area_y;
            let flux_south = 0.5 * (v[(i, j, k - 1)] + v[(i, j, k)]) * area_y;
            let flux_top = 0.5 * (w[(i, j, k)] + w[(i, j, k + 1)]) * area_z;
            let flux_bottom = 0.5 * (w[(i, j, k - 1)] + w[(i, j, k)]) * area_z;

            stencil.east.set(row, nu * area_x / g.dx, flux_east, open(k, 0));
            stencil.west.set(row, nu * area_x / g.dx, flux_west, open(k, 1));
            stencil.north.set(row, nu * area_y / g.dy, flux_north, open(k, 2));
            stencil.south.set(row, nu * area_y / g.dy, flux_south, open(k, 3));
            stencil.top.set(row, nu * area_z / g.dz(k), flux_top, true);
            stencil.bottom.set(row, nu * area_z / g.dz(k - 1), flux_bottom, true);
        }
        let coefficients = stencil.coefficients();

        for (row, k) in (k_lo..=k_hi).enumerate() {
            let h = g.center_spacing(k);
            let volume = area_z * h;
            let (area_x, area_y) = (g.dy * h, g.dx * h);
            let value = w[(i, j, k)];

            let u_mean = 0.25
                * (u[(i, j, k - 1)] + u[(i + 1, j, k - 1)] + u[(i, j, k)] + u[(i + 1, j, k)]);
            let v_mean = 0.25
                * (v[(i, j, k - 1)] + v[(i, j + 1, k - 1)] + v[(i, j, k)] + v[(i, j + 1, k)]);
            let speed = (sq(u_mean) + sq(v_mean) + sq(value)).sqrt().max(MIN_SPEED);

            let mut sink =
                0.5 * (state.veg_drag[(i, j, k - 1)] + state.veg_drag[(i, j, k)]) * speed * volume;
            for (n, neighbour) in neighbours.iter().enumerate() {
                if let Some((ni, nj)) = *neighbour {
                    if state.w_face_blocked(ni, nj, k) {
                        let (distance, area) = if n < 2 {
                            (0.5 * g.dx, area_x)
                        } else {
                            (0.5 * g.dy, area_y)
                        };
                        sink += log_law_friction(speed, distance, p.building_roughness) * area;
                    }
                }
            }

            let inertia = volume / p.time_step;
            let mut source = (state.dpm[(i, j, k - 1)] - state.dpm[(i, j, k)]) * area_z
                + inertia * value;
            let lateral = [
                &coefficients.east,
                &coefficients.west,
                &coefficients.north,
                &coefficients.south,
            ];
            for (n, neighbour) in neighbours.iter().enumerate() {
                if let Some((ni, nj)) = *neighbour {
                    source += lateral[n][row] * w[(ni, nj, k)];
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
        self.params.relaxation
    }
}

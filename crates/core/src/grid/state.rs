//! Owned flow state for one simulation
//!
//! Staggering follows the Arakawa-C convention:
//! - `u[(i, j, k)]` sits on the west face of cell `(i, j, k)`, so the east face
//!   of that cell is `u[(i + 1, j, k)]`
//! - `v[(i, j, k)]` sits on the south face
//! - `w[(i, j, k)]` sits on the bottom face
//! - pressure, turbulence and viscosity are cell centred
//!
//! The state is allocated once per simulation and reset at the start of
//! every weather situation; all solver stages borrow it explicitly.

use super::field::{Field2, Field3};
use super::geometry::GridGeometry;
use super::obstacles::ObstacleMap;
use crate::core_types::vec3::Vec3;
use crate::error::{FlowError, FlowResult};
use rayon::prelude::*;

/// Lower bound for turbulent kinetic energy (m²/s²)
pub const TKE_FLOOR: f32 = 1e-3;
/// Lower bound for the dissipation rate (m²/s³)
pub const DISSIPATION_FLOOR: f32 = 1e-7;

/// Solved quantities that a column sweep can write into
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quantity {
    U,
    V,
    W,
    Tke,
    Dissipation,
    PressureIncrement,
}

/// Velocity, pressure correction, turbulence and obstacle arrays of one grid
#[derive(Debug, Clone)]
pub struct FlowState {
    pub geometry: GridGeometry,
    /// x velocity on west faces (m/s)
    pub u: Field3,
    /// y velocity on south faces (m/s)
    pub v: Field3,
    /// z velocity on bottom faces (m/s)
    pub w: Field3,
    /// Accumulated pressure correction (DPM)
    pub dpm: Field3,
    /// Pressure correction increment of the current iteration
    pub dpm_new: Field3,
    /// Volume-flux imbalance per cell (m³/s, positive = net outflow)
    pub div: Field3,
    /// Turbulent kinetic energy (m²/s²)
    pub turb: Field3,
    /// Dissipation rate of TKE (m²/s³)
    pub tdiss: Field3,
    /// Eddy viscosity at cell centres (m²/s)
    pub visc: Field3,
    /// Vegetation drag coefficient per cell (1/m)
    pub veg_drag: Field3,
    /// Vegetation cover fraction per cell [0, 1]
    pub veg_cover: Field3,
    /// Highest blocked layer per column (0 = unobstructed)
    pub kkart: Field2<usize>,
    /// Obstacle top height per column (terrain + building, m)
    pub cutk: Field2<f32>,
    /// Terrain height per column (m)
    pub ground: Field2<f32>,
    /// Building height above terrain per column (m)
    pub building: Field2<f32>,
    /// Columns inside the prognostic sub-domain
    pub advdom: Field2<bool>,
    /// Surface friction velocity per column (m/s)
    pub ustar: Field2<f32>,
    /// Obukhov length per column (m, 0 = neutral)
    pub obukhov: Field2<f32>,
    /// Top layer of the advection-active column
    pub kadvmax: usize,
}

impl FlowState {
    /// Allocate a zeroed state on `geometry` with no obstacles
    pub fn new(geometry: GridGeometry) -> Self {
        let field = || Field3::new(&geometry);
        Self {
            u: field(),
            v: field(),
            w: field(),
            dpm: field(),
            dpm_new: field(),
            div: field(),
            turb: Field3::with_value(&geometry, TKE_FLOOR),
            tdiss: Field3::with_value(&geometry, DISSIPATION_FLOOR),
            visc: field(),
            veg_drag: field(),
            veg_cover: field(),
            kkart: Field2::new(&geometry, 0),
            cutk: Field2::new(&geometry, 0.0),
            ground: Field2::new(&geometry, 0.0),
            building: Field2::new(&geometry, 0.0),
            advdom: Field2::new(&geometry, false),
            ustar: Field2::new(&geometry, 0.0),
            obukhov: Field2::new(&geometry, 0.0),
            kadvmax: 0,
            geometry,
        }
    }

    /// Derive KKART/CUTK from an obstacle map
    ///
    /// # Errors
    ///
    /// Fails if the map does not cover this grid.
    pub fn apply_obstacles(&mut self, obstacles: &ObstacleMap) -> FlowResult<()> {
        let (ni, nj) = (self.geometry.ni, self.geometry.nj);
        if obstacles.ni() != ni || obstacles.nj() != nj {
            return Err(FlowError::dimension_mismatch(
                "obstacles",
                ni * nj,
                obstacles.ni() * obstacles.nj(),
            ));
        }

        for (i, j) in self.geometry.interior_columns() {
            let top = obstacles.obstacle_top(i, j);
            self.ground[(i, j)] = obstacles.terrain_height(i, j);
            self.building[(i, j)] = obstacles.building_height(i, j);
            self.cutk[(i, j)] = top;
            self.kkart[(i, j)] = self.geometry.blocked_layers(top);
        }
        self.ground.extend_edges();
        self.building.extend_edges();
        self.cutk.extend_edges();
        self.kkart.extend_edges();

        self.enforce_obstacles();
        Ok(())
    }

    /// Load vegetation drag and cover, both `ni · nj · nk` long, `i` fastest then `j`, then `k`
    ///
    /// # Errors
    ///
    /// Fails if either array has the wrong length.
    pub fn set_vegetation(&mut self, drag: &[f32], cover: &[f32]) -> FlowResult<()> {
        let g = &self.geometry;
        let expected = g.ni * g.nj * g.nk;
        if drag.len() != expected {
            return Err(FlowError::dimension_mismatch("vegetation_drag", expected, drag.len()));
        }
        if cover.len() != expected {
            return Err(FlowError::dimension_mismatch("vegetation_cover", expected, cover.len()));
        }
        for k in 1..=g.nk {
            for (i, j) in g.interior_columns() {
                let n = ((k - 1) * g.nj + (j - 1)) * g.ni + (i - 1);
                self.veg_drag[(i, j, k)] = drag[n].max(0.0);
                self.veg_cover[(i, j, k)] = cover[n].clamp(0.0, 1.0);
            }
        }
        Ok(())
    }

    /// Apply the same surface-layer parameters to every column
    pub fn set_surface_layer(&mut self, friction_velocity: f32, obukhov_length: f32) {
        self.ustar.fill(friction_velocity.max(0.0));
        self.obukhov.fill(obukhov_length);
    }

    /// Zero the flow fields for a new weather situation
    pub fn reset_situation(&mut self) {
        for field in [
            &mut self.u,
            &mut self.v,
            &mut self.w,
            &mut self.dpm,
            &mut self.dpm_new,
            &mut self.div,
            &mut self.visc,
        ] {
            field.fill(0.0);
        }
        self.turb.fill(TKE_FLOOR);
        self.tdiss.fill(DISSIPATION_FLOOR);
        self.advdom.fill(false);
        self.kadvmax = 0;
    }

    pub fn field(&self, quantity: Quantity) -> &Field3 {
        match quantity {
            Quantity::U => &self.u,
            Quantity::V => &self.v,
            Quantity::W => &self.w,
            Quantity::Tke => &self.turb,
            Quantity::Dissipation => &self.tdiss,
            Quantity::PressureIncrement => &self.dpm_new,
        }
    }

    pub fn field_mut(&mut self, quantity: Quantity) -> &mut Field3 {
        match quantity {
            Quantity::U => &mut self.u,
            Quantity::V => &mut self.v,
            Quantity::W => &mut self.w,
            Quantity::Tke => &mut self.turb,
            Quantity::Dissipation => &mut self.tdiss,
            Quantity::PressureIncrement => &mut self.dpm_new,
        }
    }

    /// Cell `(i, j, k)` lies inside an obstacle
    #[inline]
    pub fn is_blocked(&self, i: usize, j: usize, k: usize) -> bool {
        k <= self.kkart[(i, j)]
    }

    /// Lowest free layer of a column
    #[inline]
    pub fn first_free(&self, i: usize, j: usize) -> usize {
        self.kkart[(i, j)] + 1
    }

    /// U face `(i, j, k)` touches an obstacle cell on either side
    #[inline]
    pub fn u_face_blocked(&self, i: usize, j: usize, k: usize) -> bool {
        k <= self.kkart[(i - 1, j)].max(self.kkart[(i, j)])
    }

    /// V face `(i, j, k)` touches an obstacle cell on either side
    #[inline]
    pub fn v_face_blocked(&self, i: usize, j: usize, k: usize) -> bool {
        k <= self.kkart[(i, j - 1)].max(self.kkart[(i, j)])
    }

    /// W face `(i, j, k)` is inside an obstacle or is the ground face
    #[inline]
    pub fn w_face_blocked(&self, i: usize, j: usize, k: usize) -> bool {
        k <= self.kkart[(i, j)] + 1
    }

    /// Zero every velocity component on obstacle and ground faces
    pub fn enforce_obstacles(&mut self) {
        let kkart = &self.kkart;
        self.u.par_columns_mut().for_each(|(i, j, column)| {
            if i > 0 {
                let limit = kkart[(i - 1, j)].max(kkart[(i, j)]);
                column[..=limit].fill(0.0);
            }
        });
        self.v.par_columns_mut().for_each(|(i, j, column)| {
            if j > 0 {
                let limit = kkart[(i, j - 1)].max(kkart[(i, j)]);
                column[..=limit].fill(0.0);
            }
        });
        self.w.par_columns_mut().for_each(|(i, j, column)| {
            let limit = (kkart[(i, j)] + 1).min(column.len() - 1);
            column[..=limit].fill(0.0);
        });
    }

    /// Net volume outflow of cell `(i, j, k)` (m³/s)
    #[inline]
    pub fn divergence_at(&self, i: usize, j: usize, k: usize) -> f32 {
        flux_imbalance(&self.geometry, &self.u, &self.v, &self.w, (i, j, k))
    }

    /// Largest absolute volume-flux imbalance over free interior cells
    pub fn max_divergence(&self) -> f32 {
        let g = &self.geometry;
        (1..=g.ni)
            .into_par_iter()
            .map(|i| {
                let mut max = 0.0f32;
                for j in 1..=g.nj {
                    for k in self.first_free(i, j)..=g.nk {
                        max = max.max(self.divergence_at(i, j, k).abs());
                    }
                }
                max
            })
            .reduce(|| 0.0, f32::max)
    }

    /// Cell-centred velocity interpolated from the staggered faces
    pub fn cell_velocity(&self, i: usize, j: usize, k: usize) -> Vec3 {
        Vec3::new(
            0.5 * (self.u[(i, j, k)] + self.u[(i + 1, j, k)]),
            0.5 * (self.v[(i, j, k)] + self.v[(i, j + 1, k)]),
            0.5 * (self.w[(i, j, k)] + self.w[(i, j, k + 1)]),
        )
    }

    /// Largest cell-centred horizontal wind speed in the interior
    pub fn max_horizontal_speed(&self) -> f32 {
        let g = &self.geometry;
        (1..=g.ni)
            .into_par_iter()
            .map(|i| {
                let mut max = 0.0f32;
                for j in 1..=g.nj {
                    for k in self.first_free(i, j)..=g.nk {
                        let c = self.cell_velocity(i, j, k);
                        max = max.max(c.x.hypot(c.y));
                    }
                }
                max
            })
            .reduce(|| 0.0, f32::max)
    }

    /// Highest blocked layer over all interior columns
    pub fn max_obstacle_layer(&self) -> usize {
        self.geometry
            .interior_columns()
            .map(|(i, j)| self.kkart[(i, j)])
            .max()
            .unwrap_or(0)
    }

    /// Height above local terrain of the centre of cell `(i, j, k)`
    #[inline]
    pub fn height_above_ground(&self, i: usize, j: usize, k: usize) -> f32 {
        self.geometry.layer_center(k) - self.ground[(i, j)]
    }
}

/// Net volume outflow of cell `(i, j, k)` from the three staggered components
#[inline]
pub fn flux_imbalance(
    geometry: &GridGeometry,
    u: &Field3,
    v: &Field3,
    w: &Field3,
    (i, j, k): (usize, usize, usize),
) -> f32 {
    let dz = geometry.dz(k);
    (u[(i + 1, j, k)] - u[(i, j, k)]) * geometry.dy * dz
        + (v[(i, j + 1, k)] - v[(i, j, k)]) * geometry.dx * dz
        + (w[(i, j, k + 1)] - w[(i, j, k)]) * geometry.dx * geometry.dy
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state_with_block() -> FlowState {
        let geometry = GridGeometry::uniform(5, 5, 6, 2.0, 2.0, 2.0).unwrap();
        let mut state = FlowState::new(geometry);
        let mut map = ObstacleMap::flat(5, 5);
        map.add_block(3, 3, 3, 3, 5.0);
        state.apply_obstacles(&map).unwrap();
        state
    }

    #[test]
    fn test_obstacle_masking_sets_kkart() {
        let state = state_with_block();
        assert_eq!(state.kkart[(3, 3)], 2);
        assert_eq!(state.kkart[(2, 3)], 0);
        assert!(state.is_blocked(3, 3, 2));
        assert!(!state.is_blocked(3, 3, 3));
        assert!(state.u_face_blocked(3, 3, 1));
        assert!(state.u_face_blocked(4, 3, 2));
        assert!(!state.u_face_blocked(5, 3, 1));
        assert!(state.w_face_blocked(3, 3, 3));
        assert!(!state.w_face_blocked(3, 3, 4));
    }

    #[test]
    fn test_enforce_obstacles_zeroes_faces() {
        let mut state = state_with_block();
        state.u.fill(4.0);
        state.v.fill(1.0);
        state.w.fill(0.5);
        state.enforce_obstacles();

        assert_eq!(state.u[(3, 3, 2)], 0.0);
        assert_eq!(state.u[(4, 3, 1)], 0.0);
        assert_eq!(state.u[(4, 3, 3)], 4.0);
        assert_eq!(state.v[(3, 4, 2)], 0.0);
        assert_eq!(state.w[(3, 3, 3)], 0.0);
        assert_eq!(state.w[(3, 3, 4)], 0.5);
        // Ground faces on flat ground
        assert_eq!(state.w[(1, 1, 1)], 0.0);
        assert_eq!(state.w[(1, 1, 2)], 0.5);
    }

    #[test]
    fn test_divergence_of_uniform_flow_vanishes_aloft() {
        let mut state = state_with_block();
        state.u.fill(3.0);
        state.enforce_obstacles();
        assert_eq!(state.divergence_at(1, 1, 4), 0.0);
        // Flow stops against the west wall of the block
        assert!(state.divergence_at(2, 3, 1) < 0.0);
    }

    #[test]
    fn test_cell_velocity_averages_faces() {
        let mut state = state_with_block();
        state.u[(1, 1, 4)] = 2.0;
        state.u[(2, 1, 4)] = 4.0;
        state.w[(1, 1, 5)] = 1.0;
        let c = state.cell_velocity(1, 1, 4);
        assert_eq!(c.x, 3.0);
        assert_eq!(c.y, 0.0);
        assert_eq!(c.z, 0.5);
    }

    #[test]
    fn test_reset_situation_restores_floors() {
        let mut state = state_with_block();
        state.u.fill(1.0);
        state.turb.fill(3.0);
        state.kadvmax = 4;
        state.reset_situation();
        assert_eq!(state.u.max_abs(), 0.0);
        assert_eq!(state.turb[(2, 2, 2)], TKE_FLOOR);
        assert_eq!(state.kadvmax, 0);
        assert_eq!(state.kkart[(3, 3)], 2);
    }

    #[test]
    fn test_vegetation_layout() {
        let geometry = GridGeometry::uniform(2, 2, 2, 1.0, 1.0, 1.0).unwrap();
        let mut state = FlowState::new(geometry);
        let mut drag = vec![0.0; 8];
        drag[5] = 0.3; // i = 2, j = 1, k = 2
        state.set_vegetation(&drag, &[2.0; 8]).unwrap();
        assert_eq!(state.veg_drag[(2, 1, 2)], 0.3);
        assert_eq!(state.veg_cover[(1, 1, 1)], 1.0);
        assert!(state.set_vegetation(&[0.0; 3], &[0.0; 8]).is_err());
    }
}

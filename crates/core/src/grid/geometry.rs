//! Structured grid geometry
//!
//! Horizontal cells are indexed `i ∈ [1, ni]`, `j ∈ [1, nj]` with uniform spacing
//! `dx`, `dy`; vertical layers `k ∈ [1, nk]` have individual thicknesses `dz[k]`
//! and cumulative layer tops `hokart[k]` (`hokart[0] = 0`). Index 0 and
//! `n + 1` in every direction are ghost positions so neighbour lookups never
//! leave the arrays.

use crate::error::{FlowError, FlowResult};
use serde::{Deserialize, Serialize};

/// Tolerance when comparing layer tops against obstacle heights (m)
const HEIGHT_EPSILON: f32 = 1e-3;

/// Dimensions and spacings of the staggered solver grid
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridGeometry {
    /// Cells in x (west → east)
    pub ni: usize,
    /// Cells in y (south → north)
    pub nj: usize,
    /// Vertical layers (ground → top)
    pub nk: usize,
    /// Horizontal spacing in x (m)
    pub dx: f32,
    /// Horizontal spacing in y (m)
    pub dy: f32,
    /// Layer thickness, length `nk + 2` with ghost copies at both ends
    dz: Vec<f32>,
    /// Layer top height above the domain bottom, length `nk + 2`
    hokart: Vec<f32>,
}

impl GridGeometry {
    /// Build a grid from explicit layer thicknesses (bottom layer first)
    ///
    /// # Errors
    ///
    /// Returns [`FlowError::InvalidGrid`] for empty dimensions or non-positive spacings.
    pub fn from_layers(ni: usize, nj: usize, dx: f32, dy: f32, layers: &[f32]) -> FlowResult<Self> {
        if ni == 0 || nj == 0 || layers.is_empty() {
            return Err(FlowError::InvalidGrid(format!(
                "dimensions must be positive, got {ni}x{nj}x{}",
                layers.len()
            )));
        }
        if !(dx.is_finite() && dx > 0.0 && dy.is_finite() && dy > 0.0) {
            return Err(FlowError::InvalidGrid(format!(
                "horizontal spacing must be finite and positive, got dx={dx}, dy={dy}"
            )));
        }
        if let Some(bad) = layers.iter().find(|dz| !(dz.is_finite() && **dz > 0.0)) {
            return Err(FlowError::InvalidGrid(format!(
                "layer thickness must be finite and positive, got {bad}"
            )));
        }

        let nk = layers.len();
        let mut dz = Vec::with_capacity(nk + 2);
        dz.push(layers[0]);
        dz.extend_from_slice(layers);
        dz.push(layers[nk - 1]);

        let mut hokart = vec![0.0; nk + 2];
        for k in 1..=nk {
            hokart[k] = hokart[k - 1] + dz[k];
        }
        hokart[nk + 1] = hokart[nk] + dz[nk + 1];

        Ok(Self {
            ni,
            nj,
            nk,
            dx,
            dy,
            dz,
            hokart,
        })
    }

    /// Grid with constant layer thickness
    ///
    /// # Errors
    ///
    /// See [`GridGeometry::from_layers`].
    pub fn uniform(ni: usize, nj: usize, nk: usize, dx: f32, dy: f32, dz: f32) -> FlowResult<Self> {
        Self::from_layers(ni, nj, dx, dy, &vec![dz; nk])
    }

    /// Grid whose layers grow geometrically from `dz0` by `factor` per layer
    ///
    /// # Errors
    ///
    /// Returns [`FlowError::InvalidGrid`] if `factor < 1` or the spacings are invalid.
    pub fn stretched(
        ni: usize,
        nj: usize,
        nk: usize,
        dx: f32,
        dy: f32,
        dz0: f32,
        factor: f32,
    ) -> FlowResult<Self> {
        if !(factor.is_finite() && factor >= 1.0) {
            return Err(FlowError::InvalidGrid(format!(
                "stretching factor must be >= 1, got {factor}"
            )));
        }
        let mut layers = Vec::with_capacity(nk);
        let mut dz = dz0;
        for _ in 0..nk {
            layers.push(dz);
            dz *= factor;
        }
        Self::from_layers(ni, nj, dx, dy, &layers)
    }

    /// Thickness of layer `k` (ghost layers mirror their neighbours)
    #[inline]
    pub fn dz(&self, k: usize) -> f32 {
        self.dz[k]
    }

    /// Top height of layer `k` above the domain bottom
    #[inline]
    pub fn hokart(&self, k: usize) -> f32 {
        self.hokart[k]
    }

    /// Height of the centre of layer `k` above the domain bottom
    #[inline]
    pub fn layer_center(&self, k: usize) -> f32 {
        self.hokart[k] - 0.5 * self.dz[k]
    }

    /// Distance between the centres of layers `k - 1` and `k`
    #[inline]
    pub fn center_spacing(&self, k: usize) -> f32 {
        0.5 * (self.dz[k - 1] + self.dz[k])
    }

    /// Height of the model top
    #[inline]
    pub fn model_top(&self) -> f32 {
        self.hokart[self.nk]
    }

    /// Number of layers whose top lies at or below `height`
    pub fn blocked_layers(&self, height: f32) -> usize {
        (1..=self.nk)
            .take_while(|&k| self.hokart[k] <= height + HEIGHT_EPSILON)
            .count()
    }

    /// Lowest layer whose top reaches `height`, clamped to `[1, nk]`
    pub fn layer_at_height(&self, height: f32) -> usize {
        (1..=self.nk)
            .find(|&k| self.hokart[k] + HEIGHT_EPSILON >= height)
            .unwrap_or(self.nk)
    }

    /// Horizontal cell area `dx·dy`
    #[inline]
    pub fn horizontal_area(&self) -> f32 {
        self.dx * self.dy
    }

    /// Volume of a cell in layer `k`
    #[inline]
    pub fn cell_volume(&self, k: usize) -> f32 {
        self.dx * self.dy * self.dz[k]
    }

    /// Total number of interior columns
    #[inline]
    pub fn column_count(&self) -> usize {
        self.ni * self.nj
    }

    /// Whether `(i, j)` is an interior column
    #[inline]
    pub fn is_interior(&self, i: usize, j: usize) -> bool {
        (1..=self.ni).contains(&i) && (1..=self.nj).contains(&j)
    }

    /// Interior neighbour of `(i, j)` shifted by `(di, dj)`, if it exists
    pub fn neighbour(&self, i: usize, j: usize, di: isize, dj: isize) -> Option<(usize, usize)> {
        let ni = i.checked_add_signed(di)?;
        let nj = j.checked_add_signed(dj)?;
        self.is_interior(ni, nj).then_some((ni, nj))
    }

    /// Iterate interior columns in `i`-major order
    pub fn interior_columns(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        (1..=self.ni).flat_map(move |i| (1..=self.nj).map(move |j| (i, j)))
    }
}

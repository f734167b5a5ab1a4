//! Building and terrain heights per grid column

use crate::error::{FlowError, FlowResult};
use serde::{Deserialize, Serialize};

/// Building and terrain heights on the `ni × nj` interior columns
///
/// Heights are stored row-major (`[(j - 1) * ni + (i - 1)]`) and measured in
/// metres: terrain above the domain bottom, buildings above the terrain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObstacleMap {
    ni: usize,
    nj: usize,
    building_heights: Vec<f32>,
    terrain_heights: Vec<f32>,
}

impl ObstacleMap {
    /// Flat ground without buildings
    pub fn flat(ni: usize, nj: usize) -> Self {
        Self {
            ni,
            nj,
            building_heights: vec![0.0; ni * nj],
            terrain_heights: vec![0.0; ni * nj],
        }
    }

    /// Build from a row-major building height raster on flat ground
    ///
    /// # Errors
    ///
    /// Fails if the raster length is not `ni * nj` or a height is negative or not finite.
    pub fn from_building_heights(ni: usize, nj: usize, heights: Vec<f32>) -> FlowResult<Self> {
        validate_raster("building_heights", ni * nj, &heights)?;
        Ok(Self {
            ni,
            nj,
            building_heights: heights,
            terrain_heights: vec![0.0; ni * nj],
        })
    }

    /// Replace the terrain raster
    ///
    /// # Errors
    ///
    /// Fails if the raster length is not `ni * nj` or a height is negative or not finite.
    pub fn with_terrain(mut self, heights: Vec<f32>) -> FlowResult<Self> {
        validate_raster("terrain_heights", self.ni * self.nj, &heights)?;
        self.terrain_heights = heights;
        Ok(self)
    }

    pub fn ni(&self) -> usize {
        self.ni
    }

    pub fn nj(&self) -> usize {
        self.nj
    }

    #[inline]
    fn offset(&self, i: usize, j: usize) -> usize {
        debug_assert!((1..=self.ni).contains(&i) && (1..=self.nj).contains(&j));
        (j - 1) * self.ni + (i - 1)
    }

    /// Set the building height of one column (1-based indices)
    pub fn set_building(&mut self, i: usize, j: usize, height: f32) {
        let offset = self.offset(i, j);
        self.building_heights[offset] = height.max(0.0);
    }

    /// Place a rectangular block covering columns `i0..=i1`, `j0..=j1`
    pub fn add_block(&mut self, i0: usize, i1: usize, j0: usize, j1: usize, height: f32) {
        for j in j0.max(1)..=j1.min(self.nj) {
            for i in i0.max(1)..=i1.min(self.ni) {
                self.set_building(i, j, height);
            }
        }
    }

    #[inline]
    pub fn building_height(&self, i: usize, j: usize) -> f32 {
        self.building_heights[self.offset(i, j)]
    }

    #[inline]
    pub fn terrain_height(&self, i: usize, j: usize) -> f32 {
        self.terrain_heights[self.offset(i, j)]
    }

    /// Terrain plus building height of a column
    #[inline]
    pub fn obstacle_top(&self, i: usize, j: usize) -> f32 {
        let offset = self.offset(i, j);
        self.terrain_heights[offset] + self.building_heights[offset]
    }

    /// True when the terrain is level everywhere
    pub fn is_flat(&self) -> bool {
        let first = self.terrain_heights.first().copied().unwrap_or(0.0);
        self.terrain_heights
            .iter()
            .all(|h| (h - first).abs() < 1e-3)
    }

    pub fn has_buildings(&self) -> bool {
        self.building_heights.iter().any(|&h| h > 0.0)
    }

    /// Tallest building above its terrain
    pub fn max_building_height(&self) -> f32 {
        self.building_heights.iter().copied().fold(0.0, f32::max)
    }

    /// Building heights in row-major order
    pub fn building_heights(&self) -> &[f32] {
        &self.building_heights
    }

    /// Terrain heights in row-major order
    pub fn terrain_heights(&self) -> &[f32] {
        &self.terrain_heights
    }
}

fn validate_raster(field: &'static str, expected: usize, heights: &[f32]) -> FlowResult<()> {
    if heights.len() != expected {
        return Err(FlowError::dimension_mismatch(field, expected, heights.len()));
    }
    if let Some(bad) = heights.iter().find(|h| !(h.is_finite() && **h >= 0.0)) {
        return Err(FlowError::InvalidGrid(format!(
            "{field} must be finite and non-negative, got {bad}"
        )));
    }
    Ok(())
}

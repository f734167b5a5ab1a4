//! Flat storage for staggered 3D and 2D grid arrays
//!
//! Every 3D array is dimensioned `(ni + 2) × (nj + 2) × (nk + 2)` and stored
//! column-contiguous: `offset = (i · (nj + 2) + j) · (nk + 2) + k`. A column
//! `(i, j)` is therefore one contiguous slice, which is what the tridiagonal
//! column solvers and the rayon column iterators work on.
//!
//! The same array type holds cell-centred quantities and face quantities; the
//! staggering convention lives in [`crate::grid::state`].

use super::geometry::GridGeometry;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::ops::{Index, IndexMut};

#[inline]
pub fn sq(x: f32) -> f32 {
    x * x
}

#[inline]
pub fn cube(x: f32) -> f32 {
    x * x * x
}

/// 3D array over the padded grid
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field3 {
    data: Vec<f32>,
    ni2: usize,
    nj2: usize,
    nk2: usize,
}

impl Field3 {
    /// Zero-filled array for `geometry`
    pub fn new(geometry: &GridGeometry) -> Self {
        Self::with_value(geometry, 0.0)
    }

    /// Array for `geometry` filled with `value`
    pub fn with_value(geometry: &GridGeometry, value: f32) -> Self {
        let (ni2, nj2, nk2) = (geometry.ni + 2, geometry.nj + 2, geometry.nk + 2);
        Self {
            data: vec![value; ni2 * nj2 * nk2],
            ni2,
            nj2,
            nk2,
        }
    }

    #[inline]
    pub fn offset(&self, i: usize, j: usize, k: usize) -> usize {
        debug_assert!(i < self.ni2 && j < self.nj2 && k < self.nk2);
        (i * self.nj2 + j) * self.nk2 + k
    }

    /// Padded dimensions `(ni + 2, nj + 2, nk + 2)`
    #[inline]
    pub fn dims(&self) -> (usize, usize, usize) {
        (self.ni2, self.nj2, self.nk2)
    }

    /// Contiguous column `(i, j)`, indexed by `k`
    #[inline]
    pub fn column(&self, i: usize, j: usize) -> &[f32] {
        let start = self.offset(i, j, 0);
        &self.data[start..start + self.nk2]
    }

    #[inline]
    pub fn column_mut(&mut self, i: usize, j: usize) -> &mut [f32] {
        let start = self.offset(i, j, 0);
        let len = self.nk2;
        &mut self.data[start..start + len]
    }

    pub fn fill(&mut self, value: f32) {
        self.data.fill(value);
    }

    /// Raise every entry to at least `floor`
    pub fn clamp_min(&mut self, floor: f32) {
        self.data.par_iter_mut().for_each(|v| *v = v.max(floor));
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [f32] {
        &mut self.data
    }

    /// Largest absolute entry
    pub fn max_abs(&self) -> f32 {
        self.data.par_iter().map(|v| v.abs()).reduce(|| 0.0, f32::max)
    }

    /// Largest absolute difference to `other` (same dimensions)
    pub fn max_abs_diff(&self, other: &Self) -> f32 {
        debug_assert_eq!(self.dims(), other.dims());
        self.data
            .par_iter()
            .zip(other.data.par_iter())
            .map(|(a, b)| (a - b).abs())
            .reduce(|| 0.0, f32::max)
    }

    /// Parallel iterator over all columns (ghosts included) as `(i, j, column)`
    pub fn par_columns_mut(
        &mut self,
    ) -> impl IndexedParallelIterator<Item = (usize, usize, &mut [f32])> + '_ {
        let nj2 = self.nj2;
        self.data
            .par_chunks_mut(self.nk2)
            .enumerate()
            .map(move |(n, column)| (n / nj2, n % nj2, column))
    }
}

impl Index<(usize, usize, usize)> for Field3 {
    type Output = f32;

    #[inline]
    fn index(&self, (i, j, k): (usize, usize, usize)) -> &f32 {
        &self.data[self.offset(i, j, k)]
    }
}

impl IndexMut<(usize, usize, usize)> for Field3 {
    #[inline]
    fn index_mut(&mut self, (i, j, k): (usize, usize, usize)) -> &mut f32 {
        let offset = self.offset(i, j, k);
        &mut self.data[offset]
    }
}

/// 2D per-column array over the padded horizontal grid
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field2<T> {
    data: Vec<T>,
    ni2: usize,
    nj2: usize,
}

impl<T: Copy> Field2<T> {
    pub fn new(geometry: &GridGeometry, value: T) -> Self {
        let (ni2, nj2) = (geometry.ni + 2, geometry.nj + 2);
        Self {
            data: vec![value; ni2 * nj2],
            ni2,
            nj2,
        }
    }

    #[inline]
    pub fn offset(&self, i: usize, j: usize) -> usize {
        debug_assert!(i < self.ni2 && j < self.nj2);
        i * self.nj2 + j
    }

    pub fn fill(&mut self, value: T) {
        self.data.fill(value);
    }

    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    /// Copy the nearest interior value into the ghost ring
    pub fn extend_edges(&mut self) {
        let (ni, nj) = (self.ni2 - 2, self.nj2 - 2);
        for i in 0..self.ni2 {
            for j in 0..self.nj2 {
                let src = (i.clamp(1, ni), j.clamp(1, nj));
                if src != (i, j) {
                    self[(i, j)] = self[src];
                }
            }
        }
    }
}

impl<T> Index<(usize, usize)> for Field2<T> {
    type Output = T;

    #[inline]
    fn index(&self, (i, j): (usize, usize)) -> &T {
        &self.data[i * self.nj2 + j]
    }
}

impl<T> IndexMut<(usize, usize)> for Field2<T> {
    #[inline]
    fn index_mut(&mut self, (i, j): (usize, usize)) -> &mut T {
        &mut self.data[i * self.nj2 + j]
    }
}

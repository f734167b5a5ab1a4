//! Tridiagonal (Thomas) column solver
//!
//! Row `k` of a column system reads
//!
//! `A[k]·x[k] = B[k]·x[k+1] + C[k]·x[k-1] + D[k]`
//!
//! The forward sweep builds the recurrence
//! `P[k] = B[k] / (A[k] - C[k]·P[k-1])`,
//! `Q[k] = (D[k] + C[k]·Q[k-1]) / (A[k] - C[k]·P[k-1])`
//! from the lowest solved row upward; the backward sweep relaxes the column
//! top-down with `x[k] += relax·(P[k]·x[k+1] + Q[k] - x[k])`.
//! `x[k_lo - 1]` and `x[k_hi + 1]` act as Dirichlet boundary values.

/// Smallest magnitude allowed for a recurrence denominator
const MIN_DENOMINATOR: f32 = 1e-20;

/// Coefficient rows and recurrence scratch for one column
#[derive(Debug, Clone, Default)]
pub struct ColumnSystem {
    pub a: Vec<f32>,
    pub b: Vec<f32>,
    pub c: Vec<f32>,
    pub d: Vec<f32>,
    p: Vec<f32>,
    q: Vec<f32>,
}

impl ColumnSystem {
    /// Zeroed system for a column of `len` entries (ghosts included)
    pub fn new(len: usize) -> Self {
        Self {
            a: vec![0.0; len],
            b: vec![0.0; len],
            c: vec![0.0; len],
            d: vec![0.0; len],
            p: vec![0.0; len],
            q: vec![0.0; len],
        }
    }

    pub fn len(&self) -> usize {
        self.a.len()
    }

    pub fn is_empty(&self) -> bool {
        self.a.is_empty()
    }

    #[inline]
    pub fn set(&mut self, k: usize, a: f32, b: f32, c: f32, d: f32) {
        self.a[k] = a;
        self.b[k] = b;
        self.c[k] = c;
        self.d[k] = d;
    }

    /// Pin row `k` to `value`
    #[inline]
    pub fn set_fixed(&mut self, k: usize, value: f32) {
        self.set(k, 1.0, 0.0, 0.0, value);
    }

    /// Solve rows `k_lo..=k_hi` exactly
    pub fn solve(&mut self, values: &mut [f32], k_lo: usize, k_hi: usize) {
        self.solve_relaxed(values, k_lo, k_hi, 1.0);
    }

    /// Solve rows `k_lo..=k_hi`, blending the result into `values` with `relax`
    pub fn solve_relaxed(&mut self, values: &mut [f32], k_lo: usize, k_hi: usize, relax: f32) {
        debug_assert!(k_lo >= 1 && k_hi + 1 < values.len() && k_hi < self.len());
        if k_lo > k_hi {
            return;
        }

        let mut p_prev = 0.0;
        let mut q_prev = values[k_lo - 1];
        for k in k_lo..=k_hi {
            let mut denom = self.a[k] - self.c[k] * p_prev;
            if denom.abs() < MIN_DENOMINATOR {
                denom = MIN_DENOMINATOR.copysign(denom);
            }
            self.p[k] = self.b[k] / denom;
            self.q[k] = (self.d[k] + self.c[k] * q_prev) / denom;
            p_prev = self.p[k];
            q_prev = self.q[k];
        }

        for k in (k_lo..=k_hi).rev() {
            let target = self.p[k] * values[k + 1] + self.q[k];
            values[k] += relax * (target - values[k]);
        }
    }
}

//! Generic column solve driven by per-quantity coefficient assembly

use super::sweep::{sweep_columns, SweepDirection};
use super::tdma::ColumnSystem;
use crate::grid::{FlowState, Quantity};

/// Builds the tridiagonal rows of one quantity in one column
pub trait ColumnAssembler: Sync {
    /// Field written by the solve
    fn quantity(&self) -> Quantity;

    /// Lowest and highest solved row of column `(i, j)`, or `None` to skip it
    fn rows(&self, state: &FlowState, i: usize, j: usize) -> Option<(usize, usize)>;

    /// Fill rows `k_lo..=k_hi` of `system`
    fn assemble(
        &self,
        state: &FlowState,
        i: usize,
        j: usize,
        k_lo: usize,
        k_hi: usize,
        system: &mut ColumnSystem,
    );

    /// Under-relaxation applied in the backward sweep
    fn relaxation(&self) -> f32 {
        1.0
    }

    /// Lower bound applied to solved rows
    fn floor(&self) -> Option<f32> {
        None
    }
}

/// One sweep of `assembler` over all columns in `direction`
pub fn solve_quantity<A: ColumnAssembler + ?Sized>(
    state: &mut FlowState,
    assembler: &A,
    direction: SweepDirection,
    parallel: bool,
) {
    let len = state.geometry.nk + 2;
    let quantity = assembler.quantity();
    sweep_columns(state, quantity, direction, parallel, |view, i, j| {
        let (k_lo, k_hi) = assembler.rows(view, i, j)?;
        if k_lo == 0 || k_lo > k_hi || k_hi + 1 >= len {
            return None;
        }
        let mut system = ColumnSystem::new(len);
        assembler.assemble(view, i, j, k_lo, k_hi, &mut system);

        let mut column = view.field(quantity).column(i, j).to_vec();
        system.solve_relaxed(&mut column, k_lo, k_hi, assembler.relaxation());
        if let Some(floor) = assembler.floor() {
            for value in &mut column[k_lo..=k_hi] {
                *value = value.max(floor);
            }
        }
        Some(column)
    });
}

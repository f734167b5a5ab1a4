//! Column solvers for the diagnostic and prognostic flow fields
//!
//! Every transported quantity is solved the same way: a tridiagonal system
//! is assembled along the vertical of one column and swept over the
//! horizontal plane in one of four traversal directions. The quantities
//! differ only in how they assemble their coefficients, which is expressed
//! through the [`ColumnAssembler`] trait:
//!
//! - [`diagnostic`]: pressure-correction Poisson rows (mass conservation)
//! - [`momentum`]: U, V and W with power-law convection and wall friction
//! - [`turbulence`]: eddy viscosity closures and TKE/ε transport
//!
//! Sweeps run as anti-diagonal wavefronts, so the parallel result is
//! identical to a serial in-place Gauss-Seidel sweep.
//!
//! # Example
//!
//! ```rust,ignore
//! use microflow_core::solver::{DiagnosticSolver, SweepSchedule};
//!
//! let solver = DiagnosticSolver::new(10, SweepSchedule::Cyclic, true);
//! let report = solver.run_pass(&mut state);
//! ```

pub mod column;
pub mod diagnostic;
pub mod momentum;
pub mod power_law;
pub mod profiler;
pub mod sweep;
pub mod tdma;
pub mod turbulence;

// Re-exports
pub use column::{solve_quantity, ColumnAssembler};
pub use diagnostic::{
    compute_divergence, flux_scale, time_step, DiagnosticReport, DiagnosticSolver, DivergenceStats,
    MAX_TIME_STEP, MIN_REFERENCE_SPEED,
};
pub use momentum::{log_law_friction, Axis, HorizontalMomentum, MomentumParams, VerticalMomentum};
pub use power_law::{assemble_coefficients, power_law_weight, FaceColumn, Stencil};
pub use profiler::ProfilerScope;
pub use sweep::{sweep_columns, wavefronts, SweepDirection, SweepSchedule};
pub use tdma::ColumnSystem;
pub use turbulence::{
    create_closure, ClosureKind, KEpsilon, MixingLength, TurbulenceClosure, MAX_MIXING_LENGTH,
    MAX_VISCOSITY, VON_KARMAN,
};

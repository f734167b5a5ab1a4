//! Microscale Wind Flow Core Library
//!
//! A mass-consistent wind-field solver for urban and complex-terrain
//! dispersion modelling on a staggered (Arakawa-C) grid.
//!
//! ## Solver Paths
//!
//! - **Diagnostic**: a power-law/log-law boundary-layer profile from wind
//!   observations, reduced in the lee of obstacles, then made divergence free
//!   by a pressure-correction Poisson solve
//! - **Prognostic**: iterative U/V/W momentum sweeps with a power-law
//!   advection scheme and a mixing-length or k-ε turbulence closure, closed
//!   by the same pressure correction
//!
//! All column solves run as parallel anti-diagonal wavefronts and give the
//! same result as a serial sweep.

// Core types and utilities
pub mod core_types;
pub mod error;

// Grid, boundary layer and solvers
pub mod boundary_layer;
pub mod flow;
pub mod grid;
pub mod snapshot;
pub mod solver;

// Re-export core types
pub use core_types::{Meters, MetersPerSecond, Seconds, Vec3};
pub use error::{FlowError, FlowResult};

// Re-export grid and solver entry points
pub use boundary_layer::{BoundaryConditions, WindObservation, WindProfile};
pub use flow::{
    ConvergenceStatus, Fidelity, FlowFieldLevel, FlowFieldSolver, SolveMode, SolveReport,
    SolverConfig,
};
pub use grid::{Field2, Field3, FlowState, GridGeometry, ObstacleMap, Quantity};
pub use snapshot::SnapshotLayout;
pub use solver::{ClosureKind, SweepSchedule};

//! Flow-field orchestration
//!
//! Chooses the diagnostic or prognostic path per weather situation, owns the
//! sub-domain and KADVMAX, and reports convergence.

pub mod config;
pub mod convergence;
pub mod orchestrator;
pub mod subdomain;

pub use config::{Fidelity, FlowFieldLevel, SolverConfig};
pub use convergence::{ConvergenceStatus, VelocityChange};
pub use orchestrator::{FlowFieldSolver, SolveMode, SolveReport};
pub use subdomain::compute_subdomain;

//! Solver configuration
//!
//! Everything the host chooses per simulation: which flow-field level to
//! run, how many iterations to spend, the turbulence closure and the
//! physical constants of the momentum equations.

use crate::error::{FlowError, FlowResult};
use crate::solver::{ClosureKind, SweepSchedule};
use serde::{Deserialize, Serialize};

/// Flow-field level requested by the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum FlowFieldLevel {
    /// Initial profile only, made mass consistent
    None,
    /// Profile, obstacle shadow and pressure correction
    Diagnostic,
    /// Full momentum solve followed by a pressure correction
    #[default]
    Prognostic,
}

/// Iteration budget of each diagnostic pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Fidelity {
    #[default]
    Standard,
    High,
}

impl Fidelity {
    /// Number of pressure-correction iterations per diagnostic pass
    #[must_use]
    pub const fn diagnostic_iterations(&self) -> usize {
        match self {
            Self::Standard => 5,
            Self::High => 10,
        }
    }
}

/// Configuration of one [`FlowFieldSolver`](super::FlowFieldSolver)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    pub level: FlowFieldLevel,
    pub fidelity: Fidelity,
    pub closure: ClosureKind,
    /// Under-relaxation of U, V and W sweeps (0, 1]
    pub velocity_relaxation: f32,
    /// Under-relaxation of TKE and ε sweeps (0, 1]
    pub turbulence_relaxation: f32,
    /// Prognostic iterations always performed
    pub min_iterations: usize,
    /// Prognostic iteration budget
    pub max_iterations: usize,
    /// Largest velocity change per iteration (m/s) counted as converged
    pub convergence_tolerance: f32,
    /// Largest divergence left by the closing pass, relative to the flux scale
    pub mass_tolerance: f32,
    /// Iteration cap of the closing pass
    pub max_closing_iterations: usize,
    /// Coriolis parameter f (1/s)
    pub coriolis: f32,
    /// Roughness length of building walls and roofs (m)
    pub building_roughness: f32,
    /// Lower bound of the eddy viscosity (m²/s)
    pub viscosity_floor: f32,
    /// Restrict the prognostic solve to `factor × building height` around buildings
    pub subdomain_factor: Option<f32>,
    pub sweep_schedule: SweepSchedule,
    /// Solve independent columns concurrently
    pub parallel: bool,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            level: FlowFieldLevel::default(),
            fidelity: Fidelity::default(),
            closure: ClosureKind::default(),
            velocity_relaxation: 0.3,
            turbulence_relaxation: 0.3,
            min_iterations: 5,
            max_iterations: 50,
            convergence_tolerance: 0.01,
            mass_tolerance: 1e-3,
            max_closing_iterations: 1000,
            coriolis: 1e-4,
            building_roughness: 0.01,
            viscosity_floor: 0.01,
            subdomain_factor: None,
            sweep_schedule: SweepSchedule::default(),
            parallel: true,
        }
    }
}

impl SolverConfig {
    /// Diagnostic-only configuration with the given fidelity
    pub fn diagnostic(fidelity: Fidelity) -> Self {
        Self {
            level: FlowFieldLevel::Diagnostic,
            fidelity,
            ..Self::default()
        }
    }

    /// Check ranges of every parameter
    ///
    /// # Errors
    ///
    /// Returns [`FlowError::InvalidConfig`] naming the first offending parameter.
    pub fn validate(&self) -> FlowResult<()> {
        let relaxation_ok = |r: f32| r > 0.0 && r <= 1.0;
        if !relaxation_ok(self.velocity_relaxation) {
            return Err(FlowError::InvalidConfig(format!(
                "velocity_relaxation must be in (0, 1], got {}",
                self.velocity_relaxation
            )));
        }
        if !relaxation_ok(self.turbulence_relaxation) {
            return Err(FlowError::InvalidConfig(format!(
                "turbulence_relaxation must be in (0, 1], got {}",
                self.turbulence_relaxation
            )));
        }
        if self.max_iterations == 0 || self.min_iterations > self.max_iterations {
            return Err(FlowError::InvalidConfig(format!(
                "iteration counts must satisfy 0 < min <= max, got min {} max {}",
                self.min_iterations, self.max_iterations
            )));
        }
        if !(self.convergence_tolerance.is_finite() && self.convergence_tolerance >= 0.0) {
            return Err(FlowError::InvalidConfig(format!(
                "convergence_tolerance must be finite and non-negative, got {}",
                self.convergence_tolerance
            )));
        }
        if !(self.mass_tolerance.is_finite() && self.mass_tolerance > 0.0) {
            return Err(FlowError::InvalidConfig(format!(
                "mass_tolerance must be finite and positive, got {}",
                self.mass_tolerance
            )));
        }
        let pass = self.fidelity.diagnostic_iterations();
        if self.max_closing_iterations < pass {
            return Err(FlowError::InvalidConfig(format!(
                "max_closing_iterations must be at least {pass}, got {}",
                self.max_closing_iterations
            )));
        }
        if !self.coriolis.is_finite() {
            return Err(FlowError::InvalidConfig("coriolis must be finite".into()));
        }
        if !(self.building_roughness.is_finite() && self.building_roughness > 0.0) {
            return Err(FlowError::InvalidConfig(format!(
                "building_roughness must be positive, got {}",
                self.building_roughness
            )));
        }
        if !(self.viscosity_floor.is_finite() && self.viscosity_floor >= 0.0) {
            return Err(FlowError::InvalidConfig(format!(
                "viscosity_floor must be non-negative, got {}",
                self.viscosity_floor
            )));
        }
        if let Some(factor) = self.subdomain_factor {
            if !(factor.is_finite() && factor > 0.0) {
                return Err(FlowError::InvalidConfig(format!(
                    "subdomain_factor must be positive, got {factor}"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(SolverConfig::default().validate().is_ok());
        assert!(SolverConfig::diagnostic(Fidelity::High).validate().is_ok());
    }

    #[test]
    fn test_fidelity_iterations() {
        assert_eq!(Fidelity::Standard.diagnostic_iterations(), 5);
        assert_eq!(Fidelity::High.diagnostic_iterations(), 10);
    }

    #[test]
    fn test_rejects_bad_relaxation() {
        let config = SolverConfig {
            velocity_relaxation: 0.0,
            ..SolverConfig::default()
        };
        assert!(matches!(config.validate(), Err(FlowError::InvalidConfig(_))));

        let config = SolverConfig {
            turbulence_relaxation: 1.5,
            ..SolverConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_inverted_iteration_counts() {
        let config = SolverConfig {
            min_iterations: 10,
            max_iterations: 3,
            ..SolverConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("min 10 max 3"));
    }

    #[test]
    fn test_rejects_bad_mass_tolerance() {
        let config = SolverConfig {
            mass_tolerance: 0.0,
            ..SolverConfig::default()
        };
        assert!(config.validate().is_err());

        let config = SolverConfig {
            fidelity: Fidelity::High,
            max_closing_iterations: 8,
            ..SolverConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("at least 10"));
    }

    #[test]
    fn test_rejects_non_positive_subdomain() {
        let config = SolverConfig {
            subdomain_factor: Some(-2.0),
            ..SolverConfig::default()
        };
        assert!(config.validate().is_err());
    }
}

use microflow_core::{
    BoundaryConditions, ClosureKind, Fidelity, FlowFieldLevel, FlowFieldSolver, FlowState,
    GridGeometry, SolveReport, SolverConfig, SweepSchedule,
};
use std::ptr;
use std::slice;
use std::sync::RwLock;
use tracing::info;

use crate::error::{DefaultMicroflowError, MicroflowErrorCode};
use crate::helpers::{track_error, track_result};

/// Flow-field level requested by the host.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MicroflowLevel {
    /// Initial profile only, made mass consistent.
    None = 0,
    /// Profile, obstacle shadow and pressure correction.
    Diagnostic = 1,
    /// Momentum solve followed by a pressure correction.
    Prognostic = 2,
}

/// Turbulence closure of the prognostic solve.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MicroflowClosure {
    MixingLength = 0,
    KEpsilon = 1,
}

/// C-compatible grid description.
///
/// `layer_thickness` points to `nk` layer thicknesses from the ground up.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct MicroflowGrid {
    pub ni: usize,
    pub nj: usize,
    pub nk: usize,
    /// Cell size along x (m)
    pub dx: f32,
    /// Cell size along y (m)
    pub dy: f32,
    pub layer_thickness: *const f32,
}

/// C-compatible solver configuration. Start from `microflow_default_config()`.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct MicroflowConfig {
    pub level: MicroflowLevel,
    /// Use 10 instead of 5 pressure-correction iterations per pass
    pub high_fidelity: bool,
    pub closure: MicroflowClosure,
    pub velocity_relaxation: f32,
    pub turbulence_relaxation: f32,
    pub min_iterations: u32,
    pub max_iterations: u32,
    /// Velocity change (m/s) below which the prognostic loop stops
    pub convergence_tolerance: f32,
    /// Divergence target of the closing pass, relative to the flux scale
    pub mass_tolerance: f32,
    pub max_closing_iterations: u32,
    /// Coriolis parameter (1/s)
    pub coriolis: f32,
    /// Roughness length of building surfaces (m)
    pub building_roughness: f32,
    /// Lower bound of the eddy viscosity (m²/s)
    pub viscosity_floor: f32,
    /// Reduced sub-domain factor; zero or negative solves the whole domain
    pub subdomain_factor: f32,
    /// Seed of the shuffled sweep schedule; zero rotates the directions cyclically
    pub sweep_seed: u64,
    pub parallel: bool,
}

impl From<&SolverConfig> for MicroflowConfig {
    fn from(config: &SolverConfig) -> Self {
        Self {
            level: match config.level {
                FlowFieldLevel::None => MicroflowLevel::None,
                FlowFieldLevel::Diagnostic => MicroflowLevel::Diagnostic,
                FlowFieldLevel::Prognostic => MicroflowLevel::Prognostic,
            },
            high_fidelity: config.fidelity == Fidelity::High,
            closure: match config.closure {
                ClosureKind::MixingLength => MicroflowClosure::MixingLength,
                ClosureKind::KEpsilon => MicroflowClosure::KEpsilon,
            },
            velocity_relaxation: config.velocity_relaxation,
            turbulence_relaxation: config.turbulence_relaxation,
            min_iterations: config.min_iterations as u32,
            max_iterations: config.max_iterations as u32,
            convergence_tolerance: config.convergence_tolerance,
            mass_tolerance: config.mass_tolerance,
            max_closing_iterations: config.max_closing_iterations as u32,
            coriolis: config.coriolis,
            building_roughness: config.building_roughness,
            viscosity_floor: config.viscosity_floor,
            subdomain_factor: config.subdomain_factor.unwrap_or(0.0),
            sweep_seed: match config.sweep_schedule {
                SweepSchedule::Cyclic => 0,
                SweepSchedule::Seeded { seed } => seed,
            },
            parallel: config.parallel,
        }
    }
}

impl From<&MicroflowConfig> for SolverConfig {
    fn from(config: &MicroflowConfig) -> Self {
        Self {
            level: match config.level {
                MicroflowLevel::None => FlowFieldLevel::None,
                MicroflowLevel::Diagnostic => FlowFieldLevel::Diagnostic,
                MicroflowLevel::Prognostic => FlowFieldLevel::Prognostic,
            },
            fidelity: if config.high_fidelity {
                Fidelity::High
            } else {
                Fidelity::Standard
            },
            closure: match config.closure {
                MicroflowClosure::MixingLength => ClosureKind::MixingLength,
                MicroflowClosure::KEpsilon => ClosureKind::KEpsilon,
            },
            velocity_relaxation: config.velocity_relaxation,
            turbulence_relaxation: config.turbulence_relaxation,
            min_iterations: config.min_iterations as usize,
            max_iterations: config.max_iterations as usize,
            convergence_tolerance: config.convergence_tolerance,
            mass_tolerance: config.mass_tolerance,
            max_closing_iterations: config.max_closing_iterations as usize,
            coriolis: config.coriolis,
            building_roughness: config.building_roughness,
            viscosity_floor: config.viscosity_floor,
            subdomain_factor: (config.subdomain_factor > 0.0).then_some(config.subdomain_factor),
            sweep_schedule: match config.sweep_seed {
                0 => SweepSchedule::Cyclic,
                seed => SweepSchedule::Seeded { seed },
            },
            parallel: config.parallel,
        }
    }
}

/// Everything one host-side wind model owns.
pub(crate) struct Session {
    pub(crate) state: FlowState,
    pub(crate) solver: FlowFieldSolver,
    pub(crate) conditions: Option<BoundaryConditions>,
    pub(crate) last_report: Option<SolveReport>,
}

/// Opaque wind-solver handle.
///
/// The session sits behind an `RwLock`: field copies and queries take a read
/// lock and may run concurrently, setters and `microflow_solve` take the
/// write lock.
pub struct MicroflowInstance {
    pub(crate) session: RwLock<Session>,
}

impl MicroflowInstance {
    /// Build a flat, unobstructed instance on `grid`.
    ///
    /// # Errors
    ///
    /// Fails on a null layer pointer, an invalid grid or an invalid configuration.
    pub(crate) fn new(
        grid: &MicroflowGrid,
        config: &MicroflowConfig,
    ) -> Result<Box<Self>, DefaultMicroflowError> {
        if grid.layer_thickness.is_null() {
            return Err(DefaultMicroflowError::null_pointer("layer_thickness"));
        }
        // SAFETY: non-null and the caller guarantees `nk` readable values
        let layers = unsafe { slice::from_raw_parts(grid.layer_thickness, grid.nk) };
        let geometry = GridGeometry::from_layers(grid.ni, grid.nj, grid.dx, grid.dy, layers)?;
        let solver = FlowFieldSolver::new(SolverConfig::from(config))?;

        info!(
            "Created wind solver instance: {}x{}x{} cells",
            grid.ni, grid.nj, grid.nk
        );
        Ok(Box::new(Self {
            session: RwLock::new(Session {
                state: FlowState::new(geometry),
                solver,
                conditions: None,
                last_report: None,
            }),
        }))
    }
}

/// Default solver configuration.
#[no_mangle]
pub extern "C" fn microflow_default_config() -> MicroflowConfig {
    MicroflowConfig::from(&SolverConfig::default())
}

/// Create a wind-solver instance and return it via out-parameter.
///
/// Returns
/// - `Ok` (0) with a valid instance in `out_instance`
/// - `NullPointer` if `out_instance` or `grid.layer_thickness` is null
/// - `InvalidGrid` if a dimension or spacing is not positive
/// - `InvalidParameter` if the configuration is out of range
///
/// On failure `out_instance` is set to null; call `microflow_get_last_error()`
/// for a description.
///
/// # Safety
///
/// - `out_instance` must be a valid, non-null pointer to writable memory.
/// - `grid.layer_thickness` must point to `grid.nk` readable values; they are copied.
/// - The caller owns the instance and MUST call `microflow_destroy` exactly once.
///
/// Example (C)
/// ```c
/// float layers[12] = {2, 2, 2, 2, 2, 2, 3, 3, 4, 5, 6, 8};
/// MicroflowGrid grid = {100, 80, 12, 5.0f, 5.0f, layers};
/// MicroflowConfig config = microflow_default_config();
/// MicroflowInstance* flow = NULL;
/// if (microflow_new(grid, config, &flow) != Ok) {
///     fprintf(stderr, "%s\n", microflow_get_last_error());
/// }
/// ```
#[no_mangle]
pub unsafe extern "C" fn microflow_new(
    grid: MicroflowGrid,
    config: MicroflowConfig,
    out_instance: *mut *mut MicroflowInstance,
) -> MicroflowErrorCode {
    if out_instance.is_null() {
        return track_error(&DefaultMicroflowError::null_pointer("out_instance"));
    }

    match track_result(MicroflowInstance::new(&grid, &config)) {
        Ok(instance) => {
            unsafe {
                *out_instance = Box::into_raw(instance);
            }
            MicroflowErrorCode::Ok
        }
        Err(code) => {
            unsafe {
                *out_instance = ptr::null_mut();
            }
            code
        }
    }
}

/// Destroy an instance created by `microflow_new`. Null is a no-op.
///
/// # Safety
/// - The pointer MUST have been created by `microflow_new` and not freed already.
/// - The caller must not use the pointer afterwards.
#[no_mangle]
pub unsafe extern "C" fn microflow_destroy(ptr: *mut MicroflowInstance) {
    if ptr.is_null() {
        return;
    }

    // SAFETY: created by `Box::into_raw` in `microflow_new` and not yet freed
    unsafe {
        drop(Box::from_raw(ptr));
    }
}

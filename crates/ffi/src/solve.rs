use microflow_core::{ConvergenceStatus, SolveMode, SolveReport};
use std::ptr;

use crate::error::{DefaultMicroflowError, MicroflowErrorCode};
use crate::helpers::{into_code, with_session, with_session_mut};
use crate::instance::MicroflowInstance;

/// Path taken by a solve.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MicroflowMode {
    Diagnostic = 0,
    Prognostic = 1,
}

/// Summary of the last solve.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MicroflowReport {
    pub mode: MicroflowMode,
    /// Prognostic iterations run (0 on the diagnostic path)
    pub iterations: u32,
    /// Whether the prognostic loop met its tolerance
    pub converged: bool,
    /// Largest velocity change of the last prognostic iteration (m/s), or -1
    pub last_change: f32,
    /// Top layer of the advective solve
    pub kadvmax: u32,
    /// Columns inside the active sub-domain
    pub active_columns: u32,
    /// Largest cell volume-flux imbalance before the final pressure correction (m³/s)
    pub initial_divergence: f32,
    /// Largest cell volume-flux imbalance after the final pressure correction (m³/s)
    pub final_divergence: f32,
    /// Iterations of the final pressure correction
    pub closing_iterations: u32,
}

impl From<&SolveReport> for MicroflowReport {
    fn from(report: &SolveReport) -> Self {
        Self {
            mode: match report.mode {
                SolveMode::Diagnostic => MicroflowMode::Diagnostic,
                SolveMode::Prognostic => MicroflowMode::Prognostic,
            },
            iterations: report.iterations as u32,
            converged: report.status == ConvergenceStatus::Converged,
            last_change: report.last_change.unwrap_or(-1.0),
            kadvmax: report.kadvmax as u32,
            active_columns: report.active_columns as u32,
            initial_divergence: report.diagnostic.initial.max,
            final_divergence: report.diagnostic.last.max,
            closing_iterations: report.diagnostic.iterations as u32,
        }
    }
}

unsafe fn write_report(out_report: *mut MicroflowReport, report: &SolveReport) {
    if !out_report.is_null() {
        // SAFETY: the caller guarantees a non-null `out_report` is writable
        unsafe { ptr::write(out_report, MicroflowReport::from(report)) };
    }
}

/// Solve the wind field for the current obstacles and observations.
///
/// Blocks until the solve finishes. `out_report` may be null.
///
/// Returns
/// - `Ok` (0) on success
/// - `InvalidObservation` if no observations were set
/// - `DimensionMismatch` if the surface-layer fields do not cover the grid
///
/// # Safety
/// - `ptr` must be a live instance from `microflow_new`.
/// - `out_report` must be null or point to writable memory.
#[no_mangle]
pub unsafe extern "C" fn microflow_solve(
    ptr: *const MicroflowInstance,
    out_report: *mut MicroflowReport,
) -> MicroflowErrorCode {
    into_code(unsafe {
        with_session_mut(ptr, |session| {
            let conditions = session
                .conditions
                .as_ref()
                .ok_or_else(DefaultMicroflowError::missing_observations)?;
            let report = session.solver.solve(&mut session.state, conditions)?;
            write_report(out_report, &report);
            session.last_report = Some(report);
            Ok(())
        })
    })
}

/// Copy the report of the last successful solve.
///
/// Returns `InvalidParameter` if nothing has been solved yet.
///
/// # Safety
/// - `ptr` must be a live instance from `microflow_new`.
/// - `out_report` must point to writable memory.
#[no_mangle]
pub unsafe extern "C" fn microflow_last_report(
    ptr: *const MicroflowInstance,
    out_report: *mut MicroflowReport,
) -> MicroflowErrorCode {
    if out_report.is_null() {
        return into_code(Err(DefaultMicroflowError::null_pointer("out_report")));
    }
    into_code(unsafe {
        with_session(ptr, |session| {
            let report = session.last_report.as_ref().ok_or_else(|| {
                DefaultMicroflowError::invalid_parameter("No solve has completed yet".to_string())
            })?;
            write_report(out_report, report);
            Ok(())
        })
    })
}

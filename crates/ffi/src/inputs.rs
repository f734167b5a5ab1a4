//! Setters for obstacles, vegetation and meteorological inputs.
//!
//! Per-column arrays are row-major `ni * nj` with `i` fastest; per-cell
//! arrays are `ni * nj * nk` with `i` fastest, then `j`, then `k`.

use microflow_core::{BoundaryConditions, ObstacleMap, WindObservation};
use std::slice;

use crate::error::{DefaultMicroflowError, MicroflowErrorCode};
use crate::helpers::{copy_input, copy_optional_input, into_code, track_error, with_session_mut};
use crate::instance::MicroflowInstance;

/// One wind measurement above local ground.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct MicroflowObservation {
    /// Measurement height above ground (m)
    pub height: f32,
    /// Eastward component (m/s)
    pub u: f32,
    /// Northward component (m/s)
    pub v: f32,
}

/// Load building and terrain heights and derive the obstacle mask.
///
/// `building_heights` holds `len` building heights above terrain (m).
/// `terrain_heights` may be null for flat terrain at 0 m.
///
/// Returns
/// - `Ok` (0) on success
/// - `NullPointer` if `ptr` or `building_heights` is null
/// - `DimensionMismatch` if `len != ni * nj`
///
/// # Safety
/// - `ptr` must be a live instance from `microflow_new`.
/// - Non-null arrays must hold at least `len` readable values; they are copied.
#[no_mangle]
pub unsafe extern "C" fn microflow_set_obstacles(
    ptr: *const MicroflowInstance,
    building_heights: *const f32,
    terrain_heights: *const f32,
    len: usize,
) -> MicroflowErrorCode {
    into_code(unsafe {
        with_session_mut(ptr, |session| {
            let buildings = copy_input("building_heights", building_heights, len)?;
            let terrain = copy_optional_input("terrain_heights", terrain_heights, len)?;
            let (ni, nj) = (session.state.geometry.ni, session.state.geometry.nj);

            let mut map = ObstacleMap::from_building_heights(ni, nj, buildings)?;
            if let Some(terrain) = terrain {
                map = map.with_terrain(terrain)?;
            }
            session.state.apply_obstacles(&map)?;
            Ok(())
        })
    })
}

/// Load vegetation drag (1/m) and cover fraction per cell.
///
/// # Safety
/// - `ptr` must be a live instance from `microflow_new`.
/// - `drag` and `cover` must hold at least `len` readable values; they are copied.
#[no_mangle]
pub unsafe extern "C" fn microflow_set_vegetation(
    ptr: *const MicroflowInstance,
    drag: *const f32,
    cover: *const f32,
    len: usize,
) -> MicroflowErrorCode {
    into_code(unsafe {
        with_session_mut(ptr, |session| {
            let drag = copy_input("drag", drag, len)?;
            let cover = copy_input("cover", cover, len)?;
            session.state.set_vegetation(&drag, &cover)?;
            Ok(())
        })
    })
}

/// Set the wind observations and uniform surface layer of the next solve.
///
/// Clears any per-column surface-layer fields set earlier.
///
/// Returns `InvalidObservation` for an empty list, non-positive heights or
/// non-finite values.
///
/// # Safety
/// - `ptr` must be a live instance from `microflow_new`.
/// - `observations` must hold at least `count` readable entries; they are copied.
#[no_mangle]
pub unsafe extern "C" fn microflow_set_observations(
    ptr: *const MicroflowInstance,
    observations: *const MicroflowObservation,
    count: usize,
    obukhov_length: f32,
    friction_velocity: f32,
) -> MicroflowErrorCode {
    if observations.is_null() {
        return track_error(&DefaultMicroflowError::null_pointer("observations"));
    }
    // SAFETY: non-null and the caller guarantees `count` readable entries
    let observations: Vec<WindObservation> = unsafe { slice::from_raw_parts(observations, count) }
        .iter()
        .map(|obs| WindObservation::new(obs.height, obs.u, obs.v))
        .collect();

    into_code(unsafe {
        with_session_mut(ptr, |session| {
            let conditions = BoundaryConditions {
                observations,
                obukhov_length,
                friction_velocity,
                obukhov_field: None,
                friction_velocity_field: None,
            };
            conditions.validate_observations()?;
            session.conditions = Some(conditions);
            Ok(())
        })
    })
}

/// Set per-column Obukhov length and friction velocity.
///
/// Either array may be null to keep the uniform value given to
/// `microflow_set_observations`, which must be called first.
///
/// # Safety
/// - `ptr` must be a live instance from `microflow_new`.
/// - Non-null arrays must hold at least `len` readable values; they are copied.
#[no_mangle]
pub unsafe extern "C" fn microflow_set_surface_fields(
    ptr: *const MicroflowInstance,
    obukhov_length: *const f32,
    friction_velocity: *const f32,
    len: usize,
) -> MicroflowErrorCode {
    into_code(unsafe {
        with_session_mut(ptr, |session| {
            let columns = session.state.geometry.column_count();
            let obukhov = copy_optional_input("obukhov_length", obukhov_length, len)?;
            let ustar = copy_optional_input("friction_velocity", friction_velocity, len)?;
            let conditions = session
                .conditions
                .as_mut()
                .ok_or_else(DefaultMicroflowError::missing_observations)?;

            let mut updated = conditions.clone();
            updated.obukhov_field = obukhov;
            updated.friction_velocity_field = ustar;
            updated.validate(columns)?;
            *conditions = updated;
            Ok(())
        })
    })
}

//! Field and snapshot export.
//!
//! Copies are taken under the read lock, so several host threads may read
//! fields of the same instance at once.

use microflow_core::snapshot::{decode_into, encode};
use microflow_core::{Field3, FlowState, SnapshotLayout};
use std::slice;

use crate::error::{DefaultMicroflowError, MicroflowErrorCode};
use crate::helpers::{into_code, track_error, with_session, with_session_mut};
use crate::instance::MicroflowInstance;

/// Exportable fields.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MicroflowField {
    /// x velocity on west faces, `(ni + 1) * nj * nk` values
    U = 0,
    /// y velocity on south faces, `ni * (nj + 1) * nk` values
    V = 1,
    /// z velocity on bottom faces, `ni * nj * (nk + 1)` values
    W = 2,
    /// Accumulated pressure correction, `ni * nj * nk` values
    Dpm = 3,
    Tke = 4,
    Dissipation = 5,
}

/// Snapshot cell ordering.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MicroflowSnapshotLayout {
    Full = 0,
    ColumnCompressed = 1,
    TerrainCompressed = 2,
}

impl From<MicroflowSnapshotLayout> for SnapshotLayout {
    fn from(layout: MicroflowSnapshotLayout) -> Self {
        match layout {
            MicroflowSnapshotLayout::Full => Self::Full,
            MicroflowSnapshotLayout::ColumnCompressed => Self::ColumnCompressed,
            MicroflowSnapshotLayout::TerrainCompressed => Self::TerrainCompressed,
        }
    }
}

/// Index extents `(i_max, j_max, k_max)` of `field`, all starting at 1.
fn extents(state: &FlowState, field: MicroflowField) -> (usize, usize, usize) {
    let g = &state.geometry;
    match field {
        MicroflowField::U => (g.ni + 1, g.nj, g.nk),
        MicroflowField::V => (g.ni, g.nj + 1, g.nk),
        MicroflowField::W => (g.ni, g.nj, g.nk + 1),
        MicroflowField::Dpm | MicroflowField::Tke | MicroflowField::Dissipation => {
            (g.ni, g.nj, g.nk)
        }
    }
}

fn source(state: &FlowState, field: MicroflowField) -> &Field3 {
    match field {
        MicroflowField::U => &state.u,
        MicroflowField::V => &state.v,
        MicroflowField::W => &state.w,
        MicroflowField::Dpm => &state.dpm,
        MicroflowField::Tke => &state.turb,
        MicroflowField::Dissipation => &state.tdiss,
    }
}

fn field_len(state: &FlowState, field: MicroflowField) -> usize {
    let (ni, nj, nk) = extents(state, field);
    ni * nj * nk
}

/// Number of values `microflow_copy_field` writes for `field`.
///
/// Returns 0 for a null pointer.
///
/// # Safety
/// `ptr` must be null or a live instance from `microflow_new`.
#[no_mangle]
pub unsafe extern "C" fn microflow_field_len(
    ptr: *const MicroflowInstance,
    field: MicroflowField,
) -> usize {
    unsafe { with_session(ptr, |session| Ok(field_len(&session.state, field))) }.unwrap_or(0)
}

/// Copy `field` into `out`, `i` fastest, then `j`, then `k`.
///
/// Returns `BufferTooSmall` if `len` is below `microflow_field_len`.
///
/// # Safety
/// - `ptr` must be a live instance from `microflow_new`.
/// - `out` must point to at least `len` writable `f32` values.
#[no_mangle]
pub unsafe extern "C" fn microflow_copy_field(
    ptr: *const MicroflowInstance,
    field: MicroflowField,
    out: *mut f32,
    len: usize,
) -> MicroflowErrorCode {
    if out.is_null() {
        return track_error(&DefaultMicroflowError::null_pointer("out"));
    }
    into_code(unsafe {
        with_session(ptr, |session| {
            let state = &session.state;
            let required = field_len(state, field);
            if len < required {
                return Err(DefaultMicroflowError::buffer_too_small("out", required, len));
            }
            // SAFETY: non-null and the caller guarantees `len` writable values
            let out = slice::from_raw_parts_mut(out, required);
            let values = source(state, field);
            let (ni, nj, nk) = extents(state, field);

            let mut index = 0;
            for k in 1..=nk {
                for j in 1..=nj {
                    for i in 1..=ni {
                        out[index] = values[(i, j, k)];
                        index += 1;
                    }
                }
            }
            Ok(())
        })
    })
}

/// Top layer of the advective solve of the last solve (0 before any solve).
///
/// # Safety
/// `ptr` must be null or a live instance from `microflow_new`.
#[no_mangle]
pub unsafe extern "C" fn microflow_get_kadvmax(ptr: *const MicroflowInstance) -> usize {
    unsafe { with_session(ptr, |session| Ok(session.state.kadvmax)) }.unwrap_or(0)
}

/// Write the grid size into the out-parameters.
///
/// # Safety
/// - `ptr` must be a live instance from `microflow_new`.
/// - `ni`, `nj` and `nk` must point to writable memory.
#[no_mangle]
pub unsafe extern "C" fn microflow_get_dimensions(
    ptr: *const MicroflowInstance,
    ni: *mut usize,
    nj: *mut usize,
    nk: *mut usize,
) -> MicroflowErrorCode {
    if ni.is_null() || nj.is_null() || nk.is_null() {
        return track_error(&DefaultMicroflowError::null_pointer("ni/nj/nk"));
    }
    into_code(unsafe {
        with_session(ptr, |session| {
            let g = &session.state.geometry;
            // SAFETY: checked non-null above, writable per the caller
            *ni = g.ni;
            *nj = g.nj;
            *nk = g.nk;
            Ok(())
        })
    })
}

/// Encode the wind field as a snapshot into `out`.
///
/// The byte count is stored in `out_written`. Call with a null `out` to
/// query the required size; `BufferTooSmall` is returned with the size in
/// `out_written` when `len` is too short.
///
/// # Safety
/// - `ptr` must be a live instance from `microflow_new`.
/// - `out` must be null or point to at least `len` writable bytes.
/// - `out_written` must point to writable memory.
#[no_mangle]
pub unsafe extern "C" fn microflow_write_snapshot(
    ptr: *const MicroflowInstance,
    layout: MicroflowSnapshotLayout,
    out: *mut u8,
    len: usize,
    out_written: *mut usize,
) -> MicroflowErrorCode {
    if out_written.is_null() {
        return track_error(&DefaultMicroflowError::null_pointer("out_written"));
    }
    into_code(unsafe {
        with_session(ptr, |session| {
            let bytes = encode(&session.state, layout.into());
            // SAFETY: checked non-null above, writable per the caller
            *out_written = bytes.len();
            if out.is_null() {
                return Ok(());
            }
            if len < bytes.len() {
                return Err(DefaultMicroflowError::buffer_too_small("out", bytes.len(), len));
            }
            // SAFETY: non-null and the caller guarantees `len` writable bytes
            slice::from_raw_parts_mut(out, bytes.len()).copy_from_slice(&bytes);
            Ok(())
        })
    })
}

/// Load a snapshot written for the same grid size into the wind field.
///
/// # Safety
/// - `ptr` must be a live instance from `microflow_new`.
/// - `bytes` must point to at least `len` readable bytes.
#[no_mangle]
pub unsafe extern "C" fn microflow_read_snapshot(
    ptr: *const MicroflowInstance,
    bytes: *const u8,
    len: usize,
) -> MicroflowErrorCode {
    if bytes.is_null() {
        return track_error(&DefaultMicroflowError::null_pointer("bytes"));
    }
    // SAFETY: non-null and the caller guarantees `len` readable bytes
    let bytes = unsafe { slice::from_raw_parts(bytes, len) };
    into_code(unsafe {
        with_session_mut(ptr, |session| {
            decode_into(bytes, &mut session.state)?;
            Ok(())
        })
    })
}

use crate::error::{with_last_error_mut, DefaultMicroflowError, MicroflowError, MicroflowErrorCode};
use crate::instance::{MicroflowInstance, Session};
use std::ffi::CString;
use std::slice;

/// Record `error` as the last error of this thread.
pub(crate) fn set_last_error(error: &impl MicroflowError) {
    with_last_error_mut(|(cstring, code)| {
        *cstring = CString::new(error.msg()).ok();
        *code = error.code();
    });
}

/// Record `error` and return its code.
#[inline]
pub(crate) fn track_error(error: &impl MicroflowError) -> MicroflowErrorCode {
    set_last_error(error);
    error.code()
}

/// Record the error of a failed result, or clear the last error on success.
pub(crate) fn track_result<T>(
    result: Result<T, DefaultMicroflowError>,
) -> Result<T, MicroflowErrorCode> {
    match result {
        Ok(value) => {
            clear_last_error();
            Ok(value)
        }
        Err(error) => Err(track_error(&error)),
    }
}

/// Collapse a unit result into the code returned across the boundary.
pub(crate) fn into_code(result: Result<(), DefaultMicroflowError>) -> MicroflowErrorCode {
    match track_result(result) {
        Ok(()) => MicroflowErrorCode::Ok,
        Err(code) => code,
    }
}

/// Reset the last error of this thread after a successful call.
pub(crate) fn clear_last_error() {
    with_last_error_mut(|(cstring, code)| {
        *cstring = None;
        *code = MicroflowErrorCode::Ok;
    });
}

/// Borrow the instance behind `ptr`.
///
/// # Safety
/// `ptr` must be null or a live pointer returned by `microflow_new`.
pub(crate) unsafe fn instance_from_ptr<'a>(
    ptr: *const MicroflowInstance,
) -> Result<&'a MicroflowInstance, DefaultMicroflowError> {
    // SAFETY: the caller guarantees `ptr` is null or points to a live instance
    unsafe { ptr.as_ref() }.ok_or_else(|| DefaultMicroflowError::null_pointer("ptr"))
}

/// Run `f` with shared access to the session.
///
/// # Safety
/// See [`instance_from_ptr`].
pub(crate) unsafe fn with_session<T>(
    ptr: *const MicroflowInstance,
    f: impl FnOnce(&Session) -> Result<T, DefaultMicroflowError>,
) -> Result<T, DefaultMicroflowError> {
    let instance = unsafe { instance_from_ptr(ptr) }?;
    let session = instance
        .session
        .read()
        .map_err(|_| DefaultMicroflowError::lock_poisoned("RwLock"))?;
    f(&session)
}

/// Run `f` with exclusive access to the session.
///
/// # Safety
/// See [`instance_from_ptr`].
pub(crate) unsafe fn with_session_mut<T>(
    ptr: *const MicroflowInstance,
    f: impl FnOnce(&mut Session) -> Result<T, DefaultMicroflowError>,
) -> Result<T, DefaultMicroflowError> {
    let instance = unsafe { instance_from_ptr(ptr) }?;
    let mut session = instance
        .session
        .write()
        .map_err(|_| DefaultMicroflowError::lock_poisoned("RwLock"))?;
    f(&mut session)
}

/// Copy a caller array of `len` values, rejecting null pointers.
///
/// # Safety
/// `data` must be null or point to at least `len` readable `f32` values.
pub(crate) unsafe fn copy_input(
    name: &str,
    data: *const f32,
    len: usize,
) -> Result<Vec<f32>, DefaultMicroflowError> {
    if data.is_null() {
        return Err(DefaultMicroflowError::null_pointer(name));
    }
    // SAFETY: non-null and the caller guarantees `len` readable values
    Ok(unsafe { slice::from_raw_parts(data, len) }.to_vec())
}

/// Like [`copy_input`], but a null pointer means "not provided".
///
/// # Safety
/// See [`copy_input`].
pub(crate) unsafe fn copy_optional_input(
    name: &str,
    data: *const f32,
    len: usize,
) -> Result<Option<Vec<f32>>, DefaultMicroflowError> {
    if data.is_null() {
        Ok(None)
    } else {
        unsafe { copy_input(name, data, len) }.map(Some)
    }
}

use microflow_core::FlowError;
use std::cell::RefCell;
use std::ffi::CString;
use std::os::raw::c_char;
use std::ptr;

/// Common interface for errors that cross the FFI boundary.
///
/// - `code()` - error code returned to the caller
/// - `msg()` - message stored for `microflow_get_last_error`
pub(crate) trait MicroflowError {
    fn code(&self) -> MicroflowErrorCode;

    fn msg(&self) -> &str;
}

/// Default `MicroflowError` carrying a code and a formatted message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct DefaultMicroflowError {
    code: MicroflowErrorCode,
    msg: String,
}

impl DefaultMicroflowError {
    /// Null pointer passed where a non-null one is required.
    ///
    /// # Arguments
    /// * `param_name` - The name of the parameter that was null (e.g., `"out_instance"`)
    pub fn null_pointer(param_name: &str) -> Self {
        Self {
            code: MicroflowErrorCode::NullPointer,
            msg: format!("Parameter '{param_name}' cannot be null"),
        }
    }

    /// Lock poisoned by a panic in another thread.
    pub fn lock_poisoned(lock_name: &str) -> Self {
        Self {
            code: MicroflowErrorCode::LockPoisoned,
            msg: format!("Lock '{lock_name}' was poisoned by a panic in another thread"),
        }
    }

    /// Caller buffer shorter than the field it should receive.
    pub fn buffer_too_small(param_name: &str, required: usize, actual: usize) -> Self {
        Self {
            code: MicroflowErrorCode::BufferTooSmall,
            msg: format!("Buffer '{param_name}' holds {actual} values, {required} required"),
        }
    }

    /// A `solve` was requested before any wind observation was set.
    pub fn missing_observations() -> Self {
        Self {
            code: MicroflowErrorCode::InvalidObservation,
            msg: "No wind observations set; call microflow_set_observations first".to_string(),
        }
    }

    /// Invalid parameter with a free-form description.
    pub fn invalid_parameter(message: String) -> Self {
        Self {
            code: MicroflowErrorCode::InvalidParameter,
            msg: message,
        }
    }
}

impl From<FlowError> for DefaultMicroflowError {
    fn from(error: FlowError) -> Self {
        let code = match &error {
            FlowError::InvalidGrid(_) => MicroflowErrorCode::InvalidGrid,
            FlowError::DimensionMismatch { .. } => MicroflowErrorCode::DimensionMismatch,
            FlowError::InvalidObservation(_) => MicroflowErrorCode::InvalidObservation,
            FlowError::InvalidConfig(_) | FlowError::Snapshot(_) => {
                MicroflowErrorCode::InvalidParameter
            }
        };
        Self {
            code,
            msg: error.to_string(),
        }
    }
}

impl MicroflowError for DefaultMicroflowError {
    fn code(&self) -> MicroflowErrorCode {
        self.code
    }

    fn msg(&self) -> &str {
        &self.msg
    }
}

/// FFI error codes returned by every `microflow_*` function.
/// Follows standard C convention: 0 = success, non-zero = error.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MicroflowErrorCode {
    /// Operation completed successfully.
    Ok = 0,

    /// Invalid pointer: null pointer passed where non-null required.
    NullPointer = 1,

    /// Lock poisoned: internal synchronization primitive was poisoned by a panic.
    LockPoisoned = 2,

    /// Grid dimensions or spacings are not finite and positive.
    InvalidGrid = 3,

    /// Invalid parameter or configuration value.
    InvalidParameter = 4,

    /// An input array does not cover the grid.
    DimensionMismatch = 5,

    /// Wind observations are missing or unusable.
    InvalidObservation = 6,

    /// Output buffer is too short for the requested field.
    BufferTooSmall = 7,
}

impl From<DefaultMicroflowError> for MicroflowErrorCode {
    fn from(error: DefaultMicroflowError) -> Self {
        error.code
    }
}

thread_local! {
    /// Most recent FFI error of this thread (message, code).
    static LAST_ERROR: RefCell<(Option<CString>, MicroflowErrorCode)> =
        const { RefCell::new((None, MicroflowErrorCode::Ok)) };
}

pub(crate) fn with_last_error<F, R>(f: F) -> R
where
    F: FnOnce(&(Option<CString>, MicroflowErrorCode)) -> R,
{
    LAST_ERROR.with_borrow(f)
}

pub(crate) fn with_last_error_mut<F, R>(f: F) -> R
where
    F: FnOnce(&mut (Option<CString>, MicroflowErrorCode)) -> R,
{
    LAST_ERROR.with_borrow_mut(f)
}

/// Retrieve the most recent FFI error message as a null-terminated C string.
///
/// Returns null if the last call on this thread succeeded.
///
/// # Lifetime
/// The returned pointer is valid until the next `microflow_*` call on this
/// thread. **DO NOT FREE THIS POINTER** - it is managed internally.
///
/// Example:
/// ```c
/// if (microflow_solve(flow, &report) != Ok) {
///     const char* error = microflow_get_last_error();
///     if (error) {
///         fprintf(stderr, "Wind solve failed: %s\n", error);
///     }
/// }
/// ```
#[no_mangle]
pub extern "C" fn microflow_get_last_error() -> *const c_char {
    with_last_error(|(cstring, _code)| cstring.as_ref().map_or(ptr::null(), |cs| cs.as_ptr()))
}

/// Retrieve the most recent FFI error code of this thread.
#[no_mangle]
pub extern "C" fn microflow_get_last_error_code() -> MicroflowErrorCode {
    with_last_error(|(_cstring, code)| *code)
}

//! C ABI for the microflow wind solver.
//!
//! A host creates one [`MicroflowInstance`] per grid with `microflow_new`,
//! loads obstacles and observations, calls `microflow_solve` and copies the
//! fields it needs. Every function returns a [`MicroflowErrorCode`]; the
//! message of the last failure on the calling thread is available from
//! `microflow_get_last_error`.
//!
//! The C header `MicroflowFFI.h` is generated by the build script.

mod error;
mod fields;
mod helpers;
mod inputs;
mod instance;
mod solve;

pub use error::{microflow_get_last_error, microflow_get_last_error_code, MicroflowErrorCode};
pub use fields::{
    microflow_copy_field, microflow_field_len, microflow_get_dimensions, microflow_get_kadvmax,
    microflow_read_snapshot, microflow_write_snapshot, MicroflowField, MicroflowSnapshotLayout,
};
pub use inputs::{
    microflow_set_observations, microflow_set_obstacles, microflow_set_surface_fields,
    microflow_set_vegetation, MicroflowObservation,
};
pub use instance::{
    microflow_default_config, microflow_destroy, microflow_new, MicroflowClosure,
    MicroflowConfig, MicroflowGrid, MicroflowInstance, MicroflowLevel,
};
pub use solve::{microflow_last_report, microflow_solve, MicroflowMode, MicroflowReport};

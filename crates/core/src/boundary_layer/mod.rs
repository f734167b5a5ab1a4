//! Boundary-layer initialisation
//!
//! Initial wind profile from observations, obstacle shadow reduction and the
//! flux-balance reconstruction of W used by the diagnostic path.

pub mod mass_balance;
pub mod profile;
pub mod shadow;

pub use mass_balance::reconstruct_vertical_velocity;
pub use profile::{
    initialise_profile, profile_exponent, BoundaryConditions, WindObservation, WindProfile,
};
pub use shadow::{apply_obstacle_shadow, shadow_factor, SHADOW_SEARCH_DISTANCE};

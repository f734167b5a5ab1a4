//! Vector type alias for cell-centred wind vectors.

use nalgebra::Vector3;

/// Wind vector `(u, v, w)` in m/s, or a position `(x, y, z)` in meters.
///
/// Alias for `nalgebra::Vector3<f32>`; the solver stores components on
/// staggered faces and only builds vectors when sampling cell centres.
pub type Vec3 = Vector3<f32>;

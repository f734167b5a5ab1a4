//! Wind observations and the initial boundary-layer profile
//!
//! The profile exponent depends on the Obukhov length `L`:
//! - `L <= 0` (unstable or neutral): `max(0.35 - 0.4·|L|^-0.15, 0.05)`
//! - `L > 0` (stable): `0.56·L^-0.15`
//!
//! `L = 0` is read as neutral (`|L| → ∞`). Below the lowest observation the
//! wind follows the power law; between observations the components are
//! interpolated linearly in height; above the highest observation the power
//! law continues from the top observation.

use crate::error::{FlowError, FlowResult};
use crate::grid::FlowState;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Lowest height used when evaluating the profile (m)
const MIN_PROFILE_HEIGHT: f32 = 0.1;

/// One wind measurement above local ground
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WindObservation {
    /// Measurement height above ground (m)
    pub height: f32,
    /// Eastward component (m/s)
    pub u: f32,
    /// Northward component (m/s)
    pub v: f32,
}

impl WindObservation {
    pub fn new(height: f32, u: f32, v: f32) -> Self {
        Self { height, u, v }
    }

    /// Build from speed and meteorological direction (degrees the wind blows from)
    pub fn from_speed_direction(height: f32, speed: f32, direction_deg: f32) -> Self {
        let rad = direction_deg.to_radians();
        Self {
            height,
            u: -speed * rad.sin(),
            v: -speed * rad.cos(),
        }
    }

    pub fn speed(&self) -> f32 {
        self.u.hypot(self.v)
    }
}

/// Meteorological inputs of one weather situation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundaryConditions {
    pub observations: Vec<WindObservation>,
    /// Obukhov length (m); 0 means neutral
    pub obukhov_length: f32,
    /// Surface friction velocity (m/s)
    pub friction_velocity: f32,
    /// Optional per-column Obukhov length, row-major `ni * nj`
    #[serde(default)]
    pub obukhov_field: Option<Vec<f32>>,
    /// Optional per-column friction velocity, row-major `ni * nj`
    #[serde(default)]
    pub friction_velocity_field: Option<Vec<f32>>,
}

impl BoundaryConditions {
    /// Single observation with uniform surface-layer parameters
    pub fn single(
        observation: WindObservation,
        obukhov_length: f32,
        friction_velocity: f32,
    ) -> Self {
        Self {
            observations: vec![observation],
            obukhov_length,
            friction_velocity,
            obukhov_field: None,
            friction_velocity_field: None,
        }
    }

    /// Check observations and optional per-column arrays
    ///
    /// # Errors
    ///
    /// Fails on missing observations, non-positive heights, non-finite values or
    /// per-column arrays that do not match `columns`.
    pub fn validate(&self, columns: usize) -> FlowResult<()> {
        self.validate_observations()?;
        if let Some(field) = &self.obukhov_field {
            if field.len() != columns {
                return Err(FlowError::dimension_mismatch("obukhov_field", columns, field.len()));
            }
        }
        if let Some(field) = &self.friction_velocity_field {
            if field.len() != columns {
                return Err(FlowError::dimension_mismatch(
                    "friction_velocity_field",
                    columns,
                    field.len(),
                ));
            }
        }
        Ok(())
    }

    /// Check the wind observations and uniform surface-layer parameters
    ///
    /// # Errors
    ///
    /// Fails on missing observations, non-positive heights or non-finite values.
    pub fn validate_observations(&self) -> FlowResult<()> {
        if self.observations.is_empty() {
            return Err(FlowError::InvalidObservation(
                "at least one wind observation is required".to_string(),
            ));
        }
        for obs in &self.observations {
            if !(obs.height.is_finite() && obs.height > 0.0) {
                return Err(FlowError::InvalidObservation(format!(
                    "observation height must be positive, got {}",
                    obs.height
                )));
            }
            if !(obs.u.is_finite() && obs.v.is_finite()) {
                return Err(FlowError::InvalidObservation(format!(
                    "observation at {} m has non-finite components",
                    obs.height
                )));
            }
        }
        if !self.obukhov_length.is_finite() || !self.friction_velocity.is_finite() {
            return Err(FlowError::InvalidObservation(
                "surface-layer parameters must be finite".to_string(),
            ));
        }
        Ok(())
    }

    /// Copy surface-layer parameters into the per-column arrays of `state`
    pub fn apply_surface_layer(&self, state: &mut FlowState) {
        state.set_surface_layer(self.friction_velocity, self.obukhov_length);
        let ni = state.geometry.ni;
        let columns: Vec<(usize, usize)> = state.geometry.interior_columns().collect();
        if let Some(field) = &self.obukhov_field {
            for &(i, j) in &columns {
                state.obukhov[(i, j)] = field[(j - 1) * ni + (i - 1)];
            }
            state.obukhov.extend_edges();
        }
        if let Some(field) = &self.friction_velocity_field {
            for &(i, j) in &columns {
                state.ustar[(i, j)] = field[(j - 1) * ni + (i - 1)].max(0.0);
            }
            state.ustar.extend_edges();
        }
    }
}

/// Power-law exponent for the given Obukhov length
pub fn profile_exponent(obukhov_length: f32) -> f32 {
    if obukhov_length > 0.0 {
        0.56 * obukhov_length.powf(-0.15)
    } else {
        let magnitude = if obukhov_length == 0.0 {
            f32::INFINITY
        } else {
            obukhov_length.abs()
        };
        (0.35 - 0.4 * magnitude.powf(-0.15)).max(0.05)
    }
}

/// Vertical wind profile fitted to the observations of one situation
#[derive(Debug, Clone, PartialEq)]
pub struct WindProfile {
    observations: Vec<WindObservation>,
    exponent: f32,
}

impl WindProfile {
    /// Build the profile from validated boundary conditions
    ///
    /// # Errors
    ///
    /// Propagates observation validation failures.
    pub fn new(conditions: &BoundaryConditions) -> FlowResult<Self> {
        conditions.validate_observations()?;
        let mut observations = conditions.observations.clone();
        observations.sort_by(|a, b| a.height.total_cmp(&b.height));
        observations.dedup_by(|a, b| (a.height - b.height).abs() < 1e-3);
        Ok(Self {
            observations,
            exponent: profile_exponent(conditions.obukhov_length),
        })
    }

    pub fn exponent(&self) -> f32 {
        self.exponent
    }

    /// Wind components `(u, v)` at `height` above ground
    pub fn at(&self, height: f32) -> (f32, f32) {
        if height <= 0.0 {
            return (0.0, 0.0);
        }
        let z = height.max(MIN_PROFILE_HEIGHT);
        let (Some(lowest), Some(highest)) = (self.observations.first(), self.observations.last())
        else {
            return (0.0, 0.0);
        };

        if z <= lowest.height {
            return self.power_law(lowest, z);
        }
        if z >= highest.height {
            return self.power_law(highest, z);
        }

        for pair in self.observations.windows(2) {
            let (below, above) = (&pair[0], &pair[1]);
            if z <= above.height {
                let t = (z - below.height) / (above.height - below.height);
                return (
                    below.u + t * (above.u - below.u),
                    below.v + t * (above.v - below.v),
                );
            }
        }
        self.power_law(highest, z)
    }

    fn power_law(&self, reference: &WindObservation, z: f32) -> (f32, f32) {
        let factor = (z / reference.height).powf(self.exponent);
        (reference.u * factor, reference.v * factor)
    }
}

/// Fill U and V from the profile, zero W and apply obstacle masking
///
/// Returns the highest blocked layer over the domain.
pub fn initialise_profile(state: &mut FlowState, profile: &WindProfile) -> usize {
    let (ni, nj, nk) = (state.geometry.ni, state.geometry.nj, state.geometry.nk);

    for i in 1..=ni + 1 {
        for j in 1..=nj {
            let ground = 0.5 * (state.ground[(i - 1, j)] + state.ground[(i, j)]);
            for k in 1..=nk + 1 {
                let z = state.geometry.layer_center(k) - ground;
                state.u[(i, j, k)] = profile.at(z).0;
            }
        }
    }
    for i in 1..=ni {
        for j in 1..=nj + 1 {
            let ground = 0.5 * (state.ground[(i, j - 1)] + state.ground[(i, j)]);
            for k in 1..=nk + 1 {
                let z = state.geometry.layer_center(k) - ground;
                state.v[(i, j, k)] = profile.at(z).1;
            }
        }
    }
    state.w.fill(0.0);
    state.enforce_obstacles();

    let max_layer = state.max_obstacle_layer();
    debug!(
        "Initial profile: exponent {:.3}, highest obstacle layer {}",
        profile.exponent(),
        max_layer
    );
    max_layer
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::{GridGeometry, ObstacleMap};
    use approx::assert_relative_eq;

    #[test]
    fn test_profile_exponent_branches() {
        assert_relative_eq!(profile_exponent(0.0), 0.35);
        assert_relative_eq!(
            profile_exponent(-10.0),
            (0.35 - 0.4 * 10f32.powf(-0.15)).max(0.05),
            epsilon = 1e-6
        );
        // Very unstable short lengths clamp at the floor
        assert_relative_eq!(profile_exponent(-1.0), 0.05);
        assert_relative_eq!(profile_exponent(100.0), 0.56 * 100f32.powf(-0.15), epsilon = 1e-6);
        assert!(profile_exponent(10.0) > profile_exponent(1000.0));
    }

    #[test]
    fn test_power_law_below_and_above_single_observation() {
        let bc = BoundaryConditions::single(WindObservation::new(10.0, 5.0, 0.0), 0.0, 0.3);
        let profile = WindProfile::new(&bc).unwrap();
        let p = profile.exponent();
        assert_relative_eq!(profile.at(10.0).0, 5.0);
        assert_relative_eq!(profile.at(5.0).0, 5.0 * 0.5f32.powf(p), epsilon = 1e-5);
        assert_relative_eq!(profile.at(40.0).0, 5.0 * 4f32.powf(p), epsilon = 1e-4);
        assert_eq!(profile.at(-1.0), (0.0, 0.0));
    }

    #[test]
    fn test_linear_interpolation_between_observations() {
        let bc = BoundaryConditions {
            observations: vec![
                WindObservation::new(100.0, 10.0, 2.0),
                WindObservation::new(10.0, 4.0, 0.0),
            ],
            obukhov_length: 0.0,
            friction_velocity: 0.3,
            obukhov_field: None,
            friction_velocity_field: None,
        };
        let profile = WindProfile::new(&bc).unwrap();
        let (u, v) = profile.at(55.0);
        assert_relative_eq!(u, 7.0, epsilon = 1e-4);
        assert_relative_eq!(v, 1.0, epsilon = 1e-4);

        let (u, v) = profile.at(32.5);
        assert_relative_eq!(u, 5.5, epsilon = 1e-4);
        assert_relative_eq!(v, 0.5, epsilon = 1e-4);
    }

    #[test]
    fn test_direction_convention() {
        let westerly = WindObservation::from_speed_direction(10.0, 4.0, 270.0);
        assert_relative_eq!(westerly.u, 4.0, epsilon = 1e-5);
        assert_relative_eq!(westerly.v, 0.0, epsilon = 1e-5);
        assert_relative_eq!(westerly.speed(), 4.0, epsilon = 1e-5);
    }

    #[test]
    fn test_validation_rejects_bad_observations() {
        let mut bc = BoundaryConditions::single(WindObservation::new(0.0, 1.0, 0.0), 0.0, 0.3);
        assert!(matches!(bc.validate(4), Err(FlowError::InvalidObservation(_))));
        bc.observations.clear();
        assert!(bc.validate(4).is_err());
        bc.observations.push(WindObservation::new(10.0, 1.0, 0.0));
        bc.friction_velocity_field = Some(vec![0.2; 3]);
        assert!(matches!(bc.validate(4), Err(FlowError::DimensionMismatch { .. })));
    }

    #[test]
    fn test_initialise_profile_masks_obstacles() {
        let geometry = GridGeometry::uniform(6, 4, 8, 2.0, 2.0, 2.0).unwrap();
        let mut state = FlowState::new(geometry);
        let mut map = ObstacleMap::flat(6, 4);
        map.add_block(3, 3, 2, 3, 6.0);
        state.apply_obstacles(&map).unwrap();

        let bc = BoundaryConditions::single(WindObservation::new(10.0, 6.0, 0.0), 0.0, 0.3);
        let profile = WindProfile::new(&bc).unwrap();
        let max_layer = initialise_profile(&mut state, &profile);

        assert_eq!(max_layer, 3);
        assert_eq!(state.u[(3, 2, 2)], 0.0);
        assert_eq!(state.u[(4, 2, 3)], 0.0);
        assert!(state.u[(3, 2, 4)] > 0.0);
        assert!(state.u[(1, 1, 5)] > state.u[(1, 1, 1)]);
        assert_eq!(state.v.max_abs(), 0.0);
        assert_eq!(state.w.max_abs(), 0.0);
    }
}

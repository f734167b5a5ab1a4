//! Staggered grid, obstacle masking and the owned flow state

pub mod field;
pub mod geometry;
pub mod obstacles;
pub mod state;

// Re-export main types
pub use field::{cube, sq, Field2, Field3};
pub use geometry::GridGeometry;
pub use obstacles::ObstacleMap;
pub use state::{flux_imbalance, FlowState, Quantity, DISSIPATION_FLOOR, TKE_FLOOR};

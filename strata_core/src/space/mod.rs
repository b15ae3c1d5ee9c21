//! Partitioned 2-D spaces.

pub mod border;
pub mod geometry;
pub mod grid;
pub mod topology;
pub mod value_layer;

pub use border::BorderKind;
pub use geometry::{Bounds, Coord, Point};
pub use grid::{SharedContinuousSpace, SharedDiscreteSpace, SharedGrid};
pub use topology::{buffer_strip, CartesianTopology, Direction, Neighbor, Neighbors};
pub use value_layer::{Diffusor, SharedValueLayer};

//! Distributed relationship graphs.

pub mod edge;
pub mod network;

pub use edge::{DefaultEdgeManager, Edge, EdgeContentManager};
pub use network::SharedNetwork;

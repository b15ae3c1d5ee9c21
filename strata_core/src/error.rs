//! Error types for the Strata runtime.

use crate::agent_id::AgentId;
use strata_env::{EnvError, Rank};
use thiserror::Error;

/// Errors raised by the runtime.
///
/// Apart from `Env`, every variant is a programmer or topology error: the
/// model or its configuration is wrong, and retrying cannot help. Callers
/// are expected to log the error and abort the run.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// Transport failure underneath a collective
    #[error(transparent)]
    Env(#[from] EnvError),

    /// A global extent does not split evenly across its processes
    #[error("Extent {extent} on axis {axis} is not divisible by {procs} processes")]
    IndivisibleExtent { axis: usize, extent: f64, procs: usize },

    /// More than two spatial dimensions were requested
    #[error("Spaces of {0} dimensions are not supported (max 2)")]
    TooManyDimensions(usize),

    /// The process grid does not match the communicator
    #[error("Process grid {procs:?} needs {expected} ranks but the communicator has {actual}")]
    ProcessCountMismatch { procs: [usize; 2], expected: usize, actual: usize },

    /// Invalid grid or topology parameters
    #[error("Invalid topology: {0}")]
    Topology(String),

    /// A point lies outside every partition this rank can reach
    #[error("Rank {rank}: no partition contains point {point} for agent {id}")]
    NoPartitionForPoint { rank: Rank, id: AgentId, point: String },

    /// A point lies outside the global bounds of a strict space
    #[error("Point {point} is outside global bounds {bounds}")]
    OutOfBounds { point: String, bounds: String },

    /// An agent was sent to two destinations in one cycle
    #[error("Rank {rank}: agent {id} cannot move to rank {second}, already moving to rank {first}")]
    ConflictingMove { rank: Rank, id: AgentId, first: Rank, second: Rank },

    /// A rank was asked for an agent it does not own
    #[error("Rank {rank} does not own agent {id} requested by rank {requester}")]
    AgentNotOwned { rank: Rank, requester: Rank, id: AgentId },

    /// An operation required an agent the registry does not hold
    #[error("Rank {rank}: unknown agent {id}")]
    UnknownAgent { rank: Rank, id: AgentId },
}

impl RuntimeError {
    /// Creates a topology error.
    pub fn topology(msg: impl Into<String>) -> Self {
        Self::Topology(msg.into())
    }

    /// Creates an out-of-bounds error from displayable values.
    pub fn out_of_bounds(point: impl std::fmt::Display, bounds: impl std::fmt::Display) -> Self {
        Self::OutOfBounds {
            point: point.to_string(),
            bounds: bounds.to_string(),
        }
    }
}

/// Result type used throughout the runtime.
pub type Result<T> = std::result::Result<T, RuntimeError>;

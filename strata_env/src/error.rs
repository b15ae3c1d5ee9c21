//! Error types for the Strata environment abstraction.

use crate::types::{Rank, Tag};
use thiserror::Error;

/// Errors that can occur in the environment abstraction layer.
#[derive(Debug, Error)]
pub enum EnvError {
    /// Send failed (peer mailbox gone, etc.)
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Target rank does not exist in this communicator
    #[error("Rank {rank} out of range for communicator of size {size}")]
    RankOutOfRange { rank: Rank, size: usize },

    /// The mailbox was closed while waiting on a receive
    #[error("Channel closed while waiting for {tag} from rank {source_rank}")]
    ChannelClosed { source_rank: Rank, tag: Tag },

    /// Payload serialization/deserialization failed
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// A receive did not complete in time (a peer skipped a collective)
    #[error("Timeout after {0}ms")]
    Timeout(u64),
}

impl EnvError {
    /// Creates a network error.
    pub fn network(msg: impl Into<String>) -> Self {
        Self::NetworkError(msg.into())
    }

    /// Creates a serialization error.
    pub fn serialization(err: impl std::fmt::Display) -> Self {
        Self::SerializationError(err.to_string())
    }
}

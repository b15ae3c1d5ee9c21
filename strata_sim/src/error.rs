//! Error types for the simulation harness.

use strata_core::RuntimeError;
use strata_env::{EnvError, Rank};
use thiserror::Error;

/// Errors that end a simulation run.
#[derive(Debug, Error)]
pub enum SimError {
    /// A runtime collective or model step failed
    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    /// A rank task panicked or was cancelled
    #[error("Rank {rank} task failed: {reason}")]
    RankFailed { rank: Rank, reason: String },

    /// The run configuration is unusable
    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl SimError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Whether this error is only a peer waiting on a rank that already
    /// failed.
    pub fn is_timeout(&self) -> bool {
        matches!(self, SimError::Runtime(RuntimeError::Env(EnvError::Timeout(_))))
    }
}

impl From<EnvError> for SimError {
    fn from(err: EnvError) -> Self {
        SimError::Runtime(RuntimeError::Env(err))
    }
}

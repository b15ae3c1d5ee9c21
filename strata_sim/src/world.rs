//! SimWorld - spawns one task per rank over an in-memory mesh.

use crate::context::SimContext;
use crate::error::SimError;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::path::Path;
use strata_core::RuntimeConfig;
use strata_env::ChannelCommunicator;
use tracing::{debug, error};

/// Configuration for a simulation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Master seed for determinism
    pub seed: u64,

    /// Number of ranks (one tokio task each)
    pub num_ranks: usize,

    /// Ticks to simulate
    pub ticks: u64,

    /// Agents created on every rank at setup
    pub agents_per_rank: usize,

    /// Receive timeout; turns a stuck collective into an error
    pub recv_timeout_ms: Option<u64>,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            num_ranks: 4,
            ticks: 20,
            agents_per_rank: 8,
            recv_timeout_ms: Some(30_000),
        }
    }
}

impl SimConfig {
    /// Loads a config from a JSON file; missing fields take defaults.
    pub fn from_json_file(path: &Path) -> Result<Self, SimError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| SimError::config(format!("cannot read {}: {}", path.display(), e)))?;
        serde_json::from_str(&text)
            .map_err(|e| SimError::config(format!("{}: {}", path.display(), e)))
    }

    pub fn validate(&self) -> Result<(), SimError> {
        if self.num_ranks == 0 {
            return Err(SimError::config("at least one rank is required"));
        }
        if self.agents_per_rank == 0 {
            return Err(SimError::config("agents_per_rank must be positive"));
        }
        if self.agents_per_rank > i32::MAX as usize {
            return Err(SimError::config("agents_per_rank does not fit an agent id"));
        }
        Ok(())
    }

    /// Transport settings for the mesh.
    pub fn runtime_config(&self) -> RuntimeConfig {
        RuntimeConfig {
            recv_timeout_ms: self.recv_timeout_ms,
        }
    }
}

/// Splits `num_ranks` into the most square process grid, wider than tall.
pub fn process_grid(num_ranks: usize) -> [usize; 2] {
    let rows = (1..=num_ranks)
        .take_while(|d| d * d <= num_ranks)
        .filter(|d| num_ranks % d == 0)
        .last()
        .unwrap_or(1);
    [num_ranks / rows, rows]
}

/// What a rank task starts with.
pub struct RankEnv {
    pub comm: ChannelCommunicator,
    pub ctx: SimContext,
}

/// The SimWorld - runs the same closure on every rank.
pub struct SimWorld {
    config: SimConfig,
}

impl SimWorld {
    pub fn new(config: SimConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    /// Spawns `f` once per rank and returns the results in rank order.
    ///
    /// When several ranks fail, the first error that is not a receive
    /// timeout is returned: timeouts are usually peers stuck waiting on
    /// the rank that actually failed.
    pub async fn run<F, Fut, T>(&self, f: F) -> Result<Vec<T>, SimError>
    where
        F: Fn(RankEnv) -> Fut,
        Fut: Future<Output = Result<T, SimError>> + Send + 'static,
        T: Send + 'static,
    {
        self.config.validate()?;
        let comms = self.config.runtime_config().mesh(self.config.num_ranks).build();
        let handles: Vec<_> = comms
            .into_iter()
            .enumerate()
            .map(|(rank, comm)| {
                let ctx = SimContext::new(self.config.seed, rank);
                tokio::spawn(f(RankEnv { comm, ctx }))
            })
            .collect();
        debug!(ranks = handles.len(), seed = self.config.seed, "rank tasks spawned");

        let mut results = Vec::with_capacity(handles.len());
        let mut failures: Vec<SimError> = Vec::new();
        for (rank, handle) in handles.into_iter().enumerate() {
            match handle.await {
                Ok(Ok(value)) => results.push(value),
                Ok(Err(err)) => {
                    error!(rank, error = %err, "rank failed");
                    failures.push(err);
                }
                Err(join) => failures.push(SimError::RankFailed {
                    rank,
                    reason: join.to_string(),
                }),
            }
        }

        if failures.is_empty() {
            return Ok(results);
        }
        let root = failures.iter().position(|e| !e.is_timeout()).unwrap_or(0);
        Err(failures.swap_remove(root))
    }
}

//! Demo models driven by the scenario runner.

pub mod rumor;
pub mod wanderers;

use crate::context::SimContext;
use crate::error::SimError;
use async_trait::async_trait;
use strata_core::{Agent, RuntimeContext};
use strata_env::ChannelCommunicator;

pub use rumor::{Person, PersonPackage, Rumor};
pub use wanderers::{Walker, WalkerPackage, Wanderers};

/// Runtime type every model runs on.
pub type SimRuntime<A> = RuntimeContext<A, ChannelCommunicator>;

/// Per-rank counters a model reports after each step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StepReport {
    /// Agents that left this rank during the step
    pub migrations: usize,
    /// Ghosts held after the step
    pub ghosts: usize,
    /// Edges held after the step
    pub edges: usize,
    /// Local agents carrying the rumor
    pub informed: usize,
}

/// One rank's share of a model.
///
/// `setup` and `step` run collectives, so every rank calls them the same
/// number of times.
#[async_trait]
pub trait Model: Send + 'static {
    type Agent: Agent;

    /// Creates this rank's agents and links.
    async fn setup(
        &mut self,
        rt: &mut SimRuntime<Self::Agent>,
        ctx: &SimContext,
    ) -> Result<(), SimError>;

    /// Advances one tick and synchronizes.
    async fn step(
        &mut self,
        rt: &mut SimRuntime<Self::Agent>,
        ctx: &SimContext,
    ) -> Result<StepReport, SimError>;

    /// Summarizes the state ghosts must mirror.
    fn digest(&self, agent: &Self::Agent) -> i64;
}

//! Common surface of the structures that arrange agents (grids, networks).

use crate::agent::Agent;
use crate::agent_id::AgentId;
use crate::context::AgentContext;
use std::collections::BTreeSet;
use strata_env::Rank;

/// A view over registry agents that holds ids only.
pub trait Projection<A: Agent> {
    /// Name the projection was created with.
    fn name(&self) -> &str;

    /// Whether the projection currently holds `id`.
    fn contains(&self, id: &AgentId) -> bool;

    /// Ranks this projection exchanges data with during its syncs.
    fn exchange_partners(&self) -> BTreeSet<Rank>;

    /// Drops every id whose agent is no longer in `ctx`, e.g. after a
    /// migration or a removal status. Returns how many were dropped.
    fn retain_present(&mut self, ctx: &AgentContext<A>) -> usize;
}

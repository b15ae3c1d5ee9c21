//! Agent requests and ownership status records.

use crate::agent_id::AgentId;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use strata_env::Rank;

/// Ids a rank wants copies of, and ids it no longer wants.
///
/// Built by model code on the requesting rank; the runtime splits it by
/// owner (each id's current rank) before sending.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentRequest {
    source: Rank,
    requested: Vec<AgentId>,
    cancellations: Vec<AgentId>,
}

impl AgentRequest {
    /// Creates an empty request originating at `source`.
    pub fn new(source: Rank) -> Self {
        Self {
            source,
            requested: Vec::new(),
            cancellations: Vec::new(),
        }
    }

    /// Rank the request originates from.
    pub fn source(&self) -> Rank {
        self.source
    }

    /// Asks for a copy of `id`. Adding the same id twice has no effect.
    pub fn add_request(&mut self, id: AgentId) {
        if !self.requested.contains(&id) {
            self.requested.push(id);
        }
    }

    /// Withdraws interest in `id`.
    pub fn add_cancellation(&mut self, id: AgentId) {
        if !self.cancellations.contains(&id) {
            self.cancellations.push(id);
        }
    }

    pub fn remove_request(&mut self, id: &AgentId) -> bool {
        let before = self.requested.len();
        self.requested.retain(|r| r != id);
        before != self.requested.len()
    }

    pub fn remove_cancellation(&mut self, id: &AgentId) -> bool {
        let before = self.cancellations.len();
        self.cancellations.retain(|c| c != id);
        before != self.cancellations.len()
    }

    pub fn contains_request(&self, id: &AgentId) -> bool {
        self.requested.contains(id)
    }

    pub fn contains_cancellation(&self, id: &AgentId) -> bool {
        self.cancellations.contains(id)
    }

    pub fn requested(&self) -> &[AgentId] {
        &self.requested
    }

    pub fn cancellations(&self) -> &[AgentId] {
        &self.cancellations
    }

    pub fn is_empty(&self) -> bool {
        self.requested.is_empty() && self.cancellations.is_empty()
    }

    /// Owners this request has to reach.
    pub fn targets(&self) -> BTreeSet<Rank> {
        self.requested
            .iter()
            .chain(&self.cancellations)
            .map(|id| id.current_rank())
            .collect()
    }

    /// Splits the request into one request per owning rank.
    pub fn split_by_owner(&self) -> BTreeMap<Rank, AgentRequest> {
        let mut parts: BTreeMap<Rank, AgentRequest> = BTreeMap::new();
        for id in &self.requested {
            parts
                .entry(id.current_rank())
                .or_insert_with(|| AgentRequest::new(self.source))
                .add_request(*id);
        }
        for id in &self.cancellations {
            parts
                .entry(id.current_rank())
                .or_insert_with(|| AgentRequest::new(self.source))
                .add_cancellation(*id);
        }
        parts
    }
}

/// Ownership change of an exported agent, as told to its importers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum AgentStatus {
    /// The owner deleted the agent.
    Removed(AgentId),
    /// The agent migrated; `new` carries the new owner as current rank.
    Moved { old: AgentId, new: AgentId },
}

impl AgentStatus {
    /// Id the status is about.
    pub fn id(&self) -> AgentId {
        match self {
            AgentStatus::Removed(id) => *id,
            AgentStatus::Moved { new, .. } => *new,
        }
    }
}

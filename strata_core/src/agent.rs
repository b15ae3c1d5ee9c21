//! Agent capabilities and the collaborator roles models implement.

use crate::agent_id::AgentId;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Anything the runtime can own, replicate and migrate.
pub trait Agent: Send + Sync + 'static {
    /// Returns the agent's id.
    fn id(&self) -> &AgentId;

    /// Returns the agent's id for ownership updates.
    fn id_mut(&mut self) -> &mut AgentId;
}

/// A transport-ready snapshot of an agent.
pub trait AgentContent: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Id of the agent this snapshot describes.
    fn agent_id(&self) -> AgentId;
}

/// Serializes agents for shipping to other ranks.
pub trait ContentProvider<A: Agent, C: AgentContent>: Send + Sync {
    /// Takes a snapshot of `agent`.
    fn provide_content(&self, agent: &A) -> C;
}

/// Builds and refreshes agents from received content.
pub trait AgentFactory<A: Agent, C: AgentContent>: Send + Sync {
    /// Creates a new agent from `content`.
    ///
    /// The runtime fixes up the current rank after creation, so the
    /// factory may copy the id from the content verbatim.
    fn create_agent(&self, content: &C) -> A;

    /// Overwrites the state of an existing copy with `content`.
    fn update_agent(&self, agent: &mut A, content: &C);
}

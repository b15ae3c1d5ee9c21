//! Shared fixtures for multi-rank tests.

use crate::agent::{Agent, AgentContent, AgentFactory, ContentProvider};
use crate::agent_id::AgentId;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use strata_env::{ChannelCommunicator, ChannelMesh};

/// Spawns one task per rank over a fresh channel mesh and returns the
/// results in rank order.
pub(crate) async fn run_ranks<F, Fut, T>(size: usize, f: F) -> Vec<T>
where
    F: Fn(ChannelCommunicator) -> Fut,
    Fut: Future<Output = T> + Send + 'static,
    T: Send + 'static,
{
    let comms = ChannelMesh::new(size)
        .with_recv_timeout(Duration::from_secs(5))
        .build();
    let handles: Vec<_> = comms.into_iter().map(|comm| tokio::spawn(f(comm))).collect();

    let mut results = Vec::with_capacity(size);
    for handle in handles {
        results.push(handle.await.expect("rank task panicked"));
    }
    results
}

/// Minimal agent that doubles as its own content record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct Probe {
    pub id: AgentId,
    pub value: i64,
}

impl Probe {
    pub fn new(id: AgentId, value: i64) -> Self {
        Self { id, value }
    }
}

impl Agent for Probe {
    fn id(&self) -> &AgentId {
        &self.id
    }

    fn id_mut(&mut self) -> &mut AgentId {
        &mut self.id
    }
}

impl AgentContent for Probe {
    fn agent_id(&self) -> AgentId {
        self.id
    }
}

/// Provider and factory for `Probe`.
pub(crate) struct ProbePackage;

impl ContentProvider<Probe, Probe> for ProbePackage {
    fn provide_content(&self, agent: &Probe) -> Probe {
        agent.clone()
    }
}

impl AgentFactory<Probe, Probe> for ProbePackage {
    fn create_agent(&self, content: &Probe) -> Probe {
        content.clone()
    }

    fn update_agent(&self, agent: &mut Probe, content: &Probe) {
        agent.value = content.value;
    }
}

//! Graph edges and their wire form.

use crate::agent_id::AgentId;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// A relationship between two agents.
///
/// Endpoints are ids only; the registry resolves them to agents and
/// knows their current owners.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge<P> {
    source: AgentId,
    target: AgentId,
    weight: f64,
    payload: P,
    uses_target_as_master: bool,
}

impl<P> Edge<P> {
    /// Creates an edge of weight 1 mastered by its source.
    pub fn new(source: AgentId, target: AgentId, payload: P) -> Self {
        Self {
            source,
            target,
            weight: 1.0,
            payload,
            uses_target_as_master: false,
        }
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }

    /// Makes the target's owner the rank that pushes this edge's state.
    pub fn with_target_as_master(mut self) -> Self {
        self.uses_target_as_master = true;
        self
    }

    pub fn source(&self) -> &AgentId {
        &self.source
    }

    pub fn target(&self) -> &AgentId {
        &self.target
    }

    pub fn weight(&self) -> f64 {
        self.weight
    }

    pub fn set_weight(&mut self, weight: f64) {
        self.weight = weight;
    }

    pub fn payload(&self) -> &P {
        &self.payload
    }

    pub fn payload_mut(&mut self) -> &mut P {
        &mut self.payload
    }

    pub fn uses_target_as_master(&self) -> bool {
        self.uses_target_as_master
    }

    /// Endpoint whose owner is authoritative for this edge's state.
    pub fn master(&self) -> &AgentId {
        if self.uses_target_as_master {
            &self.target
        } else {
            &self.source
        }
    }

    /// The endpoint opposite the master.
    pub fn slave(&self) -> &AgentId {
        if self.uses_target_as_master {
            &self.source
        } else {
            &self.target
        }
    }

    /// Whether `id` is one of the endpoints.
    pub fn touches(&self, id: &AgentId) -> bool {
        self.source == *id || self.target == *id
    }
}

/// Converts edges to and from their transport form.
pub trait EdgeContentManager<P, E>: Send + Sync
where
    E: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    /// Snapshots `edge` for shipping.
    fn provide_edge_content(&self, edge: &Edge<P>) -> E;

    /// Rebuilds an edge from received content.
    fn create_edge(&self, content: &E) -> Edge<P>;
}

/// Ships edges as themselves.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultEdgeManager;

impl<P> EdgeContentManager<P, Edge<P>> for DefaultEdgeManager
where
    P: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    fn provide_edge_content(&self, edge: &Edge<P>) -> Edge<P> {
        edge.clone()
    }

    fn create_edge(&self, content: &Edge<P>) -> Edge<P> {
        content.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_master_follows_flag() {
        let a = AgentId::new(1, 0, 0);
        let b = AgentId::new(2, 1, 0);
        let edge = Edge::new(a, b, ());
        assert_eq!(edge.master(), &a);
        assert_eq!(edge.slave(), &b);

        let edge = edge.with_target_as_master();
        assert_eq!(edge.master(), &b);
        assert!(edge.touches(&a) && edge.touches(&b));
        assert!(!edge.touches(&AgentId::new(3, 0, 0)));
    }

    #[test]
    fn test_default_manager_roundtrip_keeps_weight() {
        let edge = Edge::new(AgentId::new(1, 0, 0), AgentId::new(2, 1, 0), 7u32).with_weight(0.25);
        let manager = DefaultEdgeManager;
        let content = manager.provide_edge_content(&edge);
        let wire = serde_json::to_vec(&content).unwrap();
        let back: Edge<u32> = serde_json::from_slice(&wire).unwrap();
        assert_eq!(manager.create_edge(&back), edge);
    }
}

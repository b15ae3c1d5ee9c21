//! Shared networks: graphs whose vertices may live on different ranks.
//!
//! An edge created on one rank is mirrored onto the owner of every remote
//! endpoint ("complementary edge"), so both owners see it:
//!
//! ```text
//!  rank 0                 rank 1
//!  a0 ──► a1'(ghost)      a0'(ghost) ──► a1
//!         │                   ▲
//!         └─ create_complementary_edges ─┘
//! ```
//!
//! Endpoints owned by a third rank travel as ghost content, and that
//! rank is told to start exporting them to the receiver.

use crate::agent::{Agent, AgentContent, AgentFactory, ContentProvider};
use crate::agent_id::AgentId;
use crate::context::AgentContext;
use crate::error::{Result, RuntimeError};
use crate::exchange::coordinated_exchange;
use crate::graph::edge::{Edge, EdgeContentManager};
use crate::projection::Projection;
use crate::runtime::RuntimeContext;
use crate::tags;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use strata_env::{Communicator, Rank};
use tracing::{debug, trace};

type EdgeKey = (AgentId, AgentId);

/// Asks the owner of `id` to export it to `importer`.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ExportNotice {
    importer: Rank,
    id: AgentId,
}

/// A complementary edge plus the endpoints the receiver lacks.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct EdgePacket<E, C> {
    edge: E,
    endpoints: Vec<C>,
}

/// The local view of a distributed graph.
pub struct SharedNetwork<P> {
    name: String,
    rank: Rank,
    directed: bool,
    /// Vertex ids with their last known owner
    vertices: BTreeMap<AgentId, Rank>,
    edges: BTreeMap<EdgeKey, Edge<P>>,
    /// Ghost vertices this network holds a reference on
    held: BTreeSet<AgentId>,
    /// Locally created edges each remote owner has yet to receive
    pending: BTreeMap<Rank, BTreeSet<EdgeKey>>,
    /// Removed shared edges each remote owner has yet to hear about
    removed: BTreeMap<Rank, BTreeSet<EdgeKey>>,
}

impl<P: Send + Sync + 'static> SharedNetwork<P> {
    pub fn new(name: impl Into<String>, rank: Rank, directed: bool) -> Self {
        Self {
            name: name.into(),
            rank,
            directed,
            vertices: BTreeMap::new(),
            edges: BTreeMap::new(),
            held: BTreeSet::new(),
            pending: BTreeMap::new(),
            removed: BTreeMap::new(),
        }
    }

    pub fn is_directed(&self) -> bool {
        self.directed
    }

    fn key(&self, source: &AgentId, target: &AgentId) -> EdgeKey {
        if self.directed || source <= target {
            (*source, *target)
        } else {
            (*target, *source)
        }
    }

    /// Adds a registered agent as a vertex, taking a reference on ghosts.
    /// Returns `false` when it already is one.
    ///
    /// # Errors
    /// `UnknownAgent` when the registry does not hold `id`.
    pub fn add_vertex<A: Agent>(
        &mut self,
        agents: &mut AgentContext<A>,
        id: &AgentId,
    ) -> Result<bool> {
        let stored = agents
            .resolve(id)
            .ok_or(RuntimeError::UnknownAgent { rank: self.rank, id: *id })?;
        if self.vertices.contains_key(&stored) {
            return Ok(false);
        }
        if agents.is_ghost(&stored) && self.held.insert(stored) {
            agents.increment_ref_count(&stored);
        }
        self.vertices.insert(stored, stored.current_rank());
        Ok(true)
    }

    /// Drops a vertex and every edge touching it.
    pub fn remove_vertex<A: Agent>(&mut self, agents: &mut AgentContext<A>, id: &AgentId) -> bool {
        if self.vertices.remove(id).is_none() {
            return false;
        }
        let touching: Vec<EdgeKey> = self
            .edges
            .iter()
            .filter(|(_, e)| e.touches(id))
            .map(|(k, _)| *k)
            .collect();
        for (source, target) in touching {
            self.remove_edge(&source, &target);
        }
        if self.held.remove(id) {
            agents.release(id);
        }
        true
    }

    /// Adds `edge`, making both endpoints vertices. An edge with a remote
    /// endpoint is queued for its owner's next `create_complementary_edges`,
    /// unless one remote rank owns both endpoints.
    ///
    /// # Errors
    /// `UnknownAgent` when an endpoint is not in the registry.
    pub fn add_edge<A: Agent>(
        &mut self,
        agents: &mut AgentContext<A>,
        edge: Edge<P>,
    ) -> Result<()> {
        let source = agents
            .resolve(edge.source())
            .ok_or(RuntimeError::UnknownAgent { rank: self.rank, id: *edge.source() })?;
        let target = agents
            .resolve(edge.target())
            .ok_or(RuntimeError::UnknownAgent { rank: self.rank, id: *edge.target() })?;
        self.add_vertex(agents, &source)?;
        self.add_vertex(agents, &target)?;

        let key = self.key(&source, &target);
        let (s, t) = (source.current_rank(), target.current_rank());
        if s != t || s == self.rank {
            for owner in [s, t] {
                if owner != self.rank {
                    self.pending.entry(owner).or_default().insert(key);
                }
            }
        } else {
            trace!(
                rank = self.rank,
                net = %self.name,
                owner = s,
                "edge between agents of one remote rank kept local"
            );
        }
        self.edges.insert(key, edge);
        Ok(())
    }

    /// Removes the edge between `source` and `target`. Removing an edge a
    /// remote owner already holds is pushed at the next
    /// `synch_removed_edges`.
    pub fn remove_edge(&mut self, source: &AgentId, target: &AgentId) -> Option<Edge<P>> {
        let key = self.key(source, target);
        let edge = self.edges.remove(&key)?;
        for owner in self.remote_owners(&edge) {
            let unsent = self
                .pending
                .get_mut(&owner)
                .is_some_and(|keys| keys.remove(&key));
            if !unsent {
                self.removed.entry(owner).or_default().insert(key);
            }
        }
        self.pending.retain(|_, keys| !keys.is_empty());
        Some(edge)
    }

    /// Remote ranks owning an endpoint of `edge`, except a rank that owns
    /// both.
    fn remote_owners(&self, edge: &Edge<P>) -> BTreeSet<Rank> {
        let owner = |id: &AgentId| self.vertices.get(id).copied().unwrap_or(id.current_rank());
        let (s, t) = (owner(edge.source()), owner(edge.target()));
        if s == t && s != self.rank {
            return BTreeSet::new();
        }
        [s, t].into_iter().filter(|r| *r != self.rank).collect()
    }

    pub fn edge(&self, source: &AgentId, target: &AgentId) -> Option<&Edge<P>> {
        self.edges.get(&self.key(source, target))
    }

    pub fn edge_mut(&mut self, source: &AgentId, target: &AgentId) -> Option<&mut Edge<P>> {
        let key = self.key(source, target);
        self.edges.get_mut(&key)
    }

    pub fn edges(&self) -> impl Iterator<Item = &Edge<P>> + '_ {
        self.edges.values()
    }

    pub fn vertices(&self) -> impl Iterator<Item = &AgentId> + '_ {
        self.vertices.keys()
    }

    pub fn contains_vertex(&self, id: &AgentId) -> bool {
        self.vertices.contains_key(id)
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    /// Vertices `id` points to; every neighbor when undirected.
    pub fn successors(&self, id: &AgentId) -> Vec<AgentId> {
        if !self.directed {
            return self.adjacent(id);
        }
        self.edges
            .values()
            .filter(|e| e.source() == id)
            .map(|e| *e.target())
            .collect()
    }

    /// Vertices pointing to `id`; every neighbor when undirected.
    pub fn predecessors(&self, id: &AgentId) -> Vec<AgentId> {
        if !self.directed {
            return self.adjacent(id);
        }
        self.edges
            .values()
            .filter(|e| e.target() == id)
            .map(|e| *e.source())
            .collect()
    }

    /// Vertices sharing an edge with `id`, in either direction.
    pub fn adjacent(&self, id: &AgentId) -> Vec<AgentId> {
        let set: BTreeSet<AgentId> = self
            .edges
            .values()
            .filter_map(|e| {
                if e.source() == id {
                    Some(*e.target())
                } else if e.target() == id {
                    Some(*e.source())
                } else {
                    None
                }
            })
            .collect();
        set.into_iter().collect()
    }

    pub fn in_degree(&self, id: &AgentId) -> usize {
        self.predecessors(id).len()
    }

    pub fn out_degree(&self, id: &AgentId) -> usize {
        self.successors(id).len()
    }

    /// Ranks with complementary edges waiting to be sent.
    pub fn pending_receivers(&self) -> BTreeSet<Rank> {
        self.pending.keys().copied().collect()
    }

    /// Mirrors every queued edge onto the owners of its remote endpoints.
    /// Collective.
    ///
    /// Export notices go out first so third-rank owners know whom to
    /// export to before receivers register the ghosts they get.
    pub async fn create_complementary_edges<A, Net, C, Pr, F, E, M>(
        &mut self,
        rt: &mut RuntimeContext<A, Net>,
        provider: &Pr,
        factory: &F,
        manager: &M,
    ) -> Result<()>
    where
        A: Agent,
        Net: Communicator,
        C: AgentContent,
        Pr: ContentProvider<A, C>,
        F: AgentFactory<A, C>,
        E: Serialize + DeserializeOwned + Send + Sync + 'static,
        M: EdgeContentManager<P, E>,
    {
        let me = rt.rank();
        let comm = Arc::clone(rt.comm());

        let mut notices: BTreeMap<Rank, Vec<ExportNotice>> = BTreeMap::new();
        let mut packets: BTreeMap<Rank, Vec<EdgePacket<E, C>>> = BTreeMap::new();
        for (receiver, keys) in std::mem::take(&mut self.pending) {
            for key in keys {
                let Some(edge) = self.edges.get(&key) else {
                    continue;
                };
                let mut endpoints = Vec::new();
                for endpoint in [edge.source(), edge.target()] {
                    let Some(agent) = rt.agents().get(endpoint) else {
                        continue;
                    };
                    let owner = agent.id().current_rank();
                    if owner == receiver {
                        continue;
                    }
                    endpoints.push(provider.provide_content(agent));
                    if owner == me {
                        rt.exporter_mut().add_exported(receiver, *endpoint);
                    } else {
                        notices.entry(owner).or_default().push(ExportNotice {
                            importer: receiver,
                            id: *endpoint,
                        });
                    }
                }
                packets.entry(receiver).or_default().push(EdgePacket {
                    edge: manager.provide_edge_content(edge),
                    endpoints,
                });
            }
        }

        let received = coordinated_exchange(
            comm.as_ref(),
            &notices,
            tags::NET_EXPORT_SENDERS,
            tags::NET_EXPORT_REQUESTS,
        )
        .await?;
        for (source, list) in received {
            for notice in list {
                if rt.agents().is_local(&notice.id) && notice.importer != me {
                    rt.exporter_mut().add_exported(notice.importer, notice.id);
                } else {
                    trace!(
                        rank = me,
                        source,
                        id = %notice.id,
                        "export notice for an agent not owned here"
                    );
                }
            }
        }

        let received = coordinated_exchange(
            comm.as_ref(),
            &packets,
            tags::NET_EDGE_SENDERS,
            tags::NET_EDGE_UPDATE,
        )
        .await?;

        let mut inserted = 0;
        for (source, list) in received {
            for packet in list {
                for content in &packet.endpoints {
                    let id = content.agent_id();
                    if rt.agents().contains(&id) {
                        continue;
                    }
                    let owner = if id.current_rank() == me {
                        source
                    } else {
                        id.current_rank()
                    };
                    let id = rt.materialize_ghost(content, owner, factory);
                    rt.importer_mut().register(id, owner);
                    self.held.insert(id);
                    self.vertices.insert(id, owner);
                }

                let edge = manager.create_edge(&packet.edge);
                let s = rt.agents().resolve(edge.source());
                let t = rt.agents().resolve(edge.target());
                let (Some(s), Some(t)) = (s, t) else {
                    debug!(
                        rank = me,
                        source,
                        net = %self.name,
                        "complementary edge with unresolvable endpoint dropped"
                    );
                    continue;
                };
                self.add_vertex(rt.agents_mut(), &s)?;
                self.add_vertex(rt.agents_mut(), &t)?;
                let key = self.key(&s, &t);
                self.edges.insert(key, edge);
                inserted += 1;
            }
        }

        debug!(
            rank = me,
            net = %self.name,
            sent = packets.len(),
            inserted,
            "complementary edges created"
        );
        Ok(())
    }

    /// Pushes the state of every edge this rank masters to the owner of
    /// the other endpoint, which replaces its copy. Collective.
    pub async fn synch_edges<A, Net, E, M>(
        &mut self,
        rt: &mut RuntimeContext<A, Net>,
        manager: &M,
    ) -> Result<()>
    where
        A: Agent,
        Net: Communicator,
        E: Serialize + DeserializeOwned + Send + Sync + 'static,
        M: EdgeContentManager<P, E>,
    {
        let me = rt.rank();
        let comm = Arc::clone(rt.comm());
        let owner = |id: &AgentId| rt.agents().resolve(id).map(|id| id.current_rank());

        let mut outgoing: BTreeMap<Rank, Vec<E>> = BTreeMap::new();
        for edge in self.edges.values() {
            if owner(edge.master()) != Some(me) {
                continue;
            }
            match owner(edge.slave()) {
                Some(other) if other != me => {
                    outgoing.entry(other).or_default().push(manager.provide_edge_content(edge));
                }
                _ => {}
            }
        }

        let received = coordinated_exchange(
            comm.as_ref(),
            &outgoing,
            tags::NET_EDGE_SYNC_SENDERS,
            tags::NET_EDGE_SYNC,
        )
        .await?;

        let mut replaced = 0;
        for (_, contents) in received {
            for content in &contents {
                let edge = manager.create_edge(content);
                let key = self.key(edge.source(), edge.target());
                if let Some(slot) = self.edges.get_mut(&key) {
                    *slot = edge;
                    replaced += 1;
                }
            }
        }

        debug!(rank = me, net = %self.name, replaced, "edges synchronized");
        Ok(())
    }

    /// Tells remote owners about removed shared edges. Collective.
    pub async fn synch_removed_edges<A, Net>(
        &mut self,
        rt: &mut RuntimeContext<A, Net>,
    ) -> Result<()>
    where
        A: Agent,
        Net: Communicator,
    {
        let me = rt.rank();
        let comm = Arc::clone(rt.comm());
        let outgoing: BTreeMap<Rank, Vec<EdgeKey>> = std::mem::take(&mut self.removed)
            .into_iter()
            .map(|(rank, keys)| (rank, keys.into_iter().collect()))
            .collect();

        let received = coordinated_exchange(
            comm.as_ref(),
            &outgoing,
            tags::NET_EDGE_REMOVE_SENDERS,
            tags::NET_EDGE_REMOVE_SYNC,
        )
        .await?;

        let mut dropped = 0;
        for (_, keys) in received {
            for (source, target) in keys {
                let key = self.key(&source, &target);
                if self.edges.remove(&key).is_some() {
                    dropped += 1;
                }
            }
        }

        debug!(rank = me, net = %self.name, dropped, "edge removals synchronized");
        Ok(())
    }
}

impl<A: Agent, P: Send + Sync + 'static> Projection<A> for SharedNetwork<P> {
    fn name(&self) -> &str {
        &self.name
    }

    fn contains(&self, id: &AgentId) -> bool {
        self.vertices.contains_key(id)
    }

    fn exchange_partners(&self) -> BTreeSet<Rank> {
        self.vertices
            .values()
            .copied()
            .filter(|r| *r != self.rank)
            .collect()
    }

    /// Also refreshes the owner recorded for each remaining vertex.
    fn retain_present(&mut self, ctx: &AgentContext<A>) -> usize {
        let mut gone = Vec::new();
        for (id, owner) in self.vertices.iter_mut() {
            match ctx.resolve(id) {
                Some(stored) => *owner = stored.current_rank(),
                None => gone.push(*id),
            }
        }
        for id in &gone {
            self.vertices.remove(id);
            self.held.remove(id);
            self.edges.retain(|_, e| !e.touches(id));
        }
        let edges = &self.edges;
        for keys in self.pending.values_mut() {
            keys.retain(|k| edges.contains_key(k));
        }
        self.pending.retain(|_, keys| !keys.is_empty());
        self.held.retain(|id| ctx.is_ghost(id));
        gone.len()
    }
}

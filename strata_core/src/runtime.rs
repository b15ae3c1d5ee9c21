//! Per-process runtime: the registry plus the collectives that keep ghost
//! copies, ownership and agent state consistent across ranks.
//!
//! One `RuntimeContext` exists per rank for the lifetime of its
//! communicator. Projections borrow it mutably while they synchronize.
//!
//! # Status sync order
//!
//! ```text
//!  drain removals ─► statuses to importers ─► exporter hand-off ─► ship moved agents
//! ```
//!
//! Each arrow is one Exchange Coordinator round plus one payload exchange.

use crate::agent::{Agent, AgentContent, AgentFactory, ContentProvider};
use crate::agent_id::AgentId;
use crate::context::AgentContext;
use crate::error::{Result, RuntimeError};
use crate::exchange::{coordinated_exchange, exchange};
use crate::import_export::{Exporter, Importer};
use crate::request::{AgentRequest, AgentStatus};
use crate::tags;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use strata_env::{Communicator, Rank};
use tracing::{debug, trace};

/// Process-wide runtime state for one rank.
pub struct RuntimeContext<A: Agent, Net: Communicator> {
    comm: Arc<Net>,
    agents: AgentContext<A>,
    importer: Importer,
    exporter: Exporter,
    /// Agents leaving this rank at the next status sync, with destination
    moved: BTreeMap<AgentId, Rank>,
    /// Importers each new owner must start exporting to
    handoffs: BTreeMap<Rank, Vec<AgentRequest>>,
}

impl<A: Agent, Net: Communicator> RuntimeContext<A, Net> {
    /// Creates the runtime for the rank behind `comm`.
    pub fn new(comm: Arc<Net>) -> Self {
        let rank = comm.rank();
        Self {
            comm,
            agents: AgentContext::new(rank),
            importer: Importer::new(),
            exporter: Exporter::new(),
            moved: BTreeMap::new(),
            handoffs: BTreeMap::new(),
        }
    }

    pub fn rank(&self) -> Rank {
        self.comm.rank()
    }

    /// Number of ranks in the run.
    pub fn world_size(&self) -> usize {
        self.comm.size()
    }

    pub fn comm(&self) -> &Arc<Net> {
        &self.comm
    }

    pub fn agents(&self) -> &AgentContext<A> {
        &self.agents
    }

    pub fn agents_mut(&mut self) -> &mut AgentContext<A> {
        &mut self.agents
    }

    pub fn importer(&self) -> &Importer {
        &self.importer
    }

    pub fn exporter(&self) -> &Exporter {
        &self.exporter
    }

    pub(crate) fn importer_mut(&mut self) -> &mut Importer {
        &mut self.importer
    }

    pub(crate) fn exporter_mut(&mut self) -> &mut Exporter {
        &mut self.exporter
    }

    /// Registers a new agent. Returns `false` for a duplicate id.
    pub fn add_agent(&mut self, agent: A) -> bool {
        self.agents.add_agent(agent)
    }

    /// Removes an agent; removing a local agent is broadcast to its
    /// importers at the next status sync.
    pub fn remove_agent(&mut self, id: &AgentId) -> Option<A> {
        self.agents.remove_agent(id)
    }

    /// Agents waiting to migrate, with their destinations.
    pub fn pending_moves(&self) -> &BTreeMap<AgentId, Rank> {
        &self.moved
    }

    /// Schedules the local agent `id` to migrate to `dest` at the next
    /// status sync.
    ///
    /// Repeating the same destination is a no-op. A different destination
    /// in the same cycle, including a move back to this rank, is a
    /// `ConflictingMove`.
    pub fn move_agent(&mut self, id: &AgentId, dest: Rank) -> Result<()> {
        let me = self.rank();
        if dest >= self.world_size() {
            return Err(RuntimeError::topology(format!("no rank {} to move {} to", dest, id)));
        }
        let current = match self.agents.resolve(id) {
            Some(current) if current.current_rank() == me => current,
            _ => {
                return Err(RuntimeError::AgentNotOwned {
                    rank: me,
                    requester: me,
                    id: *id,
                })
            }
        };

        match self.moved.get(id) {
            Some(&first) if first == dest => return Ok(()),
            Some(&first) => {
                return Err(RuntimeError::ConflictingMove {
                    rank: me,
                    id: current,
                    first,
                    second: dest,
                })
            }
            None if dest == me => return Ok(()),
            None => {}
        }

        self.moved.insert(current, dest);
        let new = current.owned_by(dest);
        for importer in self.exporter.agent_moved(current, new) {
            let mut handoff = AgentRequest::new(importer);
            handoff.add_request(new);
            self.handoffs.entry(dest).or_default().push(handoff);
        }
        trace!(rank = me, id = %current, dest, "agent scheduled to move");
        Ok(())
    }

    /// Pulls ghost copies of remote agents and withdraws unwanted ones.
    ///
    /// Collective. Wanted ids already imported, ids owned here and
    /// cancellations of ids never imported are dropped silently. An id both
    /// wanted and cancelled in `request` counts as cancelled.
    ///
    /// # Errors
    /// `AgentNotOwned` on the owner side when a wanted id is not local
    /// there.
    pub async fn request_agents<C, P, F>(
        &mut self,
        request: &AgentRequest,
        provider: &P,
        factory: &F,
    ) -> Result<()>
    where
        C: AgentContent,
        P: ContentProvider<A, C>,
        F: AgentFactory<A, C>,
    {
        let me = self.rank();
        let comm = Arc::clone(&self.comm);

        let mut outgoing = AgentRequest::new(me);
        for id in request.requested() {
            if request.contains_cancellation(id) {
                trace!(rank = me, %id, "request superseded by cancellation");
            } else if id.current_rank() == me || self.agents.is_local(id) {
                trace!(rank = me, %id, "request for a local agent ignored");
            } else if self.importer.is_imported(id) {
                trace!(rank = me, %id, "agent already shared");
            } else {
                outgoing.add_request(*id);
            }
        }
        for id in request.cancellations() {
            match self.importer.unregister(id) {
                Some(owner) => {
                    outgoing.add_cancellation(id.owned_by(owner));
                    self.agents.release(id);
                }
                None => trace!(rank = me, %id, "cancellation of an unshared agent ignored"),
            }
        }

        let parts = outgoing.split_by_owner();
        let owners: BTreeSet<Rank> = parts.keys().copied().collect();
        let incoming = coordinated_exchange(
            comm.as_ref(),
            &parts,
            tags::AGENT_REQUEST_SENDERS,
            tags::AGENT_REQUEST,
        )
        .await?;

        let mut replies: BTreeMap<Rank, Vec<C>> = BTreeMap::new();
        for (requester, req) in &incoming {
            for id in req.cancellations() {
                self.exporter.remove_exported(*requester, id);
            }
            let mut contents = Vec::with_capacity(req.requested().len());
            for id in req.requested() {
                let agent = self
                    .agents
                    .get(id)
                    .filter(|a| a.id().current_rank() == me)
                    .ok_or(RuntimeError::AgentNotOwned {
                        rank: me,
                        requester: *requester,
                        id: *id,
                    })?;
                self.exporter.add_exported(*requester, *id);
                contents.push(provider.provide_content(agent));
            }
            replies.insert(*requester, contents);
        }

        let shared = exchange(comm.as_ref(), &replies, &owners, tags::AGENT_CONTENT).await?;
        let mut materialized = 0;
        for (owner, contents) in shared {
            for content in &contents {
                let id = self.materialize_ghost(content, owner, factory);
                self.importer.register(id, owner);
                materialized += 1;
            }
        }

        debug!(
            rank = me,
            served = incoming.len(),
            materialized,
            cancelled = request.cancellations().len(),
            "agent request complete"
        );
        Ok(())
    }

    /// Tells importers about removed and migrated agents, hands exports
    /// over to new owners and ships migrating agents. Collective.
    pub async fn sync_agent_status<C, P, F>(&mut self, provider: &P, factory: &F) -> Result<()>
    where
        C: AgentContent,
        P: ContentProvider<A, C>,
        F: AgentFactory<A, C>,
    {
        let me = self.rank();
        let comm = Arc::clone(&self.comm);

        for id in self.agents.drain_removed() {
            if self.moved.remove(&id).is_some() {
                self.exporter.retract_move(&id);
                for handoffs in self.handoffs.values_mut() {
                    handoffs.retain(|h| !h.contains_request(&id));
                }
            }
            self.exporter.agent_removed(&id);
        }

        let statuses = self.exporter.take_statuses();
        let received = coordinated_exchange(
            comm.as_ref(),
            &statuses,
            tags::AGENT_STATUS_SENDERS,
            tags::AGENT_STATUS,
        )
        .await?;
        for (_, list) in received {
            for status in list {
                self.apply_status(status);
            }
        }

        let handoffs = std::mem::take(&mut self.handoffs);
        let received = coordinated_exchange(
            comm.as_ref(),
            &handoffs,
            tags::EXPORTER_UPDATE_SENDERS,
            tags::EXPORTER_UPDATE,
        )
        .await?;
        for (_, requests) in received {
            for req in requests.iter().filter(|r| r.source() != me) {
                for id in req.requested() {
                    self.exporter.add_exported(req.source(), *id);
                }
            }
        }

        let moved = std::mem::take(&mut self.moved);
        let mut outgoing: BTreeMap<Rank, Vec<C>> = BTreeMap::new();
        for (id, dest) in &moved {
            if let Some(agent) = self.agents.get(id) {
                outgoing.entry(*dest).or_default().push(provider.provide_content(agent));
            }
        }
        let arrived = coordinated_exchange(
            comm.as_ref(),
            &outgoing,
            tags::AGENT_MOVED_SENDERS,
            tags::AGENT_MOVED,
        )
        .await?;

        for id in moved.keys() {
            self.agents.take_agent(id);
        }
        let mut arrivals = 0;
        for (_, contents) in arrived {
            for content in &contents {
                self.adopt(content, factory);
                arrivals += 1;
            }
        }

        debug!(rank = me, departed = moved.len(), arrivals, "agent status synchronized");
        Ok(())
    }

    /// Pushes the state of every exported agent to its importers, which
    /// overwrite their ghosts. Collective.
    pub async fn sync_agents<C, P, F>(&mut self, provider: &P, factory: &F) -> Result<()>
    where
        C: AgentContent,
        P: ContentProvider<A, C>,
        F: AgentFactory<A, C>,
    {
        let me = self.rank();
        let comm = Arc::clone(&self.comm);

        let mut outgoing: BTreeMap<Rank, Vec<C>> = BTreeMap::new();
        for (importer, ids) in self.exporter.exported() {
            let contents: Vec<C> = ids
                .iter()
                .filter_map(|id| self.agents.get(id))
                .filter(|a| a.id().current_rank() == me)
                .map(|a| provider.provide_content(a))
                .collect();
            if !contents.is_empty() {
                outgoing.insert(*importer, contents);
            }
        }

        let received = coordinated_exchange(
            comm.as_ref(),
            &outgoing,
            tags::AGENT_STATE_SENDERS,
            tags::AGENT_STATE,
        )
        .await?;

        let mut updated = 0;
        for (_, contents) in received {
            for content in &contents {
                let id = content.agent_id();
                if !self.agents.is_ghost(&id) {
                    continue;
                }
                if let Some(agent) = self.agents.get_mut(&id) {
                    let owner = agent.id().current_rank();
                    factory.update_agent(agent, content);
                    agent.id_mut().set_current_rank(owner);
                    updated += 1;
                }
            }
        }

        debug!(rank = me, updated, "agent state synchronized");
        Ok(())
    }

    /// Creates (or reuses) the ghost described by `content` and takes one
    /// reference on it. Returns the ghost's id.
    pub(crate) fn materialize_ghost<C, F>(
        &mut self,
        content: &C,
        owner: Rank,
        factory: &F,
    ) -> AgentId
    where
        C: AgentContent,
        F: AgentFactory<A, C>,
    {
        let id = content.agent_id().owned_by(owner);
        if !self.agents.contains(&id) {
            let mut agent = factory.create_agent(content);
            agent.id_mut().set_current_rank(owner);
            self.agents.add_agent(agent);
        } else {
            trace!(rank = self.rank(), %id, "ghost already present");
        }
        self.agents.increment_ref_count(&id);
        id
    }

    fn apply_status(&mut self, status: AgentStatus) {
        let me = self.rank();
        match status {
            AgentStatus::Removed(id) => {
                self.importer.unregister(&id);
                self.agents.imported_agent_removed(&id);
            }
            AgentStatus::Moved { new, .. } => {
                let owner = new.current_rank();
                self.importer.imported_agent_moved(&new, owner, me);
                if owner != me {
                    self.agents.set_current_rank(&new, owner);
                }
            }
        }
    }

    /// Takes ownership of a migrated agent, promoting an existing ghost.
    fn adopt<C, F>(&mut self, content: &C, factory: &F)
    where
        C: AgentContent,
        F: AgentFactory<A, C>,
    {
        let me = self.rank();
        let id = content.agent_id();
        match self.agents.get_mut(&id) {
            Some(agent) => factory.update_agent(agent, content),
            None => {
                self.agents.add_agent(factory.create_agent(content));
            }
        }
        self.agents.set_current_rank(&id, me);
        self.importer.unregister(&id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{run_ranks, Probe, ProbePackage};
    use strata_env::{ChannelCommunicator, ChannelMesh, EnvError};

    type Rt = RuntimeContext<Probe, ChannelCommunicator>;

    /// Runtime with agents (0..n, rank, 0) valued `rank * 100 + n`.
    fn seeded(comm: ChannelCommunicator, n: i32) -> Rt {
        let mut rt = RuntimeContext::new(Arc::new(comm));
        let rank = rt.rank();
        for i in 0..n {
            rt.add_agent(Probe::new(AgentId::new(i, rank, 0), (rank * 100) as i64 + i as i64));
        }
        rt
    }

    async fn request(rt: &mut Rt, wanted: &[AgentId], cancelled: &[AgentId]) -> Result<()> {
        let mut req = AgentRequest::new(rt.rank());
        for id in wanted {
            req.add_request(*id);
        }
        for id in cancelled {
            req.add_cancellation(*id);
        }
        rt.request_agents(&req, &ProbePackage, &ProbePackage).await
    }

    #[tokio::test]
    async fn test_request_materializes_ghost() {
        let results = run_ranks(2, |comm| async move {
            let mut rt = seeded(comm, 3);
            let wanted: Vec<AgentId> = if rt.rank() == 0 {
                vec![AgentId::new(1, 1, 0)]
            } else {
                vec![]
            };
            request(&mut rt, &wanted, &[]).await.unwrap();
            rt
        })
        .await;

        let id = AgentId::new(1, 1, 0);
        let ghost = results[0].agents().get(&id).unwrap();
        assert_eq!(ghost.value, 101);
        assert_eq!(ghost.id().current_rank(), 1);
        assert_eq!(results[0].agents().ref_count(&id), 1);
        assert_eq!(results[0].importer().source_of(&id), Some(1));
        assert_eq!(results[1].exporter().importers_of(&id), vec![0]);
    }

    #[tokio::test]
    async fn test_duplicate_request_is_noop() {
        let results = run_ranks(2, |comm| async move {
            let mut rt = seeded(comm, 2);
            let wanted: Vec<AgentId> = if rt.rank() == 0 {
                vec![AgentId::new(0, 1, 0)]
            } else {
                vec![]
            };
            request(&mut rt, &wanted, &[]).await.unwrap();
            request(&mut rt, &wanted, &[]).await.unwrap();
            rt
        })
        .await;

        let id = AgentId::new(0, 1, 0);
        assert_eq!(results[0].agents().len(), 3);
        assert_eq!(results[0].agents().ref_count(&id), 1);
        assert_eq!(results[0].importer().len(), 1);
    }

    #[tokio::test]
    async fn test_request_and_cancel_in_one_batch_cancellation_wins() {
        let results = run_ranks(2, |comm| async move {
            let mut rt = seeded(comm, 2);
            let id = AgentId::new(0, 1, 0);
            if rt.rank() == 0 {
                request(&mut rt, &[id], &[id]).await.unwrap();
            } else {
                request(&mut rt, &[], &[]).await.unwrap();
            }
            rt
        })
        .await;

        let id = AgentId::new(0, 1, 0);
        assert!(!results[0].agents().contains(&id));
        assert!(results[0].importer().is_empty());
        assert!(!results[1].exporter().is_exported(&id));
    }

    #[tokio::test]
    async fn test_cancel_unrequested_is_noop() {
        let results = run_ranks(2, |comm| async move {
            let mut rt = seeded(comm, 2);
            let cancelled: Vec<AgentId> = if rt.rank() == 0 {
                vec![AgentId::new(1, 1, 0)]
            } else {
                vec![]
            };
            request(&mut rt, &[], &cancelled).await.unwrap();
            rt
        })
        .await;

        assert_eq!(results[0].agents().len(), 2);
        assert!(results[0].importer().is_empty());
        assert!(results[1].exporter().exported().is_empty());
    }

    #[tokio::test]
    async fn test_cancel_after_share_releases_ghost() {
        let results = run_ranks(2, |comm| async move {
            let mut rt = seeded(comm, 2);
            let id = AgentId::new(1, 1, 0);
            let mine = rt.rank() == 0;
            let ids: Vec<AgentId> = if mine { vec![id] } else { vec![] };
            request(&mut rt, &ids, &[]).await.unwrap();
            request(&mut rt, &[], &ids).await.unwrap();
            rt
        })
        .await;

        let id = AgentId::new(1, 1, 0);
        assert!(!results[0].agents().contains(&id));
        assert!(results[0].importer().is_empty());
        assert!(!results[1].exporter().is_exported(&id));
    }

    #[tokio::test]
    async fn test_request_from_non_owner_is_fatal() {
        let comms = ChannelMesh::new(2)
            .with_recv_timeout(std::time::Duration::from_millis(200))
            .build();
        let handles: Vec<_> = comms
            .into_iter()
            .map(|comm| {
                tokio::spawn(async move {
                    let mut rt = seeded(comm, 1);
                    let wanted: Vec<AgentId> = if rt.rank() == 0 {
                        vec![AgentId::new(42, 1, 0)]
                    } else {
                        vec![]
                    };
                    request(&mut rt, &wanted, &[]).await
                })
            })
            .collect();

        let mut results = Vec::new();
        for handle in handles {
            results.push(handle.await.unwrap());
        }
        assert!(matches!(
            results[1],
            Err(RuntimeError::AgentNotOwned { rank: 1, requester: 0, .. })
        ));
        // The requester is left waiting for a reply that never comes.
        assert!(matches!(results[0], Err(RuntimeError::Env(EnvError::Timeout(_)))));
    }

    #[tokio::test]
    async fn test_sync_agents_refreshes_ghosts() {
        let results = run_ranks(2, |comm| async move {
            let mut rt = seeded(comm, 2);
            let id = AgentId::new(0, 1, 0);
            let wanted: Vec<AgentId> = if rt.rank() == 0 { vec![id] } else { vec![] };
            request(&mut rt, &wanted, &[]).await.unwrap();

            if rt.rank() == 1 {
                rt.agents_mut().get_mut(&id).unwrap().value = -7;
            }
            rt.sync_agents(&ProbePackage, &ProbePackage).await.unwrap();
            rt
        })
        .await;

        let ghost = results[0].agents().get(&AgentId::new(0, 1, 0)).unwrap();
        assert_eq!(ghost.value, -7);
        assert_eq!(ghost.id().current_rank(), 1);
    }

    #[tokio::test]
    async fn test_removal_reaches_importers() {
        let results = run_ranks(3, |comm| async move {
            let mut rt = seeded(comm, 2);
            let id = AgentId::new(0, 2, 0);
            let wanted: Vec<AgentId> = if rt.rank() == 2 { vec![] } else { vec![id] };
            request(&mut rt, &wanted, &[]).await.unwrap();

            if rt.rank() == 2 {
                rt.remove_agent(&id);
            }
            rt.sync_agent_status(&ProbePackage, &ProbePackage).await.unwrap();
            rt
        })
        .await;

        let id = AgentId::new(0, 2, 0);
        for rt in &results {
            assert!(!rt.agents().contains(&id));
            assert!(!rt.importer().is_imported(&id));
        }
        assert!(results[2].exporter().exported().is_empty());
    }

    #[tokio::test]
    async fn test_move_agent_migrates_and_hands_off_exports() {
        let results = run_ranks(3, |comm| async move {
            let mut rt = seeded(comm, 2);
            let id = AgentId::new(1, 0, 0);
            let wanted: Vec<AgentId> = if rt.rank() == 2 { vec![id] } else { vec![] };
            request(&mut rt, &wanted, &[]).await.unwrap();

            if rt.rank() == 0 {
                rt.agents_mut().get_mut(&id).unwrap().value = 55;
                rt.move_agent(&id, 1).unwrap();
            }
            rt.sync_agent_status(&ProbePackage, &ProbePackage).await.unwrap();
            rt
        })
        .await;

        let id = AgentId::new(1, 0, 0);
        assert!(!results[0].agents().contains(&id));

        let moved = results[1].agents().get(&id).unwrap();
        assert_eq!(moved.id().current_rank(), 1);
        assert_eq!(moved.value, 55);
        assert!(results[1].agents().is_local(&id));

        let ghost = results[2].agents().get(&id).unwrap();
        assert_eq!(ghost.id().current_rank(), 1);
        assert_eq!(results[2].importer().source_of(&id), Some(1));
        assert_eq!(results[1].exporter().importers_of(&id), vec![2]);
        assert!(!results[0].exporter().is_exported(&id));
    }

    #[tokio::test]
    async fn test_move_onto_importer_promotes_ghost() {
        let results = run_ranks(2, |comm| async move {
            let mut rt = seeded(comm, 1);
            let id = AgentId::new(0, 0, 0);
            let wanted: Vec<AgentId> = if rt.rank() == 1 { vec![id] } else { vec![] };
            request(&mut rt, &wanted, &[]).await.unwrap();

            if rt.rank() == 0 {
                rt.move_agent(&id, 1).unwrap();
            }
            rt.sync_agent_status(&ProbePackage, &ProbePackage).await.unwrap();
            rt
        })
        .await;

        let id = AgentId::new(0, 0, 0);
        assert!(results[1].agents().is_local(&id));
        assert_eq!(results[1].agents().ref_count(&id), 0);
        assert!(results[1].importer().is_empty());
        assert!(results[1].exporter().exported().is_empty());
        assert!(!results[0].agents().contains(&id));
    }

    #[tokio::test]
    async fn test_conflicting_move_is_fatal() {
        let mut comms = ChannelMesh::new(3).build();
        let mut rt = seeded(comms.remove(0), 1);
        let id = AgentId::new(0, 0, 0);

        rt.move_agent(&id, 1).unwrap();
        rt.move_agent(&id, 1).unwrap();
        assert!(matches!(
            rt.move_agent(&id, 2),
            Err(RuntimeError::ConflictingMove { first: 1, second: 2, .. })
        ));
        assert!(matches!(
            rt.move_agent(&id, 0),
            Err(RuntimeError::ConflictingMove { first: 1, second: 0, .. })
        ));
        assert_eq!(rt.pending_moves().len(), 1);
    }

    #[tokio::test]
    async fn test_move_of_ghost_is_rejected() {
        let mut comms = ChannelMesh::new(2).build();
        let mut rt = seeded(comms.remove(0), 0);
        rt.add_agent(Probe::new(AgentId::new(0, 1, 0), 0));
        assert!(matches!(
            rt.move_agent(&AgentId::new(0, 1, 0), 1),
            Err(RuntimeError::AgentNotOwned { .. })
        ));
    }

    #[tokio::test]
    async fn test_removed_before_move_is_reported_removed() {
        let results = run_ranks(3, |comm| async move {
            let mut rt = seeded(comm, 1);
            let id = AgentId::new(0, 0, 0);
            let wanted: Vec<AgentId> = if rt.rank() == 2 { vec![id] } else { vec![] };
            request(&mut rt, &wanted, &[]).await.unwrap();

            if rt.rank() == 0 {
                rt.move_agent(&id, 1).unwrap();
                rt.remove_agent(&id);
            }
            rt.sync_agent_status(&ProbePackage, &ProbePackage).await.unwrap();
            rt
        })
        .await;

        let id = AgentId::new(0, 0, 0);
        for rt in &results {
            assert!(!rt.agents().contains(&id));
        }
        assert!(results[1].exporter().exported().is_empty());
        assert!(results[2].importer().is_empty());
    }
}

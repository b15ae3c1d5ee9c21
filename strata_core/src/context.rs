//! Ownership registry: the agents a rank holds, local and ghost.
//!
//! Agents live in a single arena keyed by `AgentId`. Projections (grids,
//! networks) and outstanding requests never own agents; they hold ids and
//! register interest in ghosts through reference counts:
//!
//! ```text
//!   SharedGrid ──┐ increment/release
//!   SharedNetwork┼──────────────────►  ref_counts[id]  ──► 0 ⇒ ghost removed
//!   requests ────┘
//! ```
//!
//! Local agents carry no count: they stay until removed explicitly or
//! migrated away.

use crate::agent::Agent;
use crate::agent_id::AgentId;
use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::{BTreeMap, BTreeSet};
use strata_env::Rank;
use tracing::trace;

/// Which agents a selection or view covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Locality {
    /// Agents owned by this rank
    Local,
    /// Imported copies of agents owned elsewhere
    Ghost,
    /// Both
    Any,
}

impl Locality {
    fn admits(self, local: bool) -> bool {
        match self {
            Locality::Local => local,
            Locality::Ghost => !local,
            Locality::Any => true,
        }
    }
}

/// Per-rank collection of agents.
pub struct AgentContext<A: Agent> {
    rank: Rank,
    agents: BTreeMap<AgentId, A>,
    ref_counts: BTreeMap<AgentId, usize>,
    removed_locals: Vec<AgentId>,
}

impl<A: Agent> AgentContext<A> {
    /// Creates an empty registry for `rank`.
    pub fn new(rank: Rank) -> Self {
        Self {
            rank,
            agents: BTreeMap::new(),
            ref_counts: BTreeMap::new(),
            removed_locals: Vec::new(),
        }
    }

    /// Rank this registry belongs to.
    pub fn rank(&self) -> Rank {
        self.rank
    }

    /// Inserts `agent` unless its id is already present.
    ///
    /// Returns `false` for a duplicate; the passed copy is dropped.
    pub fn add_agent(&mut self, agent: A) -> bool {
        let id = *agent.id();
        if self.agents.contains_key(&id) {
            trace!(rank = self.rank, %id, "duplicate agent discarded");
            return false;
        }
        self.agents.insert(id, agent);
        true
    }

    /// Removes an agent immediately, whatever its reference count.
    ///
    /// Removing a local agent is recorded so the next status sync tells
    /// every rank that imported it.
    pub fn remove_agent(&mut self, id: &AgentId) -> Option<A> {
        let agent = self.take_agent(id)?;
        if agent.id().current_rank() == self.rank {
            self.removed_locals.push(*agent.id());
        }
        Some(agent)
    }

    /// Removes a ghost whose owner deleted it. Never journals a removal.
    pub fn imported_agent_removed(&mut self, id: &AgentId) -> Option<A> {
        if self.is_local(id) {
            return None;
        }
        self.take_agent(id)
    }

    /// Records that one more projection holds the ghost `id`.
    ///
    /// Returns the new count, or `None` for local or unknown agents.
    pub fn increment_ref_count(&mut self, id: &AgentId) -> Option<usize> {
        if !self.is_ghost(id) {
            return None;
        }
        let count = self.ref_counts.entry(*id).or_insert(0);
        *count += 1;
        Some(*count)
    }

    /// Records that one projection stopped holding the ghost `id`.
    ///
    /// Returns the new count, or `None` when `id` is untracked.
    pub fn decrement_ref_count(&mut self, id: &AgentId) -> Option<usize> {
        let count = self.ref_counts.get_mut(id)?;
        *count = count.saturating_sub(1);
        let remaining = *count;
        if remaining == 0 {
            self.ref_counts.remove(id);
        }
        Some(remaining)
    }

    /// Current reference count of `id` (zero for local or unknown agents).
    pub fn ref_count(&self, id: &AgentId) -> usize {
        self.ref_counts.get(id).copied().unwrap_or(0)
    }

    /// Drops one reference to the ghost `id` and removes the ghost once
    /// nothing holds it. Returns whether the agent was removed.
    pub fn release(&mut self, id: &AgentId) -> bool {
        if !self.is_ghost(id) {
            return false;
        }
        self.decrement_ref_count(id);
        if self.ref_counts.contains_key(id) {
            return false;
        }
        self.take_agent(id).is_some()
    }

    /// Returns the agent with `id`.
    pub fn get(&self, id: &AgentId) -> Option<&A> {
        self.agents.get(id)
    }

    /// Returns the agent with `id` for mutation.
    pub fn get_mut(&mut self, id: &AgentId) -> Option<&mut A> {
        self.agents.get_mut(id)
    }

    /// Returns whether `id` is present.
    pub fn contains(&self, id: &AgentId) -> bool {
        self.agents.contains_key(id)
    }

    /// Returns whether `id` is present and owned by this rank.
    pub fn is_local(&self, id: &AgentId) -> bool {
        self.agents
            .get(id)
            .is_some_and(|a| a.id().current_rank() == self.rank)
    }

    /// Returns whether `id` is present and owned by another rank.
    pub fn is_ghost(&self, id: &AgentId) -> bool {
        self.agents
            .get(id)
            .is_some_and(|a| a.id().current_rank() != self.rank)
    }

    /// The stored id of `id`, carrying the authoritative current rank.
    pub fn resolve(&self, id: &AgentId) -> Option<AgentId> {
        self.agents.get(id).map(|a| *a.id())
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    pub fn local_count(&self) -> usize {
        self.local_agents().count()
    }

    pub fn ghost_count(&self) -> usize {
        self.ghost_agents().count()
    }

    /// All agents, ordered by id.
    pub fn agents(&self) -> impl Iterator<Item = &A> + '_ {
        self.agents.values()
    }

    /// Agents owned by this rank.
    pub fn local_agents(&self) -> impl Iterator<Item = &A> + '_ {
        let rank = self.rank;
        self.agents.values().filter(move |a| a.id().current_rank() == rank)
    }

    /// Imported copies of agents owned elsewhere.
    pub fn ghost_agents(&self) -> impl Iterator<Item = &A> + '_ {
        let rank = self.rank;
        self.agents.values().filter(move |a| a.id().current_rank() != rank)
    }

    /// Agents of one type.
    pub fn agents_of_type(&self, agent_type: i32) -> impl Iterator<Item = &A> + '_ {
        self.agents.values().filter(move |a| a.id().agent_type() == agent_type)
    }

    /// Agents matching `predicate`.
    pub fn filtered<'a, P>(&'a self, predicate: P) -> impl Iterator<Item = &'a A> + 'a
    where
        P: Fn(&A) -> bool + 'a,
    {
        self.agents.values().filter(move |a| predicate(*a))
    }

    /// Picks up to `count` ids at random from the agents in `locality`
    /// (all of them, in id order, when `count` is `None`).
    pub fn select_agents<R: Rng + ?Sized>(
        &self,
        locality: Locality,
        count: Option<usize>,
        rng: &mut R,
    ) -> Vec<AgentId> {
        self.select_where(locality, count, rng, |_| true)
    }

    /// Like `select_agents`, restricted to one agent type.
    pub fn select_agents_of_type<R: Rng + ?Sized>(
        &self,
        locality: Locality,
        agent_type: i32,
        count: Option<usize>,
        rng: &mut R,
    ) -> Vec<AgentId> {
        self.select_where(locality, count, rng, |a| a.id().agent_type() == agent_type)
    }

    /// Appends up to `count` more ids from `locality` to `selected`,
    /// skipping ids it already holds.
    pub fn extend_selection<R: Rng + ?Sized>(
        &self,
        locality: Locality,
        count: Option<usize>,
        selected: &mut Vec<AgentId>,
        rng: &mut R,
    ) {
        let held: BTreeSet<AgentId> = selected.iter().copied().collect();
        let picked = self.select_where(locality, count, rng, |a| !held.contains(a.id()));
        selected.extend(picked);
    }

    /// Replaces `selected` with up to `count` ids from `locality` that it
    /// did not hold before. Repeated calls walk through the population
    /// without drawing the same agent twice in a row.
    pub fn select_and_remove<R: Rng + ?Sized>(
        &self,
        locality: Locality,
        count: Option<usize>,
        selected: &mut Vec<AgentId>,
        rng: &mut R,
    ) {
        let held: BTreeSet<AgentId> = selected.drain(..).collect();
        *selected = self.select_where(locality, count, rng, |a| !held.contains(a.id()));
    }

    fn select_where<R, P>(
        &self,
        locality: Locality,
        count: Option<usize>,
        rng: &mut R,
        predicate: P,
    ) -> Vec<AgentId>
    where
        R: Rng + ?Sized,
        P: Fn(&A) -> bool,
    {
        let pool: Vec<AgentId> = self
            .agents
            .values()
            .filter(|a| locality.admits(a.id().current_rank() == self.rank) && predicate(a))
            .map(|a| *a.id())
            .collect();
        match count {
            Some(n) => pool.choose_multiple(rng, n).copied().collect(),
            None => pool,
        }
    }

    /// Physically removes `id` without journaling.
    pub(crate) fn take_agent(&mut self, id: &AgentId) -> Option<A> {
        self.ref_counts.remove(id);
        self.agents.remove(id)
    }

    /// Re-homes `id`. A ghost that becomes local loses its reference count.
    pub(crate) fn set_current_rank(&mut self, id: &AgentId, rank: Rank) -> bool {
        let Some(agent) = self.agents.get_mut(id) else {
            return false;
        };
        agent.id_mut().set_current_rank(rank);
        if rank == self.rank {
            self.ref_counts.remove(id);
        }
        true
    }

    /// Local removals since the last call.
    pub(crate) fn drain_removed(&mut self) -> Vec<AgentId> {
        std::mem::take(&mut self.removed_locals)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::Probe;
    use proptest::prelude::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn local(n: i32) -> Probe {
        Probe::new(AgentId::new(n, 0, 0), 0)
    }

    fn ghost(n: i32) -> Probe {
        Probe::new(AgentId::new(n, 1, 0), 0)
    }

    #[test]
    fn test_add_rejects_duplicate() {
        let mut ctx = AgentContext::new(0);
        assert!(ctx.add_agent(local(1)));
        assert!(!ctx.add_agent(Probe::new(AgentId::new(1, 0, 0), 99)));
        assert_eq!(ctx.get(&AgentId::new(1, 0, 0)).unwrap().value, 0);
    }

    #[test]
    fn test_local_and_ghost_views() {
        let mut ctx = AgentContext::new(0);
        ctx.add_agent(local(1));
        ctx.add_agent(local(2));
        ctx.add_agent(ghost(3));

        assert_eq!(ctx.len(), 3);
        assert_eq!(ctx.local_count(), 2);
        assert_eq!(ctx.ghost_count(), 1);
        assert!(ctx.is_local(&AgentId::new(1, 0, 0)));
        assert!(ctx.is_ghost(&AgentId::new(3, 1, 0)));
        // Views are restartable.
        assert_eq!(ctx.local_agents().count(), ctx.local_agents().count());
    }

    #[test]
    fn test_type_and_predicate_views() {
        let mut ctx = AgentContext::new(0);
        ctx.add_agent(Probe::new(AgentId::new(1, 0, 0), 5));
        ctx.add_agent(Probe::new(AgentId::new(1, 0, 1), 6));
        ctx.add_agent(Probe::new(AgentId::new(2, 0, 1), 7));

        assert_eq!(ctx.agents_of_type(1).count(), 2);
        let big: Vec<i64> = ctx.filtered(|a| a.value > 5).map(|a| a.value).collect();
        assert_eq!(big, vec![6, 7]);
    }

    #[test]
    fn test_remove_local_is_journaled() {
        let mut ctx = AgentContext::new(0);
        ctx.add_agent(local(1));
        ctx.add_agent(ghost(2));

        assert!(ctx.remove_agent(&AgentId::new(1, 0, 0)).is_some());
        assert!(ctx.remove_agent(&AgentId::new(2, 1, 0)).is_some());
        assert_eq!(ctx.drain_removed(), vec![AgentId::new(1, 0, 0)]);
        assert!(ctx.drain_removed().is_empty());
    }

    #[test]
    fn test_remove_ignores_ref_count() {
        let mut ctx = AgentContext::new(0);
        let id = AgentId::new(2, 1, 0);
        ctx.add_agent(ghost(2));
        ctx.increment_ref_count(&id);
        ctx.increment_ref_count(&id);

        assert!(ctx.remove_agent(&id).is_some());
        assert!(!ctx.contains(&id));
        assert_eq!(ctx.ref_count(&id), 0);
        // Removing again is a no-op.
        assert!(ctx.remove_agent(&id).is_none());
    }

    #[test]
    fn test_ref_counts_skip_local_agents() {
        let mut ctx = AgentContext::new(0);
        let id = AgentId::new(1, 0, 0);
        ctx.add_agent(local(1));
        assert_eq!(ctx.increment_ref_count(&id), None);
        assert_eq!(ctx.decrement_ref_count(&id), None);
        assert!(!ctx.release(&id));
        assert!(ctx.contains(&id));
    }

    #[test]
    fn test_release_removes_at_zero() {
        let mut ctx = AgentContext::new(0);
        let id = AgentId::new(2, 1, 0);
        ctx.add_agent(ghost(2));
        ctx.increment_ref_count(&id);
        ctx.increment_ref_count(&id);

        assert!(!ctx.release(&id));
        assert!(ctx.contains(&id));
        assert!(ctx.release(&id));
        assert!(!ctx.contains(&id));
    }

    #[test]
    fn test_imported_agent_removed_skips_locals() {
        let mut ctx = AgentContext::new(0);
        ctx.add_agent(local(1));
        ctx.add_agent(ghost(2));
        ctx.increment_ref_count(&AgentId::new(2, 1, 0));

        assert!(ctx.imported_agent_removed(&AgentId::new(1, 0, 0)).is_none());
        assert!(ctx.imported_agent_removed(&AgentId::new(2, 1, 0)).is_some());
        assert_eq!(ctx.ref_count(&AgentId::new(2, 1, 0)), 0);
        assert!(ctx.drain_removed().is_empty());
    }

    #[test]
    fn test_promotion_clears_ref_count() {
        let mut ctx = AgentContext::new(0);
        let id = AgentId::new(2, 1, 0);
        ctx.add_agent(ghost(2));
        ctx.increment_ref_count(&id);

        assert!(ctx.set_current_rank(&id, 0));
        assert!(ctx.is_local(&id));
        assert_eq!(ctx.ref_count(&id), 0);
    }

    #[test]
    fn test_select_agents() {
        let mut ctx = AgentContext::new(0);
        for n in 0..10 {
            ctx.add_agent(local(n));
        }
        for n in 0..5 {
            ctx.add_agent(ghost(n));
        }
        let mut rng = ChaCha8Rng::seed_from_u64(7);

        assert_eq!(ctx.select_agents(Locality::Any, None, &mut rng).len(), 15);
        assert_eq!(ctx.select_agents(Locality::Ghost, None, &mut rng).len(), 5);

        let picked = ctx.select_agents(Locality::Local, Some(4), &mut rng);
        assert_eq!(picked.len(), 4);
        assert!(picked.iter().all(|id| ctx.is_local(id)));

        let capped = ctx.select_agents(Locality::Ghost, Some(50), &mut rng);
        assert_eq!(capped.len(), 5);
        assert!(ctx.select_agents_of_type(Locality::Any, 3, None, &mut rng).is_empty());
    }

    #[test]
    fn test_selection_skips_held_ids() {
        let mut ctx = AgentContext::new(0);
        for n in 0..6 {
            ctx.add_agent(local(n));
        }
        ctx.add_agent(ghost(0));
        let mut rng = ChaCha8Rng::seed_from_u64(3);

        let mut selected = ctx.select_agents(Locality::Local, Some(2), &mut rng);
        let first = selected.clone();
        ctx.extend_selection(Locality::Local, Some(2), &mut selected, &mut rng);
        assert_eq!(selected.len(), 4);
        assert_eq!(&selected[..2], &first[..]);
        let unique: BTreeSet<AgentId> = selected.iter().copied().collect();
        assert_eq!(unique.len(), 4);

        // The two locals left over are all that can still be drawn.
        let before: BTreeSet<AgentId> = unique;
        ctx.select_and_remove(Locality::Local, Some(5), &mut selected, &mut rng);
        assert_eq!(selected.len(), 2);
        assert!(selected.iter().all(|id| ctx.is_local(id) && !before.contains(id)));

        ctx.select_and_remove(Locality::Any, None, &mut selected, &mut rng);
        assert_eq!(selected.len(), 5);
    }

    proptest! {
        #[test]
        fn test_ref_count_conservation(ops in proptest::collection::vec(any::<bool>(), 1..40)) {
            let mut ctx = AgentContext::new(0);
            let id = AgentId::new(9, 1, 0);
            ctx.add_agent(ghost(9));
            ctx.increment_ref_count(&id);
            let mut net: usize = 1;

            for hold in ops {
                if !ctx.contains(&id) {
                    break;
                }
                if hold {
                    ctx.increment_ref_count(&id);
                    net += 1;
                } else {
                    ctx.release(&id);
                    net -= 1;
                }
                prop_assert_eq!(ctx.contains(&id), net > 0);
                prop_assert_eq!(ctx.ref_count(&id), net);
            }
        }
    }
}

//! Distributed agent identity.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::hash::{Hash, Hasher};
use strata_env::Rank;

/// Globally unique identifier of an agent.
///
/// Identity is the triple (sequence, starting rank, type). The current rank
/// is ownership metadata: it changes when the agent migrates and is ignored
/// by `Eq`, `Hash` and `Ord`, so a migrated agent keeps its identity.
///
/// Ids order by type, then starting rank, then sequence.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AgentId {
    id: i32,
    starting_rank: Rank,
    agent_type: i32,
    current_rank: Rank,
}

impl AgentId {
    /// Creates an id owned by its starting rank.
    pub fn new(id: i32, starting_rank: Rank, agent_type: i32) -> Self {
        Self::with_current(id, starting_rank, agent_type, starting_rank)
    }

    /// Creates an id with an explicit current owner.
    pub fn with_current(id: i32, starting_rank: Rank, agent_type: i32, current_rank: Rank) -> Self {
        Self {
            id,
            starting_rank,
            agent_type,
            current_rank,
        }
    }

    /// Sequence number, unique per (starting rank, type).
    pub fn id(&self) -> i32 {
        self.id
    }

    /// Rank that created the agent.
    pub fn starting_rank(&self) -> Rank {
        self.starting_rank
    }

    /// Agent kind.
    pub fn agent_type(&self) -> i32 {
        self.agent_type
    }

    /// Rank that currently owns the agent.
    pub fn current_rank(&self) -> Rank {
        self.current_rank
    }

    /// Updates the owning rank.
    pub fn set_current_rank(&mut self, rank: Rank) {
        self.current_rank = rank;
    }

    /// Returns a copy owned by `rank`.
    pub fn owned_by(mut self, rank: Rank) -> Self {
        self.current_rank = rank;
        self
    }

    fn key(&self) -> (i32, Rank, i32) {
        (self.agent_type, self.starting_rank, self.id)
    }
}

impl PartialEq for AgentId {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for AgentId {}

impl Hash for AgentId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key().hash(state);
    }
}

impl PartialOrd for AgentId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for AgentId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}

impl std::fmt::Display for AgentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "AgentId({}, {}, {}, {})",
            self.id, self.starting_rank, self.agent_type, self.current_rank
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::hash_map::DefaultHasher;

    fn hash_of(id: &AgentId) -> u64 {
        let mut hasher = DefaultHasher::new();
        id.hash(&mut hasher);
        hasher.finish()
    }

    #[test]
    fn test_new_is_owned_by_starting_rank() {
        let id = AgentId::new(7, 3, 1);
        assert_eq!(id.current_rank(), 3);
        assert_eq!(id.starting_rank(), 3);
    }

    #[test]
    fn test_ordering_is_type_then_rank_then_sequence() {
        let a = AgentId::new(9, 0, 0);
        let b = AgentId::new(0, 1, 0);
        let c = AgentId::new(0, 0, 1);
        assert!(a < b);
        assert!(b < c);
    }

    #[test]
    fn test_display() {
        let id = AgentId::with_current(1, 2, 3, 4);
        assert_eq!(id.to_string(), "AgentId(1, 2, 3, 4)");
    }

    proptest! {
        #[test]
        fn test_current_rank_never_affects_identity(
            id in any::<i32>(),
            start in 0usize..64,
            ty in 0i32..8,
            r1 in 0usize..64,
            r2 in 0usize..64,
        ) {
            let a = AgentId::with_current(id, start, ty, r1);
            let b = AgentId::with_current(id, start, ty, r2);
            prop_assert_eq!(a, b);
            prop_assert_eq!(hash_of(&a), hash_of(&b));
            prop_assert_eq!(a.cmp(&b), Ordering::Equal);
        }

        #[test]
        fn test_identity_triple_distinguishes(
            a in (any::<i32>(), 0usize..8, 0i32..4),
            b in (any::<i32>(), 0usize..8, 0i32..4),
        ) {
            let x = AgentId::new(a.0, a.1, a.2);
            let y = AgentId::new(b.0, b.1, b.2);
            prop_assert_eq!(x == y, a == b);
        }
    }
}

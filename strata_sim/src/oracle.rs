//! Global invariant checks over per-rank registry snapshots.
//!
//! Ranks never see each other's memory; the oracle does. After a full
//! synchronization cycle it expects:
//! - every agent is local on exactly one rank
//! - every ghost names that rank as its owner
//! - every ghost carries its owner's state
//! - the population is conserved

use std::collections::BTreeMap;
use strata_core::{Agent, AgentContext, AgentId};
use strata_env::Rank;
use thiserror::Error;

/// What one rank's registry held at the end of a tick.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RankSnapshot {
    pub rank: Rank,
    pub tick: u64,
    /// Local agents with their state digest
    pub locals: BTreeMap<AgentId, i64>,
    /// Ghosts with their recorded owner and state digest
    pub ghosts: BTreeMap<AgentId, (Rank, i64)>,
}

impl RankSnapshot {
    /// Captures `agents`, summarizing each agent's state with `digest`.
    pub fn capture<A, D>(tick: u64, agents: &AgentContext<A>, digest: D) -> Self
    where
        A: Agent,
        D: Fn(&A) -> i64,
    {
        let locals = agents.local_agents().map(|a| (*a.id(), digest(a))).collect();
        let ghosts = agents
            .ghost_agents()
            .map(|a| (*a.id(), (a.id().current_rank(), digest(a))))
            .collect();
        Self {
            rank: agents.rank(),
            tick,
            locals,
            ghosts,
        }
    }
}

/// A broken global invariant.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Violation {
    #[error("tick {tick}: agent {id} is local on ranks {ranks:?}")]
    DuplicateOwner { tick: u64, id: AgentId, ranks: Vec<Rank> },

    #[error("tick {tick}: rank {rank} holds a ghost of {id}, which no rank owns")]
    OrphanGhost { tick: u64, id: AgentId, rank: Rank },

    #[error("tick {tick}: rank {rank} places {id} on rank {recorded}, owner is rank {actual}")]
    StaleOwner { tick: u64, id: AgentId, rank: Rank, recorded: Rank, actual: Rank },

    #[error("tick {tick}: ghost of {id} on rank {rank} has state {ghost}, owner has {owner}")]
    StaleState { tick: u64, id: AgentId, rank: Rank, ghost: i64, owner: i64 },

    #[error("tick {tick}: population is {actual}, expected {expected}")]
    PopulationChanged { tick: u64, expected: usize, actual: usize },
}

/// Checks snapshots taken by all ranks at the same tick.
#[derive(Debug, Clone, Default)]
pub struct Oracle {
    expected_population: Option<usize>,
}

impl Oracle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Also require exactly `population` local agents across all ranks.
    pub fn with_population(mut self, population: usize) -> Self {
        self.expected_population = Some(population);
        self
    }

    /// Returns every invariant `snapshots` break.
    pub fn check(&self, snapshots: &[RankSnapshot]) -> Vec<Violation> {
        let tick = snapshots.first().map(|s| s.tick).unwrap_or(0);
        let mut violations = Vec::new();

        let mut owners: BTreeMap<AgentId, Vec<Rank>> = BTreeMap::new();
        for snapshot in snapshots {
            for id in snapshot.locals.keys() {
                owners.entry(*id).or_default().push(snapshot.rank);
            }
        }
        for (id, ranks) in &owners {
            if ranks.len() > 1 {
                violations.push(Violation::DuplicateOwner {
                    tick,
                    id: *id,
                    ranks: ranks.clone(),
                });
            }
        }

        for snapshot in snapshots {
            for (id, &(recorded, ghost)) in &snapshot.ghosts {
                let Some(&actual) = owners.get(id).and_then(|ranks| ranks.first()) else {
                    violations.push(Violation::OrphanGhost { tick, id: *id, rank: snapshot.rank });
                    continue;
                };
                if recorded != actual {
                    violations.push(Violation::StaleOwner {
                        tick,
                        id: *id,
                        rank: snapshot.rank,
                        recorded,
                        actual,
                    });
                }
                let owner = snapshots
                    .iter()
                    .find(|s| s.rank == actual)
                    .and_then(|s| s.locals.get(id).copied());
                if let Some(owner) = owner.filter(|&o| o != ghost) {
                    violations.push(Violation::StaleState {
                        tick,
                        id: *id,
                        rank: snapshot.rank,
                        ghost,
                        owner,
                    });
                }
            }
        }

        if let Some(expected) = self.expected_population {
            let actual = snapshots.iter().map(|s| s.locals.len()).sum();
            if actual != expected {
                violations.push(Violation::PopulationChanged { tick, expected, actual });
            }
        }

        violations
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(
        rank: Rank,
        locals: &[(AgentId, i64)],
        ghosts: &[(AgentId, Rank, i64)],
    ) -> RankSnapshot {
        RankSnapshot {
            rank,
            tick: 3,
            locals: locals.iter().copied().collect(),
            ghosts: ghosts.iter().map(|&(id, r, d)| (id, (r, d))).collect(),
        }
    }

    #[test]
    fn test_consistent_world_passes() {
        let a = AgentId::new(0, 0, 0);
        let b = AgentId::new(0, 1, 0);
        let snaps = [
            snapshot(0, &[(a, 1)], &[(b, 1, 5)]),
            snapshot(1, &[(b, 5)], &[(a, 0, 1)]),
        ];
        assert!(Oracle::new().with_population(2).check(&snaps).is_empty());
    }

    #[test]
    fn test_each_violation_is_reported() {
        let a = AgentId::new(0, 0, 0);
        let b = AgentId::new(0, 1, 0);
        let lost = AgentId::new(9, 2, 0);
        let snaps = [
            snapshot(0, &[(a, 1), (b, 2)], &[(lost, 2, 0)]),
            snapshot(1, &[(b, 2)], &[(a, 1, 7)]),
        ];
        let violations = Oracle::new().with_population(2).check(&snaps);

        let expected = [
            Violation::DuplicateOwner { tick: 3, id: b, ranks: vec![0, 1] },
            Violation::OrphanGhost { tick: 3, id: lost, rank: 0 },
            Violation::StaleOwner { tick: 3, id: a, rank: 1, recorded: 1, actual: 0 },
            Violation::StaleState { tick: 3, id: a, rank: 1, ghost: 7, owner: 1 },
            Violation::PopulationChanged { tick: 3, expected: 2, actual: 3 },
        ];
        for violation in &expected {
            assert!(violations.contains(violation), "missing {:?}", violation);
        }
    }

    #[test]
    fn test_capture_splits_locals_and_ghosts() {
        #[derive(Debug)]
        struct Dot(AgentId, i64);
        impl Agent for Dot {
            fn id(&self) -> &AgentId {
                &self.0
            }
            fn id_mut(&mut self) -> &mut AgentId {
                &mut self.0
            }
        }

        let mut agents = AgentContext::new(0);
        agents.add_agent(Dot(AgentId::new(1, 0, 0), 4));
        agents.add_agent(Dot(AgentId::new(1, 1, 0), 9));
        let snap = RankSnapshot::capture(2, &agents, |d| d.1);
        assert_eq!(snap.locals.get(&AgentId::new(1, 0, 0)), Some(&4));
        assert_eq!(snap.ghosts.get(&AgentId::new(1, 1, 0)), Some(&(1, 9)));
    }
}

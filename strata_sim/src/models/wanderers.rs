//! Random walkers on a periodic shared grid.
//!
//! Every walker takes one king's-move step per tick and counts the
//! walkers around it, ghosts included. Walkers near a partition edge show
//! up in the neighbor's halo; walkers crossing it migrate.

use crate::context::SimContext;
use crate::error::SimError;
use crate::models::{Model, SimRuntime, StepReport};
use crate::world::{process_grid, SimConfig};
use async_trait::async_trait;
use rand::Rng;
use serde::{Deserialize, Serialize};
use strata_core::{
    Agent, AgentContent, AgentFactory, AgentId, ContentProvider, GridConfig, Point,
    SharedDiscreteSpace,
};
use strata_env::{Rank, RunContext};
use tracing::debug;

/// Agent type tag of walkers.
pub const WALKER_TYPE: i32 = 0;

/// A walker. Doubles as its own content record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Walker {
    id: AgentId,
    steps: u64,
    encounters: u64,
}

impl Walker {
    pub fn new(id: AgentId) -> Self {
        Self {
            id,
            steps: 0,
            encounters: 0,
        }
    }

    pub fn steps(&self) -> u64 {
        self.steps
    }

    /// Walkers met so far, summed over all ticks.
    pub fn encounters(&self) -> u64 {
        self.encounters
    }
}

impl Agent for Walker {
    fn id(&self) -> &AgentId {
        &self.id
    }

    fn id_mut(&mut self) -> &mut AgentId {
        &mut self.id
    }
}

impl AgentContent for Walker {
    fn agent_id(&self) -> AgentId {
        self.id
    }
}

/// Provider and factory for walkers.
pub struct WalkerPackage;

impl ContentProvider<Walker, Walker> for WalkerPackage {
    fn provide_content(&self, agent: &Walker) -> Walker {
        agent.clone()
    }
}

impl AgentFactory<Walker, Walker> for WalkerPackage {
    fn create_agent(&self, content: &Walker) -> Walker {
        content.clone()
    }

    fn update_agent(&self, agent: &mut Walker, content: &Walker) {
        agent.steps = content.steps;
        agent.encounters = content.encounters;
    }
}

/// One rank's share of the walker world.
pub struct Wanderers {
    grid: SharedDiscreteSpace,
    agents_per_rank: usize,
}

impl Wanderers {
    /// Periodic grid of 20x20 cells per rank with a 2-cell halo.
    pub fn grid_config(num_ranks: usize) -> GridConfig {
        let [px, py] = process_grid(num_ranks);
        GridConfig {
            origin: [0.0, 0.0],
            extent: [20.0 * px as f64, 20.0 * py as f64],
            process_dims: [px, py],
            buffer: 2.0,
            periodic: true,
        }
    }

    pub fn new(config: &SimConfig, rank: Rank) -> Result<Self, SimError> {
        let layout = Self::grid_config(config.num_ranks);
        let grid = SharedDiscreteSpace::new("wanderers", &layout, rank, config.num_ranks)?;
        Ok(Self {
            grid,
            agents_per_rank: config.agents_per_rank,
        })
    }

    pub fn grid(&self) -> &SharedDiscreteSpace {
        &self.grid
    }
}

#[async_trait]
impl Model for Wanderers {
    type Agent = Walker;

    async fn setup(
        &mut self,
        rt: &mut SimRuntime<Walker>,
        ctx: &SimContext,
    ) -> Result<(), SimError> {
        let mut rng = ctx.derive_rng(0);
        let [ox, oy] = self.grid.local_bounds().origin();
        let [ex, ey] = self.grid.local_bounds().extent();
        for n in 0..self.agents_per_rank {
            let id = AgentId::new(n as i32, ctx.rank(), WALKER_TYPE);
            let point = Point::new(
                ox as i64 + rng.gen_range(0..ex as i64),
                oy as i64 + rng.gen_range(0..ey as i64),
            );
            rt.add_agent(Walker::new(id));
            self.grid.add_agent(rt.agents(), id, point)?;
        }
        self.grid.synchronize(rt, &WalkerPackage, &WalkerPackage).await?;
        debug!(rank = ctx.rank(), walkers = self.agents_per_rank, "walkers placed");
        Ok(())
    }

    async fn step(
        &mut self,
        rt: &mut SimRuntime<Walker>,
        ctx: &SimContext,
    ) -> Result<StepReport, SimError> {
        let mut rng = ctx.derive_rng(ctx.tick());
        let ids: Vec<AgentId> = rt.agents().local_agents().map(|w| *w.id()).collect();
        for id in ids {
            let Some(here) = self.grid.location(&id) else {
                continue;
            };
            let met = self.grid.moore_neighborhood(&here, 1.0, true).len().saturating_sub(1) as u64;
            if let Some(walker) = rt.agents_mut().get_mut(&id) {
                walker.steps += 1;
                walker.encounters += met;
            }
            let (dx, dy) = (rng.gen_range(-1..=1), rng.gen_range(-1..=1));
            self.grid.move_to(rt, &id, Point::new(here.x + dx, here.y + dy))?;
        }

        let migrations = rt.pending_moves().len();
        self.grid.synchronize(rt, &WalkerPackage, &WalkerPackage).await?;
        Ok(StepReport {
            migrations,
            ghosts: rt.agents().ghost_count(),
            ..Default::default()
        })
    }

    fn digest(&self, walker: &Walker) -> i64 {
        (walker.steps * 1_000_000 + walker.encounters) as i64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grid_config_matches_rank_count() {
        for n in [1, 2, 4, 6, 9] {
            assert!(Wanderers::grid_config(n).validate(n).is_ok());
        }
        assert_eq!(Wanderers::grid_config(6).extent, [60.0, 40.0]);
    }

    #[test]
    fn test_update_keeps_identity() {
        let mut local = Walker::new(AgentId::new(1, 0, WALKER_TYPE));
        let mut remote = Walker::new(AgentId::with_current(1, 0, WALKER_TYPE, 3));
        remote.steps = 4;
        remote.encounters = 2;
        WalkerPackage.update_agent(&mut local, &remote);
        assert_eq!((local.steps(), local.encounters()), (4, 2));
        assert_eq!(local.id().current_rank(), 0);
    }
}

//! Shared grids: a global 2-D space split into one partition per rank,
//! with halo buffers mirrored from the eight neighbors.
//!
//! Each rank stores the agents it owns at their points plus ghost copies
//! of agents standing in a neighbor's buffer strip:
//!
//! ```text
//!        rank 0 (x 0..20)        rank 1 (x 20..40)
//!   ┌──────────────────┬──┐ ┌──┬──────────────────┐
//!   │                  │E │ │W │                  │
//!   │         •(19,10) │  │►│  │ ghost at (19,10) │
//!   │                  │  │ │  │                  │
//!   └──────────────────┴──┘ └──┴──────────────────┘
//!            buffer width 2 ─┘
//! ```
//!
//! Buffer ghosts are refreshed wholesale on every `sync_buffer`: stale
//! copies are released first, then current ones are rebuilt from what the
//! neighbors send.

use crate::agent::{Agent, AgentContent, AgentFactory, ContentProvider};
use crate::agent_id::AgentId;
use crate::config::GridConfig;
use crate::context::AgentContext;
use crate::error::{Result, RuntimeError};
use crate::exchange::coordinated_exchange;
use crate::projection::Projection;
use crate::runtime::RuntimeContext;
use crate::space::border::BorderKind;
use crate::space::geometry::{Bounds, Coord, Point};
use crate::space::topology::{buffer_strip, CartesianTopology, Direction, Neighbors};
use crate::tags;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use strata_env::{recv_value, send_value, Communicator, Rank};
use tracing::{debug, trace};

/// Discrete (integer) shared grid.
pub type SharedDiscreteSpace = SharedGrid<i64>;

/// Continuous (real) shared grid.
pub type SharedContinuousSpace = SharedGrid<f64>;

/// Where a migrating agent lands on its new rank.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct MovePacket<T> {
    id: AgentId,
    point: Point<T>,
    dest: Rank,
}

/// One agent of a buffer strip, as shipped to a neighbor.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CellContent<T, C> {
    point: Point<T>,
    content: C,
}

/// The local partition of a shared grid.
pub struct SharedGrid<T: Coord> {
    name: String,
    rank: Rank,
    topology: CartesianTopology,
    local: Bounds,
    buffer: f64,
    border: BorderKind,
    neighbors: Neighbors,
    locations: BTreeMap<AgentId, Point<T>>,
    /// Ghosts placed by the last buffer sync; each holds one reference
    buffered: BTreeSet<AgentId>,
    packets: BTreeMap<AgentId, MovePacket<T>>,
}

impl<T: Coord> SharedGrid<T> {
    /// Creates the partition of `rank` in a grid laid out by `config`.
    ///
    /// # Errors
    /// Whatever `GridConfig::validate` reports for `world_size`.
    pub fn new(
        name: impl Into<String>,
        config: &GridConfig,
        rank: Rank,
        world_size: usize,
    ) -> Result<Self> {
        config.validate(world_size)?;
        let topology = CartesianTopology::new(
            config.process_dims,
            Bounds::new(config.origin, config.extent),
            config.periodic,
        )?;
        let local = topology.bounds_of(rank);
        let neighbors = topology.neighbors(rank);
        let border = if config.periodic {
            BorderKind::Periodic
        } else {
            BorderKind::Strict
        };
        let name = name.into();
        debug!(
            rank,
            grid = %name,
            local = %local,
            neighbors = neighbors.ranks().len(),
            "grid partition created"
        );
        Ok(Self {
            name,
            rank,
            topology,
            local,
            buffer: config.buffer,
            border,
            neighbors,
            locations: BTreeMap::new(),
            buffered: BTreeSet::new(),
            packets: BTreeMap::new(),
        })
    }

    pub fn topology(&self) -> &CartesianTopology {
        &self.topology
    }

    /// Bounds of this rank's partition.
    pub fn local_bounds(&self) -> &Bounds {
        &self.local
    }

    pub fn neighbors(&self) -> &Neighbors {
        &self.neighbors
    }

    pub fn border(&self) -> BorderKind {
        self.border
    }

    /// Places a registered agent. A local agent must land inside this
    /// partition; ghosts may be placed anywhere in the domain.
    ///
    /// # Errors
    /// `UnknownAgent` when the registry does not hold `id`, `OutOfBounds`
    /// for a point outside the domain or a local agent outside this
    /// partition.
    pub fn add_agent<A: Agent>(
        &mut self,
        agents: &AgentContext<A>,
        id: AgentId,
        point: Point<T>,
    ) -> Result<Point<T>> {
        if !agents.contains(&id) {
            return Err(RuntimeError::UnknownAgent { rank: self.rank, id });
        }
        let point = self.border.transform(self.topology.global(), &point)?;
        if agents.is_local(&id) && !self.local.contains(&point) {
            return Err(RuntimeError::out_of_bounds(point, self.local));
        }
        self.locations.insert(id, point);
        Ok(point)
    }

    /// Takes `id` off the grid. A buffered ghost gives back its reference.
    pub fn remove_agent<A: Agent>(
        &mut self,
        agents: &mut AgentContext<A>,
        id: &AgentId,
    ) -> Option<Point<T>> {
        let point = self.locations.remove(id)?;
        self.packets.remove(id);
        if self.buffered.remove(id) {
            agents.release(id);
        }
        Some(point)
    }

    /// Moves a local agent to `point`, scheduling a migration when the
    /// point belongs to a neighbor. Returns the stored point after the
    /// border rule.
    ///
    /// # Errors
    /// `AgentNotOwned` for ghosts, `UnknownAgent` for agents not on this
    /// grid, `NoPartitionForPoint` when no neighbor holds the point, and
    /// `ConflictingMove` for a second destination in one cycle.
    pub fn move_to<A, Net>(
        &mut self,
        rt: &mut RuntimeContext<A, Net>,
        id: &AgentId,
        point: Point<T>,
    ) -> Result<Point<T>>
    where
        A: Agent,
        Net: Communicator,
    {
        let me = self.rank;
        if !self.locations.contains_key(id) {
            return Err(RuntimeError::UnknownAgent { rank: me, id: *id });
        }
        if !rt.agents().is_local(id) {
            return Err(RuntimeError::AgentNotOwned {
                rank: me,
                requester: me,
                id: *id,
            });
        }
        let point = self.border.transform(self.topology.global(), &point)?;

        if self.local.contains(&point) {
            rt.move_agent(id, me)?;
        } else {
            let dest = self
                .neighbors
                .find_containing(&point)
                .map(|n| n.rank)
                .ok_or_else(|| RuntimeError::NoPartitionForPoint {
                    rank: me,
                    id: *id,
                    point: point.to_string(),
                })?;
            rt.move_agent(id, dest)?;
            self.packets.insert(*id, MovePacket { id: *id, point, dest });
            trace!(rank = me, grid = %self.name, %id, %point, dest, "agent leaving partition");
        }

        self.locations.insert(*id, point);
        Ok(point)
    }

    /// Stored point of `id`.
    pub fn location(&self, id: &AgentId) -> Option<Point<T>> {
        self.locations.get(id).copied()
    }

    /// Agents stored exactly at `point`.
    pub fn agents_at(&self, point: &Point<T>) -> Vec<AgentId> {
        self.locations
            .iter()
            .filter(|(_, p)| *p == point)
            .map(|(id, _)| *id)
            .collect()
    }

    /// Agents stored inside `bounds`. On a periodic grid `bounds` may
    /// reach across the seam and matches every periodic image of a point.
    pub fn agents_within(&self, bounds: &Bounds) -> Vec<AgentId> {
        self.locations
            .iter()
            .filter(|(_, p)| self.within(bounds, p))
            .map(|(id, _)| *id)
            .collect()
    }

    /// Agents within Chebyshev distance `radius` of `center`, measured
    /// around the seam on periodic grids. Agents stored exactly at
    /// `center` are skipped unless `include_center` is set. Only what this
    /// rank stores (locals and buffer ghosts) is seen.
    pub fn moore_neighborhood(
        &self,
        center: &Point<T>,
        radius: f64,
        include_center: bool,
    ) -> Vec<AgentId> {
        self.locations
            .iter()
            .filter(|(_, p)| include_center || *p != center)
            .filter(|(_, p)| self.distance(center, p) <= radius)
            .map(|(id, _)| *id)
            .collect()
    }

    /// Chebyshev distance, wrapping on periodic grids.
    pub fn distance(&self, a: &Point<T>, b: &Point<T>) -> f64 {
        let (a, b) = (a.to_f64(), b.to_f64());
        (0..2)
            .map(|axis| self.axis_distance(axis, a[axis], b[axis]))
            .fold(0.0, f64::max)
    }

    fn axis_distance(&self, axis: usize, a: f64, b: f64) -> f64 {
        let d = (a - b).abs();
        match self.border {
            BorderKind::Strict => d,
            BorderKind::Periodic => {
                let extent = self.topology.global().extent()[axis];
                let d = d.rem_euclid(extent);
                d.min(extent - d)
            }
        }
    }

    fn within(&self, bounds: &Bounds, point: &Point<T>) -> bool {
        match self.border {
            BorderKind::Strict => bounds.contains(point),
            BorderKind::Periodic => {
                let global = self.topology.global().extent();
                let (origin, extent) = (bounds.origin(), bounds.extent());
                let p = point.to_f64();
                (0..2).all(|axis| {
                    extent[axis] >= global[axis]
                        || (p[axis] - origin[axis]).rem_euclid(global[axis]) < extent[axis]
                })
            }
        }
    }

    /// Number of agents stored, ghosts included.
    pub fn len(&self) -> usize {
        self.locations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locations.is_empty()
    }

    /// Strip of the local partition mirrored to the neighbor in
    /// `direction`. Diagonal strips are the corner where both adjacent
    /// strips overlap.
    pub fn send_buffer_bounds(&self, direction: Direction) -> Bounds {
        buffer_strip(&self.local, self.buffer, direction)
    }

    /// Delivers move packets so migrated agents land at their new points.
    /// Collective; must follow `sync_agent_status` in the same cycle.
    pub async fn sync_move<A, Net>(&mut self, rt: &mut RuntimeContext<A, Net>) -> Result<()>
    where
        A: Agent,
        Net: Communicator,
    {
        let comm = Arc::clone(rt.comm());
        let mut outgoing: BTreeMap<Rank, Vec<MovePacket<T>>> = BTreeMap::new();
        for (_, packet) in std::mem::take(&mut self.packets) {
            outgoing.entry(packet.dest).or_default().push(packet);
        }

        let received = coordinated_exchange(
            comm.as_ref(),
            &outgoing,
            tags::GRID_MOVE_SENDERS,
            tags::GRID_MOVE_PACKETS,
        )
        .await?;

        let mut placed = 0;
        for (source, packets) in received {
            for packet in packets {
                if !rt.agents().contains(&packet.id) {
                    trace!(
                        rank = self.rank,
                        source,
                        id = %packet.id,
                        "move packet for an absent agent skipped"
                    );
                    continue;
                }
                if self.buffered.remove(&packet.id) {
                    rt.agents_mut().release(&packet.id);
                }
                self.locations.insert(packet.id, packet.point);
                placed += 1;
            }
        }

        debug!(rank = self.rank, grid = %self.name, placed, "grid moves synchronized");
        Ok(())
    }

    /// Rebuilds the buffer ghosts from the neighbors' strips. Collective.
    pub async fn sync_buffer<A, Net, C, P, F>(
        &mut self,
        rt: &mut RuntimeContext<A, Net>,
        provider: &P,
        factory: &F,
    ) -> Result<()>
    where
        A: Agent,
        Net: Communicator,
        C: AgentContent,
        P: ContentProvider<A, C>,
        F: AgentFactory<A, C>,
    {
        let me = self.rank;
        let comm = Arc::clone(rt.comm());

        for id in std::mem::take(&mut self.buffered) {
            if rt.agents().is_local(&id) {
                continue;
            }
            self.locations.remove(&id);
            rt.agents_mut().release(&id);
        }

        for neighbor in self.neighbors.iter() {
            let strip = self.send_buffer_bounds(neighbor.direction);
            let cells: Vec<CellContent<T, C>> = self
                .locations
                .iter()
                .filter(|(_, p)| strip.contains(*p))
                .filter_map(|(id, p)| {
                    rt.agents().get(id).map(|agent| CellContent {
                        point: *p,
                        content: provider.provide_content(agent),
                    })
                })
                .collect();
            let tag = tags::GRID_BUFFER_SYNC.offset(neighbor.direction.opposite().index() as u32);
            send_value(comm.as_ref(), neighbor.rank, tag, &cells).await?;
        }

        let mut mirrored = 0;
        for neighbor in self.neighbors.iter() {
            let tag = tags::GRID_BUFFER_SYNC.offset(neighbor.direction.index() as u32);
            let cells: Vec<CellContent<T, C>> =
                recv_value(comm.as_ref(), neighbor.rank, tag).await?;
            for cell in cells {
                let id = cell.content.agent_id();
                if rt.agents().is_local(&id) || self.buffered.contains(&id) {
                    continue;
                }
                let owner = if id.current_rank() == me {
                    neighbor.rank
                } else {
                    id.current_rank()
                };
                let known = rt.agents().contains(&id);
                let id = rt.materialize_ghost(&cell.content, owner, factory);
                if known {
                    if let Some(agent) = rt.agents_mut().get_mut(&id) {
                        factory.update_agent(agent, &cell.content);
                        agent.id_mut().set_current_rank(owner);
                    }
                }
                self.locations.insert(id, cell.point);
                self.buffered.insert(id);
                mirrored += 1;
            }
        }

        debug!(rank = me, grid = %self.name, mirrored, "grid buffer synchronized");
        Ok(())
    }

    /// Runs one full grid cycle: status sync, moves, then buffers.
    pub async fn synchronize<A, Net, C, P, F>(
        &mut self,
        rt: &mut RuntimeContext<A, Net>,
        provider: &P,
        factory: &F,
    ) -> Result<()>
    where
        A: Agent,
        Net: Communicator,
        C: AgentContent,
        P: ContentProvider<A, C>,
        F: AgentFactory<A, C>,
    {
        rt.sync_agent_status(provider, factory).await?;
        self.retain_present(rt.agents());
        self.sync_move(rt).await?;
        self.sync_buffer(rt, provider, factory).await
    }
}

impl<A: Agent, T: Coord> Projection<A> for SharedGrid<T> {
    fn name(&self) -> &str {
        &self.name
    }

    fn contains(&self, id: &AgentId) -> bool {
        self.locations.contains_key(id)
    }

    fn exchange_partners(&self) -> BTreeSet<Rank> {
        self.neighbors.ranks()
    }

    /// Pending move packets are kept: their agents have just left.
    fn retain_present(&mut self, ctx: &AgentContext<A>) -> usize {
        let before = self.locations.len();
        self.locations.retain(|id, _| ctx.contains(id));
        self.buffered.retain(|id| ctx.contains(id));
        before - self.locations.len()
    }
}

//! Cartesian process grids and compass neighborhoods.

use crate::error::{Result, RuntimeError};
use crate::space::geometry::{Bounds, Coord, Point};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use strata_env::Rank;

/// The eight compass directions around a partition. North is the low-y
/// side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Direction {
    East,
    West,
    North,
    South,
    NorthEast,
    NorthWest,
    SouthEast,
    SouthWest,
}

impl Direction {
    /// All directions, in buffer-sync tag order.
    pub const ALL: [Direction; 8] = [
        Direction::East,
        Direction::West,
        Direction::North,
        Direction::South,
        Direction::NorthEast,
        Direction::NorthWest,
        Direction::SouthEast,
        Direction::SouthWest,
    ];

    /// Position in `ALL`.
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn opposite(self) -> Direction {
        match self {
            Direction::East => Direction::West,
            Direction::West => Direction::East,
            Direction::North => Direction::South,
            Direction::South => Direction::North,
            Direction::NorthEast => Direction::SouthWest,
            Direction::NorthWest => Direction::SouthEast,
            Direction::SouthEast => Direction::NorthWest,
            Direction::SouthWest => Direction::NorthEast,
        }
    }

    /// Step in process-grid coordinates.
    pub fn offset(self) -> [i64; 2] {
        match self {
            Direction::East => [1, 0],
            Direction::West => [-1, 0],
            Direction::North => [0, -1],
            Direction::South => [0, 1],
            Direction::NorthEast => [1, -1],
            Direction::NorthWest => [-1, -1],
            Direction::SouthEast => [1, 1],
            Direction::SouthWest => [-1, 1],
        }
    }
}

/// A neighboring partition.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    pub rank: Rank,
    pub direction: Direction,
    pub bounds: Bounds,
}

/// The neighbors of one partition. Directions without a partition (domain
/// edges of a non-periodic space) are absent.
#[derive(Debug, Clone, Default)]
pub struct Neighbors {
    slots: [Option<Neighbor>; 8],
}

impl Neighbors {
    pub fn get(&self, direction: Direction) -> Option<&Neighbor> {
        self.slots[direction.index()].as_ref()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Neighbor> + '_ {
        self.slots.iter().flatten()
    }

    /// Neighbor whose bounds contain `point`.
    pub fn find_containing<T: Coord>(&self, point: &Point<T>) -> Option<&Neighbor> {
        self.iter().find(|n| n.bounds.contains(point))
    }

    pub fn ranks(&self) -> BTreeSet<Rank> {
        self.iter().map(|n| n.rank).collect()
    }
}

/// Maps ranks onto equal tiles of a global domain.
///
/// Ranks are laid out x-fastest: `rank = y * procs_x + x`.
///
/// ```text
///   procs = [2, 2]           y
///   ┌────────┬────────┐      │
///   │ rank 0 │ rank 1 │      ▼  (North = low y)
///   ├────────┼────────┤
///   │ rank 2 │ rank 3 │
///   └────────┴────────┘
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct CartesianTopology {
    procs: [usize; 2],
    global: Bounds,
    periodic: bool,
    local_extent: [f64; 2],
}

impl CartesianTopology {
    /// Creates a 2-D topology.
    ///
    /// # Errors
    /// `IndivisibleExtent` if an axis does not split evenly, `Topology` for
    /// an empty process grid or domain.
    pub fn new(procs: [usize; 2], global: Bounds, periodic: bool) -> Result<Self> {
        let extent = global.extent();
        let mut local_extent = [0.0; 2];
        for axis in 0..2 {
            if procs[axis] == 0 {
                return Err(RuntimeError::topology(format!("no processes on axis {}", axis)));
            }
            if extent[axis] <= 0.0 {
                return Err(RuntimeError::topology(format!("empty domain on axis {}", axis)));
            }
            let share = extent[axis] / procs[axis] as f64;
            if share.fract() != 0.0 {
                return Err(RuntimeError::IndivisibleExtent {
                    axis,
                    extent: extent[axis],
                    procs: procs[axis],
                });
            }
            local_extent[axis] = share;
        }
        Ok(Self {
            procs,
            global,
            periodic,
            local_extent,
        })
    }

    /// Creates a topology from per-dimension slices (one or two entries).
    /// A 1-D layout becomes a single process row.
    pub fn from_dims(
        procs: &[usize],
        origin: &[f64],
        extent: &[f64],
        periodic: bool,
    ) -> Result<Self> {
        let dims = procs.len();
        if dims > 2 || origin.len() > 2 || extent.len() > 2 {
            return Err(RuntimeError::TooManyDimensions(dims.max(origin.len()).max(extent.len())));
        }
        if dims == 0 || origin.len() != dims || extent.len() != dims {
            return Err(RuntimeError::topology(
                "process grid, origin and extent must agree in length",
            ));
        }
        let pad = |values: &[f64], fill: f64| [values[0], values.get(1).copied().unwrap_or(fill)];
        let procs = [procs[0], procs.get(1).copied().unwrap_or(1)];
        Self::new(procs, Bounds::new(pad(origin, 0.0), pad(extent, 1.0)), periodic)
    }

    pub fn procs(&self) -> [usize; 2] {
        self.procs
    }

    /// Number of ranks the topology spans.
    pub fn size(&self) -> usize {
        self.procs[0] * self.procs[1]
    }

    pub fn global(&self) -> &Bounds {
        &self.global
    }

    pub fn is_periodic(&self) -> bool {
        self.periodic
    }

    /// Process-grid coordinates of `rank`.
    pub fn coordinates(&self, rank: Rank) -> [usize; 2] {
        [rank % self.procs[0], rank / self.procs[0]]
    }

    /// Rank at process-grid coordinates, wrapping when periodic.
    pub fn rank_at(&self, coords: [i64; 2]) -> Option<Rank> {
        let mut wrapped = [0usize; 2];
        for axis in 0..2 {
            let n = self.procs[axis] as i64;
            let c = coords[axis];
            wrapped[axis] = if (0..n).contains(&c) {
                c as usize
            } else if self.periodic {
                c.rem_euclid(n) as usize
            } else {
                return None;
            };
        }
        Some(wrapped[1] * self.procs[0] + wrapped[0])
    }

    /// Tile owned by `rank`.
    pub fn bounds_of(&self, rank: Rank) -> Bounds {
        let coords = self.coordinates(rank);
        let origin = self.global.origin();
        Bounds::new(
            [
                origin[0] + coords[0] as f64 * self.local_extent[0],
                origin[1] + coords[1] as f64 * self.local_extent[1],
            ],
            self.local_extent,
        )
    }

    /// Rank whose tile contains `point`.
    pub fn rank_containing<T: Coord>(&self, point: &Point<T>) -> Option<Rank> {
        if !self.global.contains(point) {
            return None;
        }
        let p = point.to_f64();
        let origin = self.global.origin();
        let x = ((p[0] - origin[0]) / self.local_extent[0]).floor() as i64;
        let y = ((p[1] - origin[1]) / self.local_extent[1]).floor() as i64;
        self.rank_at([x, y])
    }

    /// Neighbor of `rank` in `direction`; never `rank` itself.
    pub fn neighbor(&self, rank: Rank, direction: Direction) -> Option<Rank> {
        let coords = self.coordinates(rank);
        let step = direction.offset();
        let target = self.rank_at([coords[0] as i64 + step[0], coords[1] as i64 + step[1]])?;
        (target != rank).then_some(target)
    }

    /// All neighbors of `rank`.
    pub fn neighbors(&self, rank: Rank) -> Neighbors {
        let mut neighbors = Neighbors::default();
        for direction in Direction::ALL {
            if let Some(n) = self.neighbor(rank, direction) {
                neighbors.slots[direction.index()] = Some(Neighbor {
                    rank: n,
                    direction,
                    bounds: self.bounds_of(n),
                });
            }
        }
        neighbors
    }
}

/// Strip of `local`, `buffer` wide, that is mirrored to the neighbor in
/// `direction`. Diagonal strips are the corner where both adjacent strips
/// overlap.
pub fn buffer_strip(local: &Bounds, buffer: f64, direction: Direction) -> Bounds {
    let [ox, oy] = local.origin();
    let [ex, ey] = local.extent();
    let slab = |d: Direction| match d {
        Direction::East => Bounds::new([ox + ex - buffer, oy], [buffer, ey]),
        Direction::West => Bounds::new([ox, oy], [buffer, ey]),
        Direction::North => Bounds::new([ox, oy], [ex, buffer]),
        Direction::South => Bounds::new([ox, oy + ey - buffer], [ex, buffer]),
        _ => *local,
    };
    let (horizontal, vertical) = match direction {
        Direction::NorthEast => (Direction::East, Direction::North),
        Direction::NorthWest => (Direction::West, Direction::North),
        Direction::SouthEast => (Direction::East, Direction::South),
        Direction::SouthWest => (Direction::West, Direction::South),
        axis => return slab(axis),
    };
    slab(horizontal)
        .intersection(&slab(vertical))
        .unwrap_or_else(|| Bounds::new([ox, oy], [0.0, 0.0]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn two_by_two(periodic: bool) -> CartesianTopology {
        CartesianTopology::new([2, 2], Bounds::new([0.0, 0.0], [40.0, 60.0]), periodic).unwrap()
    }

    #[test]
    fn test_bounds_of_ranks() {
        let topo = two_by_two(false);
        assert_eq!(topo.bounds_of(0), Bounds::new([0.0, 0.0], [20.0, 30.0]));
        assert_eq!(topo.bounds_of(1), Bounds::new([20.0, 0.0], [20.0, 30.0]));
        assert_eq!(topo.bounds_of(2), Bounds::new([0.0, 30.0], [20.0, 30.0]));
        assert_eq!(topo.bounds_of(3), Bounds::new([20.0, 30.0], [20.0, 30.0]));
    }

    #[test]
    fn test_neighbors_non_periodic() {
        let topo = two_by_two(false);
        let n = topo.neighbors(0);
        assert_eq!(n.get(Direction::East).map(|n| n.rank), Some(1));
        assert_eq!(n.get(Direction::South).map(|n| n.rank), Some(2));
        assert_eq!(n.get(Direction::SouthEast).map(|n| n.rank), Some(3));
        assert!(n.get(Direction::West).is_none());
        assert!(n.get(Direction::North).is_none());
        assert!(n.get(Direction::NorthEast).is_none());
        assert_eq!(n.ranks(), BTreeSet::from([1, 2, 3]));
    }

    #[test]
    fn test_neighbors_periodic_wrap() {
        let global = Bounds::new([0.0, 0.0], [30.0, 10.0]);
        let topo = CartesianTopology::new([3, 1], global, true).unwrap();
        assert_eq!(topo.neighbor(0, Direction::West), Some(2));
        assert_eq!(topo.neighbor(2, Direction::East), Some(0));
        // A single process row never neighbors itself.
        assert_eq!(topo.neighbor(0, Direction::North), None);
        assert_eq!(topo.neighbor(0, Direction::NorthEast), Some(1));
    }

    #[test]
    fn test_indivisible_extent() {
        let global = Bounds::new([0.0, 0.0], [40.0, 10.0]);
        let err = CartesianTopology::new([3, 1], global, false).unwrap_err();
        assert!(matches!(err, RuntimeError::IndivisibleExtent { axis: 0, procs: 3, .. }));
    }

    #[test]
    fn test_from_dims() {
        let topo = CartesianTopology::from_dims(&[4], &[0.0], &[100.0], false).unwrap();
        assert_eq!(topo.procs(), [4, 1]);
        assert_eq!(topo.bounds_of(3), Bounds::new([75.0, 0.0], [25.0, 1.0]));

        let err =
            CartesianTopology::from_dims(&[2, 2, 2], &[0.0; 3], &[8.0; 3], false).unwrap_err();
        assert!(matches!(err, RuntimeError::TooManyDimensions(3)));
    }

    #[test]
    fn test_rank_containing() {
        let topo = two_by_two(false);
        assert_eq!(topo.rank_containing(&Point::new(19i64, 29)), Some(0));
        assert_eq!(topo.rank_containing(&Point::new(20i64, 29)), Some(1));
        assert_eq!(topo.rank_containing(&Point::new(25.5f64, 59.9)), Some(3));
        assert_eq!(topo.rank_containing(&Point::new(40i64, 0)), None);
    }

    #[test]
    fn test_opposites_pair_up() {
        for d in Direction::ALL {
            assert_eq!(d.opposite().opposite(), d);
            let [x, y] = d.offset();
            let [ox, oy] = d.opposite().offset();
            assert_eq!((x + ox, y + oy), (0, 0));
        }
    }

    proptest! {
        #[test]
        fn test_tiles_partition_the_domain(
            px in 1usize..5,
            py in 1usize..5,
            x in 0i64..60,
            y in 0i64..60,
        ) {
            let topo = CartesianTopology::new(
                [px, py],
                Bounds::new([0.0, 0.0], [60.0, 60.0]),
                false,
            ).unwrap();
            let point = Point::new(x, y);
            let owners: Vec<Rank> = (0..topo.size())
                .filter(|&r| topo.bounds_of(r).contains(&point))
                .collect();
            prop_assert_eq!(owners.len(), 1);
            prop_assert_eq!(topo.rank_containing(&point), Some(owners[0]));
        }

        #[test]
        fn test_neighbor_relation_is_symmetric(rank in 0usize..12, periodic in any::<bool>()) {
            let topo = CartesianTopology::new(
                [4, 3],
                Bounds::new([0.0, 0.0], [40.0, 30.0]),
                periodic,
            ).unwrap();
            for d in Direction::ALL {
                if let Some(n) = topo.neighbor(rank, d) {
                    prop_assert_eq!(topo.neighbor(n, d.opposite()), Some(rank));
                }
            }
        }
    }
}

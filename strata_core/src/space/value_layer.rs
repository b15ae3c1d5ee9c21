//! Shared value layers: one value per integer cell of a partitioned
//! domain, with a halo of neighbor cells refreshed on every
//! `synchronize`.
//!
//! Each rank stores its partition grown by the buffer width on every
//! side. Cells are addressed by global coordinates; on periodic layers a
//! coordinate across the seam reaches the mirrored halo cell.

use crate::config::GridConfig;
use crate::error::{Result, RuntimeError};
use crate::space::border::BorderKind;
use crate::space::geometry::{Bounds, Point};
use crate::space::topology::{buffer_strip, CartesianTopology, Neighbors};
use crate::tags;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::ops::Add;
use strata_env::{recv_value, send_value, Communicator, Rank};
use tracing::debug;

/// Computes a cell's next value during `diffuse`.
pub trait Diffusor<T>: Send + Sync {
    /// `block` is the 3x3 Moore block around the cell, row by row, with
    /// the cell itself at index 4. Cells outside a strict domain or beyond
    /// the halo are `None`.
    fn new_value(&self, block: &[Option<T>; 9]) -> T;
}

/// The local partition of a shared value layer.
pub struct SharedValueLayer<T> {
    name: String,
    rank: Rank,
    topology: CartesianTopology,
    local: Bounds,
    border: BorderKind,
    neighbors: Neighbors,
    buffer: i64,
    /// Lower corner of the stored area (local origin minus the buffer)
    origin: [i64; 2],
    /// Width and height of the stored area
    size: [i64; 2],
    cells: Vec<T>,
}

impl<T> SharedValueLayer<T>
where
    T: Copy + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    /// Creates the partition of `rank`, every cell holding `initial`.
    /// The buffer width is rounded down to whole cells.
    ///
    /// # Errors
    /// Whatever `GridConfig::validate` reports for `world_size`.
    pub fn new(
        name: impl Into<String>,
        config: &GridConfig,
        rank: Rank,
        world_size: usize,
        initial: T,
    ) -> Result<Self> {
        config.validate(world_size)?;
        let topology = CartesianTopology::new(
            config.process_dims,
            Bounds::new(config.origin, config.extent),
            config.periodic,
        )?;
        let local = topology.bounds_of(rank);
        let neighbors = topology.neighbors(rank);
        let buffer = config.buffer.floor() as i64;
        let [ox, oy] = local.origin();
        let [ex, ey] = local.extent();
        let origin = [ox.floor() as i64 - buffer, oy.floor() as i64 - buffer];
        let size = [ex as i64 + 2 * buffer, ey as i64 + 2 * buffer];
        let name = name.into();
        debug!(rank, layer = %name, local = %local, buffer, "value layer partition created");
        Ok(Self {
            name,
            rank,
            topology,
            local,
            border: if config.periodic {
                BorderKind::Periodic
            } else {
                BorderKind::Strict
            },
            neighbors,
            buffer,
            origin,
            size,
            cells: vec![initial; (size[0] * size[1]) as usize],
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Bounds of this rank's partition.
    pub fn local_bounds(&self) -> &Bounds {
        &self.local
    }

    /// Whether `point` is a cell this rank owns.
    pub fn is_local(&self, point: &Point<i64>) -> bool {
        self.local.contains(point)
    }

    /// Value at `point`, local or halo. `None` outside what this rank
    /// stores.
    pub fn get(&self, point: &Point<i64>) -> Option<T> {
        self.slot(point).map(|i| self.cells[i])
    }

    /// Overwrites the value at `point`. Halo cells may be written but are
    /// replaced at the next `synchronize`.
    ///
    /// # Errors
    /// `OutOfBounds` when this rank does not store `point`.
    pub fn set(&mut self, point: &Point<i64>, value: T) -> Result<()> {
        let i = self.slot_or_err(point)?;
        self.cells[i] = value;
        Ok(())
    }

    /// Adds `delta` to the value at `point` and returns the new value.
    ///
    /// # Errors
    /// `OutOfBounds` when this rank does not store `point`.
    pub fn add(&mut self, point: &Point<i64>, delta: T) -> Result<T>
    where
        T: Add<Output = T>,
    {
        let i = self.slot_or_err(point)?;
        self.cells[i] = self.cells[i] + delta;
        Ok(self.cells[i])
    }

    /// Sets every local cell to `value`.
    pub fn fill(&mut self, value: T) {
        for point in self.local_points() {
            if let Some(i) = self.slot(&point) {
                self.cells[i] = value;
            }
        }
    }

    /// Sets every halo cell to `value`.
    pub fn fill_halo(&mut self, value: T) {
        let local: Vec<usize> = self.local_points().filter_map(|p| self.slot(&p)).collect();
        let saved: Vec<T> = local.iter().map(|&i| self.cells[i]).collect();
        self.cells.iter_mut().for_each(|c| *c = value);
        for (i, v) in local.into_iter().zip(saved) {
            self.cells[i] = v;
        }
    }

    /// Local cells with their values, row by row.
    pub fn local_cells(&self) -> Vec<(Point<i64>, T)> {
        self.local_points()
            .filter_map(|p| self.get(&p).map(|v| (p, v)))
            .collect()
    }

    /// Copies every neighbor's facing strip into the halo. Collective over
    /// the ranks of the layer.
    pub async fn synchronize<Net: Communicator>(&mut self, comm: &Net) -> Result<()> {
        let buffer = self.buffer as f64;
        for neighbor in self.neighbors.iter() {
            let strip = buffer_strip(&self.local, buffer, neighbor.direction);
            let values: Vec<T> = cells_of(&strip).filter_map(|p| self.get(&p)).collect();
            let tag = tags::VALUE_LAYER_SYNC.offset(neighbor.direction.opposite().index() as u32);
            send_value(comm, neighbor.rank, tag, &values).await?;
        }

        let mut received = 0;
        for neighbor in self.neighbors.iter() {
            let tag = tags::VALUE_LAYER_SYNC.offset(neighbor.direction.index() as u32);
            let values: Vec<T> = recv_value(comm, neighbor.rank, tag).await?;
            let strip = buffer_strip(&neighbor.bounds, buffer, neighbor.direction.opposite());
            let points: Vec<Point<i64>> = cells_of(&strip).collect();
            if points.len() != values.len() {
                return Err(RuntimeError::topology(format!(
                    "layer {}: rank {} sent {} halo cells, expected {}",
                    self.name,
                    neighbor.rank,
                    values.len(),
                    points.len()
                )));
            }
            for (point, value) in points.iter().zip(values) {
                if let Some(i) = self.slot(point) {
                    self.cells[i] = value;
                    received += 1;
                }
            }
        }

        debug!(rank = self.rank, layer = %self.name, received, "value layer synchronized");
        Ok(())
    }

    /// Replaces every local cell with `diffusor`'s value for its Moore
    /// block. All new values are computed from the old ones; blocks read
    /// the halo as of the last `synchronize`.
    pub fn diffuse<D: Diffusor<T>>(&mut self, diffusor: &D) {
        let mut next = self.cells.clone();
        for point in self.local_points() {
            let mut block = [None; 9];
            for (k, slot) in block.iter_mut().enumerate() {
                let (dx, dy) = ((k % 3) as i64 - 1, (k / 3) as i64 - 1);
                *slot = self.get(&Point::new(point.x + dx, point.y + dy));
            }
            if let Some(i) = self.slot(&point) {
                next[i] = diffusor.new_value(&block);
            }
        }
        self.cells = next;
    }

    fn local_points(&self) -> impl Iterator<Item = Point<i64>> {
        cells_of(&self.local)
    }

    fn slot_or_err(&self, point: &Point<i64>) -> Result<usize> {
        self.slot(point).ok_or_else(|| {
            let stored = Bounds::new(
                [self.origin[0] as f64, self.origin[1] as f64],
                [self.size[0] as f64, self.size[1] as f64],
            );
            RuntimeError::out_of_bounds(point, stored)
        })
    }

    /// Index of the stored cell for `point`. The unshifted coordinate wins
    /// over a periodic image.
    fn slot(&self, point: &Point<i64>) -> Option<usize> {
        let point = self.border.transform(self.topology.global(), point).ok()?;
        let x = self.axis_slot(0, point.x)?;
        let y = self.axis_slot(1, point.y)?;
        Some((y * self.size[0] + x) as usize)
    }

    fn axis_slot(&self, axis: usize, coord: i64) -> Option<i64> {
        let extent = self.topology.global().extent()[axis] as i64;
        let shifts: &[i64] = match self.border {
            BorderKind::Strict => &[0],
            BorderKind::Periodic => &[0, -1, 1],
        };
        shifts
            .iter()
            .map(|s| coord + s * extent - self.origin[axis])
            .find(|rel| (0..self.size[axis]).contains(rel))
    }
}

/// Integer cells of `bounds`, row by row.
fn cells_of(bounds: &Bounds) -> impl Iterator<Item = Point<i64>> {
    let [ox, oy] = bounds.origin();
    let [ex, ey] = bounds.end();
    let (x0, x1) = (ox.ceil() as i64, ex.ceil() as i64);
    let (y0, y1) = (oy.ceil() as i64, ey.ceil() as i64);
    (y0..y1).flat_map(move |y| (x0..x1).map(move |x| Point::new(x, y)))
}

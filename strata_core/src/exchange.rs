//! Exchange Coordinator: discovers who will send to this rank.
//!
//! Every bulk exchange in the runtime is preceded by one coordinator round,
//! so receivers know exactly which peers to wait on and nobody has to keep
//! long-lived sender counts in sync.

use crate::error::{Result, RuntimeError};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use strata_env::{recv_value, send_value, Communicator, EnvError, Rank, Tag};
use tracing::trace;

/// Marks destinations for one coordinator round.
///
/// # Example
///
/// ```ignore
/// let mut coordinator = ExchangeCoordinator::new(comm.size());
/// coordinator.mark(dest);
/// let sources = coordinator.retrieve_sources(&comm, tags::GRID_MOVE_SENDERS).await?;
/// ```
#[derive(Debug, Clone)]
pub struct ExchangeCoordinator {
    marks: Vec<bool>,
}

impl ExchangeCoordinator {
    /// Creates a coordinator with no destinations marked.
    pub fn new(size: usize) -> Self {
        Self { marks: vec![false; size] }
    }

    /// Marks `rank` as a destination.
    pub fn mark(&mut self, rank: Rank) -> Result<()> {
        let size = self.marks.len();
        let slot = self
            .marks
            .get_mut(rank)
            .ok_or(EnvError::RankOutOfRange { rank, size })?;
        *slot = true;
        Ok(())
    }

    /// Returns the marked destinations.
    pub fn targets(&self) -> BTreeSet<Rank> {
        self.marks
            .iter()
            .enumerate()
            .filter_map(|(rank, &marked)| marked.then_some(rank))
            .collect()
    }

    /// Runs the all-to-all signal round and returns the ranks that marked
    /// this one.
    ///
    /// Collective: every rank must call it with the same tag, even with no
    /// destinations marked.
    pub async fn retrieve_sources<C>(&self, comm: &C, tag: Tag) -> Result<BTreeSet<Rank>>
    where
        C: Communicator + ?Sized,
    {
        if self.marks.len() != comm.size() {
            return Err(RuntimeError::topology(format!(
                "coordinator sized for {} ranks used on a communicator of {}",
                self.marks.len(),
                comm.size()
            )));
        }

        for (rank, marked) in self.marks.iter().enumerate() {
            send_value(comm, rank, tag, marked).await?;
        }

        let mut sources = BTreeSet::new();
        for rank in 0..comm.size() {
            let marked: bool = recv_value(comm, rank, tag).await?;
            if marked {
                sources.insert(rank);
            }
        }

        trace!(rank = comm.rank(), %tag, sources = sources.len(), "exchange sources retrieved");
        Ok(sources)
    }
}

/// Returns the ranks that will send to this one, given this rank's targets.
pub async fn retrieve_sources<C>(
    comm: &C,
    targets: &BTreeSet<Rank>,
    tag: Tag,
) -> Result<BTreeSet<Rank>>
where
    C: Communicator + ?Sized,
{
    let mut coordinator = ExchangeCoordinator::new(comm.size());
    for &rank in targets {
        coordinator.mark(rank)?;
    }
    coordinator.retrieve_sources(comm, tag).await
}

/// Posts every outgoing message, then waits for one message from each
/// source.
///
/// Received messages come back ordered by source rank.
pub async fn exchange<C, T>(
    comm: &C,
    outgoing: &BTreeMap<Rank, T>,
    sources: &BTreeSet<Rank>,
    tag: Tag,
) -> Result<Vec<(Rank, T)>>
where
    C: Communicator + ?Sized,
    T: Serialize + DeserializeOwned + Send + Sync,
{
    for (&rank, message) in outgoing {
        send_value(comm, rank, tag, message).await?;
    }

    let mut received = Vec::with_capacity(sources.len());
    for &rank in sources {
        let message: T = recv_value(comm, rank, tag).await?;
        received.push((rank, message));
    }
    Ok(received)
}

/// A coordinator round on `senders_tag` followed by the payload exchange on
/// `tag`.
pub async fn coordinated_exchange<C, T>(
    comm: &C,
    outgoing: &BTreeMap<Rank, T>,
    senders_tag: Tag,
    tag: Tag,
) -> Result<Vec<(Rank, T)>>
where
    C: Communicator + ?Sized,
    T: Serialize + DeserializeOwned + Send + Sync,
{
    let targets: BTreeSet<Rank> = outgoing.keys().copied().collect();
    let sources = retrieve_sources(comm, &targets, senders_tag).await?;
    exchange(comm, outgoing, &sources, tag).await
}

//! Rank-to-rank transport abstraction.

use crate::error::EnvError;
use crate::types::{Rank, Tag};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Point-to-point message passing between the ranks of one run.
///
/// # Semantics
///
/// - `send` is buffered: it returns once the message is queued and never
///   waits for the receiver to post a matching `recv`.
/// - `recv` blocks until a message from `source` carrying `tag` arrives.
///   Messages from the same source under the same tag are delivered in the
///   order they were sent; messages under other tags are held back until
///   asked for.
///
/// Together these give the "post all sends, then wait on all receives"
/// discipline every collective in the runtime relies on.
///
/// ```text
/// Rank A                   Communicator                  Rank B
///   |                           |                           |
///   |-- send(B, tag, bytes) --->|                           |
///   |                           |-- [mailbox of B] -------->|
///   |                           |                           |-- recv(A, tag) -> bytes
/// ```
#[async_trait]
pub trait Communicator: Send + Sync + 'static {
    /// Returns this process's rank.
    fn rank(&self) -> Rank;

    /// Returns the number of ranks in the communicator.
    fn size(&self) -> usize;

    /// Queues `payload` for delivery to `target` under `tag`.
    ///
    /// # Returns
    /// * `Ok(())` - Message queued
    /// * `Err(EnvError::RankOutOfRange)` - No such rank
    /// * `Err(EnvError::NetworkError)` - The target's mailbox is gone
    async fn send(&self, target: Rank, tag: Tag, payload: Vec<u8>) -> Result<(), EnvError>;

    /// Waits for the next message from `source` under `tag`.
    async fn recv(&self, source: Rank, tag: Tag) -> Result<Vec<u8>, EnvError>;
}

/// Encodes `value` and sends it.
pub async fn send_value<C, T>(comm: &C, target: Rank, tag: Tag, value: &T) -> Result<(), EnvError>
where
    C: Communicator + ?Sized,
    T: Serialize + ?Sized,
{
    let payload = serde_json::to_vec(value).map_err(EnvError::serialization)?;
    comm.send(target, tag, payload).await
}

/// Receives a message and decodes it as `T`.
pub async fn recv_value<C, T>(comm: &C, source: Rank, tag: Tag) -> Result<T, EnvError>
where
    C: Communicator + ?Sized,
    T: DeserializeOwned,
{
    let payload = comm.recv(source, tag).await?;
    serde_json::from_slice(&payload).map_err(EnvError::serialization)
}

//! In-memory implementation of `Communicator` using Tokio channels.

use crate::error::EnvError;
use crate::network::Communicator;
use crate::types::{Envelope, Rank, Tag};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};

/// Per-rank inbox plus the messages that arrived before anyone asked for
/// them.
struct Mailbox {
    rx: mpsc::UnboundedReceiver<Envelope>,
    pending: HashMap<(Rank, Tag), VecDeque<Vec<u8>>>,
}

impl Mailbox {
    fn take_pending(&mut self, source: Rank, tag: Tag) -> Option<Vec<u8>> {
        let queue = self.pending.get_mut(&(source, tag))?;
        let payload = queue.pop_front();
        if queue.is_empty() {
            self.pending.remove(&(source, tag));
        }
        payload
    }
}

/// One rank's endpoint of a `ChannelMesh`.
///
/// Every rank owns a single unbounded inbox. Sends push straight into the
/// target's inbox, so they never block; receives drain the inbox into a
/// per-(source, tag) backlog until the requested message shows up.
pub struct ChannelCommunicator {
    rank: Rank,
    peers: Arc<Vec<mpsc::UnboundedSender<Envelope>>>,
    mailbox: Mutex<Mailbox>,
    recv_timeout: Option<Duration>,
}

impl ChannelCommunicator {
    /// Returns the receive timeout, if any.
    pub fn recv_timeout(&self) -> Option<Duration> {
        self.recv_timeout
    }

    async fn next_envelope(
        &self,
        mailbox: &mut Mailbox,
        source: Rank,
        tag: Tag,
    ) -> Result<Envelope, EnvError> {
        let next = match self.recv_timeout {
            Some(limit) => tokio::time::timeout(limit, mailbox.rx.recv())
                .await
                .map_err(|_| EnvError::Timeout(limit.as_millis() as u64))?,
            None => mailbox.rx.recv().await,
        };
        next.ok_or(EnvError::ChannelClosed { source_rank: source, tag })
    }
}

#[async_trait]
impl Communicator for ChannelCommunicator {
    fn rank(&self) -> Rank {
        self.rank
    }

    fn size(&self) -> usize {
        self.peers.len()
    }

    async fn send(&self, target: Rank, tag: Tag, payload: Vec<u8>) -> Result<(), EnvError> {
        let peer = self.peers.get(target).ok_or(EnvError::RankOutOfRange {
            rank: target,
            size: self.peers.len(),
        })?;
        peer.send(Envelope::new(self.rank, tag, payload))
            .map_err(|_| EnvError::network(format!("mailbox of rank {} is closed", target)))
    }

    async fn recv(&self, source: Rank, tag: Tag) -> Result<Vec<u8>, EnvError> {
        if source >= self.peers.len() {
            return Err(EnvError::RankOutOfRange { rank: source, size: self.peers.len() });
        }

        let mut mailbox = self.mailbox.lock().await;
        loop {
            if let Some(payload) = mailbox.take_pending(source, tag) {
                return Ok(payload);
            }
            let envelope = self.next_envelope(&mut mailbox, source, tag).await?;
            if envelope.source == source && envelope.tag == tag {
                return Ok(envelope.payload);
            }
            mailbox
                .pending
                .entry((envelope.source, envelope.tag))
                .or_default()
                .push_back(envelope.payload);
        }
    }
}

/// Builder for a fully connected set of in-memory communicators.
///
/// # Example
///
/// ```ignore
/// let comms = ChannelMesh::new(4).with_recv_timeout(Duration::from_secs(5)).build();
/// for comm in comms {
///     tokio::spawn(async move { run_rank(comm).await });
/// }
/// ```
#[derive(Debug, Clone)]
pub struct ChannelMesh {
    size: usize,
    recv_timeout: Option<Duration>,
}

impl ChannelMesh {
    /// Creates a mesh description for `size` ranks.
    pub fn new(size: usize) -> Self {
        Self { size, recv_timeout: None }
    }

    /// Fails receives that wait longer than `timeout` instead of hanging.
    pub fn with_recv_timeout(mut self, timeout: Duration) -> Self {
        self.recv_timeout = Some(timeout);
        self
    }

    /// Creates one communicator per rank, ordered by rank.
    pub fn build(self) -> Vec<ChannelCommunicator> {
        let (senders, receivers): (Vec<_>, Vec<_>) =
            (0..self.size).map(|_| mpsc::unbounded_channel()).unzip();
        let peers = Arc::new(senders);

        receivers
            .into_iter()
            .enumerate()
            .map(|(rank, rx)| ChannelCommunicator {
                rank,
                peers: Arc::clone(&peers),
                mailbox: Mutex::new(Mailbox { rx, pending: HashMap::new() }),
                recv_timeout: self.recv_timeout,
            })
            .collect()
    }
}

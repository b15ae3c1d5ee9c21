//! Common types for the Strata environment abstraction.

use serde::{Deserialize, Serialize};

/// Index of a process (rank) within a communicator.
///
/// Ranks are dense: a communicator of size `n` has ranks `0..n`.
pub type Rank = usize;

/// Message tag used to match sends with receives.
///
/// Every protocol reserves its own tags so that concurrent exchanges never
/// consume each other's messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Tag(pub u32);

impl Tag {
    /// Creates a tag from its raw value.
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    /// Returns the tag offset by `n`, for tag families such as the eight
    /// buffer-sync directions.
    pub const fn offset(self, n: u32) -> Self {
        Self(self.0 + n)
    }

    /// Returns the raw tag value.
    pub fn value(&self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for Tag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "tag#{}", self.0)
    }
}

/// Envelope for a message travelling between ranks.
///
/// This is a transport-layer wrapper - the payload is opaque bytes that
/// the receiving protocol step decodes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    /// Rank that posted the message
    pub source: Rank,

    /// Tag the message was posted under
    pub tag: Tag,

    /// The encoded message body
    pub payload: Vec<u8>,
}

impl Envelope {
    /// Creates a new envelope.
    pub fn new(source: Rank, tag: Tag, payload: Vec<u8>) -> Self {
        Self { source, tag, payload }
    }

    /// Returns the payload size in bytes.
    pub fn size(&self) -> usize {
        self.payload.len()
    }
}

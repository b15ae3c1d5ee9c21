//! Strata Environment Abstraction Layer
//!
//! This crate provides the pieces of the outside world the Strata runtime
//! talks to, so the same protocol code runs over any message transport:
//! - Ranks and tags (`Rank`, `Tag`)
//! - Point-to-point messaging (`Communicator::send`, `Communicator::recv`)
//! - Per-rank determinism (`RunContext::derive_rng`)
//!
//! Payloads are encoded with `serde_json` through `send_value` and
//! `recv_value`; both ends of a tag must agree on the record type.
//!
//! # Example
//!
//! ```ignore
//! use strata_env::{ChannelMesh, Communicator, Tag, send_value, recv_value};
//!
//! async fn ping<C: Communicator>(comm: &C) -> Result<u32, EnvError> {
//!     let next = (comm.rank() + 1) % comm.size();
//!     let prev = (comm.rank() + comm.size() - 1) % comm.size();
//!     send_value(comm, next, Tag::new(1), &(comm.rank() as u32)).await?;
//!     recv_value(comm, prev, Tag::new(1)).await
//! }
//! ```

mod context;
mod error;
mod network;
mod tokio_impl;
mod types;

pub use context::RunContext;
pub use error::EnvError;
pub use network::{recv_value, send_value, Communicator};
pub use tokio_impl::{ChannelCommunicator, ChannelMesh};
pub use types::{Envelope, Rank, Tag};

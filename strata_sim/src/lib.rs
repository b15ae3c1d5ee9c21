//! Strata multi-rank simulation harness
//!
//! Runs a model on several ranks at once, each rank a tokio task with its
//! own registry, wired together by an in-memory message mesh. After every
//! tick the ranks hand a snapshot of their registries to the oracle, which
//! sees all of them and checks the global invariants no single rank can:
//! one owner per agent, ghosts that name the right owner and carry its
//! state, a conserved population.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                        SimWorld                          │
//! │   ┌─────────┐        ┌─────────┐        ┌─────────┐      │
//! │   │ rank 0  │◄──────►│ rank 1  │◄──────►│ rank 2  │ ...  │
//! │   │ Model + │  mesh  │ Model + │  mesh  │ Model + │      │
//! │   │ Runtime │        │ Runtime │        │ Runtime │      │
//! │   └────┬────┘        └────┬────┘        └────┬────┘      │
//! │        └──────────┬───────┴──────────────────┘           │
//! │             ┌─────▼─────┐                                │
//! │             │  Oracle   │  per-tick snapshots            │
//! │             └───────────┘                                │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use strata_sim::{ScenarioRunner, scenarios::ScenarioId};
//!
//! let result = ScenarioRunner::new(42, 4).with_ticks(20).run(ScenarioId::Wanderers);
//! assert!(result.passed);
//! ```

mod context;
mod error;
mod oracle;
mod runner;
mod world;
pub mod models;
pub mod scenarios;

pub use context::SimContext;
pub use error::SimError;
pub use models::{Model, StepReport};
pub use oracle::{Oracle, RankSnapshot, Violation};
pub use runner::{ScenarioMetrics, ScenarioResult, ScenarioRunner};
pub use world::{process_grid, RankEnv, SimConfig, SimWorld};

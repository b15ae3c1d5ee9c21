//! Strata Core - Distributed Agent Runtime
//!
//! Each rank owns a share of an agent population and keeps a partially
//! replicated view of the rest:
//! 1. **Ownership**: one registry per rank (`AgentContext`) holding local
//!    agents and ref-counted ghost copies
//! 2. **Replication**: agent requests, status sync and state sync through
//!    `RuntimeContext`
//! 3. **Projections**: shared grids with halo buffers and migration, and
//!    shared networks with complementary edges, and shared value layers
//!
//! ```text
//!                 ┌──────────────── RuntimeContext ────────────────┐
//!                 │  AgentContext   Importer   Exporter   moves    │
//!                 └──────▲─────────────▲──────────▲────────────────┘
//!                        │ ids + refs  │          │
//!          SharedGrid ───┘             └── SharedNetwork
//!                        │
//!                 Exchange Coordinator ──► Communicator (strata_env)
//! ```
//!
//! Every synchronization call is collective: all ranks must make it, in
//! the same order.

pub mod agent;
pub mod agent_id;
pub mod config;
pub mod context;
pub mod error;
pub mod exchange;
pub mod graph;
pub mod import_export;
pub mod projection;
pub mod request;
pub mod runtime;
pub mod space;
pub mod tags;

#[cfg(test)]
mod test_support;

// Re-export key types for convenience
pub use agent::{Agent, AgentContent, AgentFactory, ContentProvider};
pub use agent_id::AgentId;
pub use config::{GridConfig, RuntimeConfig};
pub use context::{AgentContext, Locality};
pub use error::{Result, RuntimeError};
pub use exchange::{coordinated_exchange, retrieve_sources, ExchangeCoordinator};
pub use graph::{DefaultEdgeManager, Edge, EdgeContentManager, SharedNetwork};
pub use import_export::{Exporter, Importer};
pub use projection::Projection;
pub use request::{AgentRequest, AgentStatus};
pub use runtime::RuntimeContext;
pub use space::{
    BorderKind, Bounds, CartesianTopology, Coord, Diffusor, Direction, Point, SharedContinuousSpace,
    SharedDiscreteSpace, SharedGrid, SharedValueLayer,
};

#[cfg(test)]
mod tests {
    use std::path::Path;

    fn long_lines(dir: &Path, found: &mut Vec<String>) {
        let Ok(entries) = std::fs::read_dir(dir) else {
            return;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                long_lines(&path, found);
            } else if path.extension().is_some_and(|ext| ext == "rs") {
                let text = std::fs::read_to_string(&path).unwrap();
                for (n, line) in text.lines().enumerate() {
                    if line.chars().count() > 100 {
                        found.push(format!("{}:{}", path.display(), n + 1));
                    }
                }
            }
        }
    }

    #[test]
    fn test_workspace_sources_fit_rustfmt_width() {
        let root = Path::new(env!("CARGO_MANIFEST_DIR")).join("..");
        let mut found = Vec::new();
        for krate in ["strata_env", "strata_core", "strata_sim"] {
            long_lines(&root.join(krate).join("src"), &mut found);
        }
        assert!(found.is_empty(), "lines over 100 columns: {:?}", found);
    }
}

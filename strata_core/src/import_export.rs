//! Bookkeeping of which ghosts a rank imports and which locals it exports.

use crate::agent_id::AgentId;
use crate::request::AgentStatus;
use std::collections::{BTreeMap, BTreeSet};
use strata_env::Rank;

/// Ghosts this rank imported, keyed by the rank exporting them.
#[derive(Debug, Clone, Default)]
pub struct Importer {
    sources: BTreeMap<Rank, BTreeSet<AgentId>>,
}

impl Importer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `id` as imported from `source`. Returns `false` if it was
    /// already imported.
    pub fn register(&mut self, id: AgentId, source: Rank) -> bool {
        if self.is_imported(&id) {
            return false;
        }
        self.sources.entry(source).or_default().insert(id);
        true
    }

    /// Forgets `id`, returning the rank it was imported from.
    pub fn unregister(&mut self, id: &AgentId) -> Option<Rank> {
        let source = self.source_of(id)?;
        if let Some(ids) = self.sources.get_mut(&source) {
            ids.remove(id);
            if ids.is_empty() {
                self.sources.remove(&source);
            }
        }
        Some(source)
    }

    /// Re-files a migrated import under its new owner. Nothing is kept when
    /// the new owner is `me`: the agent is about to become local.
    pub fn imported_agent_moved(&mut self, id: &AgentId, new_owner: Rank, me: Rank) {
        if self.unregister(id).is_some() && new_owner != me {
            self.register(*id, new_owner);
        }
    }

    pub fn is_imported(&self, id: &AgentId) -> bool {
        self.sources.values().any(|ids| ids.contains(id))
    }

    pub fn source_of(&self, id: &AgentId) -> Option<Rank> {
        self.sources
            .iter()
            .find_map(|(rank, ids)| ids.contains(id).then_some(*rank))
    }

    /// Ranks currently exporting to this one.
    pub fn exporting_ranks(&self) -> BTreeSet<Rank> {
        self.sources.keys().copied().collect()
    }

    /// Number of imported ids.
    pub fn len(&self) -> usize {
        self.sources.values().map(BTreeSet::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

/// Locals this rank exports, keyed by importing rank, plus the status
/// changes those importers have not been told about yet.
#[derive(Debug, Clone, Default)]
pub struct Exporter {
    exported: BTreeMap<Rank, BTreeSet<AgentId>>,
    statuses: BTreeMap<Rank, Vec<AgentStatus>>,
}

impl Exporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts exporting `id` to `importer`. Returns `false` if it already was.
    pub fn add_exported(&mut self, importer: Rank, id: AgentId) -> bool {
        self.exported.entry(importer).or_default().insert(id)
    }

    /// Stops exporting `id` to `importer`. Returns `false` if it was not.
    pub fn remove_exported(&mut self, importer: Rank, id: &AgentId) -> bool {
        let Some(ids) = self.exported.get_mut(&importer) else {
            return false;
        };
        let removed = ids.remove(id);
        if ids.is_empty() {
            self.exported.remove(&importer);
        }
        removed
    }

    /// Ranks that import `id`.
    pub fn importers_of(&self, id: &AgentId) -> Vec<Rank> {
        self.exported
            .iter()
            .filter_map(|(rank, ids)| ids.contains(id).then_some(*rank))
            .collect()
    }

    pub fn is_exported(&self, id: &AgentId) -> bool {
        self.exported.values().any(|ids| ids.contains(id))
    }

    /// Stops every export of a deleted agent and queues REMOVED statuses.
    pub fn agent_removed(&mut self, id: &AgentId) {
        for importer in self.importers_of(id) {
            self.remove_exported(importer, id);
            self.statuses
                .entry(importer)
                .or_default()
                .push(AgentStatus::Removed(*id));
        }
    }

    /// Stops every export of a migrating agent and queues MOVED statuses.
    ///
    /// Returns the importers, which the new owner has to start exporting
    /// to.
    pub fn agent_moved(&mut self, old: AgentId, new: AgentId) -> Vec<Rank> {
        let importers = self.importers_of(&old);
        for &importer in &importers {
            self.remove_exported(importer, &old);
            self.statuses
                .entry(importer)
                .or_default()
                .push(AgentStatus::Moved { old, new });
        }
        importers
    }

    /// Turns queued MOVED statuses for `id` into REMOVED ones, for an agent
    /// deleted before its migration was shipped.
    pub fn retract_move(&mut self, id: &AgentId) {
        for statuses in self.statuses.values_mut() {
            for status in statuses.iter_mut() {
                if matches!(status, AgentStatus::Moved { old, .. } if old == id) {
                    *status = AgentStatus::Removed(*id);
                }
            }
        }
    }

    /// Pending statuses per importer, clearing the queue.
    pub fn take_statuses(&mut self) -> BTreeMap<Rank, Vec<AgentStatus>> {
        std::mem::take(&mut self.statuses)
    }

    /// Exported ids per importing rank.
    pub fn exported(&self) -> &BTreeMap<Rank, BTreeSet<AgentId>> {
        &self.exported
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_importer_register_once() {
        let mut importer = Importer::new();
        let id = AgentId::new(1, 2, 0);
        assert!(importer.register(id, 2));
        assert!(!importer.register(id, 3));
        assert_eq!(importer.source_of(&id), Some(2));
        assert_eq!(importer.len(), 1);
    }

    #[test]
    fn test_importer_moved() {
        let mut importer = Importer::new();
        let id = AgentId::new(1, 2, 0);
        importer.register(id, 2);

        importer.imported_agent_moved(&id, 3, 0);
        assert_eq!(importer.source_of(&id), Some(3));
        assert_eq!(importer.exporting_ranks(), BTreeSet::from([3]));

        // Moving to ourselves ends the import.
        importer.imported_agent_moved(&id, 0, 0);
        assert!(!importer.is_imported(&id));
        assert!(importer.is_empty());
    }

    #[test]
    fn test_exporter_removed_queues_statuses() {
        let mut exporter = Exporter::new();
        let id = AgentId::new(1, 0, 0);
        exporter.add_exported(1, id);
        exporter.add_exported(2, id);

        exporter.agent_removed(&id);
        assert!(!exporter.is_exported(&id));
        let statuses = exporter.take_statuses();
        assert_eq!(statuses[&1], vec![AgentStatus::Removed(id)]);
        assert_eq!(statuses[&2], vec![AgentStatus::Removed(id)]);
        assert!(exporter.take_statuses().is_empty());
    }

    #[test]
    fn test_exporter_moved_returns_importers() {
        let mut exporter = Exporter::new();
        let old = AgentId::new(1, 0, 0);
        let new = old.owned_by(3);
        exporter.add_exported(1, old);
        exporter.add_exported(2, AgentId::new(5, 0, 0));

        assert_eq!(exporter.agent_moved(old, new), vec![1]);
        assert_eq!(exporter.exported().len(), 1);
        let statuses = exporter.take_statuses();
        assert_eq!(statuses[&1], vec![AgentStatus::Moved { old, new }]);
    }

    #[test]
    fn test_exporter_retract_move() {
        let mut exporter = Exporter::new();
        let old = AgentId::new(1, 0, 0);
        exporter.add_exported(1, old);
        exporter.agent_moved(old, old.owned_by(2));

        exporter.retract_move(&old);
        assert_eq!(exporter.take_statuses()[&1], vec![AgentStatus::Removed(old)]);
    }

    #[test]
    fn test_exporter_remove_unknown() {
        let mut exporter = Exporter::new();
        assert!(!exporter.remove_exported(4, &AgentId::new(1, 0, 0)));
        exporter.agent_removed(&AgentId::new(1, 0, 0));
        assert!(exporter.take_statuses().is_empty());
    }
}

//! Reserved message tags.
//!
//! Each collective uses one tag for its Exchange Coordinator round and one
//! for its payload. Tags must be unique across the whole runtime.

use strata_env::Tag;

pub const AGENT_REQUEST_SENDERS: Tag = Tag::new(1000);
pub const AGENT_REQUEST: Tag = Tag::new(1001);
pub const AGENT_CONTENT: Tag = Tag::new(1002);

pub const AGENT_STATUS_SENDERS: Tag = Tag::new(1010);
pub const AGENT_STATUS: Tag = Tag::new(1011);

pub const EXPORTER_UPDATE_SENDERS: Tag = Tag::new(1020);
pub const EXPORTER_UPDATE: Tag = Tag::new(1021);

pub const AGENT_MOVED_SENDERS: Tag = Tag::new(1030);
pub const AGENT_MOVED: Tag = Tag::new(1031);

pub const AGENT_STATE_SENDERS: Tag = Tag::new(1040);
pub const AGENT_STATE: Tag = Tag::new(1041);

pub const NET_EXPORT_SENDERS: Tag = Tag::new(2000);
pub const NET_EXPORT_REQUESTS: Tag = Tag::new(2001);
pub const NET_EDGE_SENDERS: Tag = Tag::new(2002);
pub const NET_EDGE_UPDATE: Tag = Tag::new(2003);
pub const NET_EDGE_SYNC_SENDERS: Tag = Tag::new(2004);
pub const NET_EDGE_SYNC: Tag = Tag::new(2005);
pub const NET_EDGE_REMOVE_SENDERS: Tag = Tag::new(2006);
pub const NET_EDGE_REMOVE_SYNC: Tag = Tag::new(2007);

/// First of the eight buffer-sync tags, one per compass direction.
pub const GRID_BUFFER_SYNC: Tag = Tag::new(3000);
pub const GRID_MOVE_SENDERS: Tag = Tag::new(3100);
pub const GRID_MOVE_PACKETS: Tag = Tag::new(3101);

/// First of the eight value-layer halo tags, one per compass direction.
pub const VALUE_LAYER_SYNC: Tag = Tag::new(3200);

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    #[test]
    fn test_tags_do_not_collide() {
        let mut tags = vec![
            AGENT_REQUEST_SENDERS,
            AGENT_REQUEST,
            AGENT_CONTENT,
            AGENT_STATUS_SENDERS,
            AGENT_STATUS,
            EXPORTER_UPDATE_SENDERS,
            EXPORTER_UPDATE,
            AGENT_MOVED_SENDERS,
            AGENT_MOVED,
            AGENT_STATE_SENDERS,
            AGENT_STATE,
            NET_EXPORT_SENDERS,
            NET_EXPORT_REQUESTS,
            NET_EDGE_SENDERS,
            NET_EDGE_UPDATE,
            NET_EDGE_SYNC_SENDERS,
            NET_EDGE_SYNC,
            NET_EDGE_REMOVE_SENDERS,
            NET_EDGE_REMOVE_SYNC,
            GRID_MOVE_SENDERS,
            GRID_MOVE_PACKETS,
        ];
        tags.extend((0..8).map(|i| GRID_BUFFER_SYNC.offset(i)));
        tags.extend((0..8).map(|i| VALUE_LAYER_SYNC.offset(i)));

        let unique: BTreeSet<_> = tags.iter().copied().collect();
        assert_eq!(unique.len(), tags.len());
    }
}

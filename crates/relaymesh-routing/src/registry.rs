//! Registry of known peers
//!
//! The [`PeerRegistry`] maps node ids to their [`NodeRecord`]. It is shared
//! between the registration handler and every concurrent fan-out, so all
//! operations take `&self`.
//!
//! Entries are permanent for the lifetime of the process: there is no
//! eviction and no liveness tracking.

use dashmap::DashMap;
use relaymesh_core::{NodeId, NodeRecord};
use tracing::debug;

/// Concurrent peer registry
#[derive(Debug, Default)]
pub struct PeerRegistry {
    /// Records indexed by node id
    peers: DashMap<NodeId, NodeRecord>,
}

impl PeerRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            peers: DashMap::new(),
        }
    }

    /// Insert or replace a peer record
    ///
    /// Last write wins on the same id. The public key and reachability are
    /// not checked here. Returns `true` if the id was not known before.
    pub fn register(&self, record: NodeRecord) -> bool {
        let id = record.id.clone();
        let previous = self.peers.insert(id.clone(), record);
        debug!(
            peer = %id.short_id(),
            replaced = previous.is_some(),
            "Registered peer"
        );
        previous.is_none()
    }

    /// Get a peer record by id
    pub fn get(&self, id: &NodeId) -> Option<NodeRecord> {
        self.peers.get(id).map(|entry| entry.value().clone())
    }

    /// Snapshot of all known peers
    ///
    /// Order is unspecified.
    pub fn list(&self) -> Vec<NodeRecord> {
        self.peers.iter().map(|entry| entry.value().clone()).collect()
    }

    /// Check if a peer is known
    pub fn contains(&self, id: &NodeId) -> bool {
        self.peers.contains_key(id)
    }

    /// Get the number of known peers
    pub fn len(&self) -> usize {
        self.peers.len()
    }

    /// Check if the registry is empty
    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}

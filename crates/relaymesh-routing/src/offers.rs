//! Store of received connection offers
//!
//! Keeps only the most recent [`ConnectOffer`] per source node. A newer offer
//! from the same source replaces the previous one.

use dashmap::DashMap;
use relaymesh_core::{ConnectOffer, NodeId};

/// Latest connection offer per source, last write wins
#[derive(Debug, Default)]
pub struct OfferStore {
    offers: DashMap<NodeId, ConnectOffer>,
}

impl OfferStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self {
            offers: DashMap::new(),
        }
    }

    /// Store an offer under its source id, replacing any previous one
    pub fn store(&self, offer: ConnectOffer) {
        self.offers.insert(offer.source_id.clone(), offer);
    }

    /// Get the latest offer from a source
    pub fn get(&self, source: &NodeId) -> Option<ConnectOffer> {
        self.offers.get(source).map(|entry| entry.value().clone())
    }

    /// Number of sources with a stored offer
    pub fn len(&self) -> usize {
        self.offers.len()
    }

    /// Check if no offers are stored
    pub fn is_empty(&self) -> bool {
        self.offers.is_empty()
    }
}

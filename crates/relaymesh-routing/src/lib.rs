//! # Relaymesh Routing
//!
//! Routing layer for the Relaymesh overlay.
//!
//! This crate decides what happens to every inbound envelope and carries out
//! the resulting network work. Routing is bounded flooding: no topology
//! knowledge, no routing tables, just a hop budget.
//!
//! ## Core Components
//!
//! - [`PeerRegistry`]: known peers, keyed by node id, last write wins
//! - [`OfferStore`]: most recent connection offer per source
//! - [`RelayEngine`]: the deliver-or-forward decision and the fan-out
//! - [`BootstrapClient`]: registers this node with the configured seeds
//!
//! ## Relay Algorithm
//!
//! For each inbound envelope:
//!
//! 1. **EXPIRED**: `ttl <= 0`, drop silently
//! 2. **DELIVER**: destination is the local node, hand to the local handler
//! 3. **FORWARD**: decrement `ttl` by one, send to every known peer concurrently
//!
//! Flooding is not deduplicated. An envelope can reach a node several times
//! through different paths until its budget runs out, and dense topologies
//! amplify traffic accordingly.
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use relaymesh_routing::{PeerRegistry, OfferStore, RelayEngine, RelayConfig, Disposition};
//!
//! let engine = RelayEngine::new(local_record, registry, offers, transport, RelayConfig::default());
//!
//! match engine.handle(envelope) {
//!     Disposition::Expired => { /* dropped */ }
//!     Disposition::Delivered(kind) => { /* handled locally */ }
//!     Disposition::Forwarding(fanout) => {
//!         let report = fanout.await;
//!     }
//! }
//! ```

pub mod bootstrap;
pub mod engine;
pub mod error;
pub mod link;
pub mod offers;
pub mod registry;

// Re-export main types
pub use bootstrap::{BootstrapClient, BootstrapConfig, BootstrapReport};
pub use engine::{Delivery, Disposition, FanoutHandle, FanoutReport, RelayConfig, RelayEngine};
pub use error::{RoutingError, RoutingResult};
pub use offers::OfferStore;
pub use registry::PeerRegistry;

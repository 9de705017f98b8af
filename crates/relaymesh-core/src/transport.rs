//! Outbound transport abstraction
//!
//! The [`PeerTransport`] trait is everything the relay engine and the
//! bootstrap client need from the network: post an envelope to a peer,
//! register a record with a peer, and fetch a peer's known-peer list.
//!
//! ## Implementations
//!
//! - [`MockTransport`](crate::MockTransport): in-memory recorder for tests (in this crate)
//! - `HttpTransport`: JSON over HTTP(S) (in relaymesh-node)

use async_trait::async_trait;

use crate::envelope::Envelope;
use crate::error::TransportError;
use crate::record::NodeRecord;

/// Transport trait for talking to other overlay nodes
///
/// Every method addresses a peer by its base URL. Implementations should
/// bound each call with a timeout; the engine applies its own as well.
#[async_trait]
pub trait PeerTransport: Send + Sync + 'static {
    /// Deliver an envelope to the node at `address`
    ///
    /// # Errors
    ///
    /// Returns an error if the peer cannot be reached or rejects the request.
    async fn send_envelope(&self, address: &str, envelope: &Envelope) -> Result<(), TransportError>;

    /// Register `record` with the node at `address`
    async fn register(&self, address: &str, record: &NodeRecord) -> Result<(), TransportError>;

    /// Fetch the peer list known to the node at `address`
    async fn fetch_peers(&self, address: &str) -> Result<Vec<NodeRecord>, TransportError>;
}

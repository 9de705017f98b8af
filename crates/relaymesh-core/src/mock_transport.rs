//! Mock transport implementation for testing
//!
//! Records every outbound call in memory and lets tests make individual
//! addresses fail or respond slowly, without opening sockets.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use relaymesh_core::{MockTransport, PeerTransport};
//!
//! let transport = MockTransport::new();
//! transport.fail_address("http://down:1");
//!
//! transport.send_envelope("http://up:1", &envelope).await?;
//! assert_eq!(transport.sent_to("http://up:1").len(), 1);
//! ```

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use tokio::sync::Mutex;

use crate::envelope::Envelope;
use crate::error::TransportError;
use crate::record::NodeRecord;
use crate::transport::PeerTransport;

/// An envelope captured by the mock transport
#[derive(Debug, Clone)]
pub struct SentEnvelope {
    /// Address the envelope was sent to
    pub address: String,
    /// The envelope as sent
    pub envelope: Envelope,
}

/// A registration captured by the mock transport
#[derive(Debug, Clone)]
pub struct SentRegistration {
    /// Address the registration was sent to
    pub address: String,
    /// The registered record
    pub record: NodeRecord,
}

/// In-memory recording transport
///
/// Cloning shares the recorded state.
#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    envelopes: Arc<Mutex<Vec<SentEnvelope>>>,
    registrations: Arc<Mutex<Vec<SentRegistration>>>,
    failing: Arc<DashSet<String>>,
    delays: Arc<DashMap<String, Duration>>,
    peer_lists: Arc<DashMap<String, Vec<NodeRecord>>>,
}

impl MockTransport {
    /// Create an empty mock transport
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call to `address` fail as unreachable
    pub fn fail_address(&self, address: impl Into<String>) {
        self.failing.insert(address.into());
    }

    /// Delay every call to `address` by `delay`
    pub fn delay_address(&self, address: impl Into<String>, delay: Duration) {
        self.delays.insert(address.into(), delay);
    }

    /// Set the peer list returned by `fetch_peers` for `address`
    pub fn set_peer_list(&self, address: impl Into<String>, peers: Vec<NodeRecord>) {
        self.peer_lists.insert(address.into(), peers);
    }

    /// All envelopes sent so far, in completion order
    pub async fn sent(&self) -> Vec<SentEnvelope> {
        self.envelopes.lock().await.clone()
    }

    /// Envelopes sent to a specific address, in completion order
    pub async fn sent_to(&self, address: &str) -> Vec<Envelope> {
        self.envelopes
            .lock()
            .await
            .iter()
            .filter(|s| s.address == address)
            .map(|s| s.envelope.clone())
            .collect()
    }

    /// All registrations sent so far
    pub async fn registrations(&self) -> Vec<SentRegistration> {
        self.registrations.lock().await.clone()
    }

    async fn gate(&self, address: &str) -> Result<(), TransportError> {
        let delay = self.delays.get(address).map(|d| *d.value());
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.contains(address) {
            return Err(TransportError::Unreachable {
                address: address.to_string(),
                reason: "connection refused".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl PeerTransport for MockTransport {
    async fn send_envelope(&self, address: &str, envelope: &Envelope) -> Result<(), TransportError> {
        self.gate(address).await?;
        self.envelopes.lock().await.push(SentEnvelope {
            address: address.to_string(),
            envelope: envelope.clone(),
        });
        Ok(())
    }

    async fn register(&self, address: &str, record: &NodeRecord) -> Result<(), TransportError> {
        self.gate(address).await?;
        self.registrations.lock().await.push(SentRegistration {
            address: address.to_string(),
            record: record.clone(),
        });
        Ok(())
    }

    async fn fetch_peers(&self, address: &str) -> Result<Vec<NodeRecord>, TransportError> {
        self.gate(address).await?;
        Ok(self
            .peer_lists
            .get(address)
            .map(|p| p.value().clone())
            .unwrap_or_default())
    }
}

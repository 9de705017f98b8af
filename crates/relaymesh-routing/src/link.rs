//! Per-peer outbound links
//!
//! Each peer gets one bounded queue and one worker task. The worker sends
//! queued envelopes one at a time, so envelopes reach a given peer in the
//! order they were enqueued. Different peers have different workers and
//! progress independently: a slow or unreachable peer only delays its own
//! queue.
//!
//! Enqueueing never waits. A full queue is reported back as a failed send for
//! that peer.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use relaymesh_core::{Envelope, NodeId, NodeRecord, PeerTransport, TransportError};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, trace};

/// Result of one send, reported back to the fan-out that queued it
pub type SendReceipt = oneshot::Receiver<Result<(), TransportError>>;

/// A queued outbound envelope
struct Outbound {
    /// Peer address at the time of enqueueing
    address: String,
    envelope: Envelope,
    reply: oneshot::Sender<Result<(), TransportError>>,
}

/// The set of outbound links, one per peer id
pub struct LinkSet<T: PeerTransport> {
    links: DashMap<NodeId, mpsc::Sender<Outbound>>,
    transport: Arc<T>,
    capacity: usize,
    send_timeout: Duration,
}

impl<T: PeerTransport> LinkSet<T> {
    /// Create an empty link set
    ///
    /// # Arguments
    /// * `transport` - Transport used by every link worker
    /// * `capacity` - Queue depth per peer
    /// * `send_timeout` - Upper bound on each individual send
    pub fn new(transport: Arc<T>, capacity: usize, send_timeout: Duration) -> Self {
        Self {
            links: DashMap::new(),
            transport,
            capacity: capacity.max(1),
            send_timeout,
        }
    }

    /// Queue an envelope for a peer
    ///
    /// Creates the peer's link on first use. Must be called from within a
    /// Tokio runtime.
    pub fn enqueue(&self, peer: &NodeRecord, envelope: Envelope) -> Result<SendReceipt, TransportError> {
        let (reply, receipt) = oneshot::channel();
        let outbound = Outbound {
            address: peer.base_url().to_string(),
            envelope,
            reply,
        };

        match self.sender_for(&peer.id).try_send(outbound) {
            Ok(()) => Ok(receipt),
            Err(mpsc::error::TrySendError::Full(_)) => {
                Err(TransportError::QueueFull(peer.id.short_id().to_string()))
            }
            Err(mpsc::error::TrySendError::Closed(outbound)) => {
                // Worker is gone; replace the link and try once more
                self.links.remove(&peer.id);
                self.sender_for(&peer.id)
                    .try_send(outbound)
                    .map(|()| receipt)
                    .map_err(|_| TransportError::LinkClosed(peer.id.short_id().to_string()))
            }
        }
    }

    /// Number of open links
    pub fn len(&self) -> usize {
        self.links.len()
    }

    /// Check if no links are open
    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    fn sender_for(&self, peer: &NodeId) -> mpsc::Sender<Outbound> {
        self.links
            .entry(peer.clone())
            .or_insert_with(|| {
                let (tx, rx) = mpsc::channel(self.capacity);
                debug!(peer = %peer.short_id(), "Opening outbound link");
                tokio::spawn(run_link(
                    peer.clone(),
                    rx,
                    Arc::clone(&self.transport),
                    self.send_timeout,
                ));
                tx
            })
            .clone()
    }
}

/// Worker loop for one peer; ends when the link set is dropped
async fn run_link<T: PeerTransport>(
    peer: NodeId,
    mut rx: mpsc::Receiver<Outbound>,
    transport: Arc<T>,
    send_timeout: Duration,
) {
    while let Some(outbound) = rx.recv().await {
        let result = match tokio::time::timeout(
            send_timeout,
            transport.send_envelope(&outbound.address, &outbound.envelope),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout(outbound.address.clone())),
        };
        trace!(peer = %peer.short_id(), ok = result.is_ok(), "Link send finished");
        // The fan-out may have stopped listening; that is fine
        let _ = outbound.reply.send(result);
    }
    debug!(peer = %peer.short_id(), "Outbound link closed");
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use relaymesh_core::{ContentPacket, MockTransport, Relayable};

    use super::*;

    fn peer(id: &str) -> NodeRecord {
        NodeRecord {
            id: NodeId::new(id),
            display_name: id.to_string(),
            exposed: true,
            address: format!("http://{id}:1/"),
            created_at: Utc::now(),
            public_key: String::new(),
            ttl: 1,
        }
    }

    fn packet(ttl: i64) -> Envelope {
        ContentPacket::new(NodeId::new("a"), NodeId::new("z"), "p", vec![], ttl).into()
    }

    #[tokio::test]
    async fn test_preserves_order_per_peer() {
        let transport = Arc::new(MockTransport::new());
        let links = LinkSet::new(Arc::clone(&transport), 16, Duration::from_secs(1));
        let b = peer("b");

        let mut receipts = Vec::new();
        for ttl in 1..=10 {
            receipts.push(links.enqueue(&b, packet(ttl)).unwrap());
        }
        for receipt in receipts {
            receipt.await.unwrap().unwrap();
        }

        let ttls: Vec<i64> = transport
            .sent_to("http://b:1")
            .await
            .iter()
            .map(|e| e.ttl())
            .collect();
        assert_eq!(ttls, (1..=10).collect::<Vec<_>>());
        assert_eq!(links.len(), 1);
    }

    #[tokio::test]
    async fn test_timeout_reported() {
        let transport = Arc::new(MockTransport::new());
        transport.delay_address("http://slow:1", Duration::from_millis(200));
        let links = LinkSet::new(Arc::clone(&transport), 4, Duration::from_millis(20));

        let receipt = tokio_test::assert_ok!(links.enqueue(&peer("slow"), packet(1)));
        let err = tokio_test::assert_err!(receipt.await.unwrap());
        assert!(matches!(err, TransportError::Timeout(_)));
    }

    #[tokio::test]
    async fn test_full_queue_rejected() {
        let transport = Arc::new(MockTransport::new());
        transport.delay_address("http://slow:1", Duration::from_millis(200));
        let links = LinkSet::new(Arc::clone(&transport), 1, Duration::from_secs(1));
        let slow = peer("slow");

        let mut full = false;
        for _ in 0..5 {
            if let Err(TransportError::QueueFull(_)) = links.enqueue(&slow, packet(1)) {
                full = true;
            }
        }
        assert!(full);
    }
}

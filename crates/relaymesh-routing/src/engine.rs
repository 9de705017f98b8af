//! Flood-forwarding relay engine
//!
//! The [`RelayEngine`] makes the deliver-or-forward decision for every
//! inbound envelope and drives the resulting fan-out.
//!
//! ## Relay Algorithm
//!
//! 1. **EXPIRED**: `ttl <= 0` on arrival, drop with no side effect
//! 2. **DELIVER**: destination is the local node, run the local handler
//! 3. **FORWARD**: decrement `ttl` by exactly one and send once to every
//!    known peer, concurrently
//!
//! A failed send to one peer never stops the others and is never retried.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, ready};
use std::time::Duration;

use futures::future::join_all;
use relaymesh_core::{
    ConnectOffer, ConnectResponse, ContentPacket, Envelope, EnvelopeKind, NodeId, NodeRecord,
    PeerTransport, Relayable, TransportError, Ttl,
};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::error::{RoutingError, RoutingResult};
use crate::link::LinkSet;
use crate::offers::OfferStore;
use crate::registry::PeerRegistry;

/// Configuration for the relay engine
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Starting hop budget for envelopes this node originates
    pub default_ttl: Ttl,
    /// Upper bound on each outbound send
    pub send_timeout: Duration,
    /// Queue depth of each per-peer link
    pub link_queue_capacity: usize,
    /// Capacity of the local delivery broadcast channel
    pub delivery_channel_capacity: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            default_ttl: 8,
            send_timeout: Duration::from_secs(5),
            link_queue_capacity: 256,
            delivery_channel_capacity: 1024,
        }
    }
}

impl RelayConfig {
    /// Set the starting hop budget
    pub fn with_default_ttl(mut self, ttl: Ttl) -> Self {
        self.default_ttl = ttl;
        self
    }

    /// Set the per-send timeout
    pub fn with_send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout = timeout;
        self
    }

    /// Set the per-peer queue depth
    pub fn with_link_queue_capacity(mut self, capacity: usize) -> Self {
        self.link_queue_capacity = capacity;
        self
    }

    /// Reject budgets and limits that would make relaying meaningless
    pub fn validate(&self) -> RoutingResult<()> {
        if self.default_ttl < 1 {
            return Err(RoutingError::InvalidTtl(self.default_ttl));
        }
        if self.send_timeout.is_zero() {
            return Err(RoutingError::InvalidTimeout("send timeout is zero".to_string()));
        }
        if self.link_queue_capacity == 0 {
            return Err(RoutingError::InvalidQueueCapacity(0));
        }
        Ok(())
    }
}

/// An envelope handed to the local node
#[derive(Debug, Clone)]
pub enum Delivery {
    /// Content addressed to us
    Packet(ContentPacket),
    /// Connection offer addressed to us (also stored in the [`OfferStore`])
    Offer(ConnectOffer),
    /// Answer to one of our offers
    Answer(ConnectResponse),
}

/// Outcome of handling one envelope
#[derive(Debug)]
pub enum Disposition {
    /// Hop budget exhausted, dropped
    Expired,
    /// Delivered to the local node
    Delivered(EnvelopeKind),
    /// Being forwarded; await the handle for per-peer results
    Forwarding(FanoutHandle),
}

impl Disposition {
    /// Whether the envelope was dropped as expired
    pub fn is_expired(&self) -> bool {
        matches!(self, Disposition::Expired)
    }

    /// Whether the envelope was delivered locally
    pub fn is_delivered(&self) -> bool {
        matches!(self, Disposition::Delivered(_))
    }

    /// The fan-out handle, if the envelope is being forwarded
    pub fn into_fanout(self) -> Option<FanoutHandle> {
        match self {
            Disposition::Forwarding(handle) => Some(handle),
            _ => None,
        }
    }
}

/// Per-peer results of one fan-out
#[derive(Debug, Clone, Default)]
pub struct FanoutReport {
    /// Kind of the forwarded envelope
    pub kind: Option<EnvelopeKind>,
    /// Peers that accepted the envelope
    pub delivered: Vec<NodeId>,
    /// Peers that could not be reached, with the reason
    pub failed: Vec<(NodeId, TransportError)>,
}

impl FanoutReport {
    /// Number of peers the fan-out targeted
    pub fn attempted(&self) -> usize {
        self.delivered.len() + self.failed.len()
    }

    /// Whether every targeted peer accepted the envelope
    pub fn all_delivered(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Per-peer outcomes reported by the fan-out task
type SendResults = Vec<(NodeId, Result<(), TransportError>)>;

/// Handle to an in-flight fan-out
///
/// The fan-out runs whether or not the handle is awaited. Peers that could
/// not be queued are held here, so they are reported even if the fan-out
/// task dies.
#[derive(Debug)]
pub struct FanoutHandle {
    kind: EnvelopeKind,
    /// Peers whose queue refused the envelope
    rejected: Vec<(NodeId, TransportError)>,
    /// Peers handed to the fan-out task
    queued: Vec<NodeId>,
    task: JoinHandle<SendResults>,
}

impl Future for FanoutHandle {
    type Output = FanoutReport;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let results = match ready!(Pin::new(&mut this.task).poll(cx)) {
            Ok(results) => results,
            Err(e) => {
                warn!(kind = %this.kind, peers = this.queued.len(), error = %e, "Fan-out task failed");
                this.queued
                    .iter()
                    .map(|peer| (peer.clone(), Err(TransportError::LinkClosed(peer.short_id().to_string()))))
                    .collect()
            }
        };

        let mut report = FanoutReport {
            kind: Some(this.kind),
            delivered: Vec::new(),
            failed: std::mem::take(&mut this.rejected),
        };
        for (peer, result) in results {
            match result {
                Ok(()) => report.delivered.push(peer),
                Err(e) => report.failed.push((peer, e)),
            }
        }

        debug!(
            kind = %this.kind,
            delivered = report.delivered.len(),
            failed = report.failed.len(),
            "Fan-out finished"
        );
        Poll::Ready(report)
    }
}

/// Flood-forwarding relay engine
///
/// Owns the local node record and the per-peer links; shares the registry
/// and offer store with the HTTP boundary.
pub struct RelayEngine<T: PeerTransport> {
    /// Our own record
    local: NodeRecord,
    /// Known peers
    registry: Arc<PeerRegistry>,
    /// Offers delivered to us
    offers: Arc<OfferStore>,
    /// One outbound queue per peer
    links: LinkSet<T>,
    /// Engine configuration
    config: RelayConfig,
    /// Local delivery notifications
    deliveries: broadcast::Sender<Delivery>,
}

impl<T: PeerTransport> RelayEngine<T> {
    /// Create a new relay engine
    ///
    /// # Arguments
    /// * `local` - Record of the local node
    /// * `registry` - Shared peer registry
    /// * `offers` - Shared offer store
    /// * `transport` - Transport used for forwarding
    /// * `config` - Engine configuration
    pub fn new(
        local: NodeRecord,
        registry: Arc<PeerRegistry>,
        offers: Arc<OfferStore>,
        transport: Arc<T>,
        config: RelayConfig,
    ) -> Self {
        let links = LinkSet::new(transport, config.link_queue_capacity, config.send_timeout);
        let (deliveries, _) = broadcast::channel(config.delivery_channel_capacity.max(1));
        Self {
            local,
            registry,
            offers,
            links,
            config,
            deliveries,
        }
    }

    /// Our node id
    pub fn local_id(&self) -> &NodeId {
        &self.local.id
    }

    /// Our node record
    pub fn local_record(&self) -> &NodeRecord {
        &self.local
    }

    /// The shared peer registry
    pub fn registry(&self) -> &Arc<PeerRegistry> {
        &self.registry
    }

    /// The shared offer store
    pub fn offers(&self) -> &Arc<OfferStore> {
        &self.offers
    }

    /// Engine configuration
    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// Subscribe to local deliveries
    pub fn subscribe(&self) -> broadcast::Receiver<Delivery> {
        self.deliveries.subscribe()
    }

    /// Handle an envelope received from the network
    ///
    /// Must be called from within a Tokio runtime.
    pub fn handle(&self, envelope: Envelope) -> Disposition {
        debug!(
            kind = %envelope.kind(),
            source = %envelope.source_id().short_id(),
            dest = %envelope.destination_id().short_id(),
            ttl = envelope.ttl(),
            "Handling envelope"
        );

        if envelope.is_expired() {
            trace!(kind = %envelope.kind(), ttl = envelope.ttl(), "TTL expired, dropping");
            return Disposition::Expired;
        }

        if envelope.destination_id() == self.local_id() {
            return Disposition::Delivered(self.deliver_locally(envelope));
        }

        let mut envelope = envelope;
        envelope.decrement_ttl();
        Disposition::Forwarding(self.fan_out(envelope))
    }

    /// Send an envelope this node created
    ///
    /// The hop budget is sent as-is; only relaying hops decrement it.
    pub fn originate(&self, envelope: Envelope) -> Disposition {
        if envelope.is_expired() {
            warn!(kind = %envelope.kind(), ttl = envelope.ttl(), "Refusing to send expired envelope");
            return Disposition::Expired;
        }

        if envelope.destination_id() == self.local_id() {
            return Disposition::Delivered(self.deliver_locally(envelope));
        }

        Disposition::Forwarding(self.fan_out(envelope))
    }

    /// Run the kind-specific local handler
    fn deliver_locally(&self, envelope: Envelope) -> EnvelopeKind {
        let kind = envelope.kind();
        let delivery = match envelope {
            Envelope::Packet(packet) => {
                info!(
                    source = %packet.source_id.short_id(),
                    protocol = %packet.protocol,
                    bytes = packet.payload.len(),
                    "Received packet"
                );
                Delivery::Packet(packet)
            }
            Envelope::Offer(offer) => {
                info!(source = %offer.source_id.short_id(), "Received connection offer");
                self.offers.store(offer.clone());
                Delivery::Offer(offer)
            }
            Envelope::Response(response) => {
                info!(source = %response.source_id.short_id(), "Received connection answer");
                Delivery::Answer(response)
            }
        };
        // No subscribers is not an error
        let _ = self.deliveries.send(delivery);
        kind
    }

    /// Queue the envelope once on every peer link and collect the results
    fn fan_out(&self, envelope: Envelope) -> FanoutHandle {
        let kind = envelope.kind();
        let peers: Vec<NodeRecord> = self
            .registry
            .list()
            .into_iter()
            .filter(|peer| peer.id != self.local.id)
            .collect();

        debug!(kind = %kind, ttl = envelope.ttl(), peers = peers.len(), "Forwarding envelope");

        let mut pending = Vec::with_capacity(peers.len());
        let mut rejected = Vec::new();
        for peer in peers {
            match self.links.enqueue(&peer, envelope.clone()) {
                Ok(receipt) => pending.push((peer.id, receipt)),
                Err(e) => {
                    warn!(peer = %peer.id.short_id(), error = %e, "Could not queue forward");
                    rejected.push((peer.id, e));
                }
            }
        }

        let queued = pending.iter().map(|(peer, _)| peer.clone()).collect();
        let task = tokio::spawn(async move {
            join_all(pending.into_iter().map(|(peer, receipt)| async move {
                let result = receipt.await.unwrap_or_else(|_| {
                    Err(TransportError::LinkClosed(peer.short_id().to_string()))
                });
                if let Err(e) = &result {
                    warn!(peer = %peer.short_id(), error = %e, "Forward failed");
                }
                (peer, result)
            }))
            .await
        });

        FanoutHandle {
            kind,
            rejected,
            queued,
            task,
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use relaymesh_core::MockTransport;

    use super::*;

    fn record(id: &str) -> NodeRecord {
        NodeRecord {
            id: NodeId::new(id),
            display_name: id.to_string(),
            exposed: true,
            address: format!("http://{id}:1"),
            created_at: Utc::now(),
            public_key: String::new(),
            ttl: 8,
        }
    }

    fn engine_with_peers(peers: &[&str]) -> (RelayEngine<MockTransport>, Arc<MockTransport>) {
        let registry = Arc::new(PeerRegistry::new());
        for peer in peers {
            registry.register(record(peer));
        }
        let transport = Arc::new(MockTransport::new());
        let engine = RelayEngine::new(
            record("me"),
            registry,
            Arc::new(OfferStore::new()),
            Arc::clone(&transport),
            RelayConfig::default(),
        );
        (engine, transport)
    }

    fn packet(dest: &str, ttl: Ttl) -> Envelope {
        ContentPacket::new(NodeId::new("src"), NodeId::new(dest), "chat", b"hi".to_vec(), ttl).into()
    }

    #[test]
    fn test_config_validation() {
        assert!(RelayConfig::default().validate().is_ok());
        assert!(matches!(
            RelayConfig::default().with_default_ttl(0).validate(),
            Err(RoutingError::InvalidTtl(0))
        ));
        assert!(RelayConfig::default()
            .with_send_timeout(Duration::ZERO)
            .validate()
            .is_err());
        assert!(RelayConfig::default()
            .with_link_queue_capacity(0)
            .validate()
            .is_err());
    }

    #[tokio::test]
    async fn test_expired_is_dropped() {
        let (engine, transport) = engine_with_peers(&["b"]);

        assert!(engine.handle(packet("other", 0)).is_expired());
        assert!(engine.handle(packet("me", -1)).is_expired());

        tokio::task::yield_now().await;
        assert!(transport.sent().await.is_empty());
    }

    #[tokio::test]
    async fn test_local_delivery_does_not_forward() {
        let (engine, transport) = engine_with_peers(&["b", "c"]);
        let mut rx = engine.subscribe();

        let disposition = engine.handle(packet("me", 3));
        assert!(matches!(disposition, Disposition::Delivered(EnvelopeKind::Packet)));

        match rx.try_recv().unwrap() {
            Delivery::Packet(p) => {
                assert_eq!(p.payload, b"hi");
                assert_eq!(p.ttl, 3);
            }
            other => panic!("Expected packet delivery, got {:?}", other),
        }
        tokio::task::yield_now().await;
        assert!(transport.sent().await.is_empty());
    }

    #[tokio::test]
    async fn test_forward_decrements_once() {
        let (engine, transport) = engine_with_peers(&["b", "c"]);

        let report = engine.handle(packet("far", 3)).into_fanout().unwrap().await;
        assert_eq!(report.delivered.len(), 2);
        assert_eq!(report.kind, Some(EnvelopeKind::Packet));

        let sent = transport.sent().await;
        assert_eq!(sent.len(), 2);
        assert!(sent.iter().all(|s| s.envelope.ttl() == 2));
    }

    #[tokio::test]
    async fn test_forward_skips_self() {
        let (engine, transport) = engine_with_peers(&["me", "b"]);

        let report = engine.handle(packet("far", 2)).into_fanout().unwrap().await;
        assert_eq!(report.attempted(), 1);
        assert!(transport.sent_to("http://me:1").await.is_empty());
    }

    #[tokio::test]
    async fn test_offer_stored_on_delivery() {
        let (engine, _transport) = engine_with_peers(&[]);
        let offer = ConnectOffer::new(NodeId::new("a"), NodeId::new("me"), "turn:x", "sdp", 2);

        assert!(engine.handle(offer.into()).is_delivered());
        assert_eq!(engine.offers().get(&NodeId::new("a")).unwrap().sdp_offer, "sdp");
    }

    #[tokio::test]
    async fn test_offer_for_other_node_not_stored() {
        let (engine, _transport) = engine_with_peers(&["b"]);
        let offer = ConnectOffer::new(NodeId::new("a"), NodeId::new("b"), "turn:x", "sdp", 2);

        engine.handle(offer.into()).into_fanout().unwrap().await;
        assert!(engine.offers().is_empty());
    }

    #[tokio::test]
    async fn test_answer_delivery() {
        let (engine, _transport) = engine_with_peers(&[]);
        let mut rx = engine.subscribe();
        let answer = ConnectResponse::new(NodeId::new("a"), NodeId::new("me"), "turn:x", "ans", 1);

        engine.handle(answer.into());
        assert!(matches!(rx.try_recv().unwrap(), Delivery::Answer(r) if r.sdp_answer == "ans"));
    }

    #[tokio::test]
    async fn test_originate_keeps_ttl() {
        let (engine, transport) = engine_with_peers(&["b"]);

        engine.originate(packet("far", 3)).into_fanout().unwrap().await;
        assert_eq!(transport.sent_to("http://b:1").await[0].ttl(), 3);
    }

    #[tokio::test]
    async fn test_crashed_fanout_reports_every_peer_failed() {
        let task: JoinHandle<SendResults> = tokio::spawn(async { panic!("link worker crashed") });
        let handle = FanoutHandle {
            kind: EnvelopeKind::Offer,
            rejected: vec![(NodeId::new("full"), TransportError::QueueFull("full".to_string()))],
            queued: vec![NodeId::new("b"), NodeId::new("c")],
            task,
        };

        let report = handle.await;
        assert_eq!(report.kind, Some(EnvelopeKind::Offer));
        assert!(report.delivered.is_empty());
        assert_eq!(report.attempted(), 3);
        assert!(matches!(report.failed[0].1, TransportError::QueueFull(_)));
        assert!(report.failed[1..]
            .iter()
            .all(|(_, e)| matches!(e, TransportError::LinkClosed(_))));
    }

    #[tokio::test]
    async fn test_no_peers_is_empty_report() {
        let (engine, _transport) = engine_with_peers(&[]);

        let report = engine.handle(packet("far", 3)).into_fanout().unwrap().await;
        assert_eq!(report.attempted(), 0);
        assert!(report.all_delivered());
    }
}

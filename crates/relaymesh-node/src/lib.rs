//! # Relaymesh Node
//!
//! A complete overlay node: identity, peer registry, relay engine, HTTP API,
//! and seed bootstrap.
//!
//! This crate provides [`RelayNode`], which ties together:
//! - Identity derivation ([`relaymesh_core::LocalIdentity`])
//! - Routing ([`relaymesh_routing::RelayEngine`], [`relaymesh_routing::PeerRegistry`])
//! - The HTTP boundary ([`api`] server side, [`HttpTransport`] client side)
//!
//! ## Example
//!
//! ```rust,ignore
//! use relaymesh_node::{NodeConfig, RelayNode};
//!
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await?;
//! let config = NodeConfig::default()
//!     .with_name("edge-1")
//!     .with_address("http://10.0.0.5:8080")
//!     .with_seeds(vec!["http://10.0.0.1:8080".into()]);
//!
//! let node = std::sync::Arc::new(RelayNode::new(config)?);
//! let server = tokio::spawn({
//!     let node = node.clone();
//!     async move { node.serve(listener).await }
//! });
//! node.bootstrap().await;
//!
//! // Send a packet into the overlay
//! node.send_packet(destination, "chat", b"hello".to_vec());
//!
//! // Watch what arrives for us
//! let mut deliveries = node.subscribe();
//! while let Ok(delivery) = deliveries.recv().await {
//!     println!("Received: {:?}", delivery);
//! }
//! ```

pub mod api;
mod config;
mod error;
mod http;

pub use config::{BootstrapSettings, NodeConfig, RelaySettings};
pub use error::{NodeError, NodeResult};
pub use http::HttpTransport;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use relaymesh_core::{
    ConnectOffer, ConnectResponse, ContentPacket, HardwareIdSource, LocalIdentity, NodeId,
    NodeRecord, PeerTransport, StaticHardwareId, SystemHardwareId,
};
use relaymesh_routing::{
    BootstrapClient, BootstrapReport, Delivery, Disposition, OfferStore, PeerRegistry,
    RelayEngine,
};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::{info, instrument, warn};

/// A running overlay node
///
/// Owns the relay engine and the bootstrap client. The HTTP API is served
/// from [`RelayNode::router`]; the default transport is [`HttpTransport`].
pub struct RelayNode<T: PeerTransport = HttpTransport> {
    config: NodeConfig,
    identity: LocalIdentity,
    engine: Arc<RelayEngine<T>>,
    bootstrap: BootstrapClient<T>,
}

impl RelayNode<HttpTransport> {
    /// Build a node that talks HTTP to its peers
    ///
    /// The identity comes from the configured hardware id override if there
    /// is one, otherwise from the system's network interfaces. Failing to
    /// derive it is an error; there is no fallback identity.
    pub fn new(config: NodeConfig) -> NodeResult<Self> {
        let transport = Arc::new(HttpTransport::new(Duration::from_millis(
            config.relay.send_timeout_ms,
        ))?);
        match config.hardware_id.clone() {
            Some(hardware_id) => {
                Self::with_transport(config, &StaticHardwareId(hardware_id), transport)
            }
            None => Self::with_transport(config, &SystemHardwareId, transport),
        }
    }
}

impl<T: PeerTransport> RelayNode<T> {
    /// Build a node over any transport and hardware id source
    pub fn with_transport<S: HardwareIdSource + ?Sized>(
        config: NodeConfig,
        source: &S,
        transport: Arc<T>,
    ) -> NodeResult<Self> {
        config.validate()?;
        let identity = LocalIdentity::derive(source, &config.name)?;

        let local = NodeRecord::local(
            &identity,
            config.exposed,
            config.advertised_address(),
            config.public_key.clone(),
        );
        if local.base_url().contains("0.0.0.0") {
            warn!(address = %local.address, "Advertised address is unspecified; peers cannot reach us");
        }

        let engine = Arc::new(RelayEngine::new(
            local,
            Arc::new(PeerRegistry::new()),
            Arc::new(OfferStore::new()),
            Arc::clone(&transport),
            config.relay_config(),
        ));
        let bootstrap = BootstrapClient::new(transport, config.seeds.clone(), config.bootstrap_config());

        info!(
            id = %identity.id(),
            name = %identity.name(),
            address = %engine.local_record().address,
            "Node created"
        );

        Ok(Self {
            config,
            identity,
            engine,
            bootstrap,
        })
    }

    /// Our node id
    pub fn id(&self) -> &NodeId {
        self.identity.id()
    }

    /// Our derived identity
    pub fn identity(&self) -> &LocalIdentity {
        &self.identity
    }

    /// Our node record as advertised to peers
    pub fn local_record(&self) -> &NodeRecord {
        self.engine.local_record()
    }

    /// The configuration the node was built from
    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    /// The relay engine
    pub fn engine(&self) -> &Arc<RelayEngine<T>> {
        &self.engine
    }

    /// Known peers
    pub fn registry(&self) -> &Arc<PeerRegistry> {
        self.engine.registry()
    }

    /// Offers delivered to us
    pub fn offers(&self) -> &Arc<OfferStore> {
        self.engine.offers()
    }

    /// Subscribe to envelopes delivered to this node
    pub fn subscribe(&self) -> broadcast::Receiver<Delivery> {
        self.engine.subscribe()
    }

    /// The HTTP API router for this node
    pub fn router(&self) -> Router {
        api::router(Arc::clone(&self.engine))
    }

    /// Serve the HTTP API until the listener fails
    pub async fn serve(&self, listener: TcpListener) -> NodeResult<()> {
        self.serve_with_shutdown(listener, std::future::pending()).await
    }

    /// Serve the HTTP API until `signal` resolves
    #[instrument(skip_all, fields(id = %self.id().short_id()))]
    pub async fn serve_with_shutdown<F>(&self, listener: TcpListener, signal: F) -> NodeResult<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let local_addr = listener.local_addr()?;
        info!(listen = %local_addr, "Serving HTTP API");
        axum::serve(listener, self.router())
            .with_graceful_shutdown(signal)
            .await
            .map_err(|e| NodeError::Serve(e.to_string()))?;
        info!("HTTP API stopped");
        Ok(())
    }

    /// Register with every configured seed
    ///
    /// Never fails; unreachable seeds are reported and logged.
    #[instrument(skip_all, fields(id = %self.id().short_id(), seeds = self.bootstrap.seeds().len()))]
    pub async fn bootstrap(&self) -> BootstrapReport {
        let report = self
            .bootstrap
            .run(self.engine.local_record(), self.engine.registry())
            .await;
        info!(
            registered = report.registered.len(),
            failed = report.failed.len(),
            imported = report.imported,
            "Bootstrap finished"
        );
        report
    }

    /// Originate a content packet with the configured hop budget
    pub fn send_packet(
        &self,
        destination: NodeId,
        protocol: impl Into<String>,
        payload: Vec<u8>,
    ) -> Disposition {
        let packet = ContentPacket::new(
            self.id().clone(),
            destination,
            protocol,
            payload,
            self.config.relay.default_ttl,
        );
        self.engine.originate(packet.into())
    }

    /// Originate a connection offer with the configured hop budget
    pub fn send_offer(
        &self,
        destination: NodeId,
        turn_server: impl Into<String>,
        sdp_offer: impl Into<String>,
    ) -> Disposition {
        let offer = ConnectOffer::new(
            self.id().clone(),
            destination,
            turn_server,
            sdp_offer,
            self.config.relay.default_ttl,
        );
        self.engine.originate(offer.into())
    }

    /// Originate a connection response with the configured hop budget
    pub fn send_response(
        &self,
        destination: NodeId,
        turn_server: impl Into<String>,
        sdp_answer: impl Into<String>,
    ) -> Disposition {
        let response = ConnectResponse::new(
            self.id().clone(),
            destination,
            turn_server,
            sdp_answer,
            self.config.relay.default_ttl,
        );
        self.engine.originate(response.into())
    }
}

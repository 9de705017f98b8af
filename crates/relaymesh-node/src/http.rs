//! HTTP peer transport
//!
//! [`HttpTransport`] speaks the same JSON API that [`crate::api`] serves.
//! Every request is bounded by the client timeout; a non-2xx answer is a
//! [`TransportError::Rejected`].

use std::time::Duration;

use async_trait::async_trait;
use relaymesh_core::{Envelope, NodeRecord, PeerTransport, TransportError};
use serde::Serialize;
use tracing::trace;

use crate::api::PeerList;
use crate::error::{NodeError, NodeResult};

/// Outbound transport over HTTP/JSON
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Create a transport whose requests time out after `timeout`
    pub fn new(timeout: Duration) -> NodeResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| NodeError::Config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { client })
    }

    async fn post_json<B: Serialize + ?Sized>(&self, url: &str, body: &B) -> Result<(), TransportError> {
        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| request_error(url, e))?;

        let status = response.status();
        trace!(url = %url, status = status.as_u16(), "POST finished");
        if !status.is_success() {
            return Err(TransportError::Rejected {
                address: url.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(())
    }
}

fn api_url(address: &str, endpoint: &str) -> String {
    format!("{}/api/v1/{}", address.trim_end_matches('/'), endpoint)
}

fn request_error(url: &str, error: reqwest::Error) -> TransportError {
    if error.is_timeout() {
        TransportError::Timeout(url.to_string())
    } else {
        TransportError::Unreachable {
            address: url.to_string(),
            reason: error.to_string(),
        }
    }
}

#[async_trait]
impl PeerTransport for HttpTransport {
    async fn send_envelope(&self, address: &str, envelope: &Envelope) -> Result<(), TransportError> {
        let url = api_url(address, envelope.kind().endpoint());
        match envelope {
            Envelope::Packet(packet) => self.post_json(&url, packet).await,
            Envelope::Offer(offer) => self.post_json(&url, offer).await,
            Envelope::Response(response) => self.post_json(&url, response).await,
        }
    }

    async fn register(&self, address: &str, record: &NodeRecord) -> Result<(), TransportError> {
        self.post_json(&api_url(address, "peer"), record).await
    }

    async fn fetch_peers(&self, address: &str) -> Result<Vec<NodeRecord>, TransportError> {
        let url = api_url(address, "peers");
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| request_error(&url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Rejected {
                address: url,
                status: status.as_u16(),
            });
        }

        let list: PeerList = response
            .json()
            .await
            .map_err(|e| TransportError::Decode(e.to_string()))?;
        Ok(list.peers)
    }
}

//! HTTP API
//!
//! Thin adapter between JSON requests and the relay engine. Bodies are
//! decoded and checked here; anything malformed is answered with
//! `400 {"error": "..."}` and never reaches the registry or the engine.
//!
//! | Method | Path | Effect |
//! |---|---|---|
//! | POST | `/api/v1/peer` | register a peer |
//! | GET | `/api/v1/peers` | list known peers |
//! | POST | `/api/v1/packet_send` | relay a content packet |
//! | POST | `/api/v1/offer` | relay a connection offer |
//! | POST | `/api/v1/connect` | relay a connection response |
//! | GET | `/api/v1/offers/{source_id}` | latest offer received from a source |
//! | GET | `/api/v1/node` | our own record |
//! | GET | `/health` | liveness |

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use relaymesh_core::{
    ConnectOffer, ConnectResponse, ContentPacket, Envelope, NodeId, NodeRecord, PeerTransport,
    ValidationError,
};
use relaymesh_routing::{Disposition, RelayEngine};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

/// Body of `GET /api/v1/peers`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerList {
    pub peers: Vec<NodeRecord>,
}

/// Errors returned to HTTP clients
#[derive(Debug)]
pub enum ApiError {
    /// The request body could not be accepted
    Malformed(String),
    /// The requested resource does not exist
    NotFound(String),
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::Malformed(rejection.body_text())
    }
}

impl From<ValidationError> for ApiError {
    fn from(e: ValidationError) -> Self {
        ApiError::Malformed(e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Malformed(message) => (StatusCode::BAD_REQUEST, message),
            ApiError::NotFound(message) => (StatusCode::NOT_FOUND, message),
        };
        debug!(status = status.as_u16(), error = %message, "Rejecting request");
        (status, Json(json!({ "error": message }))).into_response()
    }
}

/// Shared handler state
pub struct ApiState<T: PeerTransport> {
    engine: Arc<RelayEngine<T>>,
}

impl<T: PeerTransport> Clone for ApiState<T> {
    fn clone(&self) -> Self {
        Self {
            engine: Arc::clone(&self.engine),
        }
    }
}

/// Build the API router around a relay engine
pub fn router<T: PeerTransport>(engine: Arc<RelayEngine<T>>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/v1/node", get(node_record::<T>))
        .route("/api/v1/peer", post(register_peer::<T>))
        .route("/api/v1/peers", get(list_peers::<T>))
        .route("/api/v1/packet_send", post(packet_send::<T>))
        .route("/api/v1/offer", post(offer::<T>))
        .route("/api/v1/connect", post(connect::<T>))
        .route("/api/v1/offers/{source_id}", get(get_offer::<T>))
        .layer(TraceLayer::new_for_http())
        .with_state(ApiState { engine })
}

async fn health() -> impl IntoResponse {
    StatusCode::OK
}

async fn node_record<T: PeerTransport>(State(state): State<ApiState<T>>) -> Json<NodeRecord> {
    Json(state.engine.local_record().clone())
}

async fn register_peer<T: PeerTransport>(
    State(state): State<ApiState<T>>,
    body: Result<Json<NodeRecord>, JsonRejection>,
) -> Result<StatusCode, ApiError> {
    let Json(record) = body?;
    record.validate()?;

    let id = record.id.clone();
    if state.engine.registry().register(record) {
        info!(peer = %id.short_id(), "Peer registered");
    }
    Ok(StatusCode::OK)
}

async fn list_peers<T: PeerTransport>(State(state): State<ApiState<T>>) -> Json<PeerList> {
    Json(PeerList {
        peers: state.engine.registry().list(),
    })
}

async fn packet_send<T: PeerTransport>(
    State(state): State<ApiState<T>>,
    body: Result<Json<ContentPacket>, JsonRejection>,
) -> Result<StatusCode, ApiError> {
    let Json(packet) = body?;
    accept(&state, packet.into())
}

async fn offer<T: PeerTransport>(
    State(state): State<ApiState<T>>,
    body: Result<Json<ConnectOffer>, JsonRejection>,
) -> Result<StatusCode, ApiError> {
    let Json(offer) = body?;
    accept(&state, offer.into())
}

async fn connect<T: PeerTransport>(
    State(state): State<ApiState<T>>,
    body: Result<Json<ConnectResponse>, JsonRejection>,
) -> Result<StatusCode, ApiError> {
    let Json(response) = body?;
    accept(&state, response.into())
}

/// Hand a decoded envelope to the engine; forwarding continues after we answer
fn accept<T: PeerTransport>(state: &ApiState<T>, envelope: Envelope) -> Result<StatusCode, ApiError> {
    envelope.validate()?;
    let kind = envelope.kind();
    match state.engine.handle(envelope) {
        Disposition::Expired => debug!(kind = %kind, "Dropped expired envelope"),
        Disposition::Delivered(_) => debug!(kind = %kind, "Delivered locally"),
        Disposition::Forwarding(_) => debug!(kind = %kind, "Forwarding"),
    }
    Ok(StatusCode::OK)
}

async fn get_offer<T: PeerTransport>(
    State(state): State<ApiState<T>>,
    Path(source_id): Path<String>,
) -> Result<Json<ConnectOffer>, ApiError> {
    state
        .engine
        .offers()
        .get(&NodeId::new(source_id.as_str()))
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("no offer from {}", source_id)))
}

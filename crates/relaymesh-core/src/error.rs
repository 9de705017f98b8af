//! Error types for Relaymesh

use thiserror::Error;

/// Top-level error type for Relaymesh
#[derive(Debug, Error)]
pub enum MeshError {
    #[error("Identity error: {0}")]
    Identity(#[from] IdentityError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

/// Errors raised while deriving the local node identity
///
/// Both variants are fatal at startup: a node must never run with an
/// undefined or placeholder identity.
#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("Hardware identifier unavailable: {0}")]
    HardwareUnavailable(String),

    #[error("Logical node name must not be empty")]
    EmptyName,
}

/// Errors raised by a single outbound send
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("Peer unreachable at {address}: {reason}")]
    Unreachable { address: String, reason: String },

    #[error("Send to {0} timed out")]
    Timeout(String),

    #[error("Peer at {address} rejected request with status {status}")]
    Rejected { address: String, status: u16 },

    #[error("Outbound queue full for peer {0}")]
    QueueFull(String),

    #[error("Outbound link to peer {0} closed")]
    LinkClosed(String),

    #[error("Failed to decode response: {0}")]
    Decode(String),
}

/// Errors raised when an inbound record or envelope is structurally invalid
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Missing or empty field: {0}")]
    MissingField(&'static str),

    #[error("Invalid field {field}: {reason}")]
    InvalidField { field: &'static str, reason: String },
}

/// Result type alias for Relaymesh operations
pub type MeshResult<T> = Result<T, MeshError>;

//! Routing error types
//!
//! Re-exports core transport errors and adds routing-specific errors.

use thiserror::Error;

// Re-export core transport errors
pub use relaymesh_core::TransportError;

/// Errors for routing configuration and bootstrap
#[derive(Debug, Error)]
pub enum RoutingError {
    /// Core transport error
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Starting hop budget must be finite and positive
    #[error("Invalid default TTL {0}: must be at least 1")]
    InvalidTtl(i64),

    /// A timeout of zero would fail every send
    #[error("Invalid timeout: {0}")]
    InvalidTimeout(String),

    /// Outbound queues need room for at least one envelope
    #[error("Invalid link queue capacity: {0}")]
    InvalidQueueCapacity(usize),
}

/// Result type for routing operations
pub type RoutingResult<T> = Result<T, RoutingError>;

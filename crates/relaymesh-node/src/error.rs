//! Error types for the node

use relaymesh_core::{IdentityError, TransportError};
use relaymesh_routing::RoutingError;
use thiserror::Error;

/// Errors that can occur while building or running a node
#[derive(Debug, Error)]
pub enum NodeError {
    /// The local identity could not be derived
    #[error("Identity error: {0}")]
    Identity(#[from] IdentityError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error (config file, listener)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Transport layer error
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// The HTTP server stopped with an error
    #[error("Server error: {0}")]
    Serve(String),
}

impl From<RoutingError> for NodeError {
    fn from(e: RoutingError) -> Self {
        match e {
            RoutingError::Transport(e) => NodeError::Transport(e),
            other => NodeError::Config(other.to_string()),
        }
    }
}

impl From<toml::de::Error> for NodeError {
    fn from(e: toml::de::Error) -> Self {
        NodeError::Config(e.to_string())
    }
}

/// Result type alias for node operations
pub type NodeResult<T> = Result<T, NodeError>;

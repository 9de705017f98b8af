//! Peer records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::identity::{LocalIdentity, NodeId};

/// Lifetime budget carried on a [`NodeRecord`]
///
/// Nothing evicts on it; it is stored and reported as received.
pub const DEFAULT_RECORD_TTL: i64 = 8;

/// A known overlay node, including ourselves
///
/// Wire names follow the registration API (`unique_id`, `peer_name`, `created`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    /// Stable node identifier
    #[serde(rename = "unique_id")]
    pub id: NodeId,
    /// Human-readable name
    #[serde(rename = "peer_name")]
    pub display_name: String,
    /// Whether the node is publicly reachable
    pub exposed: bool,
    /// Base URL of the node's HTTP API
    pub address: String,
    /// When the record was created
    #[serde(
        rename = "created",
        default = "Utc::now",
        deserialize_with = "crate::envelope::wire_time::deserialize"
    )]
    pub created_at: DateTime<Utc>,
    /// Opaque public key, never validated
    pub public_key: String,
    /// Remaining lifetime budget
    pub ttl: i64,
}

impl NodeRecord {
    /// Create a record for the local node
    pub fn local(
        identity: &LocalIdentity,
        exposed: bool,
        address: impl Into<String>,
        public_key: impl Into<String>,
    ) -> Self {
        Self {
            id: identity.id().clone(),
            display_name: identity.name().to_string(),
            exposed,
            address: address.into(),
            created_at: Utc::now(),
            public_key: public_key.into(),
            ttl: DEFAULT_RECORD_TTL,
        }
    }

    /// Set the lifetime budget
    pub fn with_ttl(mut self, ttl: i64) -> Self {
        self.ttl = ttl;
        self
    }

    /// Check the fields a registration must carry
    ///
    /// Only structure is checked. The public key and reachability are not.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.id.is_empty() {
            return Err(ValidationError::MissingField("unique_id"));
        }
        if self.address.trim().is_empty() {
            return Err(ValidationError::MissingField("address"));
        }
        if !(self.address.starts_with("http://") || self.address.starts_with("https://")) {
            return Err(ValidationError::InvalidField {
                field: "address",
                reason: format!("expected an http(s) url, got {:?}", self.address),
            });
        }
        Ok(())
    }

    /// Base URL with any trailing slash removed
    pub fn base_url(&self) -> &str {
        self.address.trim_end_matches('/')
    }
}

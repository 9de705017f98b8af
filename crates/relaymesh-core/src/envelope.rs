//! Relayable envelopes
//!
//! Three message kinds travel through the overlay: [`ContentPacket`],
//! [`ConnectOffer`] and [`ConnectResponse`]. They share the [`Relayable`]
//! contract: a source, a destination, a creation time, and a hop budget
//! (`ttl`) that every relaying node decrements by exactly one.
//!
//! An envelope that arrives with `ttl <= 0` is expired and must be dropped
//! without delivery or forwarding.

use std::fmt::{self, Display};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::identity::NodeId;

/// Hop budget type
///
/// Signed so that zero or negative budgets from the wire are representable
/// and dropped as expired instead of failing to parse.
pub type Ttl = i64;

/// Kind tag for an envelope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvelopeKind {
    /// Application content
    Packet,
    /// Connection offer
    Offer,
    /// Connection response (answer)
    Response,
}

impl EnvelopeKind {
    /// API path segment this kind is posted to
    pub fn endpoint(&self) -> &'static str {
        match self {
            EnvelopeKind::Packet => "packet_send",
            EnvelopeKind::Offer => "offer",
            EnvelopeKind::Response => "connect",
        }
    }
}

impl Display for EnvelopeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EnvelopeKind::Packet => write!(f, "packet"),
            EnvelopeKind::Offer => write!(f, "offer"),
            EnvelopeKind::Response => write!(f, "response"),
        }
    }
}

/// Capabilities shared by every relayable message
pub trait Relayable {
    /// Originating node
    fn source_id(&self) -> &NodeId;

    /// Final destination node
    fn destination_id(&self) -> &NodeId;

    /// Remaining hop budget
    fn ttl(&self) -> Ttl;

    /// When the originating node created the message
    fn created_at(&self) -> DateTime<Utc>;

    /// Mutable access to the hop budget
    fn ttl_mut(&mut self) -> &mut Ttl;

    /// Whether the hop budget is exhausted
    fn is_expired(&self) -> bool {
        self.ttl() <= 0
    }

    /// Decrement the hop budget by exactly one
    fn decrement_ttl(&mut self) {
        *self.ttl_mut() -= 1;
    }
}

macro_rules! impl_relayable {
    ($ty:ty) => {
        impl Relayable for $ty {
            fn source_id(&self) -> &NodeId {
                &self.source_id
            }

            fn destination_id(&self) -> &NodeId {
                &self.destination_id
            }

            fn ttl(&self) -> Ttl {
                self.ttl
            }

            fn created_at(&self) -> DateTime<Utc> {
                self.created_at
            }

            fn ttl_mut(&mut self) -> &mut Ttl {
                &mut self.ttl
            }
        }
    };
}

/// Application content addressed to a node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentPacket {
    pub source_id: NodeId,
    pub destination_id: NodeId,
    /// Application protocol tag
    pub protocol: String,
    /// Raw payload, base64 on the wire
    #[serde(with = "base64_bytes")]
    pub payload: Vec<u8>,
    pub ttl: Ttl,
    #[serde(
        rename = "created",
        default = "Utc::now",
        deserialize_with = "wire_time::deserialize"
    )]
    pub created_at: DateTime<Utc>,
}

impl ContentPacket {
    /// Create a new packet with the given hop budget
    pub fn new(
        source_id: NodeId,
        destination_id: NodeId,
        protocol: impl Into<String>,
        payload: Vec<u8>,
        ttl: Ttl,
    ) -> Self {
        Self {
            source_id,
            destination_id,
            protocol: protocol.into(),
            payload,
            ttl,
            created_at: Utc::now(),
        }
    }
}

/// A connection offer carrying an SDP offer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectOffer {
    pub source_id: NodeId,
    pub destination_id: NodeId,
    pub turn_server: String,
    pub sdp_offer: String,
    #[serde(
        rename = "created",
        default = "Utc::now",
        deserialize_with = "wire_time::deserialize"
    )]
    pub created_at: DateTime<Utc>,
    pub ttl: Ttl,
}

impl ConnectOffer {
    /// Create a new offer with the given hop budget
    pub fn new(
        source_id: NodeId,
        destination_id: NodeId,
        turn_server: impl Into<String>,
        sdp_offer: impl Into<String>,
        ttl: Ttl,
    ) -> Self {
        Self {
            source_id,
            destination_id,
            turn_server: turn_server.into(),
            sdp_offer: sdp_offer.into(),
            created_at: Utc::now(),
            ttl,
        }
    }
}

/// A connection response carrying an SDP answer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectResponse {
    pub source_id: NodeId,
    pub destination_id: NodeId,
    pub turn_server: String,
    pub sdp_answer: String,
    #[serde(
        rename = "created",
        default = "Utc::now",
        deserialize_with = "wire_time::deserialize"
    )]
    pub created_at: DateTime<Utc>,
    pub ttl: Ttl,
}

impl ConnectResponse {
    /// Create a new response with the given hop budget
    pub fn new(
        source_id: NodeId,
        destination_id: NodeId,
        turn_server: impl Into<String>,
        sdp_answer: impl Into<String>,
        ttl: Ttl,
    ) -> Self {
        Self {
            source_id,
            destination_id,
            turn_server: turn_server.into(),
            sdp_answer: sdp_answer.into(),
            created_at: Utc::now(),
            ttl,
        }
    }
}

impl_relayable!(ContentPacket);
impl_relayable!(ConnectOffer);
impl_relayable!(ConnectResponse);

/// Any relayable message
#[derive(Debug, Clone, PartialEq)]
pub enum Envelope {
    Packet(ContentPacket),
    Offer(ConnectOffer),
    Response(ConnectResponse),
}

impl Envelope {
    /// Kind tag of this envelope
    pub fn kind(&self) -> EnvelopeKind {
        match self {
            Envelope::Packet(_) => EnvelopeKind::Packet,
            Envelope::Offer(_) => EnvelopeKind::Offer,
            Envelope::Response(_) => EnvelopeKind::Response,
        }
    }

    fn inner(&self) -> &dyn Relayable {
        match self {
            Envelope::Packet(p) => p,
            Envelope::Offer(o) => o,
            Envelope::Response(r) => r,
        }
    }

    /// Check the fields every envelope must carry
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.source_id().is_empty() {
            return Err(ValidationError::MissingField("source_id"));
        }
        if self.destination_id().is_empty() {
            return Err(ValidationError::MissingField("destination_id"));
        }
        Ok(())
    }

}

impl Relayable for Envelope {
    fn source_id(&self) -> &NodeId {
        self.inner().source_id()
    }

    fn destination_id(&self) -> &NodeId {
        self.inner().destination_id()
    }

    fn ttl(&self) -> Ttl {
        self.inner().ttl()
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.inner().created_at()
    }

    fn ttl_mut(&mut self) -> &mut Ttl {
        match self {
            Envelope::Packet(p) => &mut p.ttl,
            Envelope::Offer(o) => &mut o.ttl,
            Envelope::Response(r) => &mut r.ttl,
        }
    }
}

impl From<ContentPacket> for Envelope {
    fn from(p: ContentPacket) -> Self {
        Envelope::Packet(p)
    }
}

impl From<ConnectOffer> for Envelope {
    fn from(o: ConnectOffer) -> Self {
        Envelope::Offer(o)
    }
}

impl From<ConnectResponse> for Envelope {
    fn from(r: ConnectResponse) -> Self {
        Envelope::Response(r)
    }
}

/// Serde adapter carrying bytes as a standard base64 string
pub mod base64_bytes {
    use base64::{Engine as _, engine::general_purpose::STANDARD};
    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(|e| D::Error::custom(format!("invalid base64 payload: {e}")))
    }
}

/// Serde adapter reading a timestamp as RFC 3339 text or epoch seconds
///
/// Peers send `created` either way; epoch seconds may be fractional.
/// Timestamps are always written back as RFC 3339.
pub mod wire_time {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, de::Error};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum WireTime {
        Text(String),
        Seconds(f64),
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        match WireTime::deserialize(deserializer)? {
            WireTime::Text(text) => DateTime::parse_from_rfc3339(&text)
                .map(|t| t.with_timezone(&Utc))
                .map_err(|e| D::Error::custom(format!("invalid timestamp {text:?}: {e}"))),
            WireTime::Seconds(seconds) => from_epoch_seconds(seconds)
                .ok_or_else(|| D::Error::custom(format!("epoch seconds out of range: {seconds}"))),
        }
    }

    fn from_epoch_seconds(seconds: f64) -> Option<DateTime<Utc>> {
        if !seconds.is_finite() {
            return None;
        }
        let whole = seconds.floor();
        let nanos = (((seconds - whole) * 1e9).round() as u32).min(999_999_999);
        DateTime::from_timestamp(whole as i64, nanos)
    }
}

//! # Relaymesh Core
//!
//! Core types, identity derivation, and errors for the Relaymesh overlay.
//!
//! This crate holds everything the relay engine and the HTTP boundary agree
//! on, without depending on either of them.
//!
//! ## Key Types
//!
//! - [`NodeId`] / [`LocalIdentity`]: stable node identifiers derived from a
//!   hardware identifier and a logical name
//! - [`NodeRecord`]: a known peer (including ourselves)
//! - [`Envelope`]: the three relayable message kinds sharing the [`Relayable`]
//!   TTL contract
//! - [`PeerTransport`]: the outbound network seam, with [`MockTransport`] for tests

pub mod envelope;
pub mod error;
pub mod identity;
pub mod mock_transport;
pub mod record;
pub mod transport;

// Re-export main types
pub use envelope::*;
pub use error::*;
pub use identity::*;
pub use mock_transport::*;
pub use record::*;
pub use transport::*;

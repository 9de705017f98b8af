//! Node identity derivation
//!
//! A node's [`NodeId`] is a SHA-256 digest of its hardware identifier and its
//! logical name. It is deterministic, so the same machine running under the
//! same name keeps its identity across restarts, and it is never randomly
//! generated.
//!
//! The hardware identifier comes from a [`HardwareIdSource`]:
//!
//! - [`SystemHardwareId`]: MAC address of the most physical-looking interface
//! - [`StaticHardwareId`]: a fixed value (configuration override, tests)

use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sysinfo::Networks;

use crate::error::IdentityError;

/// Stable identifier of an overlay node
///
/// Serialized as a plain string. Remote ids are accepted as-is from the wire;
/// only the local id is derived.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    /// Wrap an existing identifier string
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the identifier as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the identifier is empty
    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }

    /// Get a short display form (for logging)
    pub fn short_id(&self) -> &str {
        let end = self.0.char_indices().nth(8).map_or(self.0.len(), |(i, _)| i);
        &self.0[..end]
    }
}

impl Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for NodeId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Derive a node id from a hardware identifier and a logical name
///
/// The hash input is `"<len(hardware_id)>:<hardware_id>|<logical_name>"`.
/// The byte-length prefix fixes where the hardware identifier ends, so two
/// different pairs can never share a pre-image even if either field contains
/// the `|` separator.
pub fn derive_id(hardware_id: &str, logical_name: &str) -> NodeId {
    let mut hasher = Sha256::new();
    hasher.update(hardware_id.len().to_string().as_bytes());
    hasher.update(b":");
    hasher.update(hardware_id.as_bytes());
    hasher.update(b"|");
    hasher.update(logical_name.as_bytes());
    NodeId(hex::encode(hasher.finalize()))
}

/// Source of the hardware identifier used for identity derivation
pub trait HardwareIdSource: Send + Sync {
    /// Return a stable hardware identifier for this machine
    ///
    /// # Errors
    ///
    /// Returns [`IdentityError::HardwareUnavailable`] if no identifier can be
    /// determined. Implementations must not substitute a placeholder.
    fn hardware_id(&self) -> Result<String, IdentityError>;
}

/// Reads the MAC address of the machine's primary network interface
///
/// See [`select_hardware_mac`] for how the interface is chosen.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemHardwareId;

impl HardwareIdSource for SystemHardwareId {
    fn hardware_id(&self) -> Result<String, IdentityError> {
        let networks = Networks::new_with_refreshed_list();
        let interfaces = networks
            .list()
            .iter()
            .map(|(name, data)| (name.as_str(), data.mac_address().0));

        select_hardware_mac(interfaces).ok_or_else(|| {
            IdentityError::HardwareUnavailable(
                "no network interface with a hardware address".to_string(),
            )
        })
    }
}

/// Interface name prefixes of bridges, tunnels and container links
const VIRTUAL_PREFIXES: &[&str] = &[
    "br-", "docker", "veth", "virbr", "vnet", "tun", "tap", "cni", "flannel", "cali", "vmnet",
    "vboxnet", "wg", "zt",
];

fn is_virtual_interface(name: &str) -> bool {
    VIRTUAL_PREFIXES.iter().any(|prefix| name.starts_with(prefix))
}

fn is_locally_administered(mac: &[u8; 6]) -> bool {
    mac[0] & 0x02 != 0
}

/// Pick the MAC address to derive identity from
///
/// Loopback and all-zero addresses never qualify. Among the rest, real
/// interface names beat virtual ones, then globally unique (burned-in) MACs
/// beat locally administered ones, then the name breaks ties. A locally
/// administered MAC is still used when nothing better exists, since some
/// cloud NICs only have those. The result is lowercase and colon separated.
pub fn select_hardware_mac<'a>(
    interfaces: impl IntoIterator<Item = (&'a str, [u8; 6])>,
) -> Option<String> {
    interfaces
        .into_iter()
        .filter(|(name, mac)| *name != "lo" && mac.iter().any(|b| *b != 0))
        .min_by_key(|(name, mac)| (is_virtual_interface(name), is_locally_administered(mac), *name))
        .map(|(_, mac)| {
            mac.iter()
                .map(|b| format!("{b:02x}"))
                .collect::<Vec<_>>()
                .join(":")
        })
}

/// A fixed hardware identifier
#[derive(Debug, Clone)]
pub struct StaticHardwareId(pub String);

impl HardwareIdSource for StaticHardwareId {
    fn hardware_id(&self) -> Result<String, IdentityError> {
        if self.0.trim().is_empty() {
            return Err(IdentityError::HardwareUnavailable(
                "configured hardware id is empty".to_string(),
            ));
        }
        Ok(self.0.clone())
    }
}

/// The local node's derived identity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalIdentity {
    id: NodeId,
    name: String,
}

impl LocalIdentity {
    /// Derive the local identity from a hardware source and a logical name
    pub fn derive<S: HardwareIdSource + ?Sized>(
        source: &S,
        name: &str,
    ) -> Result<Self, IdentityError> {
        if name.trim().is_empty() {
            return Err(IdentityError::EmptyName);
        }
        let hardware_id = source.hardware_id()?;
        Ok(Self {
            id: derive_id(&hardware_id, name),
            name: name.to_string(),
        })
    }

    /// Our node id
    pub fn id(&self) -> &NodeId {
        &self.id
    }

    /// Our logical name
    pub fn name(&self) -> &str {
        &self.name
    }
}

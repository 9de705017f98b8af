//! Configuration for a Relaymesh node
//!
//! Loaded from TOML; every field has a default, so a file only needs the
//! values it changes. The binary layers command-line flags and environment
//! variables on top.
//!
//! ```toml
//! name = "edge-1"
//! listen = "0.0.0.0:8080"
//! address = "http://10.0.0.5:8080"
//! seeds = ["http://10.0.0.1:8080"]
//!
//! [relay]
//! default_ttl = 6
//!
//! [bootstrap]
//! pull_peers = true
//!
//! [log]
//! level = "info,relaymesh_routing=debug"
//! ```

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use relaymesh_core::Ttl;
use relaymesh_logging::LogConfig;
use relaymesh_routing::{BootstrapConfig, RelayConfig};
use serde::{Deserialize, Serialize};

use crate::error::{NodeError, NodeResult};

/// Configuration for a [`RelayNode`](crate::RelayNode)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Logical node name, part of the identity
    pub name: String,
    /// Socket address the HTTP API binds to
    pub listen: SocketAddr,
    /// Base URL other nodes use to reach us; derived from `listen` if unset
    pub address: Option<String>,
    /// Whether this node is publicly reachable
    pub exposed: bool,
    /// Opaque public key advertised in our record
    pub public_key: String,
    /// Seed node addresses to register with at startup
    pub seeds: Vec<String>,
    /// Hardware identifier override (skips interface discovery)
    pub hardware_id: Option<String>,
    /// Relay engine settings
    pub relay: RelaySettings,
    /// Bootstrap settings
    pub bootstrap: BootstrapSettings,
    /// Logging configuration
    pub log: LogConfig,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            name: "relaymesh".to_string(),
            listen: SocketAddr::from(([0, 0, 0, 0], 8080)),
            address: None,
            exposed: false,
            public_key: String::new(),
            seeds: Vec::new(),
            hardware_id: None,
            relay: RelaySettings::default(),
            bootstrap: BootstrapSettings::default(),
            log: LogConfig::default(),
        }
    }
}

/// Relay engine settings as they appear in the config file
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelaySettings {
    /// Hop budget for envelopes this node originates
    pub default_ttl: Ttl,
    /// Timeout for each outbound send, in milliseconds
    pub send_timeout_ms: u64,
    /// Queue depth of each per-peer link
    pub link_queue_capacity: usize,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            default_ttl: 8,
            send_timeout_ms: 5_000,
            link_queue_capacity: 256,
        }
    }
}

/// Bootstrap settings as they appear in the config file
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BootstrapSettings {
    /// Timeout for each seed call, in milliseconds
    pub timeout_ms: u64,
    /// Import each seed's peer list after registering
    pub pull_peers: bool,
}

impl Default for BootstrapSettings {
    fn default() -> Self {
        Self {
            timeout_ms: 5_000,
            pull_peers: false,
        }
    }
}

impl NodeConfig {
    /// Load a configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> NodeResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    /// Parse a configuration from TOML text
    pub fn from_toml_str(contents: &str) -> NodeResult<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Set the logical node name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the listen address
    pub fn with_listen(mut self, listen: SocketAddr) -> Self {
        self.listen = listen;
        self
    }

    /// Set the advertised base URL
    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }

    /// Mark the node as publicly reachable or not
    pub fn with_exposed(mut self, exposed: bool) -> Self {
        self.exposed = exposed;
        self
    }

    /// Set the advertised public key
    pub fn with_public_key(mut self, public_key: impl Into<String>) -> Self {
        self.public_key = public_key.into();
        self
    }

    /// Replace the seed list
    pub fn with_seeds(mut self, seeds: Vec<String>) -> Self {
        self.seeds = seeds;
        self
    }

    /// Override the hardware identifier
    pub fn with_hardware_id(mut self, hardware_id: impl Into<String>) -> Self {
        self.hardware_id = Some(hardware_id.into());
        self
    }

    /// Set the hop budget for originated envelopes
    pub fn with_default_ttl(mut self, ttl: Ttl) -> Self {
        self.relay.default_ttl = ttl;
        self
    }

    /// Set the per-send timeout
    pub fn with_send_timeout(mut self, timeout: Duration) -> Self {
        self.relay.send_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Enable or disable importing seed peer lists
    pub fn with_pull_peers(mut self, pull_peers: bool) -> Self {
        self.bootstrap.pull_peers = pull_peers;
        self
    }

    /// Set the logging configuration
    pub fn with_log(mut self, log: LogConfig) -> Self {
        self.log = log;
        self
    }

    /// The base URL advertised in our record
    pub fn advertised_address(&self) -> String {
        match &self.address {
            Some(address) => address.trim_end_matches('/').to_string(),
            None => format!("http://{}", self.listen),
        }
    }

    /// Relay engine configuration
    pub fn relay_config(&self) -> RelayConfig {
        RelayConfig::default()
            .with_default_ttl(self.relay.default_ttl)
            .with_send_timeout(Duration::from_millis(self.relay.send_timeout_ms))
            .with_link_queue_capacity(self.relay.link_queue_capacity)
    }

    /// Bootstrap configuration
    pub fn bootstrap_config(&self) -> BootstrapConfig {
        BootstrapConfig {
            timeout: Duration::from_millis(self.bootstrap.timeout_ms),
            pull_peers: self.bootstrap.pull_peers,
        }
    }

    /// Check the configuration before a node is built from it
    pub fn validate(&self) -> NodeResult<()> {
        if self.name.trim().is_empty() {
            return Err(NodeError::Config("name must not be empty".to_string()));
        }
        let address = self.advertised_address();
        if !(address.starts_with("http://") || address.starts_with("https://")) {
            return Err(NodeError::Config(format!(
                "address must be an http(s) url, got {:?}",
                address
            )));
        }
        if self.bootstrap.timeout_ms == 0 {
            return Err(NodeError::Config("bootstrap timeout is zero".to_string()));
        }
        self.relay_config().validate()?;
        self.log
            .validate()
            .map_err(|e| NodeError::Config(e.to_string()))?;
        Ok(())
    }
}

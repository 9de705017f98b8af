//! Seed registration at startup
//!
//! The [`BootstrapClient`] pushes the local [`NodeRecord`] to every
//! configured seed address. Attempts run concurrently and independently: an
//! unreachable seed never prevents registration with the others, and no
//! outcome is fatal.
//!
//! Bootstrapping is push-only by default. Seeds learn about us, but we learn
//! about nobody until peers register with us. Setting
//! [`BootstrapConfig::pull_peers`] additionally imports each reachable seed's
//! peer list.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use relaymesh_core::{NodeRecord, PeerTransport, TransportError};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::registry::PeerRegistry;

/// Bootstrap behaviour
#[derive(Debug, Clone)]
pub struct BootstrapConfig {
    /// Upper bound on each seed call
    pub timeout: Duration,
    /// Import each seed's peer list after registering with it
    pub pull_peers: bool,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            pull_peers: false,
        }
    }
}

/// Outcome of one bootstrap run
#[derive(Debug, Clone, Default)]
pub struct BootstrapReport {
    /// Seeds that accepted our registration
    pub registered: Vec<String>,
    /// Seeds that could not be reached or refused
    pub failed: Vec<(String, TransportError)>,
    /// Peers imported from seed peer lists
    pub imported: usize,
}

/// Registers the local node with a fixed list of seeds
pub struct BootstrapClient<T: PeerTransport> {
    transport: Arc<T>,
    seeds: Vec<String>,
    config: BootstrapConfig,
}

impl<T: PeerTransport> BootstrapClient<T> {
    /// Create a client for the given seed addresses
    pub fn new(transport: Arc<T>, seeds: Vec<String>, config: BootstrapConfig) -> Self {
        let seeds = seeds
            .into_iter()
            .map(|s| s.trim().trim_end_matches('/').to_string())
            .filter(|s| !s.is_empty())
            .collect();
        Self {
            transport,
            seeds,
            config,
        }
    }

    /// Configured seed addresses
    pub fn seeds(&self) -> &[String] {
        &self.seeds
    }

    /// Register with every seed concurrently
    ///
    /// Imported peers (with `pull_peers`) are added to `registry`; our own
    /// record is never imported.
    pub async fn run(&self, local: &NodeRecord, registry: &Arc<PeerRegistry>) -> BootstrapReport {
        let mut attempts = JoinSet::new();
        let mut seed_of_task = HashMap::with_capacity(self.seeds.len());

        for seed in &self.seeds {
            let transport = Arc::clone(&self.transport);
            let registry = Arc::clone(registry);
            let local = local.clone();
            let config = self.config.clone();
            let task_seed = seed.clone();

            let handle = attempts.spawn(async move {
                register_with(transport.as_ref(), &task_seed, &local, &registry, &config).await
            });
            seed_of_task.insert(handle.id(), seed.clone());
        }

        let mut report = BootstrapReport::default();
        while let Some(joined) = attempts.join_next_with_id().await {
            let (id, outcome) = match joined {
                Ok((id, outcome)) => (id, Ok(outcome)),
                Err(e) => (e.id(), Err(e)),
            };
            let Some(seed) = seed_of_task.remove(&id) else {
                continue;
            };
            let outcome = outcome.unwrap_or_else(|e| {
                Err(TransportError::Unreachable {
                    address: seed.clone(),
                    reason: format!("registration task failed: {e}"),
                })
            });
            match outcome {
                Ok(imported) => {
                    info!(seed = %seed, imported, "Registered with bootstrap node");
                    report.registered.push(seed);
                    report.imported += imported;
                }
                Err(e) => {
                    warn!(seed = %seed, error = %e, "Failed to register with bootstrap node");
                    report.failed.push((seed, e));
                }
            }
        }
        report
    }
}

/// Register with one seed and optionally import its peers
async fn register_with<T: PeerTransport>(
    transport: &T,
    seed: &str,
    local: &NodeRecord,
    registry: &PeerRegistry,
    config: &BootstrapConfig,
) -> Result<usize, TransportError> {
    tokio::time::timeout(config.timeout, transport.register(seed, local))
        .await
        .map_err(|_| TransportError::Timeout(seed.to_string()))??;

    if !config.pull_peers {
        return Ok(0);
    }

    let peers = match tokio::time::timeout(config.timeout, transport.fetch_peers(seed)).await {
        Ok(Ok(peers)) => peers,
        Ok(Err(e)) => {
            warn!(seed = %seed, error = %e, "Registered, but could not fetch peer list");
            return Ok(0);
        }
        Err(_) => {
            warn!(seed = %seed, "Registered, but peer list fetch timed out");
            return Ok(0);
        }
    };

    let mut imported = 0;
    for peer in peers {
        if peer.id == local.id || peer.validate().is_err() {
            continue;
        }
        debug!(seed = %seed, peer = %peer.id.short_id(), "Importing peer from seed");
        registry.register(peer);
        imported += 1;
    }
    Ok(imported)
}

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use relaymesh_core::{HardwareIdSource, LocalIdentity, StaticHardwareId, SystemHardwareId};
use relaymesh_logging::MeshSubscriberBuilder;
use relaymesh_node::{NodeConfig, RelayNode};
use tokio::net::TcpListener;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "relaymesh", version, about = "Minimal peer-to-peer overlay node")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start a node: derive identity, serve the API, register with seeds
    Run {
        /// TOML configuration file
        #[arg(short, long, env = "RELAYMESH_CONFIG")]
        config: Option<PathBuf>,

        /// Logical node name
        #[arg(long, env = "RELAYMESH_NAME")]
        name: Option<String>,

        /// Socket address to listen on
        #[arg(long, env = "RELAYMESH_LISTEN")]
        listen: Option<SocketAddr>,

        /// Base URL peers use to reach this node
        #[arg(long, env = "RELAYMESH_ADDRESS")]
        address: Option<String>,

        /// Seed node address (repeatable)
        #[arg(long = "seed", env = "RELAYMESH_SEEDS", value_delimiter = ',')]
        seeds: Vec<String>,

        /// Hop budget for originated envelopes
        #[arg(long)]
        ttl: Option<i64>,

        /// Import each seed's peer list after registering
        #[arg(long)]
        pull_peers: bool,

        /// Hardware identifier override
        #[arg(long, env = "RELAYMESH_HARDWARE_ID")]
        hardware_id: Option<String>,

        /// Log level (overridden by RUST_LOG)
        #[arg(long)]
        log_level: Option<String>,
    },

    /// Print the node id derived for a name on this machine
    Id {
        /// Logical node name
        #[arg(long)]
        name: String,

        /// Hardware identifier override
        #[arg(long)]
        hardware_id: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Run {
            config,
            name,
            listen,
            address,
            seeds,
            ttl,
            pull_peers,
            hardware_id,
            log_level,
        } => {
            let mut config = match config {
                Some(path) => NodeConfig::from_file(&path)
                    .with_context(|| format!("failed to load config from {}", path.display()))?,
                None => NodeConfig::default(),
            };
            if let Some(name) = name {
                config.name = name;
            }
            if let Some(listen) = listen {
                config.listen = listen;
            }
            if let Some(address) = address {
                config.address = Some(address);
            }
            if !seeds.is_empty() {
                config.seeds = seeds;
            }
            if let Some(ttl) = ttl {
                config.relay.default_ttl = ttl;
            }
            if pull_peers {
                config.bootstrap.pull_peers = true;
            }
            if let Some(hardware_id) = hardware_id {
                config.hardware_id = Some(hardware_id);
            }

            let mut logging = MeshSubscriberBuilder::new().with_config(config.log.clone());
            if let Some(level) = log_level {
                logging = logging.with_level(level);
            }
            let _log_guard = logging.init();

            run(config).await
        }

        Command::Id { name, hardware_id } => {
            let source: Box<dyn HardwareIdSource> = match hardware_id {
                Some(hardware_id) => Box::new(StaticHardwareId(hardware_id)),
                None => Box::new(SystemHardwareId),
            };
            let identity = LocalIdentity::derive(source.as_ref(), &name)
                .context("failed to derive node identity")?;
            println!("{}", identity.id());
            Ok(())
        }
    }
}

async fn run(mut config: NodeConfig) -> anyhow::Result<()> {
    let listener = TcpListener::bind(config.listen)
        .await
        .with_context(|| format!("failed to bind {}", config.listen))?;
    if config.address.is_none() {
        config.address = Some(format!("http://{}", listener.local_addr()?));
    }

    let node = Arc::new(RelayNode::new(config).context("failed to start node")?);

    let server = tokio::spawn({
        let node = Arc::clone(&node);
        async move {
            node.serve_with_shutdown(listener, async {
                let _ = tokio::signal::ctrl_c().await;
            })
            .await
        }
    });

    let report = node.bootstrap().await;
    if !report.failed.is_empty() {
        warn!(failed = report.failed.len(), "Some seeds could not be reached");
    }

    server.await.context("server task panicked")??;
    info!("Node stopped");
    Ok(())
}

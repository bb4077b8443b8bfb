//! ha2ha-node — the HA2HA federation host binary.
//!
//! Startup sequence:
//!   1. Load (or create) the agent identity
//!   2. Open the audit chain (verified) and trust store
//!   3. Restore the approval queue and load the approver profile
//!   4. Wire the ports and start the HTTP endpoint surface
//!   5. Run the timeout sweeper until shutdown

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::info;

use ha2ha_core::types::AgentId;
use ha2ha_node::{expand_tilde, Ha2haConfig, Node, NodeOptions};
use ha2ha_rpc::RpcServer;

#[derive(Parser, Debug)]
#[command(
    name = "ha2ha-node",
    version,
    about = "HA2HA federation node — human-approved cross-agent task execution"
)]
struct Args {
    /// Directory for identity, trust store, approval queue and audit log.
    #[arg(long, default_value = "~/.ha2ha")]
    data_dir: PathBuf,

    /// Host configuration document (YAML). Defaults apply when absent.
    #[arg(long)]
    config: Option<PathBuf>,

    /// HTTP listen address for the endpoint surface.
    #[arg(long, default_value = "127.0.0.1:7423")]
    listen: SocketAddr,

    /// This agent's identifier, as advertised on its card.
    #[arg(long, default_value = "local.agent")]
    agent_id: String,

    /// Optional human-readable display name.
    #[arg(long)]
    name: Option<String>,

    /// Public base URL advertised on the card. Defaults to the listen
    /// address over http.
    #[arg(long)]
    url: Option<String>,

    /// Capabilities advertised on the card.
    #[arg(long, value_delimiter = ',')]
    capabilities: Vec<String>,

    /// Seconds between timeout sweeps.
    #[arg(long, default_value_t = 30)]
    sweep_interval: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,ha2ha=debug".parse().unwrap()),
        )
        .init();

    let args = Args::parse();
    info!("HA2HA node starting");

    let config = match &args.config {
        Some(path) => Ha2haConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => Ha2haConfig::default(),
    };
    if !config.enabled {
        info!("ha2ha is disabled in the configuration; exiting");
        return Ok(());
    }

    let node = Node::build(NodeOptions {
        data_dir: expand_tilde(&args.data_dir),
        agent_id: AgentId::new(args.agent_id),
        display_name: args.name,
        url: args
            .url
            .unwrap_or_else(|| format!("http://{}", args.listen)),
        capabilities: args.capabilities,
        config,
    })?;

    let sweeper = node.spawn_sweeper(Duration::from_secs(args.sweep_interval));

    let server = RpcServer::new(node.rpc_state());
    let handle = server.start(args.listen).await.context("starting server")?;
    info!(addr = %handle.addr, agent_id = %node.identity.agent_id, "node ready");

    tokio::signal::ctrl_c().await.context("waiting for ctrl-c")?;
    info!("shutting down");
    // Stopping the owner stops the sweeper.
    sweeper.abort();
    handle.stop();
    Ok(())
}

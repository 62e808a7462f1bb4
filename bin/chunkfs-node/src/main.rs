//! chunkfs Storage Node
//!
//! Serves the chunk store over HTTP and keeps the node registered with the
//! coordinator.

use anyhow::{Context, Result};
use chunkfs_client::CoordinatorClient;
use chunkfs_common::Config;
use chunkfs_node::{ChunkDir, HeartbeatTask, NodeService, router};
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Slack on top of the chunk size for multipart framing
const MULTIPART_OVERHEAD: usize = 64 * 1024;

#[derive(Parser, Debug)]
#[command(name = "chunkfs-node")]
#[command(about = "chunkfs storage node")]
#[command(version)]
struct Args {
    /// Node identifier reported to the coordinator
    #[arg(long)]
    node_id: String,

    /// Configuration file path (TOML or JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listen address; defaults to this node's entry under `nodes`
    #[arg(short, long)]
    listen: Option<String>,

    /// Base URL the coordinator uses to reach this node
    #[arg(long)]
    advertise: Option<String>,

    /// Coordinator base URL; defaults to `coordinator.host`/`coordinator.port`
    #[arg(long)]
    coordinator: Option<String>,

    /// Chunk directory
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| args.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load(args.config.as_deref())?;
    let entry = config.find_node(&args.node_id);

    let listen = args
        .listen
        .clone()
        .or_else(|| entry.map(chunkfs_common::config::NodeEndpoint::listen_addr))
        .with_context(|| {
            format!(
                "node '{}' is not configured under [nodes]; pass --listen",
                args.node_id
            )
        })?;
    let addr: SocketAddr = listen
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid listen address {}: {}", listen, e))?;

    let advertise = args
        .advertise
        .clone()
        .or_else(|| entry.map(chunkfs_common::config::NodeEndpoint::base_url))
        .unwrap_or_else(|| format!("http://{addr}"));
    let coordinator = args
        .coordinator
        .clone()
        .unwrap_or_else(|| config.coordinator.base_url());
    let data_dir = args
        .data_dir
        .clone()
        .unwrap_or_else(|| PathBuf::from(format!("./{}-data", args.node_id)));

    info!("Starting chunkfs storage node {}", args.node_id);
    info!("Coordinator: {}", coordinator);
    info!("Advertising as {}", advertise);

    let chunks = ChunkDir::open(&data_dir)
        .with_context(|| format!("failed to open chunk directory {}", data_dir.display()))?;
    let service = Arc::new(NodeService::new(args.node_id.clone(), chunks));
    let app = router(service, config.chunk_size_bytes + MULTIPART_OVERHEAD);

    let client = CoordinatorClient::new(coordinator, config.timeouts.heartbeat())?;
    let heartbeat = HeartbeatTask::new(
        client,
        args.node_id.clone(),
        advertise,
        config.liveness.heartbeat_interval(),
        config.liveness.retry_interval(),
    );
    let heartbeat_handle = tokio::spawn(heartbeat.run());

    info!("Storage node listening on {}", addr);
    let listener = TcpListener::bind(addr).await?;

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            info!("Shutting down...");
        })
        .await?;

    heartbeat_handle.abort();

    info!("Storage node shut down gracefully");

    Ok(())
}

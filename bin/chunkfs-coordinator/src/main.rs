//! chunkfs Coordinator
//!
//! Accepts uploads, replicates chunks to the configured storage nodes,
//! tracks storage node liveness and serves downloads.

use anyhow::Result;
use chunkfs_client::HttpChunkClient;
use chunkfs_common::Config;
use chunkfs_coordinator::{AppState, router};
use chunkfs_meta_store::MetaStore;
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "chunkfs-coordinator")]
#[command(about = "chunkfs coordinator service")]
#[command(version)]
struct Args {
    /// Configuration file path (TOML or JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listen address, overrides `coordinator.host`/`coordinator.port`
    #[arg(short, long)]
    listen: Option<String>,

    /// Metadata snapshot path, overrides `coordinator.snapshot_path`
    #[arg(long)]
    snapshot: Option<PathBuf>,

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

    let mut config = Config::load(args.config.as_deref())?;
    if let Some(snapshot) = args.snapshot {
        config.coordinator.snapshot_path = snapshot;
    }
    let listen = args
        .listen
        .unwrap_or_else(|| config.coordinator.listen_addr());

    info!("Starting chunkfs coordinator");
    info!("Chunk size: {} bytes", config.chunk_size_bytes);
    for (name, node) in &config.nodes {
        info!("Storage node {}: {}", name, node.base_url());
    }

    let store = Arc::new(MetaStore::open(&config.coordinator.snapshot_path)?);
    let transport = Arc::new(HttpChunkClient::new(
        config.timeouts.push(),
        config.timeouts.fetch(),
    )?);
    let state = Arc::new(AppState::new(&config, store, transport));
    let app = router(state, config.coordinator.max_upload_bytes);

    let addr: SocketAddr = listen
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid listen address {}: {}", listen, e))?;

    info!("Coordinator listening on {}", addr);
    let listener = TcpListener::bind(addr).await?;

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            info!("Shutting down...");
        })
        .await?;

    info!("Coordinator shut down gracefully");

    Ok(())
}

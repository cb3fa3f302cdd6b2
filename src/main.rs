// # Flock Server
//
// Main entry point. Loads the per-node properties file, initializes
// structured logging and runs either a backend node or a balancer node
// until interrupted.

use flock::config::NodeConfig;
use flock::node::{BackendNode, BalancerNode};
use flock::{Result, VERSION};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_target(false)
        .with_thread_ids(true)
        .with_level(true)
        .init();

    let config_path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("FLOCK_CONFIG").ok());
    let config = match &config_path {
        Some(path) => NodeConfig::load(path)?,
        None => NodeConfig::default(),
    };

    info!("flock {} starting", VERSION);
    info!(
        "node '{}' at {} (role: {})",
        config.server_id,
        config.server_address,
        if config.is_balancer { "balancer" } else { "backend" }
    );
    match &config_path {
        Some(path) => info!("configuration loaded from {}", path),
        None => info!("no configuration file given, using defaults"),
    }
    info!(
        "sync port {} | service base port {} | data directory {}",
        config.sync_port,
        config.server_port,
        config.data_directory.display()
    );

    if config.is_balancer {
        let node = BalancerNode::start(config).await?;
        wait_for_shutdown().await;
        node.stop().await;
    } else {
        let node = BackendNode::start(config).await?;
        wait_for_shutdown().await;
        node.stop().await;
    }

    info!("shutdown complete");
    Ok(())
}

async fn wait_for_shutdown() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("signal handler error: {}", e);
    } else {
        info!("interrupt received, shutting down");
    }
}

//! RelayNet Ledger Node - Main Binary
//!
//! Incentive ledger for the relay network with:
//! - sled persistent storage
//! - JSON-RPC 2.0 over HTTP
//! - Prometheus metrics
//! - Automatic daily reward settlement

use anyhow::Result;
use clap::Parser;
use relaynet_node::{LedgerNode, NodeConfig};
use std::path::PathBuf;
use tokio::signal;
use tracing::{error, info};

/// RelayNet Ledger Node CLI
#[derive(Parser)]
#[command(name = "relaynet-node")]
#[command(about = "RelayNet incentive ledger node")]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "/etc/relaynet/node.toml", env = "RELAYNET_CONFIG")]
    config: PathBuf,

    /// Data directory (overrides config)
    #[arg(long, env = "RELAYNET_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Override RPC listen address
    #[arg(long, env = "RELAYNET_RPC_ADDR")]
    listen: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Subcommand
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Parser)]
enum Command {
    /// Show node version
    Version,

    /// Load and validate the configuration, then exit
    CheckConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("{},relaynet_node=debug", log_level).into())
        )
        .with_target(true)
        .with_thread_ids(true)
        .with_line_number(true)
        .init();

    if let Some(Command::Version) = cli.command {
        println!("RelayNet Node v{}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    // Load configuration
    let mut config = NodeConfig::load(&cli.config)?;
    info!("Loaded configuration from {:?}", cli.config);

    // Apply CLI overrides
    if let Some(data_dir) = cli.data_dir {
        config.node.data_dir = data_dir;
    }
    if let Some(listen_addr) = cli.listen {
        config.rpc.listen_addr = listen_addr;
    }
    if config.node.id.is_empty() {
        config.node.id = format!("relaynet-{}", uuid::Uuid::new_v4());
    }

    // Validate configuration
    config.validate()?;

    if let Some(Command::CheckConfig) = cli.command {
        println!("Configuration OK: {:?}", cli.config);
        return Ok(());
    }

    info!("Starting RelayNet Node v{}", env!("CARGO_PKG_VERSION"));

    let mut node = LedgerNode::new(config).await?;
    info!("Ledger node initialized");

    // Run node with graceful shutdown
    tokio::select! {
        result = node.run() => {
            if let Err(e) = result {
                error!("Node error: {}", e);
                return Err(e);
            }
        }
        _ = signal::ctrl_c() => {
            info!("Received shutdown signal (Ctrl+C)");
        }
        _ = shutdown_signal() => {
            info!("Received shutdown signal (SIGTERM)");
        }
    }

    node.shutdown().await?;
    info!("Node stopped gracefully");
    Ok(())
}

/// Cross-platform shutdown signal handling
#[cfg(unix)]
async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            sigterm.recv().await;
        }
        Err(e) => {
            error!("Failed to register SIGTERM handler: {}", e);
            std::future::pending::<()>().await
        }
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() {
    // On non-Unix systems, only Ctrl+C is supported
    std::future::pending::<()>().await
}

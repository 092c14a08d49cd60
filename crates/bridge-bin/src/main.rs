//! Daemon entrypoint: config, wiring, and signal-driven shutdown.

use anyhow::Context;
use bridge_config_and_utils::{init_logging, Config};
use bridge_database::BridgeDb;
use clap::Parser;
use conversation_sync_engine::{Bridge, BridgeSettings, HostexRemoteChannel, MatrixChatChannel};
use hostex_api_client::HostexClient;
use matrix_chat_client::MatrixClient;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Parser)]
#[command(
    name = "hostex-matrix-bridge",
    about = "Bridges Hostex conversations into Matrix rooms",
    version
)]
struct Cli {
    /// Path to the YAML configuration file.
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Log level override (trace, debug, info, warn, error).
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load(&cli.config)
        .with_context(|| format!("failed to load config from {}", cli.config.display()))?;
    if let Some(level) = cli.log_level {
        config.log_level = level;
    }
    config.validate().context("invalid configuration")?;
    init_logging(&config.log_level);

    info!(config = %cli.config.display(), "Starting hostex-matrix-bridge");

    let db = BridgeDb::open(Path::new(&config.database_path))
        .await
        .context("failed to open database")?;

    let remote = Arc::new(HostexRemoteChannel::new(HostexClient::new(
        config.hostex.api_url.clone(),
        config.hostex.token.clone(),
    )));
    let chat = Arc::new(MatrixChatChannel::new(
        MatrixClient::new(config.homeserver.address.clone()),
        config.homeserver.user_id.clone(),
        config.homeserver.password.clone(),
        config.homeserver.domain.clone(),
    ));

    let bridge = Bridge::new(remote, chat, db, BridgeSettings::from_config(&config));
    bridge.start().await.context("failed to start bridge")?;

    wait_for_shutdown().await;

    bridge.stop().await;
    info!("Shutdown complete");
    Ok(())
}

/// Block until SIGINT or SIGTERM arrives.
async fn wait_for_shutdown() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm =
            signal(SignalKind::terminate()).expect("failed to register SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => info!("Received SIGINT, shutting down"),
            _ = sigterm.recv() => info!("Received SIGTERM, shutting down"),
        }
    }

    #[cfg(not(unix))]
    {
        let _ = ctrl_c.await;
        info!("Received Ctrl-C, shutting down");
    }
}

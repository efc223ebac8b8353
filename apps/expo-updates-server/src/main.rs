use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use expo_updates_core::FsBundleStore;
use expo_updates_server::config::{Cli, ServerConfig};
use expo_updates_server::routes::build_router;
use expo_updates_server::state::AppState;
use expo_updates_server::telemetry::init_tracing;
use tokio::signal;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let config = ServerConfig::try_from(Cli::parse())?;
    init_tracing()?;

    let store = Arc::new(FsBundleStore::new(config.updates_dir.clone()));
    let state = AppState::new(store, config.protocol_config());
    let router = build_router(state);

    let listener = tokio::net::TcpListener::bind(config.listen_addr)
        .await
        .context("failed to bind listener")?;

    info!(
        addr = %config.listen_addr,
        updates_dir = %config.updates_dir.display(),
        assets_endpoint = %config.assets_endpoint,
        signing_key = ?config.private_key_path,
        "expo-updates-server listening"
    );

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server shutdown with error")?;

    info!(
        grace_seconds = config.shutdown_grace.as_secs(),
        "shutdown signal received; sleeping for graceful period"
    );
    tokio::time::sleep(config.shutdown_grace).await;
    info!("graceful shutdown complete");

    Ok(())
}

async fn shutdown_signal() {
    let _ = signal::ctrl_c().await;
}

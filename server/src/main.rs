use anyhow::Context;
use clap::Parser;
use fleet_server::api;
use fleet_server::command::StaleCommandMonitor;
use fleet_server::config::{Cli, ServerConfig};
use fleet_server::store::{MemoryStore, SqliteStore, Store};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let config = ServerConfig::try_from(Cli::parse())?;

    let store: Arc<dyn Store> = match &config.database_url {
        Some(url) => {
            info!("Using SQLite store at {}", url);
            Arc::new(SqliteStore::connect(url).await?)
        }
        None => {
            warn!("No database configured, state is kept in memory only");
            Arc::new(MemoryStore::new())
        }
    };

    let state = api::AppState::new(store, config.active_window);

    let monitor = StaleCommandMonitor::new(
        state.commands.clone(),
        config.stale_check_interval,
        config.stale_after,
    );
    tokio::spawn(async move {
        monitor.run().await;
    });

    let listener = TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.listen_addr))?;
    info!("Dispatch API listening on {}", config.listen_addr);
    info!("  Active window: {}s", state.fleet.active_window().as_secs());

    axum::serve(listener, api::router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown requested, draining connections");
}

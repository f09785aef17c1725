mod agent;
mod command;
mod config;
mod transport;

use agent::AgentLoop;
use config::AgentConfig;
use transport::HttpTransport;

use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let config = AgentConfig::from_args()?;

    info!("Agent starting: {}", config.machine_id);
    info!("  Name: {}", config.machine_name);
    info!(
        "  Execution timeout: {}s, workers: {}",
        config.execution_timeout.as_secs(),
        config.max_concurrent_commands
    );

    let transport = HttpTransport::new(&config.api_url, config.retry)?;
    info!("  Dispatch API: {}", transport.api_url());
    let agent = AgentLoop::new(&config, transport);

    // In-flight scripts are killed on exit; unreported commands stay pending
    tokio::select! {
        _ = agent.run() => {}
        result = tokio::signal::ctrl_c() => match result {
            Ok(()) => info!("Agent stopping"),
            Err(e) => {
                warn!("Failed to listen for Ctrl-C: {}", e);
                agent.run().await;
            }
        },
    }

    Ok(())
}

//! Server configuration

use anyhow::Context;
use clap::Parser;
use shellfleet_shared::timing;
use std::net::SocketAddr;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub listen_addr: SocketAddr,
    /// `None` keeps all state in memory
    pub database_url: Option<String>,
    pub active_window: Duration,
    pub stale_after: Duration,
    pub stale_check_interval: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 8000)),
            database_url: None,
            active_window: timing::ACTIVE_WINDOW,
            stale_after: Duration::from_secs(3600),
            stale_check_interval: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Parser)]
#[command(
    name = "fleet-server",
    version,
    about = "Dispatches shell scripts to registered machines and collects their output"
)]
pub struct Cli {
    /// Address the HTTP API listens on.
    #[arg(long, env = "FLEET_LISTEN_ADDR", default_value = "0.0.0.0:8000")]
    listen_addr: String,

    /// SQLite database URL (e.g. sqlite://fleet.db). State is kept in memory when unset.
    #[arg(long, env = "FLEET_DATABASE_URL")]
    database_url: Option<String>,

    /// Machines seen within this many seconds are listed as active.
    #[arg(long, env = "FLEET_ACTIVE_WINDOW_SECS", default_value_t = 300)]
    active_window_secs: u64,

    /// Pending commands older than this many seconds are reported in the log.
    #[arg(long, env = "FLEET_STALE_AFTER_SECS", default_value_t = 3600)]
    stale_after_secs: u64,

    /// How often to look for stale pending commands.
    #[arg(long, env = "FLEET_STALE_CHECK_SECS", default_value_t = 60)]
    stale_check_secs: u64,
}

impl TryFrom<Cli> for ServerConfig {
    type Error = anyhow::Error;

    fn try_from(cli: Cli) -> Result<Self, Self::Error> {
        let listen_addr: SocketAddr = cli
            .listen_addr
            .parse()
            .with_context(|| format!("invalid listen address: {}", cli.listen_addr))?;
        if cli.stale_check_secs == 0 {
            anyhow::bail!("stale check interval must be at least one second");
        }
        Ok(ServerConfig {
            listen_addr,
            database_url: cli.database_url.filter(|url| !url.trim().is_empty()),
            active_window: Duration::from_secs(cli.active_window_secs),
            stale_after: Duration::from_secs(cli.stale_after_secs),
            stale_check_interval: Duration::from_secs(cli.stale_check_secs),
        })
    }
}

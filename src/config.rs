//! Agent configuration

use crate::transport::RetryPolicy;
use anyhow::Context;
use clap::Parser;
use shellfleet_shared::timing;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

const MACHINE_ID_FILE: &str = "/etc/machine-id";

/// Settings of one agent process
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub api_url: String,
    /// Stable identity reported on every heartbeat
    pub machine_id: String,
    /// Display name operators schedule against
    pub machine_name: String,
    pub heartbeat_interval: Duration,
    pub poll_interval: Duration,
    pub execution_timeout: Duration,
    pub shell: String,
    /// 1 runs the pending list strictly in order
    pub max_concurrent_commands: usize,
    pub retry: RetryPolicy,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:8000".into(),
            machine_id: "machine-001".into(),
            machine_name: "machine_localhost".into(),
            heartbeat_interval: timing::HEARTBEAT_INTERVAL,
            poll_interval: timing::POLL_INTERVAL,
            execution_timeout: timing::EXECUTION_TIMEOUT,
            shell: "/bin/sh".into(),
            max_concurrent_commands: 1,
            retry: RetryPolicy::default(),
        }
    }
}

#[derive(Debug, Parser)]
#[command(
    name = "fleet-agent",
    version,
    about = "Registers this machine with the dispatch server and runs the scripts scheduled for it"
)]
pub struct Cli {
    /// Base URL of the dispatch API.
    #[arg(long, env = "FLEET_API_URL", default_value = "http://localhost:8000")]
    api_url: String,

    /// Machine identity. Defaults to /etc/machine-id, then the hostname.
    #[arg(long, env = "FLEET_MACHINE_ID")]
    machine_id: Option<String>,

    /// Prefix of the display name; the hostname is appended.
    #[arg(long, env = "FLEET_MACHINE_NAME_BASE", default_value = "machine")]
    machine_name_base: String,

    #[arg(long, env = "FLEET_HEARTBEAT_SECS", default_value_t = 300)]
    heartbeat_secs: u64,

    #[arg(long, env = "FLEET_POLL_SECS", default_value_t = 300)]
    poll_secs: u64,

    /// Scripts running longer than this are killed.
    #[arg(long, env = "FLEET_EXEC_TIMEOUT_SECS", default_value_t = 30)]
    exec_timeout_secs: u64,

    /// Shell used as `<shell> -c <script>`.
    #[arg(long, env = "FLEET_SHELL", default_value = "/bin/sh")]
    shell: String,

    /// Commands executed at the same time within one poll.
    #[arg(long, env = "FLEET_MAX_CONCURRENT", default_value_t = 1)]
    max_concurrent: usize,

    /// Attempts per API call before giving up until the next cycle.
    #[arg(long, env = "FLEET_RETRY_ATTEMPTS", default_value_t = timing::REQUEST_MAX_ATTEMPTS)]
    retry_attempts: u32,

    #[arg(long, env = "FLEET_RETRY_INITIAL_MS", default_value_t = 500)]
    retry_initial_ms: u64,

    #[arg(long, env = "FLEET_RETRY_MAX_MS", default_value_t = 8000)]
    retry_max_ms: u64,
}

impl TryFrom<Cli> for AgentConfig {
    type Error = anyhow::Error;

    fn try_from(cli: Cli) -> Result<Self, Self::Error> {
        if cli.heartbeat_secs == 0 || cli.poll_secs == 0 {
            anyhow::bail!("heartbeat and poll intervals must be at least one second");
        }
        if cli.exec_timeout_secs == 0 {
            anyhow::bail!("execution timeout must be at least one second");
        }
        if cli.max_concurrent == 0 {
            anyhow::bail!("max concurrent commands must be at least 1");
        }
        if cli.retry_attempts == 0 {
            anyhow::bail!("retry attempts must be at least 1");
        }

        let host = local_hostname();
        let machine_id = match cli.machine_id.filter(|id| !id.trim().is_empty()) {
            Some(id) => id,
            None => read_machine_id(Path::new(MACHINE_ID_FILE)).unwrap_or_else(|| host.clone()),
        };

        Ok(AgentConfig {
            api_url: cli.api_url,
            machine_id,
            machine_name: machine_name(&cli.machine_name_base, &host),
            heartbeat_interval: Duration::from_secs(cli.heartbeat_secs),
            poll_interval: Duration::from_secs(cli.poll_secs),
            execution_timeout: Duration::from_secs(cli.exec_timeout_secs),
            shell: cli.shell,
            max_concurrent_commands: cli.max_concurrent,
            retry: RetryPolicy {
                max_attempts: cli.retry_attempts,
                initial_delay: Duration::from_millis(cli.retry_initial_ms),
                max_delay: Duration::from_millis(cli.retry_max_ms.max(cli.retry_initial_ms)),
            },
        })
    }
}

impl AgentConfig {
    pub fn from_args() -> anyhow::Result<Self> {
        Self::try_from(Cli::parse()).context("invalid agent configuration")
    }
}

pub fn machine_name(base: &str, hostname: &str) -> String {
    format!("{}_{}", base, hostname)
}

fn local_hostname() -> String {
    match hostname::get() {
        Ok(os_string) => os_string
            .into_string()
            .unwrap_or_else(|_| "invalid_hostname".to_string()),
        Err(_) => "unknown_hostname".to_string(),
    }
}

fn read_machine_id(path: &Path) -> Option<String> {
    match std::fs::read_to_string(path) {
        Ok(content) => {
            let id = content.trim();
            (!id.is_empty()).then(|| id.to_string())
        }
        Err(e) => {
            debug!("No machine id at {}: {}", path.display(), e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> anyhow::Result<AgentConfig> {
        let mut argv = vec!["fleet-agent"];
        argv.extend_from_slice(args);
        AgentConfig::try_from(Cli::try_parse_from(argv)?)
    }

    #[test]
    fn test_explicit_settings() {
        let config = parse(&[
            "--api-url",
            "http://dispatch:9000",
            "--machine-id",
            "abc123",
            "--machine-name-base",
            "web",
            "--poll-secs",
            "5",
            "--max-concurrent",
            "4",
        ])
        .unwrap();

        assert_eq!(config.api_url, "http://dispatch:9000");
        assert_eq!(config.machine_id, "abc123");
        assert!(config.machine_name.starts_with("web_"));
        assert_eq!(config.poll_interval, Duration::from_secs(5));
        assert_eq!(config.heartbeat_interval, timing::HEARTBEAT_INTERVAL);
        assert_eq!(config.max_concurrent_commands, 4);
        assert_eq!(config.shell, "/bin/sh");
    }

    #[test]
    fn test_zero_values_rejected() {
        assert!(parse(&["--poll-secs", "0"]).is_err());
        assert!(parse(&["--exec-timeout-secs", "0"]).is_err());
        assert!(parse(&["--max-concurrent", "0"]).is_err());
        assert!(parse(&["--retry-attempts", "0"]).is_err());
    }

    #[test]
    fn test_machine_id_never_empty() {
        let config = parse(&["--machine-id", " "]).unwrap();
        assert!(!config.machine_id.trim().is_empty());
    }

    #[test]
    fn test_machine_name_format() {
        assert_eq!(machine_name("machine", "host-a"), "machine_host-a");
    }

    #[test]
    fn test_read_machine_id_trims() {
        let path = std::env::temp_dir().join(format!("fleet-agent-mid-{}", std::process::id()));
        std::fs::write(&path, "0f1e2d3c\n").unwrap();
        assert_eq!(read_machine_id(&path).as_deref(), Some("0f1e2d3c"));
        std::fs::remove_file(&path).unwrap();

        assert!(read_machine_id(Path::new("/nonexistent/machine-id")).is_none());
    }
}

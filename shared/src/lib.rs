//! Shellfleet Shared Protocol Types
//!
//! This crate provides the wire types, the command lifecycle and the HTTP
//! client shared by the dispatch server, the machine agents and the
//! operator tooling.

pub mod api;
pub mod client;
pub mod lifecycle;

use std::time::{SystemTime, UNIX_EPOCH};

// Re-export commonly used types at crate root
pub use api::*;
pub use client::{ClientError, DispatchClient, StatusCode};
pub use lifecycle::{CommandStatus, FailureKind, Outcome};

/// Identifier assigned to a command by the dispatcher, starting at 1
pub type CommandId = u64;

/// Get current timestamp in seconds since Unix epoch
pub fn now_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

/// Timing parameters for the system
pub mod timing {
    use std::time::Duration;

    /// Machines seen within this window are reported as active
    pub const ACTIVE_WINDOW: Duration = Duration::from_secs(300);

    /// Interval between agent heartbeats
    pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(300);

    /// Interval between agent polls for pending commands
    pub const POLL_INTERVAL: Duration = Duration::from_secs(300);

    /// Wall-clock bound on a single script execution
    pub const EXECUTION_TIMEOUT: Duration = Duration::from_secs(30);

    /// Attempts per API call before the agent gives up until the next cycle
    pub const REQUEST_MAX_ATTEMPTS: u32 = 3;

    /// First backoff delay between attempts
    pub const RETRY_INITIAL_DELAY: Duration = Duration::from_millis(500);

    /// Backoff ceiling
    pub const RETRY_MAX_DELAY: Duration = Duration::from_secs(8);

    /// Output recorded for a script that ran past the execution timeout
    pub const TIMEOUT_DIAGNOSTIC: &str = "Error: command exceeded the execution time limit";
}

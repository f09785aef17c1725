//! Tracking of commands that stay pending for too long

use super::queue::CommandQueue;
use crate::error::Result;
use shellfleet_shared::CommandId;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{error, warn};

/// Periodically reports pending commands older than `stale_after`
///
/// Commands are never failed or retried here; an agent that comes back
/// still picks them up.
pub struct StaleCommandMonitor {
    queue: Arc<CommandQueue>,
    check_interval: Duration,
    stale_after: Duration,
    reported: Mutex<HashSet<CommandId>>,
}

impl StaleCommandMonitor {
    pub fn new(queue: Arc<CommandQueue>, check_interval: Duration, stale_after: Duration) -> Self {
        Self {
            queue,
            check_interval,
            stale_after,
            reported: Mutex::new(HashSet::new()),
        }
    }

    /// Start the monitoring loop
    pub async fn run(&self) {
        let mut ticker = interval(self.check_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;

            if let Err(e) = self.check().await {
                error!(error = %e, "Stale command check failed");
            }
        }
    }

    /// Warn once per newly stale command and return their ids
    pub async fn check(&self) -> Result<Vec<CommandId>> {
        let stale = self.queue.stale(self.stale_after).await?;
        let mut reported = self.reported.lock().await;

        // Forget commands that settled since the last check
        let still_stale: HashSet<CommandId> = stale.iter().map(|c| c.id).collect();
        reported.retain(|id| still_stale.contains(id));

        let mut fresh = Vec::new();
        for cmd in stale {
            if reported.insert(cmd.id) {
                warn!(
                    command_id = cmd.id,
                    machine_id = %cmd.machine_id,
                    script = %cmd.script_name,
                    created_at = cmd.created_at,
                    "Command still pending"
                );
                fresh.push(cmd.id);
            }
        }
        Ok(fresh)
    }
}

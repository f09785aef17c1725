//! Machine registration and liveness

use crate::error::Result;
use crate::store::{Machine, Store};
use shellfleet_shared::now_secs;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Tracks machine identity and last contact time
pub struct FleetRegistry {
    store: Arc<dyn Store>,
    active_window: Duration,
}

impl FleetRegistry {
    pub fn new(store: Arc<dyn Store>, active_window: Duration) -> Self {
        Self {
            store,
            active_window,
        }
    }

    pub fn active_window(&self) -> Duration {
        self.active_window
    }

    /// Register a machine or refresh its name and last contact time
    pub async fn upsert(&self, id: &str, name: &str) -> Result<Machine> {
        self.upsert_at(id, name, now_secs()).await
    }

    pub async fn upsert_at(&self, id: &str, name: &str, now: i64) -> Result<Machine> {
        let machine = self.store.upsert_machine(id, name, now).await?;
        debug!(
            machine_id = %machine.id,
            name = %machine.name,
            last_seen = machine.last_seen,
            "Heartbeat"
        );
        Ok(machine)
    }

    /// Machines whose last heartbeat falls inside the active window
    pub async fn list_active(&self) -> Result<Vec<Machine>> {
        self.list_active_at(now_secs()).await
    }

    pub async fn list_active_at(&self, now: i64) -> Result<Vec<Machine>> {
        let window = i64::try_from(self.active_window.as_secs()).unwrap_or(i64::MAX);
        self.store
            .machines_seen_since(now.saturating_sub(window))
            .await
    }
}

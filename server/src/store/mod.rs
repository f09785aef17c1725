//! Persistence for machines, scripts and commands
//!
//! Every `Store` method runs as one short transactional scope: it either
//! applies completely or not at all, and holds nothing once it returns.
//! Two backends exist:
//! - `MemoryStore` for development and tests
//! - `SqliteStore` for durable state

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use crate::error::Result;
use async_trait::async_trait;
use shellfleet_shared::{CommandId, CommandRecord, MachineSummary, Outcome, Script};

/// A registered machine
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct Machine {
    pub id: String,
    pub name: String,
    /// Unix seconds of the last heartbeat, never rewound
    pub last_seen: i64,
}

impl Machine {
    pub fn summary(&self) -> MachineSummary {
        MachineSummary {
            id: self.id.clone(),
            name: self.name.clone(),
        }
    }
}

#[async_trait]
pub trait Store: Send + Sync {
    /// Insert the machine or replace its name; `last_seen` becomes `max(last_seen, now)`
    async fn upsert_machine(&self, id: &str, name: &str, now: i64) -> Result<Machine>;

    /// Machines with `last_seen >= cutoff`, ordered by name then id
    async fn machines_seen_since(&self, cutoff: i64) -> Result<Vec<Machine>>;

    /// Fails with `Conflict` if the name is taken; existing content is untouched
    async fn insert_script(&self, script: &Script) -> Result<()>;

    async fn script(&self, name: &str) -> Result<Option<Script>>;

    /// Resolve both names and insert a pending command
    ///
    /// When several machines share `machine_name` the most recently seen one
    /// wins, ties going to the smallest id.
    async fn schedule_command(
        &self,
        machine_name: &str,
        script_name: &str,
        now: i64,
    ) -> Result<CommandRecord>;

    /// Pending commands of one machine in ascending id order
    async fn pending_commands(&self, machine_id: &str) -> Result<Vec<CommandRecord>>;

    /// Settle a command, overwriting any earlier result
    async fn record_result(
        &self,
        id: CommandId,
        outcome: Outcome,
        output: &str,
        now: i64,
    ) -> Result<CommandRecord>;

    async fn command(&self, id: CommandId) -> Result<Option<CommandRecord>>;

    /// Pending commands created strictly before `created_before`, ascending id
    async fn stale_pending(&self, created_before: i64) -> Result<Vec<CommandRecord>>;
}

//! Command queue linking machines to scripts

use crate::error::{DispatchError, Entity, Result};
use crate::store::Store;
use shellfleet_shared::{now_secs, CommandId, CommandRecord, Outcome};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Schedules commands and tracks them from `pending` to a terminal state
pub struct CommandQueue {
    store: Arc<dyn Store>,
}

impl CommandQueue {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Create a pending command for the named machine and script
    ///
    /// Scheduling the same pair twice creates two independent commands.
    pub async fn schedule(&self, machine_name: &str, script_name: &str) -> Result<CommandRecord> {
        let command = self
            .store
            .schedule_command(machine_name, script_name, now_secs())
            .await?;

        info!(
            command_id = command.id,
            machine_id = %command.machine_id,
            machine_name,
            script = %command.script_name,
            "Command scheduled"
        );
        Ok(command)
    }

    /// Pending commands for a machine in creation order; does not change state
    pub async fn fetch_pending(&self, machine_id: &str) -> Result<Vec<CommandRecord>> {
        self.store.pending_commands(machine_id).await
    }

    /// Settle a command with the agent's report
    ///
    /// Reports may be redelivered; a later report overwrites an earlier one.
    pub async fn report_result(
        &self,
        command_id: CommandId,
        outcome: Outcome,
        output: &str,
    ) -> Result<CommandRecord> {
        let previous = self.store.command(command_id).await?;
        let command = self
            .store
            .record_result(command_id, outcome, output, now_secs())
            .await?;

        if previous.is_some_and(|c| c.status.is_completed()) {
            warn!(
                command_id,
                status = command.status.label(),
                "Result reported again, overwriting"
            );
        } else {
            info!(
                command_id,
                machine_id = %command.machine_id,
                status = command.status.label(),
                output_bytes = output.len(),
                "Command completed"
            );
        }
        Ok(command)
    }

    pub async fn get(&self, command_id: CommandId) -> Result<CommandRecord> {
        self.store
            .command(command_id)
            .await?
            .ok_or_else(|| DispatchError::not_found(Entity::Command, command_id))
    }

    /// Commands still pending after `age`
    pub async fn stale(&self, age: Duration) -> Result<Vec<CommandRecord>> {
        let age = i64::try_from(age.as_secs()).unwrap_or(i64::MAX);
        self.store.stale_pending(now_secs().saturating_sub(age)).await
    }
}

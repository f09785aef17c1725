//! In-memory store

use super::{Machine, Store};
use crate::error::{DispatchError, Entity, Result};
use async_trait::async_trait;
use shellfleet_shared::{CommandId, CommandRecord, CommandStatus, Outcome, Script};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;

#[derive(Default)]
struct Tables {
    machines: HashMap<String, Machine>,
    scripts: HashMap<String, Script>,
    /// Keyed by id so iteration is creation order
    commands: BTreeMap<CommandId, CommandRecord>,
}

/// Keeps all state behind one lock; each method holds it for its whole scope
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
    command_id: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_command_id(&self) -> CommandId {
        self.command_id.fetch_add(1, Ordering::SeqCst) + 1
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn upsert_machine(&self, id: &str, name: &str, now: i64) -> Result<Machine> {
        let mut tables = self.tables.write().await;
        let machine = tables
            .machines
            .entry(id.to_string())
            .and_modify(|m| {
                m.name = name.to_string();
                m.last_seen = m.last_seen.max(now);
            })
            .or_insert_with(|| Machine {
                id: id.to_string(),
                name: name.to_string(),
                last_seen: now,
            });
        Ok(machine.clone())
    }

    async fn machines_seen_since(&self, cutoff: i64) -> Result<Vec<Machine>> {
        let tables = self.tables.read().await;
        let mut active: Vec<Machine> = tables
            .machines
            .values()
            .filter(|m| m.last_seen >= cutoff)
            .cloned()
            .collect();
        active.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        Ok(active)
    }

    async fn insert_script(&self, script: &Script) -> Result<()> {
        let mut tables = self.tables.write().await;
        if tables.scripts.contains_key(&script.name) {
            return Err(DispatchError::Conflict(script.name.clone()));
        }
        tables.scripts.insert(script.name.clone(), script.clone());
        Ok(())
    }

    async fn script(&self, name: &str) -> Result<Option<Script>> {
        Ok(self.tables.read().await.scripts.get(name).cloned())
    }

    async fn schedule_command(
        &self,
        machine_name: &str,
        script_name: &str,
        now: i64,
    ) -> Result<CommandRecord> {
        let mut tables = self.tables.write().await;

        let machine_id = tables
            .machines
            .values()
            .filter(|m| m.name == machine_name)
            // Latest heartbeat first, then the smallest id
            .max_by(|a, b| a.last_seen.cmp(&b.last_seen).then_with(|| b.id.cmp(&a.id)))
            .map(|m| m.id.clone())
            .ok_or_else(|| DispatchError::not_found(Entity::Machine, machine_name))?;

        if !tables.scripts.contains_key(script_name) {
            return Err(DispatchError::not_found(Entity::Script, script_name));
        }

        let record = CommandRecord {
            id: self.next_command_id(),
            machine_id,
            script_name: script_name.to_string(),
            status: CommandStatus::Pending,
            created_at: now,
            completed_at: None,
        };
        tables.commands.insert(record.id, record.clone());
        Ok(record)
    }

    async fn pending_commands(&self, machine_id: &str) -> Result<Vec<CommandRecord>> {
        let tables = self.tables.read().await;
        Ok(tables
            .commands
            .values()
            .filter(|c| c.machine_id == machine_id && c.status.is_pending())
            .cloned()
            .collect())
    }

    async fn record_result(
        &self,
        id: CommandId,
        outcome: Outcome,
        output: &str,
        now: i64,
    ) -> Result<CommandRecord> {
        let mut tables = self.tables.write().await;
        let command = tables
            .commands
            .get_mut(&id)
            .ok_or_else(|| DispatchError::not_found(Entity::Command, id))?;
        command.status = CommandStatus::settle(outcome, output);
        command.completed_at = Some(now);
        Ok(command.clone())
    }

    async fn command(&self, id: CommandId) -> Result<Option<CommandRecord>> {
        Ok(self.tables.read().await.commands.get(&id).cloned())
    }

    async fn stale_pending(&self, created_before: i64) -> Result<Vec<CommandRecord>> {
        let tables = self.tables.read().await;
        Ok(tables
            .commands
            .values()
            .filter(|c| c.status.is_pending() && c.created_at < created_before)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::conformance;

    #[tokio::test]
    async fn test_upsert_never_rewinds() {
        conformance::upsert_never_rewinds(&MemoryStore::new()).await;
    }

    #[tokio::test]
    async fn test_active_window_cutoff() {
        conformance::active_window_cutoff(&MemoryStore::new()).await;
    }

    #[tokio::test]
    async fn test_duplicate_script_conflicts() {
        conformance::duplicate_script_conflicts(&MemoryStore::new()).await;
    }

    #[tokio::test]
    async fn test_schedule_resolves_names() {
        conformance::schedule_resolves_names(&MemoryStore::new()).await;
    }

    #[tokio::test]
    async fn test_shared_name_prefers_latest() {
        conformance::shared_name_prefers_latest(&MemoryStore::new()).await;
    }

    #[tokio::test]
    async fn test_pending_until_reported() {
        conformance::pending_until_reported(&MemoryStore::new()).await;
    }

    #[tokio::test]
    async fn test_last_report_wins() {
        conformance::last_report_wins(&MemoryStore::new()).await;
    }

    #[tokio::test]
    async fn test_stale_pending_by_age() {
        conformance::stale_pending_by_age(&MemoryStore::new()).await;
    }

    #[tokio::test]
    async fn test_failed_schedule_consumes_no_id() {
        let store = MemoryStore::new();
        store.upsert_machine("m1", "web1", 100).await.unwrap();
        store
            .insert_script(&Script {
                name: "ping".into(),
                content: "echo pong".into(),
            })
            .await
            .unwrap();

        assert!(store.schedule_command("web1", "nope", 100).await.is_err());
        let command = store.schedule_command("web1", "ping", 100).await.unwrap();
        assert_eq!(command.id, 1);
    }
}

//! SQLite store
//!
//! Tables:
//! ```text
//! machines (id PK, name, last_seen)
//! scripts  (name PK, content)
//! commands (id PK autoincrement, machine_id, script_name, status, exit_code, output,
//!           created_at, completed_at)
//! ```
//! No foreign keys: nothing is ever deleted.

use super::{Machine, Store};
use crate::error::{DispatchError, Entity, Result};
use async_trait::async_trait;
use shellfleet_shared::{CommandId, CommandRecord, CommandStatus, FailureKind, Outcome, Script};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::FromRow;
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS machines (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        last_seen INTEGER NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS scripts (
        name TEXT PRIMARY KEY,
        content TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS commands (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        machine_id TEXT NOT NULL,
        script_name TEXT NOT NULL,
        status TEXT NOT NULL DEFAULT 'pending',
        exit_code INTEGER,
        output TEXT,
        created_at INTEGER NOT NULL,
        completed_at INTEGER
    )
    "#,
    "CREATE INDEX IF NOT EXISTS commands_by_machine_status ON commands (machine_id, status)",
    "CREATE INDEX IF NOT EXISTS machines_by_name ON machines (name)",
];

const COMMAND_COLUMNS: &str =
    "id, machine_id, script_name, status, exit_code, output, created_at, completed_at";

#[derive(Debug, FromRow)]
struct CommandRow {
    id: i64,
    machine_id: String,
    script_name: String,
    status: String,
    exit_code: Option<i64>,
    output: Option<String>,
    created_at: i64,
    completed_at: Option<i64>,
}

impl TryFrom<CommandRow> for CommandRecord {
    type Error = DispatchError;

    fn try_from(row: CommandRow) -> Result<Self> {
        let corrupt = |reason: &str| DispatchError::CorruptRow {
            id: row.id,
            reason: reason.to_string(),
        };
        let output = || row.output.clone().unwrap_or_default();

        let status = match row.status.as_str() {
            "pending" => CommandStatus::Pending,
            "succeeded" => CommandStatus::Succeeded { output: output() },
            "timed_out" => CommandStatus::TimedOut { output: output() },
            "failed" => {
                let failure = match row.exit_code {
                    Some(code) => FailureKind::NonZeroExit {
                        code: i32::try_from(code).map_err(|_| corrupt("exit code out of range"))?,
                    },
                    None => FailureKind::Fault,
                };
                CommandStatus::Failed {
                    failure,
                    output: output(),
                }
            }
            other => return Err(corrupt(&format!("unknown status '{}'", other))),
        };

        Ok(CommandRecord {
            id: row.id as CommandId,
            machine_id: row.machine_id,
            script_name: row.script_name,
            status,
            created_at: row.created_at,
            completed_at: row.completed_at,
        })
    }
}

/// Column values for a settled command
fn encode_outcome(outcome: Outcome) -> (&'static str, Option<i64>) {
    match outcome {
        Outcome::Succeeded => ("succeeded", None),
        Outcome::TimedOut => ("timed_out", None),
        Outcome::Failed {
            failure: FailureKind::NonZeroExit { code },
        } => ("failed", Some(i64::from(code))),
        Outcome::Failed {
            failure: FailureKind::Fault,
        } => ("failed", None),
    }
}

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if needed) the database and ensure the schema exists
    pub async fn connect(url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .busy_timeout(Duration::from_secs(5));

        // Every connection to an in-memory database is a separate database
        let in_memory = url.contains(":memory:");
        let (options, pool_options) = if in_memory {
            let pool_options = SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None);
            (options, pool_options)
        } else {
            let options = options.journal_mode(SqliteJournalMode::Wal);
            (options, SqlitePoolOptions::new().max_connections(5))
        };

        let pool = pool_options.connect_with(options).await?;
        for statement in SCHEMA {
            sqlx::query(statement).execute(&pool).await?;
        }

        info!(url, "SQLite store ready");
        Ok(Self { pool })
    }

    async fn fetch_command(
        conn: &mut sqlx::SqliteConnection,
        id: i64,
    ) -> Result<Option<CommandRecord>> {
        let sql = format!("SELECT {} FROM commands WHERE id = ?", COMMAND_COLUMNS);
        let row = sqlx::query_as::<_, CommandRow>(&sql)
            .bind(id)
            .fetch_optional(conn)
            .await?;
        row.map(CommandRecord::try_from).transpose()
    }

    fn collect(rows: Vec<CommandRow>) -> Result<Vec<CommandRecord>> {
        rows.into_iter().map(CommandRecord::try_from).collect()
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn upsert_machine(&self, id: &str, name: &str, now: i64) -> Result<Machine> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO machines (id, name, last_seen)
            VALUES (?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                last_seen = MAX(machines.last_seen, excluded.last_seen)
            "#,
        )
        .bind(id)
        .bind(name)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        let machine =
            sqlx::query_as::<_, Machine>("SELECT id, name, last_seen FROM machines WHERE id = ?")
                .bind(id)
                .fetch_one(&mut *tx)
                .await?;

        tx.commit().await?;
        Ok(machine)
    }

    async fn machines_seen_since(&self, cutoff: i64) -> Result<Vec<Machine>> {
        let machines = sqlx::query_as::<_, Machine>(
            "SELECT id, name, last_seen FROM machines WHERE last_seen >= ? ORDER BY name, id",
        )
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;
        Ok(machines)
    }

    async fn insert_script(&self, script: &Script) -> Result<()> {
        let inserted = sqlx::query(
            "INSERT INTO scripts (name, content) VALUES (?, ?) ON CONFLICT(name) DO NOTHING",
        )
        .bind(&script.name)
        .bind(&script.content)
        .execute(&self.pool)
        .await?;

        if inserted.rows_affected() == 0 {
            return Err(DispatchError::Conflict(script.name.clone()));
        }
        Ok(())
    }

    async fn script(&self, name: &str) -> Result<Option<Script>> {
        let row = sqlx::query_as::<_, (String, String)>(
            "SELECT name, content FROM scripts WHERE name = ?",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|(name, content)| Script { name, content }))
    }

    async fn schedule_command(
        &self,
        machine_name: &str,
        script_name: &str,
        now: i64,
    ) -> Result<CommandRecord> {
        // One statement resolves both names and inserts, so concurrent
        // schedules only ever wait on the write lock
        let mut conn = self.pool.acquire().await?;
        let inserted = sqlx::query(
            r#"
            INSERT INTO commands (machine_id, script_name, status, created_at)
            SELECT m.id, s.name, 'pending', ?
            FROM machines m, scripts s
            WHERE m.name = ? AND s.name = ?
            ORDER BY m.last_seen DESC, m.id ASC
            LIMIT 1
            "#,
        )
        .bind(now)
        .bind(machine_name)
        .bind(script_name)
        .execute(&mut *conn)
        .await?;

        if inserted.rows_affected() == 0 {
            let machine_known: Option<String> =
                sqlx::query_scalar("SELECT id FROM machines WHERE name = ? LIMIT 1")
                    .bind(machine_name)
                    .fetch_optional(&mut *conn)
                    .await?;
            return Err(match machine_known {
                None => DispatchError::not_found(Entity::Machine, machine_name),
                Some(_) => DispatchError::not_found(Entity::Script, script_name),
            });
        }

        let id = inserted.last_insert_rowid();
        Self::fetch_command(&mut conn, id)
            .await?
            .ok_or_else(|| DispatchError::not_found(Entity::Command, id))
    }

    async fn pending_commands(&self, machine_id: &str) -> Result<Vec<CommandRecord>> {
        let sql = format!(
            "SELECT {} FROM commands WHERE machine_id = ? AND status = 'pending' ORDER BY id",
            COMMAND_COLUMNS
        );
        let rows = sqlx::query_as::<_, CommandRow>(&sql)
            .bind(machine_id)
            .fetch_all(&self.pool)
            .await?;
        Self::collect(rows)
    }

    async fn record_result(
        &self,
        id: CommandId,
        outcome: Outcome,
        output: &str,
        now: i64,
    ) -> Result<CommandRecord> {
        let row_id = i64::try_from(id).map_err(|_| DispatchError::not_found(Entity::Command, id))?;
        let (status, exit_code) = encode_outcome(outcome);
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            "UPDATE commands SET status = ?, exit_code = ?, output = ?, completed_at = ? WHERE id = ?",
        )
        .bind(status)
        .bind(exit_code)
        .bind(output)
        .bind(now)
        .bind(row_id)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            return Err(DispatchError::not_found(Entity::Command, id));
        }

        let record = Self::fetch_command(&mut *tx, row_id)
            .await?
            .ok_or_else(|| DispatchError::not_found(Entity::Command, id))?;

        tx.commit().await?;
        Ok(record)
    }

    async fn command(&self, id: CommandId) -> Result<Option<CommandRecord>> {
        let Ok(row_id) = i64::try_from(id) else {
            return Ok(None);
        };
        let mut conn = self.pool.acquire().await?;
        Self::fetch_command(&mut conn, row_id).await
    }

    async fn stale_pending(&self, created_before: i64) -> Result<Vec<CommandRecord>> {
        let sql = format!(
            "SELECT {} FROM commands WHERE status = 'pending' AND created_at < ? ORDER BY id",
            COMMAND_COLUMNS
        );
        let rows = sqlx::query_as::<_, CommandRow>(&sql)
            .bind(created_before)
            .fetch_all(&self.pool)
            .await?;
        Self::collect(rows)
    }
}

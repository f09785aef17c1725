//! Agent loop - heartbeats and polls against the dispatcher on two timers

use crate::command::ScriptExecutor;
use crate::config::AgentConfig;
use crate::transport::DispatchTransport;
use futures::stream::{self, StreamExt};
use shellfleet_shared::{ClientError, PendingCommand};
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// What happened to one pending command during a poll
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Executed and the result was accepted by the server
    Reported,
    /// Script missing or unreadable; the command stays pending
    Skipped,
    /// Executed but the report did not reach the server
    ReportFailed,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PollSummary {
    pub reported: usize,
    pub skipped: usize,
    pub report_failed: usize,
}

impl PollSummary {
    fn record(mut self, disposition: Disposition) -> Self {
        match disposition {
            Disposition::Reported => self.reported += 1,
            Disposition::Skipped => self.skipped += 1,
            Disposition::ReportFailed => self.report_failed += 1,
        }
        self
    }
}

/// Runs on each remote machine
pub struct AgentLoop<T> {
    transport: T,
    executor: ScriptExecutor,
    machine_id: String,
    machine_name: String,
    heartbeat_interval: Duration,
    poll_interval: Duration,
    max_concurrent: usize,
}

impl<T: DispatchTransport> AgentLoop<T> {
    pub fn new(config: &AgentConfig, transport: T) -> Self {
        Self {
            transport,
            executor: ScriptExecutor::new(config.shell.clone(), config.execution_timeout),
            machine_id: config.machine_id.clone(),
            machine_name: config.machine_name.clone(),
            heartbeat_interval: config.heartbeat_interval,
            poll_interval: config.poll_interval,
            max_concurrent: config.max_concurrent_commands.max(1),
        }
    }

    /// Drive heartbeats and polls forever; network faults never end the loop
    ///
    /// Both timers fire immediately, heartbeat first. Heartbeats keep their
    /// cadence while a poll is executing commands. A poll that overruns its
    /// interval delays the next tick rather than bursting.
    pub async fn run(&self) {
        let mut heartbeat = interval(self.heartbeat_interval);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut poll = interval(self.poll_interval);
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            "Agent loop started via {} (heartbeat every {:?}, poll every {:?})",
            self.transport.name(),
            self.heartbeat_interval,
            self.poll_interval
        );

        loop {
            tokio::select! {
                biased;

                _ = heartbeat.tick() => self.beat().await,

                _ = poll.tick() => {
                    let work = self.poll();
                    tokio::pin!(work);
                    loop {
                        tokio::select! {
                            biased;

                            result = &mut work => {
                                if let Err(e) = result {
                                    error!(error = %e, "Failed to fetch pending commands");
                                }
                                break;
                            }

                            _ = heartbeat.tick() => self.beat().await,
                        }
                    }
                }
            }
        }
    }

    /// One heartbeat followed by one poll, each failure absorbed
    pub async fn run_cycle(&self) -> PollSummary {
        self.beat().await;
        match self.poll().await {
            Ok(summary) => summary,
            Err(e) => {
                error!(error = %e, "Failed to fetch pending commands");
                PollSummary::default()
            }
        }
    }

    async fn beat(&self) {
        if let Err(e) = self.heartbeat().await {
            error!(error = %e, "Heartbeat failed");
        }
    }

    pub async fn heartbeat(&self) -> Result<(), ClientError> {
        self.transport
            .heartbeat(&self.machine_id, &self.machine_name)
            .await?;
        debug!(machine_id = %self.machine_id, name = %self.machine_name, "Heartbeat sent");
        Ok(())
    }

    /// Process every pending command in the order the server returned them
    ///
    /// Only the fetch of the pending list can fail the poll; each command
    /// is handled independently.
    pub async fn poll(&self) -> Result<PollSummary, ClientError> {
        let pending = self.transport.fetch_pending(&self.machine_id).await?;
        if pending.is_empty() {
            debug!("No pending commands");
            return Ok(PollSummary::default());
        }
        info!(count = pending.len(), "Pending commands received");

        let summary = stream::iter(pending)
            .map(|cmd| self.process(cmd))
            .buffered(self.max_concurrent)
            .fold(PollSummary::default(), |summary, disposition| async move {
                summary.record(disposition)
            })
            .await;

        Ok(summary)
    }

    async fn process(&self, cmd: PendingCommand) -> Disposition {
        let body = match self.transport.fetch_script(&cmd.script_name).await {
            Ok(Some(body)) => body,
            Ok(None) => {
                warn!(
                    command_id = cmd.id,
                    script = %cmd.script_name,
                    "Script not found, leaving command pending"
                );
                return Disposition::Skipped;
            }
            Err(e) => {
                warn!(
                    command_id = cmd.id,
                    script = %cmd.script_name,
                    error = %e,
                    "Failed to fetch script, leaving command pending"
                );
                return Disposition::Skipped;
            }
        };

        info!(command_id = cmd.id, script = %cmd.script_name, "Executing command");
        let run = self.executor.execute(&body).await;

        match self
            .transport
            .report_result(cmd.id, run.outcome, &run.output)
            .await
        {
            Ok(()) => {
                info!(command_id = cmd.id, outcome = ?run.outcome, "Result reported");
                Disposition::Reported
            }
            Err(e) => {
                error!(command_id = cmd.id, error = %e, "Failed to report result");
                Disposition::ReportFailed
            }
        }
    }
}

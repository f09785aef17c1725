//! Script executor - runs one script body and captures its output

use shellfleet_shared::{timing, FailureKind, Outcome};
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;
use tokio::time::{timeout, Instant};
use tracing::{debug, warn};

/// Why a script could not be run to an exit status
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("failed to start {shell}: {source}")]
    Spawn {
        shell: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to collect output: {0}")]
    Wait(#[source] std::io::Error),
}

/// Outcome and output of one run, ready to report
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Execution {
    pub outcome: Outcome,
    /// stdout followed by stderr
    pub output: String,
}

/// Runs scripts as `<shell> -c <body>`
#[derive(Debug, Clone)]
pub struct ScriptExecutor {
    shell: String,
    timeout: Duration,
}

impl Default for ScriptExecutor {
    fn default() -> Self {
        Self::new("/bin/sh", timing::EXECUTION_TIMEOUT)
    }
}

impl ScriptExecutor {
    pub fn new(shell: impl Into<String>, timeout: Duration) -> Self {
        Self {
            shell: shell.into(),
            timeout,
        }
    }

    /// Run a script; never fails, every fault becomes an outcome
    pub async fn execute(&self, body: &str) -> Execution {
        let started = Instant::now();

        let result = match self.spawn(body) {
            Ok(child) => timeout(self.timeout, child.wait_with_output()).await,
            Err(e) => return fault(e),
        };

        // Dropping the timed-out future drops the child, which kills it
        let output = match result {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return fault(ExecutionError::Wait(e)),
            Err(_) => {
                warn!(timeout_secs = self.timeout.as_secs(), "Script timed out, killed");
                return Execution {
                    outcome: Outcome::TimedOut,
                    output: timing::TIMEOUT_DIAGNOSTIC.to_string(),
                };
            }
        };

        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        text.push_str(&String::from_utf8_lossy(&output.stderr));

        let outcome = match output.status.code() {
            Some(0) => Outcome::Succeeded,
            Some(code) => Outcome::Failed {
                failure: FailureKind::NonZeroExit { code },
            },
            // Terminated by a signal
            None => Outcome::Failed {
                failure: FailureKind::Fault,
            },
        };

        debug!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            exit_code = ?output.status.code(),
            output_bytes = text.len(),
            "Script finished"
        );

        Execution {
            outcome,
            output: text,
        }
    }

    fn spawn(&self, body: &str) -> Result<tokio::process::Child, ExecutionError> {
        Command::new(&self.shell)
            .arg("-c")
            .arg(body)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ExecutionError::Spawn {
                shell: self.shell.clone(),
                source,
            })
    }
}

fn fault(e: ExecutionError) -> Execution {
    warn!(error = %e, "Script could not be executed");
    Execution {
        outcome: Outcome::Failed {
            failure: FailureKind::Fault,
        },
        output: format!("Error executing command: {}", e),
    }
}

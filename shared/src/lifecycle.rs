//! Command Lifecycle
//!
//! A command starts `Pending` and is settled by the agent's report into one
//! of the terminal states. Reports are delivered at least once, so settling
//! an already terminal command overwrites it (last write wins).

use serde::{Deserialize, Serialize};

/// Why an execution is recorded as failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum FailureKind {
    /// The script ran and exited with a non-zero status
    NonZeroExit { code: i32 },
    /// The script could not be run, or ended without an exit status
    Fault,
}

/// What the agent observed when it ran a command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Outcome {
    /// Exit status zero
    #[default]
    Succeeded,
    /// Ran and failed, or could not run at all
    Failed { failure: FailureKind },
    /// Killed after exceeding the execution timeout
    TimedOut,
}

/// State of a command as tracked by the dispatcher
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CommandStatus {
    /// Scheduled, waiting for its machine to pick it up
    Pending,
    Succeeded {
        output: String,
    },
    Failed {
        failure: FailureKind,
        output: String,
    },
    TimedOut {
        output: String,
    },
}

impl CommandStatus {
    /// Build the terminal state for a reported outcome
    pub fn settle(outcome: Outcome, output: impl Into<String>) -> Self {
        let output = output.into();
        match outcome {
            Outcome::Succeeded => CommandStatus::Succeeded { output },
            Outcome::Failed { failure } => CommandStatus::Failed { failure, output },
            Outcome::TimedOut => CommandStatus::TimedOut { output },
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, CommandStatus::Pending)
    }

    /// Every non-pending state is terminal
    pub fn is_completed(&self) -> bool {
        !self.is_pending()
    }

    /// Recorded output, `None` while pending
    pub fn output(&self) -> Option<&str> {
        match self {
            CommandStatus::Pending => None,
            CommandStatus::Succeeded { output }
            | CommandStatus::Failed { output, .. }
            | CommandStatus::TimedOut { output } => Some(output),
        }
    }

    /// Tag used on the wire and in storage
    pub fn label(&self) -> &'static str {
        match self {
            CommandStatus::Pending => "pending",
            CommandStatus::Succeeded { .. } => "succeeded",
            CommandStatus::Failed { .. } => "failed",
            CommandStatus::TimedOut { .. } => "timed_out",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settle_maps_each_outcome() {
        assert_eq!(
            CommandStatus::settle(Outcome::Succeeded, "pong\n"),
            CommandStatus::Succeeded { output: "pong\n".into() }
        );

        let failed = CommandStatus::settle(
            Outcome::Failed {
                failure: FailureKind::NonZeroExit { code: 2 },
            },
            "boom",
        );
        assert_eq!(failed.label(), "failed");
        assert_eq!(failed.output(), Some("boom"));

        let timed_out = CommandStatus::settle(Outcome::TimedOut, "late");
        assert!(timed_out.is_completed());
        assert_eq!(timed_out.label(), "timed_out");
    }

    #[test]
    fn test_pending_has_no_output() {
        let status = CommandStatus::Pending;
        assert!(status.is_pending());
        assert!(!status.is_completed());
        assert_eq!(status.output(), None);
        assert_eq!(status.label(), "pending");
    }

    #[test]
    fn test_status_json_shape() {
        let status = CommandStatus::settle(
            Outcome::Failed {
                failure: FailureKind::NonZeroExit { code: 1 },
            },
            "no",
        );
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["status"], "failed");
        assert_eq!(json["failure"]["reason"], "non_zero_exit");
        assert_eq!(json["failure"]["code"], 1);
        assert_eq!(json["output"], "no");
    }

    #[test]
    fn test_outcome_defaults_to_succeeded() {
        assert_eq!(Outcome::default(), Outcome::Succeeded);
        let parsed: Outcome = serde_json::from_str(r#"{"kind":"timed_out"}"#).unwrap();
        assert_eq!(parsed, Outcome::TimedOut);
    }
}

//! Request and response bodies of the dispatch HTTP API

use crate::lifecycle::{CommandStatus, Outcome};
use crate::CommandId;
use serde::{Deserialize, Serialize};

/// `POST /register_machine`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterMachine {
    pub id: String,
    pub name: String,
}

/// Entry of `GET /machines`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineSummary {
    pub id: String,
    pub name: String,
}

/// `POST /scripts`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewScript {
    pub name: String,
    pub content: String,
}

/// `GET /scripts/:name`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Script {
    pub name: String,
    pub content: String,
}

impl From<NewScript> for Script {
    fn from(new: NewScript) -> Self {
        Self {
            name: new.name,
            content: new.content,
        }
    }
}

/// `POST /execute`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecuteRequest {
    pub machine_name: String,
    pub script_name: String,
}

/// Reply to a successful `POST /execute`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scheduled {
    pub message: String,
    pub command_id: CommandId,
}

/// Entry of `GET /commands/:machine_id`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingCommand {
    pub id: CommandId,
    pub script_name: String,
}

/// `POST /commands/:command_id/result`
///
/// Agents that predate outcome tagging send only `output`; those reports are
/// recorded as succeeded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultReport {
    pub output: String,
    #[serde(default)]
    pub outcome: Outcome,
}

impl ResultReport {
    pub fn new(outcome: Outcome, output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            outcome,
        }
    }
}

/// `GET /results/:command_id`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandRecord {
    pub id: CommandId,
    pub machine_id: String,
    pub script_name: String,
    #[serde(flatten)]
    pub status: CommandStatus,
    pub created_at: i64,
    pub completed_at: Option<i64>,
}

impl CommandRecord {
    pub fn pending(&self) -> PendingCommand {
        PendingCommand {
            id: self.id,
            script_name: self.script_name.clone(),
        }
    }
}

/// Plain acknowledgement body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub message: String,
}

impl Message {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Body of every failure response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub detail: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::FailureKind;

    #[test]
    fn test_bare_result_report_is_success() {
        let report: ResultReport = serde_json::from_str(r#"{"output":"pong\n"}"#).unwrap();
        assert_eq!(report.output, "pong\n");
        assert_eq!(report.outcome, Outcome::Succeeded);
    }

    #[test]
    fn test_command_record_flattens_status() {
        let record = CommandRecord {
            id: 7,
            machine_id: "m1".into(),
            script_name: "ping".into(),
            status: CommandStatus::settle(
                Outcome::Failed {
                    failure: FailureKind::Fault,
                },
                "Error executing command: no shell",
            ),
            created_at: 100,
            completed_at: Some(110),
        };

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["status"], "failed");
        assert_eq!(json["failure"]["reason"], "fault");
        assert_eq!(json["output"], "Error executing command: no shell");

        let back: CommandRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn test_pending_record_has_no_output_field() {
        let record = CommandRecord {
            id: 1,
            machine_id: "m1".into(),
            script_name: "ping".into(),
            status: CommandStatus::Pending,
            created_at: 100,
            completed_at: None,
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["status"], "pending");
        assert!(json.get("output").is_none());
        assert_eq!(record.pending(), PendingCommand { id: 1, script_name: "ping".into() });
    }
}

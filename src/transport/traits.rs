//! Transport trait abstraction between the agent loop and the dispatch API

use async_trait::async_trait;
use shellfleet_shared::{ClientError, CommandId, Outcome, PendingCommand};

/// The four calls an agent makes against the dispatcher
#[async_trait]
pub trait DispatchTransport: Send + Sync {
    /// Register this machine or refresh its last contact time
    async fn heartbeat(&self, machine_id: &str, machine_name: &str) -> Result<(), ClientError>;

    /// Pending commands for this machine, oldest first
    async fn fetch_pending(&self, machine_id: &str) -> Result<Vec<PendingCommand>, ClientError>;

    /// Script body by name, `None` if the server has no such script
    async fn fetch_script(&self, name: &str) -> Result<Option<String>, ClientError>;

    async fn report_result(
        &self,
        command_id: CommandId,
        outcome: Outcome,
        output: &str,
    ) -> Result<(), ClientError>;

    /// Human-readable name for this transport
    fn name(&self) -> &'static str;
}

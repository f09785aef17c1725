//! HTTP transport over the dispatch API client

use super::retry::RetryPolicy;
use super::traits::DispatchTransport;
use async_trait::async_trait;
use shellfleet_shared::{ClientError, CommandId, DispatchClient, Outcome, PendingCommand, ResultReport};

pub struct HttpTransport {
    client: DispatchClient,
    retry: RetryPolicy,
}

impl HttpTransport {
    pub fn new(api_url: &str, retry: RetryPolicy) -> Result<Self, ClientError> {
        Ok(Self {
            client: DispatchClient::new(api_url)?,
            retry,
        })
    }

    pub fn api_url(&self) -> &str {
        self.client.base_url()
    }
}

#[async_trait]
impl DispatchTransport for HttpTransport {
    async fn heartbeat(&self, machine_id: &str, machine_name: &str) -> Result<(), ClientError> {
        self.retry
            .run("register_machine", || {
                self.client.register_machine(machine_id, machine_name)
            })
            .await?;
        Ok(())
    }

    async fn fetch_pending(&self, machine_id: &str) -> Result<Vec<PendingCommand>, ClientError> {
        self.retry
            .run("fetch_pending", || self.client.fetch_pending(machine_id))
            .await
    }

    async fn fetch_script(&self, name: &str) -> Result<Option<String>, ClientError> {
        let script = self
            .retry
            .run("get_script", || self.client.get_script(name))
            .await?;
        Ok(script.map(|s| s.content))
    }

    async fn report_result(
        &self,
        command_id: CommandId,
        outcome: Outcome,
        output: &str,
    ) -> Result<(), ClientError> {
        let report = ResultReport::new(outcome, output);
        self.retry
            .run("report_result", || {
                self.client.report_result(command_id, &report)
            })
            .await?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "HTTP"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_unreachable_server_fails_after_retries() {
        let policy = RetryPolicy {
            max_attempts: 2,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(1),
        };
        let transport = HttpTransport::new("http://127.0.0.1:9", policy).unwrap();
        assert_eq!(transport.api_url(), "http://127.0.0.1:9");

        let err = transport.fetch_pending("m1").await.unwrap_err();
        assert!(err.is_transient());
    }
}

//! Asynchronous client for the dispatch API.
//!
//! Used by the machine agents and by operator tooling. One method per
//! endpoint; failures keep the server's `detail` text.

use crate::api::{
    CommandRecord, ErrorBody, ExecuteRequest, MachineSummary, Message, NewScript, PendingCommand,
    RegisterMachine, ResultReport, Scheduled, Script,
};
use crate::CommandId;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use reqwest::{Client, RequestBuilder, Response};
pub use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use std::time::Duration;
use thiserror::Error;

/// Per-request bound so a hung server cannot stall an agent cycle forever
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Everything but RFC 3986 unreserved characters
const PATH_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("unexpected status: {status} detail={detail}")]
    Status { status: StatusCode, detail: String },
}

impl ClientError {
    /// Whether retrying the same request may succeed
    pub fn is_transient(&self) -> bool {
        match self {
            ClientError::Http(e) => !e.is_decode() && !e.is_builder(),
            ClientError::Status { status, .. } => status.is_server_error(),
            ClientError::NotFound(_) | ClientError::Conflict(_) => false,
        }
    }
}

#[derive(Clone, Debug)]
pub struct DispatchClient {
    http: Client,
    base_url: String,
}

impl DispatchClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, ClientError> {
        let http = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Register or refresh a machine (heartbeat)
    pub async fn register_machine(&self, id: &str, name: &str) -> Result<Message, ClientError> {
        let body = RegisterMachine {
            id: id.to_string(),
            name: name.to_string(),
        };
        self.send(self.http.post(self.url("/register_machine")).json(&body))
            .await
    }

    /// Machines seen within the server's active window
    pub async fn list_machines(&self) -> Result<Vec<MachineSummary>, ClientError> {
        self.send(self.http.get(self.url("/machines"))).await
    }

    pub async fn create_script(&self, name: &str, content: &str) -> Result<Message, ClientError> {
        let body = NewScript {
            name: name.to_string(),
            content: content.to_string(),
        };
        self.send(self.http.post(self.url("/scripts")).json(&body))
            .await
    }

    /// Fetch a script body, `None` if the server does not know the name
    pub async fn get_script(&self, name: &str) -> Result<Option<Script>, ClientError> {
        let path = format!("/scripts/{}", encode_segment(name));
        match self.send(self.http.get(self.url(&path))).await {
            Ok(script) => Ok(Some(script)),
            Err(ClientError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Schedule a script on a machine by display name
    pub async fn schedule(
        &self,
        machine_name: &str,
        script_name: &str,
    ) -> Result<Scheduled, ClientError> {
        let body = ExecuteRequest {
            machine_name: machine_name.to_string(),
            script_name: script_name.to_string(),
        };
        self.send(self.http.post(self.url("/execute")).json(&body))
            .await
    }

    /// Pending commands for a machine, oldest first
    pub async fn fetch_pending(&self, machine_id: &str) -> Result<Vec<PendingCommand>, ClientError> {
        let path = format!("/commands/{}", encode_segment(machine_id));
        self.send(self.http.get(self.url(&path))).await
    }

    pub async fn report_result(
        &self,
        command_id: CommandId,
        report: &ResultReport,
    ) -> Result<Message, ClientError> {
        let path = format!("/commands/{}/result", command_id);
        self.send(self.http.post(self.url(&path)).json(report))
            .await
    }

    /// Full record of a command, including its outcome once reported
    pub async fn get_command(&self, command_id: CommandId) -> Result<CommandRecord, ClientError> {
        let path = format!("/results/{}", command_id);
        self.send(self.http.get(self.url(&path))).await
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ClientError> {
        let res = request.send().await?;
        if res.status().is_success() {
            Ok(res.json::<T>().await?)
        } else {
            Err(error_from(res).await)
        }
    }
}

async fn error_from(res: Response) -> ClientError {
    let status = res.status();
    let body = res.text().await.unwrap_or_default();
    classify(status, body)
}

fn classify(status: StatusCode, body: String) -> ClientError {
    let api_detail = serde_json::from_str::<ErrorBody>(&body).ok().map(|b| b.detail);

    match (status, api_detail) {
        (StatusCode::NOT_FOUND, detail) => ClientError::NotFound(detail.unwrap_or(body)),
        // The API answers a duplicate script name with 400 and a detail body;
        // a bare 400 is a rejected request, not a conflict
        (StatusCode::BAD_REQUEST | StatusCode::CONFLICT, Some(detail)) => {
            ClientError::Conflict(detail)
        }
        (status, detail) => ClientError::Status {
            status,
            detail: detail.unwrap_or(body),
        },
    }
}

/// Percent-encode a single path segment
fn encode_segment(segment: &str) -> String {
    utf8_percent_encode(segment, PATH_SEGMENT).to_string()
}

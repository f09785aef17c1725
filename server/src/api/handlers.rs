use super::AppState;
use crate::error::Result;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use shellfleet_shared::{
    CommandId, CommandRecord, ExecuteRequest, MachineSummary, Message, NewScript, PendingCommand,
    RegisterMachine, ResultReport, Scheduled, Script,
};

pub async fn health() -> Json<Message> {
    Json(Message::new("ok"))
}

/// Registration and heartbeat are the same call
pub async fn register_machine(
    State(state): State<AppState>,
    Json(req): Json<RegisterMachine>,
) -> Result<Json<Message>> {
    state.fleet.upsert(&req.id, &req.name).await?;
    Ok(Json(Message::new("Machine registered")))
}

pub async fn list_machines(State(state): State<AppState>) -> Result<Json<Vec<MachineSummary>>> {
    let machines = state.fleet.list_active().await?;
    Ok(Json(machines.iter().map(|m| m.summary()).collect()))
}

pub async fn create_script(
    State(state): State<AppState>,
    Json(req): Json<NewScript>,
) -> Result<(StatusCode, Json<Message>)> {
    state.scripts.create(&req.name, &req.content).await?;
    Ok((StatusCode::CREATED, Json(Message::new("Script created"))))
}

pub async fn get_script(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<Script>> {
    Ok(Json(state.scripts.get(&name).await?))
}

pub async fn execute(
    State(state): State<AppState>,
    Json(req): Json<ExecuteRequest>,
) -> Result<(StatusCode, Json<Scheduled>)> {
    let command = state
        .commands
        .schedule(&req.machine_name, &req.script_name)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(Scheduled {
            message: "Command scheduled".to_string(),
            command_id: command.id,
        }),
    ))
}

/// Unknown machines simply have nothing pending
pub async fn pending_commands(
    State(state): State<AppState>,
    Path(machine_id): Path<String>,
) -> Result<Json<Vec<PendingCommand>>> {
    let pending = state.commands.fetch_pending(&machine_id).await?;
    Ok(Json(pending.iter().map(CommandRecord::pending).collect()))
}

pub async fn report_result(
    State(state): State<AppState>,
    Path(command_id): Path<CommandId>,
    Json(report): Json<ResultReport>,
) -> Result<Json<Message>> {
    state
        .commands
        .report_result(command_id, report.outcome, &report.output)
        .await?;
    Ok(Json(Message::new("Result saved")))
}

pub async fn get_result(
    State(state): State<AppState>,
    Path(command_id): Path<CommandId>,
) -> Result<Json<CommandRecord>> {
    Ok(Json(state.commands.get(command_id).await?))
}

#[cfg(test)]
mod tests {
    use super::super::{router, AppState};
    use crate::store::MemoryStore;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use axum::Router;
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use shellfleet_shared::{
        ClientError, CommandStatus, DispatchClient, FailureKind, Outcome, ResultReport,
    };
    use std::sync::Arc;
    use std::time::Duration;
    use tower::ServiceExt;

    fn app() -> Router {
        let state = AppState::new(Arc::new(MemoryStore::new()), Duration::from_secs(300));
        router(state)
    }

    async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    #[tokio::test]
    async fn test_register_then_list() {
        let app = app();
        let (status, body) = send(
            &app,
            "POST",
            "/register_machine",
            Some(json!({"id": "m1", "name": "web1"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["message"].is_string());

        let (status, body) = send(&app, "GET", "/machines", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!([{"id": "m1", "name": "web1"}]));
    }

    #[tokio::test]
    async fn test_duplicate_script_is_bad_request() {
        let app = app();
        let script = json!({"name": "deploy", "content": "./deploy.sh"});

        let (status, _) = send(&app, "POST", "/scripts", Some(script.clone())).await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, body) = send(&app, "POST", "/scripts", Some(script)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["detail"], "Script already exists: deploy");

        let (status, body) = send(&app, "GET", "/scripts/deploy", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["content"], "./deploy.sh");
    }

    #[tokio::test]
    async fn test_execute_unknown_names_is_not_found() {
        let app = app();
        send(
            &app,
            "POST",
            "/register_machine",
            Some(json!({"id": "m1", "name": "web1"})),
        )
        .await;

        let (status, body) = send(
            &app,
            "POST",
            "/execute",
            Some(json!({"machine_name": "web1", "script_name": "deploy"})),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["detail"], "Script not found: deploy");

        let (status, body) = send(
            &app,
            "POST",
            "/execute",
            Some(json!({"machine_name": "db9", "script_name": "deploy"})),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["detail"], "Machine not found: db9");
    }

    #[tokio::test]
    async fn test_report_unknown_command_is_not_found() {
        let app = app();
        let (status, body) = send(
            &app,
            "POST",
            "/commands/42/result",
            Some(json!({"output": "x"})),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["detail"], "Command not found: 42");
    }

    #[tokio::test]
    async fn test_pending_for_unknown_machine_is_empty() {
        let app = app();
        let (status, body) = send(&app, "GET", "/commands/ghost", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!([]));
    }

    #[tokio::test]
    async fn test_health() {
        let (status, body) = send(&app(), "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "ok");
    }

    async fn serve() -> DispatchClient {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app()).await.unwrap();
        });
        DispatchClient::new(format!("http://{}", addr)).unwrap()
    }

    #[tokio::test]
    async fn test_full_dispatch_round_trip() {
        let client = serve().await;

        client.register_machine("m1", "web1").await.unwrap();
        client.create_script("ping", "echo pong").await.unwrap();
        let scheduled = client.schedule("web1", "ping").await.unwrap();
        assert_eq!(scheduled.command_id, 1);

        let pending = client.fetch_pending("m1").await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, 1);
        assert_eq!(pending[0].script_name, "ping");

        let script = client.get_script("ping").await.unwrap().unwrap();
        assert_eq!(script.content, "echo pong");

        client
            .report_result(1, &ResultReport::new(Outcome::Succeeded, "pong\n"))
            .await
            .unwrap();

        assert!(client.fetch_pending("m1").await.unwrap().is_empty());
        let record = client.get_command(1).await.unwrap();
        assert_eq!(
            record.status,
            CommandStatus::Succeeded {
                output: "pong\n".into()
            }
        );
        assert!(record.completed_at.is_some());
    }

    #[tokio::test]
    async fn test_client_surfaces_api_failures() {
        let client = serve().await;

        client.create_script("ping", "echo pong").await.unwrap();
        let err = client.create_script("ping", "echo other").await.unwrap_err();
        assert!(matches!(err, ClientError::Conflict(_)));
        assert!(!err.is_transient());

        let err = client.schedule("nowhere", "ping").await.unwrap_err();
        assert!(matches!(err, ClientError::NotFound(_)));

        assert!(client.get_script("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_failure_is_reported_with_its_kind() {
        let client = serve().await;
        client.register_machine("m1", "web1").await.unwrap();
        client.create_script("boom", "exit 3").await.unwrap();
        let scheduled = client.schedule("web1", "boom").await.unwrap();

        let failure = FailureKind::NonZeroExit { code: 3 };
        client
            .report_result(
                scheduled.command_id,
                &ResultReport::new(Outcome::Failed { failure }, ""),
            )
            .await
            .unwrap();

        let record = client.get_command(scheduled.command_id).await.unwrap();
        assert_eq!(record.status.label(), "failed");
        assert_eq!(
            record.status,
            CommandStatus::Failed {
                failure,
                output: String::new()
            }
        );
    }
}

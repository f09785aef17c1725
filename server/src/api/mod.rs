//! HTTP boundary of the dispatch service
//!
//! Routes:
//! - `POST /register_machine`, `GET /machines`
//! - `POST /scripts`, `GET /scripts/:name`
//! - `POST /execute`
//! - `GET /commands/:machine_id`, `POST /commands/:command_id/result`
//! - `GET /results/:command_id`, `GET /health`

mod handlers;

use crate::command::CommandQueue;
use crate::fleet::FleetRegistry;
use crate::script::ScriptStore;
use crate::store::Store;
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;

/// Components shared by every handler
#[derive(Clone)]
pub struct AppState {
    pub fleet: Arc<FleetRegistry>,
    pub scripts: Arc<ScriptStore>,
    pub commands: Arc<CommandQueue>,
}

impl AppState {
    pub fn new(store: Arc<dyn Store>, active_window: Duration) -> Self {
        Self {
            fleet: Arc::new(FleetRegistry::new(store.clone(), active_window)),
            scripts: Arc::new(ScriptStore::new(store.clone())),
            commands: Arc::new(CommandQueue::new(store)),
        }
    }
}

pub fn router(state: AppState) -> Router {
    // Both command routes name their segment `id`; the handlers decide what it means
    Router::new()
        .route("/health", get(handlers::health))
        .route("/register_machine", post(handlers::register_machine))
        .route("/machines", get(handlers::list_machines))
        .route("/scripts", post(handlers::create_script))
        .route("/scripts/:name", get(handlers::get_script))
        .route("/execute", post(handlers::execute))
        .route("/commands/:id", get(handlers::pending_commands))
        .route("/commands/:id/result", post(handlers::report_result))
        .route("/results/:id", get(handlers::get_result))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

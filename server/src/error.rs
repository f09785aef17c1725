use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use shellfleet_shared::ErrorBody;
use std::fmt;
use thiserror::Error;
use tracing::error;

/// Kind of record a lookup missed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    Machine,
    Script,
    Command,
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Entity::Machine => write!(f, "Machine"),
            Entity::Script => write!(f, "Script"),
            Entity::Command => write!(f, "Command"),
        }
    }
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("{entity} not found: {key}")]
    NotFound { entity: Entity, key: String },

    #[error("Script already exists: {0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Corrupt command row {id}: {reason}")]
    CorruptRow { id: i64, reason: String },
}

impl DispatchError {
    pub fn not_found(entity: Entity, key: impl ToString) -> Self {
        DispatchError::NotFound {
            entity,
            key: key.to_string(),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            DispatchError::NotFound { .. } => StatusCode::NOT_FOUND,
            DispatchError::Conflict(_) => StatusCode::BAD_REQUEST,
            DispatchError::Database(_) | DispatchError::CorruptRow { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for DispatchError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let detail = if status.is_server_error() {
            error!(error = %self, "Request failed in storage");
            "Internal storage error".to_string()
        } else {
            self.to_string()
        };
        (status, Json(ErrorBody { detail })).into_response()
    }
}

pub type Result<T> = std::result::Result<T, DispatchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(
            DispatchError::not_found(Entity::Script, "deploy").status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            DispatchError::Conflict("deploy".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            DispatchError::CorruptRow {
                id: 1,
                reason: "bad".into()
            }
            .status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_not_found_detail() {
        let err = DispatchError::not_found(Entity::Machine, "web1");
        assert_eq!(err.to_string(), "Machine not found: web1");
    }
}

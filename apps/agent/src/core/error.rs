use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

/// The error taxonomy the agent surfaces over HTTP. Internal helpers mostly
/// return `anyhow::Result`; handlers convert at the boundary.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("{0}")]
    Input(String),
    #[error("{0}")]
    Auth(String),
    #[error("middleware not initialized")]
    NotInitialized,
    #[error("{0}")]
    Preflight(String),
    #[error("{0}")]
    RuntimeInvocation(String),
    #[error("{0}")]
    Transport(String),
    #[error("{0}")]
    Persistence(String),
}

impl AgentError {
    fn status(&self) -> StatusCode {
        match self {
            AgentError::Input(_) => StatusCode::BAD_REQUEST,
            AgentError::Auth(_) => StatusCode::UNAUTHORIZED,
            AgentError::NotInitialized => StatusCode::INTERNAL_SERVER_ERROR,
            AgentError::Preflight(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AgentError::RuntimeInvocation(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AgentError::Transport(_) => StatusCode::BAD_GATEWAY,
            AgentError::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AgentError {
    fn into_response(self) -> Response {
        let status = self.status();
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

impl From<anyhow::Error> for AgentError {
    fn from(e: anyhow::Error) -> Self {
        AgentError::RuntimeInvocation(e.to_string())
    }
}

use crate::core::{error::AgentError, runtime};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

#[derive(Debug, Deserialize)]
pub struct PullRequest {
    image: String,
}

pub async fn pull(Json(req): Json<PullRequest>) -> Result<Json<Value>, AgentError> {
    let result = runtime::pull_image(&req.image)
        .await
        .map_err(|e| AgentError::RuntimeInvocation(e.to_string()))?;
    Ok(Json(json!({ "result": result })))
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    registry: String,
    username: String,
    password: String,
}

pub async fn login(Json(req): Json<LoginRequest>) -> Result<Json<Value>, AgentError> {
    let result = runtime::login(&req.registry, &req.username, &req.password)
        .await
        .map_err(|e| AgentError::RuntimeInvocation(e.to_string()))?;
    Ok(Json(json!({ "result": result })))
}

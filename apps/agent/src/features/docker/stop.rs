use crate::core::{error::AgentError, runtime};
use axum::extract::Path;
use axum::Json;
use serde_json::{json, Value};

pub async fn stop(Path(id): Path<String>) -> Result<Json<Value>, AgentError> {
    let result = runtime::stop_container(&id)
        .await
        .map_err(|e| AgentError::RuntimeInvocation(e.to_string()))?;
    Ok(Json(json!({ "result": result })))
}

pub async fn remove(Path(id): Path<String>) -> Result<Json<Value>, AgentError> {
    let result = runtime::remove_container(&id)
        .await
        .map_err(|e| AgentError::RuntimeInvocation(e.to_string()))?;
    Ok(Json(json!({ "result": result })))
}

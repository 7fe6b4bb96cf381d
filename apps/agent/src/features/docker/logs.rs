use crate::core::{error::AgentError, runtime};
use axum::extract::{Path, Query};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

#[derive(Debug, Deserialize)]
pub struct LogsQuery {
    tail: Option<u32>,
}

pub async fn logs(Path(id): Path<String>, Query(q): Query<LogsQuery>) -> Result<Json<Value>, AgentError> {
    let result = runtime::container_logs(&id, q.tail)
        .await
        .map_err(|e| AgentError::RuntimeInvocation(e.to_string()))?;
    Ok(Json(json!({ "result": result })))
}

use crate::core::runtime::RunSpec;
use crate::core::state::AppState;
use crate::core::{error::AgentError, runtime};
use axum::extract::Extension;
use axum::Json;
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use tokio::process::Command;
use tracing::info;

#[derive(Debug, Deserialize)]
pub struct RunRequest {
    #[serde(rename = "workloadId")]
    pub workload_id: String,
    pub image: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(rename = "displayName", default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub ports: Vec<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
    #[serde(default)]
    pub volumes: Vec<String>,
}

/// Supersedes the earlier synchronous `/docker/run` contract (see
/// DESIGN.md's Open Question record): always async, always labels-aware,
/// always workloadId-bearing.
pub async fn run(
    Extension(state): Extension<AppState>,
    Json(req): Json<RunRequest>,
) -> Result<Json<Value>, AgentError> {
    let name = req.name.unwrap_or_else(|| req.workload_id.clone());
    let display_name = req.display_name.unwrap_or_else(|| name.clone());

    let env: Vec<String> = req
        .env
        .into_iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect();

    let spec = RunSpec {
        image: req.image,
        name: name.clone(),
        ports: req.ports,
        env,
        volumes: req.volumes,
        extra_args: vec![
            "--label".to_string(),
            format!("displayName={display_name}"),
            "--label".to_string(),
            format!("workloadId={}", req.workload_id),
        ],
    };

    let workload_id = req.workload_id.clone();
    state
        .pending_workloads
        .lock()
        .await
        .insert(workload_id.clone(), Utc::now());

    let args = runtime::run_args(&spec);
    let child = Command::new("docker").args(&args).spawn();
    match child {
        Ok(mut child) => {
            if let Some(pid) = child.id() {
                state
                    .running_docker_runs
                    .lock()
                    .await
                    .insert(pid, workload_id.clone());
            }
            let tracked_workload_id = workload_id.clone();
            tokio::spawn(async move {
                match child.wait().await {
                    Ok(status) => info!(workload_id = %tracked_workload_id, %status, "docker run completed"),
                    Err(e) => tracing::error!(workload_id = %tracked_workload_id, error = %e, "docker run wait failed"),
                }
            });
        }
        Err(e) => {
            tracing::error!(workload_id = %workload_id, error = %e, "failed to spawn docker run");
        }
    }

    Ok(Json(json!({
        "result": "Command queued for execution",
        "workloadId": workload_id,
    })))
}

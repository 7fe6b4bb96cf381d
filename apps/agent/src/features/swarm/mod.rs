use crate::core::error::AgentError;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::process::Command;

pub fn router() -> Router {
    Router::new()
        .route("/api/swarm/status", get(status))
        .route("/api/swarm/init", post(init))
        .route("/api/swarm/join", post(join))
        .route("/api/swarm/leave", post(leave))
        .route("/api/swarm/deploy", post(deploy))
        .route("/api/swarm/remove", post(remove))
}

/// Runs a `docker` subcommand and returns its merged stdout+stderr as text.
/// `SwarmController.cpp` returns this same text as a 200 body regardless of
/// whether it contains the word "Error" — only a spawn failure is an error
/// here.
async fn run_docker(args: &[&str]) -> Result<String, AgentError> {
    let output = Command::new("docker")
        .args(args)
        .output()
        .await
        .map_err(|e| AgentError::RuntimeInvocation(e.to_string()))?;
    let mut combined = String::from_utf8_lossy(&output.stdout).trim().to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    if !stderr.is_empty() {
        if !combined.is_empty() {
            combined.push('\n');
        }
        combined.push_str(&stderr);
    }
    Ok(combined)
}

async fn status() -> Result<Json<Value>, AgentError> {
    let out = run_docker(&["info", "--format", "{{json .Swarm}}"]).await?;
    let parsed: Value = serde_json::from_str(&out).unwrap_or(json!(out));
    Ok(Json(json!({ "result": parsed })))
}

#[derive(Debug, Deserialize)]
struct InitRequest {
    #[serde(rename = "advertiseAddr", default)]
    advertise_addr: Option<String>,
}

async fn init(Json(req): Json<InitRequest>) -> Result<Json<Value>, AgentError> {
    let result = match req.advertise_addr {
        Some(addr) => run_docker(&["swarm", "init", "--advertise-addr", &addr]).await?,
        None => run_docker(&["swarm", "init"]).await?,
    };
    Ok(Json(json!({ "result": result })))
}

#[derive(Debug, Deserialize)]
struct JoinRequest {
    token: String,
    #[serde(rename = "managerAddress")]
    manager_address: String,
}

async fn join(Json(req): Json<JoinRequest>) -> Result<Json<Value>, AgentError> {
    let result = run_docker(&["swarm", "join", "--token", &req.token, &req.manager_address]).await?;
    Ok(Json(json!({ "result": result })))
}

async fn leave() -> Result<Json<Value>, AgentError> {
    let result = run_docker(&["swarm", "leave", "--force"]).await?;
    Ok(Json(json!({ "result": result })))
}

#[derive(Debug, Deserialize)]
struct DeployRequest {
    #[serde(rename = "stackName")]
    stack_name: String,
    #[serde(rename = "composeFile")]
    compose_file: String,
}

async fn deploy(Json(req): Json<DeployRequest>) -> Result<Json<Value>, AgentError> {
    let result = run_docker(&["stack", "deploy", "-c", &req.compose_file, &req.stack_name]).await?;
    Ok(Json(json!({ "result": result })))
}

#[derive(Debug, Deserialize)]
struct RemoveRequest {
    #[serde(rename = "stackName")]
    stack_name: String,
}

async fn remove(Json(req): Json<RemoveRequest>) -> Result<Json<Value>, AgentError> {
    let result = run_docker(&["stack", "rm", &req.stack_name]).await?;
    Ok(Json(json!({ "result": result })))
}

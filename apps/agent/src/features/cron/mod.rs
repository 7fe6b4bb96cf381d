use crate::core::error::AgentError;
use axum::extract::Path;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::process::Command;

pub fn router() -> Router {
    Router::new()
        .route("/cron/list", get(list))
        .route("/cron/add", post(add))
        .route("/cron/remove/:job_id", post(remove))
}

async fn crontab_lines() -> Vec<String> {
    let output = Command::new("crontab").arg("-l").output().await;
    match output {
        Ok(out) if out.status.success() => String::from_utf8_lossy(&out.stdout)
            .lines()
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}

async fn list() -> Json<Value> {
    Json(json!({ "result": crontab_lines().await }))
}

#[derive(Debug, Deserialize)]
struct AddRequest {
    schedule: String,
    command: String,
}

/// Appends `<schedule> <command>` to the crontab via a temp-file roundtrip,
/// matching the original's `crontab -l > tmp; echo line >> tmp; crontab tmp`.
/// `CronController.cpp::executeCronCommand` discards `pclose`'s return value
/// and always returns the command's text, so a failing `crontab` invocation
/// here still yields a 200 with that text, not an error.
async fn add(Json(req): Json<AddRequest>) -> Result<Json<Value>, AgentError> {
    let mut lines = crontab_lines().await;
    lines.push(format!("{} {}", req.schedule, req.command));
    let new_crontab = lines.join("\n") + "\n";

    let tmp = tempfile_path();
    tokio::fs::write(&tmp, new_crontab)
        .await
        .map_err(|e| AgentError::RuntimeInvocation(e.to_string()))?;

    let output = Command::new("crontab")
        .arg(&tmp)
        .output()
        .await
        .map_err(|e| AgentError::RuntimeInvocation(e.to_string()))?;
    let _ = tokio::fs::remove_file(&tmp).await;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        return Ok(Json(json!({ "result": stderr })));
    }
    Ok(Json(json!({ "result": "Cron job added" })))
}

/// Removes any crontab line containing `jobId` as a substring, matching the
/// original's `grep -v` filter.
async fn remove(Path(job_id): Path<String>) -> Result<Json<Value>, AgentError> {
    let lines = crontab_lines().await;
    let filtered: Vec<&String> = lines.iter().filter(|l| !l.contains(&job_id)).collect();
    let new_crontab = filtered
        .iter()
        .map(|s| s.as_str())
        .collect::<Vec<_>>()
        .join("\n")
        + "\n";

    let tmp = tempfile_path();
    tokio::fs::write(&tmp, new_crontab)
        .await
        .map_err(|e| AgentError::RuntimeInvocation(e.to_string()))?;

    let output = Command::new("crontab")
        .arg(&tmp)
        .output()
        .await
        .map_err(|e| AgentError::RuntimeInvocation(e.to_string()))?;
    let _ = tokio::fs::remove_file(&tmp).await;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        return Ok(Json(json!({ "result": stderr })));
    }
    Ok(Json(json!({ "result": "Cron job removed" })))
}

fn tempfile_path() -> std::path::PathBuf {
    std::env::temp_dir().join(format!("agent-crontab-{}.tmp", uuid::Uuid::new_v4()))
}

use crate::core::error::AgentError;
use axum::routing::post;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::path::Path;
use tokio::process::Command;

pub fn router() -> Router {
    Router::new()
        .route("/compose/run", post(run))
        .route("/compose/clone", post(clone))
        .route("/compose/stop", post(stop))
}

/// Runs `cmd` to completion and returns its merged stdout+stderr as text. The
/// exit status is never inspected: a failed `docker compose`/`git` invocation
/// is still a normal result here, matching `ComposeController.cpp`, which
/// never throws on a non-zero exit. Only a spawn failure is an error.
async fn run_merged(mut cmd: Command) -> Result<String, AgentError> {
    let output = cmd.output().await.map_err(|e| AgentError::RuntimeInvocation(e.to_string()))?;
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

#[derive(Debug, Deserialize)]
struct RunRequest {
    #[serde(rename = "composeDir")]
    compose_dir: String,
    #[serde(rename = "envVariables", default)]
    env_variables: HashMap<String, String>,
}

async fn run(Json(req): Json<RunRequest>) -> Result<Json<Value>, AgentError> {
    let compose_file = format!("{}/docker-compose.yml", req.compose_dir);
    let build_flag = has_dockerfile(&req.compose_dir).await;

    let mut cmd = Command::new("sh");
    let mut script = String::new();
    for (k, v) in &req.env_variables {
        script.push_str(&format!("export {}={}; ", shell_escape(k), shell_escape(v)));
    }
    script.push_str("docker compose -f ");
    script.push_str(&shell_escape(&compose_file));
    script.push_str(" up -d");
    if build_flag {
        script.push_str(" --build");
    }
    cmd.arg("-c").arg(&script);

    let result = run_merged(cmd).await?;
    Ok(Json(json!({ "result": result })))
}

#[derive(Debug, Deserialize)]
struct CloneRequest {
    #[serde(rename = "repoUrl")]
    repo_url: String,
    branch: String,
    #[serde(rename = "authToken")]
    auth_token: Option<String>,
    #[serde(rename = "envVariables", default)]
    #[allow(dead_code)]
    env_variables: HashMap<String, String>,
}

/// Clones (or pulls, if the target directory already exists) the compose
/// repository, mirroring the original's decision between `git clone` and
/// `git pull`+`git reset --hard`.
async fn clone(Json(req): Json<CloneRequest>) -> Result<Json<Value>, AgentError> {
    let repo_name = repo_name_from_url(&req.repo_url);
    let compose_dir = format!("compose-repos/{repo_name}");

    let url = match &req.auth_token {
        Some(token) => req.repo_url.replacen("https://", &format!("https://{token}@"), 1),
        None => req.repo_url.clone(),
    };

    if Path::new(&compose_dir).exists() {
        let _ = Command::new("git")
            .args(["-C", &compose_dir, "fetch", "origin", &req.branch])
            .output()
            .await;
        let mut reset = Command::new("git");
        reset.args(["-C", &compose_dir, "reset", "--hard", &format!("origin/{}", req.branch)]);
        run_merged(reset).await?;
    } else {
        let mut clone = Command::new("git");
        clone.args(["clone", "-b", &req.branch, &url, &compose_dir]);
        run_merged(clone).await?;
    };

    Ok(Json(json!({
        "result": "Repository ready",
        "composeDir": compose_dir,
    })))
}

#[derive(Debug, Deserialize)]
struct StopRequest {
    #[serde(rename = "composeDir")]
    compose_dir: String,
}

async fn stop(Json(req): Json<StopRequest>) -> Result<Json<Value>, AgentError> {
    let compose_file = format!("{}/docker-compose.yml", req.compose_dir);
    let mut cmd = Command::new("docker");
    cmd.args(["compose", "-f", &compose_file, "down"]);
    let result = run_merged(cmd).await?;
    Ok(Json(json!({ "result": result })))
}

/// Strips a trailing `.git` and takes the last path segment, e.g.
/// `https://github.com/org/repo.git` -> `repo`.
fn repo_name_from_url(url: &str) -> String {
    let trimmed = url.trim_end_matches('/').trim_end_matches(".git");
    trimmed.rsplit('/').next().unwrap_or(trimmed).to_string()
}

async fn has_dockerfile(dir: &str) -> bool {
    if tokio::fs::metadata(format!("{dir}/Dockerfile")).await.is_ok() {
        return true;
    }
    let output = Command::new("find")
        .args([dir, "-maxdepth", "2", "-iname", "Dockerfile"])
        .output()
        .await;
    matches!(output, Ok(o) if !o.stdout.is_empty())
}

fn shell_escape(value: &str) -> String {
    format!("'{}'", value.replace('\'', "'\\''"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_git_suffix_and_takes_last_segment() {
        assert_eq!(repo_name_from_url("https://github.com/org/repo.git"), "repo");
        assert_eq!(repo_name_from_url("https://github.com/org/repo"), "repo");
        assert_eq!(repo_name_from_url("https://github.com/org/repo/"), "repo");
    }

    #[test]
    fn shell_escape_quotes_single_quotes() {
        assert_eq!(shell_escape("it's"), "'it'\\''s'");
    }
}

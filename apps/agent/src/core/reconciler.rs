use crate::core::runtime::{self, ContainerSummary};
use crate::core::state::{AppState, WorkloadState};
use chrono::{Duration as ChronoDuration, Utc};
use serde::Serialize;
use std::collections::HashSet;
use tokio::process::Command;
use tracing::{info, warn};

/// Workloads whose `docker run` is still in flight get this long before the
/// reconciler gives up and drops them from `pendingWorkloads` (§4.9 step 2).
const GRACE_PERIOD: ChronoDuration = ChronoDuration::minutes(35);

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ContainerView {
    pub id: String,
    pub names: String,
    pub image: String,
    pub status: String,
    pub ports: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub since_minutes: Option<f64>,
}

impl ContainerView {
    fn synthetic(names: &str, reason: &str, since_minutes: Option<f64>) -> Self {
        ContainerView {
            id: String::new(),
            names: names.to_string(),
            image: String::new(),
            status: "Pulling".to_string(),
            ports: String::new(),
            reason: Some(reason.to_string()),
            since_minutes,
        }
    }
}

fn from_summary(c: &ContainerSummary) -> ContainerView {
    ContainerView {
        id: c.id.clone(),
        names: c.name.clone(),
        image: c.image.clone(),
        status: classify_ps_status(&c.status),
        ports: c.ports.clone(),
        reason: None,
        since_minutes: None,
    }
}

fn classify_ps_status(ps_status: &str) -> String {
    let lower = ps_status.to_lowercase();
    if lower.starts_with("up") {
        "Running".to_string()
    } else if lower.starts_with("exited") {
        "Exited".to_string()
    } else if lower.starts_with("created") {
        "ContainerCreating".to_string()
    } else if lower.starts_with("removal") {
        "Removing".to_string()
    } else {
        ps_status.to_string()
    }
}

/// Runs the deterministic 5-step merge described for the view reconciler:
/// runtime listing, pending-launch synthesis with grace period, per-container
/// inspect-state enhancement, running-PID sweep, and a ps-aux fallback scan.
pub async fn reconcile(state: &AppState, all: bool) -> anyhow::Result<Vec<ContainerView>> {
    let containers = runtime::list_containers(all).await.unwrap_or_default();
    let mut names: HashSet<String> = containers.iter().map(|c| c.name.clone()).collect();
    let mut list: Vec<ContainerView> = containers.iter().map(from_summary).collect();

    reconcile_pending(state, &names, &mut list).await;
    for c in &list {
        names.insert(c.names.clone());
    }

    enhance_with_inspect(&mut list).await;

    reconcile_running_docker_runs(state, &mut names, &mut list).await;
    reconcile_ps_fallback(&mut names, &mut list).await;

    let mut states = state.workload_states.lock().await;
    for view in &list {
        if view.names.is_empty() {
            continue;
        }
        states.insert(
            view.names.clone(),
            WorkloadState {
                status: view.status.clone(),
                reason: view.reason.clone(),
                last_update: Utc::now(),
            },
        );
    }

    Ok(list)
}

async fn docker_run_processes() -> Vec<String> {
    let output = Command::new("sh")
        .arg("-c")
        .arg("ps aux | grep 'docker run' | grep -v grep")
        .output()
        .await;
    match output {
        Ok(out) => String::from_utf8_lossy(&out.stdout)
            .lines()
            .map(str::to_string)
            .collect(),
        Err(_) => Vec::new(),
    }
}

/// §4.9 step 2: resolve each pending workload against the live container set
/// and the host process table.
async fn reconcile_pending(state: &AppState, names: &HashSet<String>, list: &mut Vec<ContainerView>) {
    let mut pending = state.pending_workloads.lock().await;
    if pending.is_empty() {
        return;
    }

    let processes = docker_run_processes().await;
    let now = Utc::now();
    let mut to_remove = Vec::new();

    for (workload_id, dispatched_at) in pending.iter() {
        if names.contains(workload_id) {
            to_remove.push(workload_id.clone());
            continue;
        }

        let still_launching = processes.iter().any(|line| line.contains(workload_id.as_str()));
        if still_launching {
            let age_minutes = (now - *dispatched_at).num_milliseconds() as f64 / 60_000.0;
            list.push(ContainerView::synthetic(
                workload_id,
                "docker run in progress",
                Some(age_minutes),
            ));
            continue;
        }

        if now - *dispatched_at > GRACE_PERIOD {
            warn!(workload_id, "workload exceeded launch grace period, dropping from pending");
            to_remove.push(workload_id.clone());
        }
        // else: keep pending silently, no record appended this pass.
    }

    for id in to_remove {
        pending.remove(&id);
    }
}

/// §4.9 step 3: enhance every named record with the runtime's detailed
/// per-container state. Records with no corresponding container yet (e.g.
/// synthetic `Pulling` entries) are left as-is when inspect fails.
async fn enhance_with_inspect(list: &mut [ContainerView]) {
    for view in list.iter_mut() {
        if view.names.is_empty() {
            continue;
        }
        let Ok(state_json) = runtime::inspect_state(&view.names).await else {
            continue;
        };

        if state_json.get("Running").and_then(|v| v.as_bool()) == Some(true) {
            view.status = "Running".to_string();
        } else if state_json.get("Paused").and_then(|v| v.as_bool()) == Some(true) {
            view.status = "Paused".to_string();
        } else if state_json.get("Restarting").and_then(|v| v.as_bool()) == Some(true) {
            view.status = "Restarting".to_string();
        } else if state_json.get("Dead").and_then(|v| v.as_bool()) == Some(true) {
            view.status = "Dead".to_string();
        } else if let Some(status) = state_json.get("Status").and_then(|v| v.as_str()) {
            view.status = match status {
                "created" => "ContainerCreating".to_string(),
                "exited" => "Exited".to_string(),
                "removing" => "Removing".to_string(),
                "dead" => "Dead".to_string(),
                "running" => "Running".to_string(),
                other => other.to_string(),
            };
        }

        if let Some(err) = state_json.get("Error").and_then(|v| v.as_str()) {
            if !err.is_empty() {
                view.status = "ImagePullBackOff".to_string();
                view.reason = Some(err.to_string());
            }
        }
    }
}

async fn pid_is_alive(pid: u32) -> bool {
    tokio::fs::metadata(format!("/proc/{pid}")).await.is_ok()
}

/// §4.9 step 4: sweep tracked PIDs, dropping dead ones and synthesizing
/// `Pulling` records for workloads not yet visible any other way.
async fn reconcile_running_docker_runs(
    state: &AppState,
    names: &mut HashSet<String>,
    list: &mut Vec<ContainerView>,
) {
    let mut running = state.running_docker_runs.lock().await;
    if running.is_empty() {
        return;
    }

    let mut dead_pids = Vec::new();
    for (pid, workload_id) in running.iter() {
        if pid_is_alive(*pid).await {
            if !names.contains(workload_id) {
                list.push(ContainerView::synthetic(
                    workload_id,
                    "docker run in progress (tracked by PID)",
                    None,
                ));
                names.insert(workload_id.clone());
            }
        } else {
            dead_pids.push(*pid);
        }
    }
    for pid in dead_pids {
        running.remove(&pid);
    }
}

/// §4.9 step 5: catch any `docker run --name <n>` still live but otherwise
/// untracked (e.g. dispatched before this agent process started).
async fn reconcile_ps_fallback(names: &mut HashSet<String>, list: &mut Vec<ContainerView>) {
    let processes = docker_run_processes().await;
    for line in processes {
        let Some(name) = extract_name_flag(&line) else {
            continue;
        };
        if names.contains(&name) {
            continue;
        }
        names.insert(name.clone());
        info!(name, "found untracked docker run via ps fallback scan");
        list.push(ContainerView::synthetic(
            &name,
            "docker run in progress (ps aux fallback)",
            None,
        ));
    }
}

fn extract_name_flag(ps_line: &str) -> Option<String> {
    let idx = ps_line.find("--name")?;
    let after = ps_line[idx + "--name".len()..].trim_start();
    let after = after.strip_prefix('=').unwrap_or(after);
    after.split_whitespace().next().map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_up_status_as_running() {
        assert_eq!(classify_ps_status("Up 3 hours"), "Running");
    }

    #[test]
    fn classifies_exited_status() {
        assert_eq!(classify_ps_status("Exited (0) 2 minutes ago"), "Exited");
    }

    #[test]
    fn extracts_name_flag_with_space() {
        let line = "root 123 0.0 docker run --name my-workload nginx";
        assert_eq!(extract_name_flag(line), Some("my-workload".to_string()));
    }

    #[test]
    fn extracts_name_flag_with_equals() {
        let line = "root 123 0.0 docker run --name=my-workload nginx";
        assert_eq!(extract_name_flag(line), Some("my-workload".to_string()));
    }

    #[test]
    fn extracts_nothing_without_name_flag() {
        let line = "root 123 0.0 docker ps";
        assert_eq!(extract_name_flag(line), None);
    }

    #[tokio::test]
    async fn pid_is_alive_false_for_implausible_pid() {
        assert!(!pid_is_alive(u32::MAX - 1).await);
    }

    #[tokio::test]
    async fn reconcile_drops_timed_out_pending_without_record() {
        let state = AppState::new("node-1".into(), "http://central".into(), 8080, None, String::new());
        state
            .pending_workloads
            .lock()
            .await
            .insert("wl-timeout".to_string(), Utc::now() - ChronoDuration::minutes(40));

        let views = reconcile(&state, true).await.unwrap();
        assert!(!views.iter().any(|v| v.names == "wl-timeout"));
        assert!(state.pending_workloads.lock().await.is_empty());
    }
}

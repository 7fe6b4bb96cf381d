use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Debug, Clone)]
pub struct WorkloadState {
    pub status: String,
    pub reason: Option<String>,
    pub last_update: DateTime<Utc>,
}

/// Shared agent state. Each map guards its own `Mutex` rather than one big
/// lock, matching the teacher's per-concern locking in its VM registries.
#[derive(Clone)]
pub struct AppState {
    pub node_id: String,
    pub central_url: String,
    pub agent_port: u16,
    pub shared_secret: Option<String>,
    pub trusted_key: Arc<Mutex<String>>,
    /// workloadId -> time the `docker run` was dispatched; consulted by the
    /// reconciler's grace-period logic before a workload is declared failed.
    pub pending_workloads: Arc<Mutex<HashMap<String, DateTime<Utc>>>>,
    /// pid -> workloadId for `docker run` invocations still being awaited.
    pub running_docker_runs: Arc<Mutex<HashMap<u32, String>>>,
    /// workloadId -> last known reconciled state.
    pub workload_states: Arc<Mutex<HashMap<String, WorkloadState>>>,
}

impl AppState {
    pub fn new(
        node_id: String,
        central_url: String,
        agent_port: u16,
        shared_secret: Option<String>,
        trusted_key: String,
    ) -> Self {
        AppState {
            node_id,
            central_url,
            agent_port,
            shared_secret,
            trusted_key: Arc::new(Mutex::new(trusted_key)),
            pending_workloads: Arc::new(Mutex::new(HashMap::new())),
            running_docker_runs: Arc::new(Mutex::new(HashMap::new())),
            workload_states: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn new_state_starts_empty() {
        let state = AppState::new(
            "node-1".to_string(),
            "http://central:8084".to_string(),
            9000,
            Some("secret".to_string()),
            String::new(),
        );
        assert!(state.pending_workloads.lock().await.is_empty());
        assert!(state.running_docker_runs.lock().await.is_empty());
        assert!(state.workload_states.lock().await.is_empty());
        assert_eq!(*state.trusted_key.lock().await, "");
    }
}

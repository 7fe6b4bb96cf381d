use crate::core::host_probe;
use crate::core::state::AppState;
use serde_json::json;
use std::time::Duration;
use tracing::{error, info};

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(4 * 60);

/// Strictly sequential: sleeps the full interval between iterations
/// regardless of how long the previous send took. Failures are logged and
/// the loop continues — a missed heartbeat is not fatal.
pub async fn heartbeat_loop(state: AppState) {
    loop {
        tokio::time::sleep(HEARTBEAT_INTERVAL).await;
        if let Err(e) = send_heartbeat(&state).await {
            error!(error = %e, "heartbeat failed");
        }
    }
}

async fn send_heartbeat(state: &AppState) -> anyhow::Result<()> {
    let resources = host_probe::read_resources().await;
    let status = host_probe::status_for(&resources);

    let body = json!({
        "nodeId": state.node_id,
        "status": status,
        "availableCpu": resources.available_cpu,
        "availableMemory": resources.available_memory_mib,
    });

    let client = reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(5))
        .timeout(Duration::from_secs(10))
        .build()?;

    let url = format!("{}/nodes/heartbeat", state.central_url.trim_end_matches('/'));
    let response = client.post(&url).json(&body).send().await?;
    if !response.status().is_success() {
        anyhow::bail!("heartbeat rejected with status {}", response.status());
    }
    info!(status, "heartbeat sent");
    Ok(())
}

use crate::core::host_probe;
use crate::core::state::AppState;
use axum::extract::Extension;
use axum::response::IntoResponse;
use axum::{routing::get, Json, Router};

pub fn router() -> Router {
    Router::new().route("/api/v1/health", get(health))
}

async fn health(Extension(state): Extension<AppState>) -> impl IntoResponse {
    let resources = host_probe::read_resources().await;
    let status = host_probe::status_for(&resources);

    Json(serde_json::json!({
        "nodeId": state.node_id,
        "status": status,
        "availableCpu": resources.available_cpu,
        "availableMemory": resources.available_memory_mib,
        "timestamp": chrono::Utc::now(),
    }))
}

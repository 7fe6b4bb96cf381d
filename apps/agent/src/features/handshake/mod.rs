use crate::core::state::AppState;
use axum::extract::Extension;
use axum::{routing::post, Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};

pub fn router() -> Router {
    Router::new().route("/api/v1/handshake", post(handshake))
}

#[derive(Debug, Deserialize)]
struct HandshakeRequest {
    #[serde(rename = "schedulerId")]
    #[allow(dead_code)]
    scheduler_id: Option<String>,
    #[allow(dead_code)]
    timestamp: Option<Value>,
}

/// Key pinning happens in the auth middleware before this handler runs; by
/// the time a request reaches here its signature was already valid.
async fn handshake(Extension(state): Extension<AppState>, Json(body): Json<HandshakeRequest>) -> Json<Value> {
    let _ = body;
    Json(json!({
        "message": "Handshake successful",
        "nodeId": state.node_id,
    }))
}

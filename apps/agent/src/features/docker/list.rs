use crate::core::reconciler;
use crate::core::state::AppState;
use axum::extract::{Extension, Query};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    all: bool,
}

pub async fn list(Extension(state): Extension<AppState>, Query(q): Query<ListQuery>) -> Json<Value> {
    let views = reconciler::reconcile(&state, q.all).await.unwrap_or_default();
    Json(json!({ "result": views }))
}

pub async fn images(Query(q): Query<ListQuery>) -> Json<Value> {
    let images = crate::core::runtime::list_images(q.all).await.unwrap_or_default();
    Json(json!({ "result": images }))
}

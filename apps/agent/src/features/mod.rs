use crate::core::state::AppState;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::{middleware, Router};

pub mod auth;
pub mod compose;
pub mod cron;
pub mod docker;
pub mod handshake;
pub mod health;
pub mod metrics;
pub mod swarm;

/// Mounts `/metrics` unauthenticated, layers the auth middleware over every
/// other route, and installs the catch-all 404/405 responses.
pub fn router(state: AppState) -> Router {
    let authenticated = Router::new()
        .merge(health::router())
        .merge(handshake::router())
        .merge(docker::router())
        .merge(compose::router())
        .merge(cron::router())
        .merge(swarm::router())
        .layer(middleware::from_fn(auth::auth_middleware));

    Router::new()
        .merge(metrics::router())
        .merge(authenticated)
        .layer(axum::Extension(state))
        .fallback(not_found)
}

async fn not_found() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, "The URL does not seem to be correct.")
}

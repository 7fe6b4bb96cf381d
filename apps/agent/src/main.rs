mod core;
mod features;

use core::identity;
use core::registrar;
use core::state::AppState;
use tracing::{error, info, warn};

const LOCALHOST_CENTRAL_URL: &str = "http://localhost:8084";
const DEFAULT_AGENT_PORT: u16 = 8080;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let central_url = read_central_url()?;
    let agent_port = read_agent_port();
    let shared_secret = std::env::var("AGENT_SECRET").ok().filter(|s| !s.is_empty());

    let node_id = identity::load_or_create_node_id().await?;
    let trusted_key = identity::load_trusted_key().await;
    info!(%node_id, "node identity loaded");

    let state = AppState::new(node_id.clone(), central_url.clone(), agent_port, shared_secret.clone(), trusted_key);

    match registrar::register_with_retry(&central_url, &node_id, shared_secret.as_deref()).await {
        Ok(result) => info!(status = %result.status, ready = result.ready, "registered with scheduler"),
        Err(e) => {
            error!(error = %e, "registration failed after all retries, exiting");
            std::process::exit(1);
        }
    }

    tokio::spawn(core::heartbeat::heartbeat_loop(state.clone()));

    let app = features::router(state);
    let bind = format!("0.0.0.0:{agent_port}");
    info!(%bind, "agent listening");
    let listener = tokio::net::TcpListener::bind(&bind).await?;
    axum::serve(listener, app.into_make_service()).await?;
    Ok(())
}

/// A literal `http://localhost:8084` is treated as "not really configured"
/// and aborts startup, since it is the value left behind by an unedited
/// local dev template.
fn read_central_url() -> anyhow::Result<String> {
    let url = std::env::var("CENTRAL_URL").unwrap_or_default();
    if url.is_empty() || url == LOCALHOST_CENTRAL_URL {
        anyhow::bail!("CENTRAL_URL is not configured (missing or left as the localhost default)");
    }
    Ok(url)
}

fn read_agent_port() -> u16 {
    match std::env::var("AGENT_PORT") {
        Ok(raw) => match raw.parse() {
            Ok(port) => port,
            Err(_) => {
                warn!(raw, "invalid AGENT_PORT, using default");
                DEFAULT_AGENT_PORT
            }
        },
        Err(_) => DEFAULT_AGENT_PORT,
    }
}

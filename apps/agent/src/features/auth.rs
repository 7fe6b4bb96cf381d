use crate::core::error::AgentError;
use crate::core::identity;
use crate::core::signature;
use crate::core::state::AppState;
use axum::extract::Extension;
use axum::http::{Request, StatusCode};
use axum::middleware::Next;
use axum::response::Response;
use tracing::{info, warn};

const SIG_HEADER: &str = "X-Scheduler-Signature";
const KEY_HEADER: &str = "X-Scheduler-PublicKey";
const SECRET_HEADER: &str = "X-Shared-Secret";
const HANDSHAKE_PATH: &str = "/api/v1/handshake";
const METRICS_PATH: &str = "/metrics";

/// Implements the decision table of the agent's request-authentication
/// policy: TOFU public-key pin with an optional shared-secret override.
/// `/metrics` bypasses this layer entirely (mounted outside it in the
/// router).
pub async fn auth_middleware(
    Extension(state): Extension<AppState>,
    req: Request<axum::body::Body>,
    next: Next,
) -> Result<Response, (StatusCode, String)> {
    if req.uri().path() == METRICS_PATH {
        return Ok(next.run(req).await);
    }

    let is_handshake = req.uri().path() == HANDSHAKE_PATH;

    let signature_b64 = header_value(&req, SIG_HEADER);
    let public_key_hex = header_value(&req, KEY_HEADER);
    let shared_secret_header = header_value(&req, SECRET_HEADER);

    let (Some(signature_b64), Some(public_key_hex)) = (signature_b64, public_key_hex) else {
        return Err((StatusCode::UNAUTHORIZED, "missing headers".to_string()));
    };

    let (parts, body) = req.into_parts();
    let bytes = axum::body::to_bytes(body, usize::MAX)
        .await
        .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?;

    let sig_valid = signature::verify(&bytes, &signature_b64, &public_key_hex);
    let secret_matches = match (&shared_secret_header, &state.shared_secret) {
        (Some(provided), Some(expected)) => provided == expected,
        _ => false,
    };

    if sig_valid {
        if is_handshake {
            pin_key(&state, &public_key_hex).await?;
            info!("pinned scheduler public key via handshake");
        } else {
            let pin_empty = state.trusted_key.lock().await.is_empty();
            if pin_empty {
                pin_key(&state, &public_key_hex).await?;
                info!("pinned scheduler public key on first authenticated use");
            } else {
                let mismatch = *state.trusted_key.lock().await != public_key_hex;
                if mismatch {
                    if secret_matches {
                        warn!("public key mismatch overridden by shared secret");
                    } else {
                        return Err((
                            StatusCode::UNAUTHORIZED,
                            "Public key does not match trusted key".to_string(),
                        ));
                    }
                }
            }
        }
    } else if secret_matches {
        if is_handshake {
            pin_key(&state, &public_key_hex).await?;
            warn!("invalid signature on handshake overridden by shared secret; key pinned");
        } else {
            warn!("invalid signature overridden by shared secret");
        }
    } else {
        return Err((StatusCode::UNAUTHORIZED, "signature failed".to_string()));
    }

    let req = Request::from_parts(parts, axum::body::Body::from(bytes));
    Ok(next.run(req).await)
}

/// Updates the in-memory pin and persists it to `trusted_key.txt` so a
/// restart doesn't forget a key pinned this session (invariant I7).
async fn pin_key(state: &AppState, public_key_hex: &str) -> Result<(), (StatusCode, String)> {
    {
        let mut pin = state.trusted_key.lock().await;
        *pin = public_key_hex.to_string();
    }
    identity::save_trusted_key(public_key_hex).await.map_err(|e| {
        let err = AgentError::Persistence(e.to_string());
        (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
    })
}

fn header_value(req: &Request<axum::body::Body>, name: &str) -> Option<String> {
    req.headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_name_constants_match_spec() {
        assert_eq!(SIG_HEADER, "X-Scheduler-Signature");
        assert_eq!(KEY_HEADER, "X-Scheduler-PublicKey");
        assert_eq!(SECRET_HEADER, "X-Shared-Secret");
    }
}

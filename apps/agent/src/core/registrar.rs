use crate::core::error::AgentError;
use crate::core::host_probe::{self, HostFacts};
use anyhow::{anyhow, Result};
use serde::Serialize;
use serde_json::json;
use std::time::Duration;
use tracing::{error, info};

const MAX_RETRIES: u32 = 3;
const RETRY_DELAY: Duration = Duration::from_secs(30);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const TOTAL_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Serialize)]
pub struct RegistrationResult {
    pub status: String,
    pub ready: bool,
}

fn is_ipv4_literal(host: &str) -> bool {
    host.parse::<std::net::Ipv4Addr>().is_ok()
}

fn extract_hostname(url: &str) -> Option<String> {
    let without_scheme = url.split("://").nth(1).unwrap_or(url);
    let host_port = without_scheme.split('/').next()?;
    let host = host_port.split(':').next()?;
    if host.is_empty() {
        None
    } else {
        Some(host.to_string())
    }
}

/// DNS resolution + TCP reachability probe before registering. Both steps
/// abort registration on failure (spec: "failure -> abort with a fatal
/// error" / "failure -> abort"), matching `NodeController.cpp::registerNode`,
/// which throws on either check rather than treating them as diagnostics.
async fn preflight(central_url: &str) -> Result<(), AgentError> {
    let host = extract_hostname(central_url)
        .ok_or_else(|| AgentError::Preflight(format!("could not extract hostname from {central_url}")))?;

    if is_ipv4_literal(&host) {
        info!(%host, "central host is an IP literal, skipping DNS check");
    } else {
        let mut addrs = tokio::net::lookup_host((host.as_str(), 0))
            .await
            .map_err(|e| AgentError::Preflight(format!("DNS resolution failed for {host}: {e}")))?;
        if addrs.next().is_none() {
            return Err(AgentError::Preflight(format!("DNS resolution returned no addresses for {host}")));
        }
        info!(%host, "DNS resolution succeeded");
    }

    let client = reqwest::Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .timeout(TOTAL_TIMEOUT)
        .build()
        .map_err(|e| AgentError::Preflight(format!("failed to build preflight http client: {e}")))?;

    let resp = client
        .get(central_url)
        .send()
        .await
        .map_err(|e| AgentError::Preflight(format!("central reachability check failed: {e}")))?;
    info!(status = %resp.status(), "central reachability check completed");
    Ok(())
}

fn build_registration_body(node_id: &str, facts: &HostFacts, shared_secret: Option<&str>) -> serde_json::Value {
    json!({
        "nodeId": node_id,
        "ipAddress": facts.ip_address,
        "hostname": facts.hostname,
        "username": facts.username,
        "osName": facts.os_name,
        "kernelVersion": facts.kernel_version,
        "resources": {
            "totalCpu": facts.resources.total_cpu,
            "availableCpu": facts.resources.available_cpu,
            "totalMemoryMiB": facts.resources.total_memory_mib,
            "availableMemoryMiB": facts.resources.available_memory_mib,
        },
        "hypervisor": {
            "type": facts.hypervisor.kind,
            "status": facts.hypervisor.status,
        },
        "containerEngine": {
            "type": facts.container_engine.kind,
            "status": facts.container_engine.status,
        },
        "swarm": {
            "active": facts.swarm.active,
            "nodeId": facts.swarm.node_id,
            "role": facts.swarm.role,
        },
        "labels": facts.labels,
        "authConfig": {
            "sharedSecret": shared_secret,
        },
    })
}

async fn register_once(central_url: &str, node_id: &str, shared_secret: Option<&str>) -> Result<RegistrationResult> {
    preflight(central_url).await?;

    let facts = host_probe::read_host_facts().await;
    let body = build_registration_body(node_id, &facts, shared_secret);

    let client = reqwest::Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .timeout(TOTAL_TIMEOUT)
        .build()
        .map_err(|e| AgentError::Transport(format!("failed to build registration http client: {e}")))?;

    let url = format!("{}/nodes/register", central_url.trim_end_matches('/'));
    let response = client
        .post(&url)
        .json(&body)
        .send()
        .await
        .map_err(|e| AgentError::Transport(format!("registration request failed: {e}")))?;

    let status_code = response.status();
    let payload: serde_json::Value = response
        .json()
        .await
        .map_err(|e| AgentError::Transport(format!("registration response was not valid JSON: {e}")))?;

    if !status_code.is_success() {
        return Err(AgentError::Transport(format!("registration rejected with status {status_code}: {payload}")).into());
    }

    let status = payload
        .get("status")
        .and_then(|v| v.as_str())
        .unwrap_or("unknown")
        .to_string();
    let ready = status == "active";

    Ok(RegistrationResult { status, ready })
}

/// Retries registration up to `MAX_RETRIES` times with a fixed 30s delay.
/// Exhausting all attempts is treated as fatal by the caller (`main`), which
/// exits the process rather than serve traffic unregistered.
pub async fn register_with_retry(
    central_url: &str,
    node_id: &str,
    shared_secret: Option<&str>,
) -> Result<RegistrationResult> {
    let mut last_error = None;
    for attempt in 1..=MAX_RETRIES {
        match register_once(central_url, node_id, shared_secret).await {
            Ok(result) => return Ok(result),
            Err(e) => {
                error!(attempt, error = %e, "registration attempt failed");
                last_error = Some(e);
                if attempt < MAX_RETRIES {
                    tokio::time::sleep(RETRY_DELAY).await;
                }
            }
        }
    }
    Err(last_error.unwrap_or_else(|| anyhow!("registration failed with no recorded error")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_hostname_from_url_with_scheme_and_port() {
        assert_eq!(
            extract_hostname("https://scheduler.internal:8084/api"),
            Some("scheduler.internal".to_string())
        );
    }

    #[test]
    fn extracts_hostname_without_path() {
        assert_eq!(extract_hostname("http://10.0.0.5:8084"), Some("10.0.0.5".to_string()));
    }

    #[test]
    fn detects_ipv4_literal() {
        assert!(is_ipv4_literal("10.0.0.5"));
        assert!(!is_ipv4_literal("scheduler.internal"));
    }

    #[test]
    fn builds_registration_body_with_shared_secret() {
        let facts = host_probe::HostFacts {
            resources: host_probe::Resources {
                cpu_usage_percent: 1.0,
                total_cpu: 4.0,
                available_cpu: 3.9,
                total_memory_mib: 8000,
                available_memory_mib: 7000,
                memory_usage_percent: 12.5,
                disk_usage_percent: 20.0,
            },
            ip_address: "10.0.0.5".to_string(),
            hostname: "node-1".to_string(),
            username: "agent".to_string(),
            os_name: "Linux".to_string(),
            kernel_version: "6.1.0".to_string(),
            hypervisor: host_probe::Hypervisor {
                kind: "KVM".to_string(),
                status: "active".to_string(),
                version: None,
            },
            container_engine: host_probe::ContainerEngine {
                kind: "Docker".to_string(),
                status: "active".to_string(),
                version: Some("24.0".to_string()),
            },
            swarm: host_probe::SwarmFacts {
                active: false,
                node_id: None,
                role: None,
                status: None,
                manager_address: None,
            },
            labels: std::collections::HashMap::new(),
        };
        let body = build_registration_body("node-1", &facts, Some("topsecret"));
        assert_eq!(body["nodeId"], "node-1");
        assert_eq!(body["authConfig"]["sharedSecret"], "topsecret");
    }
}

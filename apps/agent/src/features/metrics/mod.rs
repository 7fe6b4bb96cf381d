use crate::core::runtime;
use axum::response::IntoResponse;
use axum::{routing::get, Router};
use std::fmt::Write;

pub fn router() -> Router {
    Router::new().route("/metrics", get(metrics))
}

/// Unauthenticated Prometheus text-exposition endpoint. Hand-written rather
/// than built on the `metrics` crate's exporter: the wire format here (one
/// gauge series per running container, keyed by container name) has no
/// natural mapping onto a process-global metrics registry.
async fn metrics() -> impl IntoResponse {
    let containers = runtime::list_containers(false).await.unwrap_or_default();
    let mut per_container_stats = Vec::new();
    for container in &containers {
        if let Ok(stats) = runtime::container_stats(&container.name).await {
            per_container_stats.push((container.name.clone(), stats));
        }
    }
    let daemon_info = runtime::daemon_info().await.unwrap_or_default();

    (
        [("content-type", "text/plain; version=0.0.4")],
        render(&per_container_stats, &daemon_info),
    )
}

fn render(
    per_container_stats: &[(String, runtime::ContainerStats)],
    daemon_info: &runtime::DaemonInfo,
) -> String {
    let mut out = String::new();

    writeln!(out, "# HELP docker_container_cpu_usage_percent Container CPU usage percent").ok();
    writeln!(out, "# TYPE docker_container_cpu_usage_percent gauge").ok();
    for (name, stats) in per_container_stats {
        writeln!(
            out,
            "docker_container_cpu_usage_percent{{container=\"{name}\"}} {}",
            stats.cpu_percent
        )
        .ok();
    }

    writeln!(out, "# HELP docker_container_memory_usage_bytes Container memory usage in bytes").ok();
    writeln!(out, "# TYPE docker_container_memory_usage_bytes gauge").ok();
    for (name, stats) in per_container_stats {
        writeln!(
            out,
            "docker_container_memory_usage_bytes{{container=\"{name}\"}} {}",
            stats.memory_usage_bytes
        )
        .ok();
    }

    writeln!(out, "# HELP docker_container_memory_limit_bytes Container memory limit in bytes").ok();
    writeln!(out, "# TYPE docker_container_memory_limit_bytes gauge").ok();
    for (name, stats) in per_container_stats {
        writeln!(
            out,
            "docker_container_memory_limit_bytes{{container=\"{name}\"}} {}",
            stats.memory_limit_bytes
        )
        .ok();
    }

    writeln!(out, "# HELP docker_container_network_rx_bytes Container network bytes received").ok();
    writeln!(out, "# TYPE docker_container_network_rx_bytes gauge").ok();
    for (name, stats) in per_container_stats {
        writeln!(
            out,
            "docker_container_network_rx_bytes{{container=\"{name}\"}} {}",
            stats.network_rx_bytes
        )
        .ok();
    }

    writeln!(out, "# HELP docker_container_network_tx_bytes Container network bytes sent").ok();
    writeln!(out, "# TYPE docker_container_network_tx_bytes gauge").ok();
    for (name, stats) in per_container_stats {
        writeln!(
            out,
            "docker_container_network_tx_bytes{{container=\"{name}\"}} {}",
            stats.network_tx_bytes
        )
        .ok();
    }

    writeln!(out, "# HELP docker_daemon_containers_running Number of running containers").ok();
    writeln!(out, "# TYPE docker_daemon_containers_running gauge").ok();
    writeln!(out, "docker_daemon_containers_running {}", daemon_info.containers_running).ok();

    writeln!(out, "# HELP docker_daemon_containers_stopped Number of stopped containers").ok();
    writeln!(out, "# TYPE docker_daemon_containers_stopped gauge").ok();
    writeln!(out, "docker_daemon_containers_stopped {}", daemon_info.containers_stopped).ok();

    writeln!(out, "# HELP docker_daemon_containers_paused Number of paused containers").ok();
    writeln!(out, "# TYPE docker_daemon_containers_paused gauge").ok();
    writeln!(out, "docker_daemon_containers_paused {}", daemon_info.containers_paused).ok();

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_help_and_type_lines_per_metric() {
        let stats = vec![(
            "web-1".to_string(),
            runtime::ContainerStats {
                cpu_percent: 5.0,
                memory_usage_bytes: 1024.0,
                memory_limit_bytes: 2048.0,
                network_rx_bytes: 10.0,
                network_tx_bytes: 20.0,
            },
        )];
        let daemon_info = runtime::DaemonInfo {
            containers_running: 1,
            containers_paused: 0,
            containers_stopped: 0,
        };
        let text = render(&stats, &daemon_info);
        assert!(text.contains("# HELP docker_container_cpu_usage_percent"));
        assert!(text.contains("docker_container_cpu_usage_percent{container=\"web-1\"} 5"));
        assert!(text.contains("docker_daemon_containers_running 1"));
    }
}

use anyhow::{anyhow, Result};
use serde::Serialize;
use tokio::process::Command;
use tracing::{debug, warn};

/// Runs a `docker` subcommand and returns its combined stdout+stderr as text.
/// The exit status is never inspected here: the original merges stderr into
/// stdout (`2>&1`) and always returns the text as a normal result, regardless
/// of whether the subcommand itself failed. This only errors when the
/// subprocess pipe fails to open (spawn failure).
async fn docker(args: &[&str]) -> Result<String> {
    debug!(?args, "invoking docker");
    let output = Command::new("docker").args(args).output().await?;
    let mut combined = String::from_utf8_lossy(&output.stdout).trim().to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    if !stderr.is_empty() {
        if !combined.is_empty() {
            combined.push('\n');
        }
        combined.push_str(&stderr);
    }
    Ok(combined)
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSpec {
    pub image: String,
    pub name: String,
    pub ports: Vec<String>,
    pub env: Vec<String>,
    pub volumes: Vec<String>,
    pub extra_args: Vec<String>,
}

/// Composes the `docker run -d --name <name> ...` argument vector for a
/// [`RunSpec`], matching the original's string-composition approach.
pub fn run_args(spec: &RunSpec) -> Vec<String> {
    let mut args: Vec<String> = vec!["run".to_string(), "-d".to_string()];
    args.push("--name".to_string());
    args.push(spec.name.clone());
    for port in &spec.ports {
        args.push("-p".to_string());
        args.push(port.clone());
    }
    for env in &spec.env {
        args.push("-e".to_string());
        args.push(env.clone());
    }
    for volume in &spec.volumes {
        args.push("-v".to_string());
        args.push(volume.clone());
    }
    args.extend(spec.extra_args.clone());
    args.push(spec.image.clone());
    args
}

/// Runs `docker run` for `spec` to completion, returning the new container
/// ID. Used directly by tests; the live HTTP handler instead spawns the
/// subprocess itself so it can record the PID before awaiting it.
pub async fn run_container(spec: &RunSpec) -> Result<String> {
    let args = run_args(spec);
    let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
    docker(&arg_refs).await
}

pub async fn stop_container(name: &str) -> Result<String> {
    docker(&["stop", name]).await
}

pub async fn remove_container(name: &str) -> Result<String> {
    docker(&["rm", "-f", name]).await
}

pub async fn container_logs(name: &str, tail: Option<u32>) -> Result<String> {
    match tail {
        Some(n) => docker(&["logs", "--tail", &n.to_string(), name]).await,
        None => docker(&["logs", name]).await,
    }
}

pub async fn pull_image(image: &str) -> Result<String> {
    docker(&["pull", image]).await
}

pub async fn login(registry: &str, username: &str, password: &str) -> Result<String> {
    let output = Command::new("docker")
        .args(["login", registry, "-u", username, "--password-stdin"])
        .stdin(std::process::Stdio::piped())
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::piped())
        .spawn()?;

    use tokio::io::AsyncWriteExt;
    if let Some(mut stdin) = output.stdin {
        stdin.write_all(password.as_bytes()).await?;
    }

    let out = output.wait_with_output().await?;
    let mut combined = String::from_utf8_lossy(&out.stdout).trim().to_string();
    let stderr = String::from_utf8_lossy(&out.stderr).trim().to_string();
    if !stderr.is_empty() {
        if !combined.is_empty() {
            combined.push('\n');
        }
        combined.push_str(&stderr);
    }
    Ok(combined)
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ContainerSummary {
    pub id: String,
    pub name: String,
    pub image: String,
    pub status: String,
    pub ports: String,
}

pub async fn list_containers(all: bool) -> Result<Vec<ContainerSummary>> {
    let mut args = vec!["ps", "--format", "{{.ID}}\t{{.Names}}\t{{.Image}}\t{{.Status}}\t{{.Ports}}"];
    if all {
        args.insert(1, "-a");
    }
    let out = docker(&args).await?;
    Ok(parse_container_list(&out))
}

fn parse_container_list(out: &str) -> Vec<ContainerSummary> {
    out.lines()
        .filter(|l| !l.trim().is_empty())
        .filter_map(|line| {
            let mut fields = line.split('\t');
            Some(ContainerSummary {
                id: fields.next()?.to_string(),
                name: fields.next()?.to_string(),
                image: fields.next()?.to_string(),
                status: fields.next()?.to_string(),
                ports: fields.next().unwrap_or("").to_string(),
            })
        })
        .collect()
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ImageSummary {
    pub id: String,
    pub repository: String,
    pub tag: String,
    pub size: String,
}

pub async fn list_images(all: bool) -> Result<Vec<ImageSummary>> {
    let mut args = vec!["images", "--format", "{{.ID}}\t{{.Repository}}\t{{.Tag}}\t{{.Size}}"];
    if all {
        args.insert(1, "-a");
    }
    let out = docker(&args).await?;
    Ok(parse_image_list(&out))
}

fn parse_image_list(out: &str) -> Vec<ImageSummary> {
    out.lines()
        .filter(|l| !l.trim().is_empty())
        .filter_map(|line| {
            let mut fields = line.split('\t');
            Some(ImageSummary {
                id: fields.next()?.to_string(),
                repository: fields.next()?.to_string(),
                tag: fields.next()?.to_string(),
                size: fields.next().unwrap_or("").to_string(),
            })
        })
        .collect()
}

/// `docker inspect <name> --format '{{json .State}}'`, used by the
/// reconciler to enhance ps-derived status with Running/Paused/Restarting/
/// Dead/Error detail.
pub async fn inspect_state(name: &str) -> Result<serde_json::Value> {
    let out = docker(&["inspect", name, "--format", "{{json .State}}"]).await?;
    serde_json::from_str(&out).map_err(|e| anyhow!("failed to parse inspect state: {e}"))
}

#[derive(Debug, Clone, Serialize, PartialEq, Default)]
pub struct ContainerStats {
    pub cpu_percent: f64,
    pub memory_usage_bytes: f64,
    pub memory_limit_bytes: f64,
    pub network_rx_bytes: f64,
    pub network_tx_bytes: f64,
}

pub async fn container_stats(name: &str) -> Result<ContainerStats> {
    let out = docker(&[
        "stats",
        "--no-stream",
        "--format",
        "{{.CPUPerc}}\t{{.MemUsage}}\t{{.NetIO}}",
        name,
    ])
    .await?;
    parse_stats_line(&out).ok_or_else(|| anyhow!("unexpected docker stats output: {out}"))
}

fn parse_stats_line(line: &str) -> Option<ContainerStats> {
    let mut fields = line.lines().next()?.split('\t');
    let cpu_percent = parse_percent(fields.next()?);
    let mem = fields.next()?;
    let (memory_usage_bytes, memory_limit_bytes) = parse_mem_usage(mem)?;
    let net = fields.next()?;
    let (network_rx_bytes, network_tx_bytes) = parse_net_io(net)?;

    Some(ContainerStats {
        cpu_percent,
        memory_usage_bytes,
        memory_limit_bytes,
        network_rx_bytes,
        network_tx_bytes,
    })
}

fn parse_percent(field: &str) -> f64 {
    field.trim().trim_end_matches('%').parse().unwrap_or(0.0)
}

/// Parses `"12.34MiB / 1.944GiB"` into `(bytes, bytes)`.
fn parse_mem_usage(field: &str) -> Option<(f64, f64)> {
    let mut parts = field.split('/');
    let usage = parse_byte_size(parts.next()?.trim())?;
    let limit = parse_byte_size(parts.next()?.trim())?;
    Some((usage, limit))
}

/// Parses `"1.23kB / 456B"` style network I/O into `(rx_bytes, tx_bytes)`.
fn parse_net_io(field: &str) -> Option<(f64, f64)> {
    let mut parts = field.split('/');
    let rx = parse_byte_size(parts.next()?.trim())?;
    let tx = parse_byte_size(parts.next()?.trim())?;
    Some((rx, tx))
}

fn parse_byte_size(text: &str) -> Option<f64> {
    let units: &[(&str, f64)] = &[
        ("GiB", 1024.0 * 1024.0 * 1024.0),
        ("MiB", 1024.0 * 1024.0),
        ("KiB", 1024.0),
        ("GB", 1000.0 * 1000.0 * 1000.0),
        ("MB", 1000.0 * 1000.0),
        ("kB", 1000.0),
        ("B", 1.0),
    ];
    for (suffix, multiplier) in units {
        if let Some(number) = text.strip_suffix(suffix) {
            return number.trim().parse::<f64>().ok().map(|n| n * multiplier);
        }
    }
    text.parse::<f64>().ok()
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct DaemonInfo {
    pub containers_running: u32,
    pub containers_paused: u32,
    pub containers_stopped: u32,
}

/// Prefers `docker info --format json`; falls back to line-matching when the
/// JSON shape is unexpected. The fallback intentionally matches on the bare
/// substring `"Running:"`, which also matches `ContainersRunning:` — carried
/// over verbatim from the original implementation (see DESIGN.md).
pub async fn daemon_info() -> Result<DaemonInfo> {
    if let Ok(out) = docker(&["info", "--format", "{{json .}}"]).await {
        if let Ok(value) = serde_json::from_str::<serde_json::Value>(&out) {
            let running = value
                .get("ContainersRunning")
                .and_then(|v| v.as_u64())
                .unwrap_or(0) as u32;
            let paused = value
                .get("ContainersPaused")
                .and_then(|v| v.as_u64())
                .unwrap_or(0) as u32;
            let stopped = value
                .get("ContainersStopped")
                .and_then(|v| v.as_u64())
                .unwrap_or(0) as u32;
            return Ok(DaemonInfo {
                containers_running: running,
                containers_paused: paused,
                containers_stopped: stopped,
            });
        }
        warn!("docker info json unparseable, falling back to line scan");
        return Ok(parse_daemon_info_lines(&out));
    }
    let out = docker(&["info"]).await?;
    Ok(parse_daemon_info_lines(&out))
}

fn parse_daemon_info_lines(out: &str) -> DaemonInfo {
    let mut info = DaemonInfo::default();
    for line in out.lines() {
        let trimmed = line.trim();
        if trimmed.contains("Running:") {
            if let Some(n) = trailing_number(trimmed) {
                info.containers_running = n;
            }
        } else if trimmed.contains("Paused:") {
            if let Some(n) = trailing_number(trimmed) {
                info.containers_paused = n;
            }
        } else if trimmed.contains("Stopped:") {
            if let Some(n) = trailing_number(trimmed) {
                info.containers_stopped = n;
            }
        }
    }
    info
}

fn trailing_number(line: &str) -> Option<u32> {
    line.rsplit(':').next()?.trim().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_tab_delimited_container_list() {
        let fixture = "abc123\tweb-1\tnginx:latest\tUp 2 hours\t0.0.0.0:80->80/tcp\n";
        let parsed = parse_container_list(fixture);
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].name, "web-1");
        assert_eq!(parsed[0].image, "nginx:latest");
    }

    #[test]
    fn parses_image_list() {
        let fixture = "abc123\tnginx\tlatest\t142MB\n";
        let parsed = parse_image_list(fixture);
        assert_eq!(parsed[0].id, "abc123");
        assert_eq!(parsed[0].repository, "nginx");
        assert_eq!(parsed[0].size, "142MB");
    }

    #[test]
    fn parses_byte_sizes_across_units() {
        assert_eq!(parse_byte_size("1MiB"), Some(1024.0 * 1024.0));
        assert_eq!(parse_byte_size("1KiB"), Some(1024.0));
        assert_eq!(parse_byte_size("1kB"), Some(1000.0));
        assert_eq!(parse_byte_size("512B"), Some(512.0));
    }

    #[test]
    fn parses_full_stats_line() {
        let fixture = "12.34%\t100MiB / 1GiB\t1.5kB / 2kB";
        let stats = parse_stats_line(fixture).unwrap();
        assert!((stats.cpu_percent - 12.34).abs() < 1e-6);
        assert_eq!(stats.memory_usage_bytes, 100.0 * 1024.0 * 1024.0);
        assert_eq!(stats.memory_limit_bytes, 1024.0 * 1024.0 * 1024.0);
        assert_eq!(stats.network_rx_bytes, 1500.0);
        assert_eq!(stats.network_tx_bytes, 2000.0);
    }

    #[test]
    fn daemon_info_line_scan_matches_running_substring_quirk() {
        let fixture = " Containers: 5\n  Running: 3\n  Paused: 0\n  Stopped: 2\nServerVersion: 24.0\n";
        let info = parse_daemon_info_lines(fixture);
        assert_eq!(info.containers_running, 3);
        assert_eq!(info.containers_paused, 0);
        assert_eq!(info.containers_stopped, 2);
    }
}

use serde::Serialize;
use std::collections::HashMap;
use tokio::process::Command;

const BUSY_THRESHOLD: f64 = 80.0;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Resources {
    pub cpu_usage_percent: f64,
    pub total_cpu: f64,
    pub available_cpu: f64,
    pub total_memory_mib: i64,
    pub available_memory_mib: i64,
    pub memory_usage_percent: f64,
    pub disk_usage_percent: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Hypervisor {
    #[serde(rename = "type")]
    pub kind: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ContainerEngine {
    #[serde(rename = "type")]
    pub kind: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SwarmFacts {
    pub active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manager_address: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HostFacts {
    pub resources: Resources,
    pub ip_address: String,
    pub hostname: String,
    pub username: String,
    pub os_name: String,
    pub kernel_version: String,
    pub hypervisor: Hypervisor,
    pub container_engine: ContainerEngine,
    pub swarm: SwarmFacts,
    pub labels: HashMap<String, String>,
}

/// `status = "busy"` iff any of {cpu%, mem%, disk%} exceeds 80.0, else "active".
pub fn status_for(resources: &Resources) -> &'static str {
    if resources.cpu_usage_percent > BUSY_THRESHOLD
        || resources.memory_usage_percent > BUSY_THRESHOLD
        || resources.disk_usage_percent > BUSY_THRESHOLD
    {
        "busy"
    } else {
        "active"
    }
}

pub async fn read_resources() -> Resources {
    let (cpu_usage_percent, total_cpu) = read_cpu().await;
    let available_cpu = total_cpu * (1.0 - cpu_usage_percent / 100.0);
    let (total_memory_mib, available_memory_mib, memory_usage_percent) = read_memory().await;
    let disk_usage_percent = read_disk_usage().await;

    Resources {
        cpu_usage_percent,
        total_cpu,
        available_cpu,
        total_memory_mib,
        available_memory_mib,
        memory_usage_percent,
        disk_usage_percent,
    }
}

/// Single-sample (not delta) CPU percentage from the first `cpu` line of
/// `/proc/stat`. Intentionally not a delta: the first reading after boot
/// reports the process lifetime average. Do not "improve" this.
async fn read_cpu() -> (f64, f64) {
    let stat = tokio::fs::read_to_string("/proc/stat")
        .await
        .unwrap_or_default();
    let cpu_usage_percent = stat
        .lines()
        .next()
        .and_then(parse_cpu_line)
        .unwrap_or(0.0);

    let cpuinfo = tokio::fs::read_to_string("/proc/cpuinfo")
        .await
        .unwrap_or_default();
    let cpu_count = cpuinfo
        .lines()
        .filter(|line| line.starts_with("processor"))
        .count();
    let total_cpu = if cpu_count > 0 { cpu_count as f64 } else { 4.0 };

    (cpu_usage_percent, total_cpu)
}

fn parse_cpu_line(line: &str) -> Option<f64> {
    let mut fields = line.split_whitespace();
    let label = fields.next()?;
    if label != "cpu" {
        return None;
    }
    let user: f64 = fields.next()?.parse().ok()?;
    let nice: f64 = fields.next()?.parse().ok()?;
    let system: f64 = fields.next()?.parse().ok()?;
    let idle: f64 = fields.next()?.parse().ok()?;
    let total = user + nice + system + idle;
    if total <= 0.0 {
        return None;
    }
    Some(100.0 * (user + nice + system) / total)
}

/// Returns `(totalMemoryMiB, availableMemoryMiB, memoryUsagePercent)`.
async fn read_memory() -> (i64, i64, f64) {
    let meminfo = tokio::fs::read_to_string("/proc/meminfo")
        .await
        .unwrap_or_default();
    parse_meminfo(&meminfo)
}

fn parse_meminfo(contents: &str) -> (i64, i64, f64) {
    let mut total_kib = 0i64;
    let mut free_kib = 0i64;
    let mut available_kib = 0i64;
    let mut buffers_kib = 0i64;
    let mut cached_kib = 0i64;

    for line in contents.lines() {
        let mut fields = line.split_whitespace();
        let Some(key) = fields.next() else { continue };
        let Some(value) = fields.next().and_then(|v| v.parse::<i64>().ok()) else {
            continue;
        };
        match key {
            "MemTotal:" => total_kib = value,
            "MemFree:" => free_kib = value,
            "MemAvailable:" => available_kib = value,
            "Buffers:" => buffers_kib = value,
            "Cached:" => cached_kib = value,
            _ => {}
        }
    }

    if total_kib <= 0 {
        return (0, 0, 0.0);
    }
    let total_mib = total_kib / 1024;

    let available_mib = if available_kib > 0 {
        available_kib / 1024
    } else {
        (free_kib + buffers_kib + cached_kib).min(total_kib) / 1024
    };

    let usage_percent = 100.0 * (total_mib - available_mib) as f64 / total_mib as f64;
    (total_mib, available_mib, usage_percent)
}

async fn read_disk_usage() -> f64 {
    let output = Command::new("sh")
        .arg("-c")
        .arg("df -h --output=pcent / | tail -1 | tr -d ' %'")
        .output()
        .await;
    let Ok(output) = output else { return 0.0 };
    String::from_utf8_lossy(&output.stdout)
        .trim()
        .parse()
        .unwrap_or(0.0)
}

/// Parses `/proc/net/route` for the row with destination `00000000` and a
/// non-zero gateway; returns its interface name.
pub async fn default_interface() -> Option<String> {
    let contents = tokio::fs::read_to_string("/proc/net/route").await.ok()?;
    parse_default_interface(&contents)
}

fn parse_default_interface(contents: &str) -> Option<String> {
    for line in contents.lines().skip(1) {
        let mut fields = line.split_whitespace();
        let iface = fields.next()?;
        let dest = fields.next()?;
        let gateway = fields.next()?;
        if dest == "00000000" && gateway != "00000000" {
            return Some(iface.to_string());
        }
    }
    None
}

pub async fn external_ip() -> String {
    let Some(iface) = default_interface().await else {
        return "unknown".to_string();
    };
    match local_ipv4_for_interface(&iface) {
        Some(ip) => ip,
        None => "unknown".to_string(),
    }
}

#[cfg(unix)]
fn local_ipv4_for_interface(iface: &str) -> Option<String> {
    // SIOCGIFADDR via a throwaway datagram socket, mirroring the original's ioctl approach.
    use std::net::UdpSocket;
    let socket = UdpSocket::bind("0.0.0.0:0").ok()?;
    socket.connect("255.255.255.255:1").ok()?;
    let _ = iface; // interface selection happens via routing; kept for signature parity.
    socket.local_addr().ok().map(|addr| addr.ip().to_string())
}

#[cfg(not(unix))]
fn local_ipv4_for_interface(_iface: &str) -> Option<String> {
    None
}

async fn run_text(cmd: &str, args: &[&str]) -> String {
    let output = Command::new(cmd).args(args).output().await;
    match output {
        Ok(out) => String::from_utf8_lossy(&out.stdout).trim().to_string(),
        Err(_) => String::new(),
    }
}

pub async fn hypervisor_info() -> Hypervisor {
    let cpuinfo = tokio::fs::read_to_string("/proc/cpuinfo")
        .await
        .unwrap_or_default();
    if cpuinfo.contains("vmx") || cpuinfo.contains("svm") {
        let status = if tokio::fs::metadata("/dev/kvm").await.is_ok() {
            "active"
        } else {
            "inactive"
        };
        return Hypervisor {
            kind: "KVM".to_string(),
            status: status.to_string(),
            version: None,
        };
    }
    if tokio::fs::metadata("/proc/xen").await.is_ok() {
        return Hypervisor {
            kind: "Xen".to_string(),
            status: "active".to_string(),
            version: None,
        };
    }
    let vbox_version = run_text("sh", &["-c", "vboxmanage --version 2>/dev/null"]).await;
    if !vbox_version.is_empty() {
        return Hypervisor {
            kind: "VirtualBox".to_string(),
            status: "active".to_string(),
            version: Some(vbox_version),
        };
    }
    Hypervisor {
        kind: "none".to_string(),
        status: "n/a".to_string(),
        version: None,
    }
}

pub async fn container_engine_info() -> ContainerEngine {
    let docker_version = run_text("sh", &["-c", "docker --version 2>/dev/null"]).await;
    if !docker_version.is_empty() {
        let active = run_text("sh", &["-c", "systemctl is-active docker 2>/dev/null"]).await;
        return ContainerEngine {
            kind: "Docker".to_string(),
            status: if active == "active" { "active" } else { "inactive" }.to_string(),
            version: Some(docker_version),
        };
    }
    let podman_version = run_text("sh", &["-c", "podman --version 2>/dev/null"]).await;
    if !podman_version.is_empty() {
        return ContainerEngine {
            kind: "Podman".to_string(),
            status: "active".to_string(),
            version: Some(podman_version),
        };
    }
    ContainerEngine {
        kind: "none".to_string(),
        status: "n/a".to_string(),
        version: None,
    }
}

pub async fn swarm_info() -> SwarmFacts {
    let state = run_text(
        "docker",
        &["info", "--format", "{{.Swarm.LocalNodeState}}"],
    )
    .await;
    if state != "active" {
        return SwarmFacts {
            active: false,
            node_id: None,
            role: None,
            status: None,
            manager_address: None,
        };
    }

    let inspect = run_text(
        "docker",
        &["node", "inspect", "self", "--format", "{{json .}}"],
    )
    .await;
    let Ok(node_data) = serde_json::from_str::<serde_json::Value>(&inspect) else {
        return SwarmFacts {
            active: true,
            node_id: None,
            role: None,
            status: None,
            manager_address: None,
        };
    };

    SwarmFacts {
        active: true,
        node_id: node_data.get("ID").and_then(|v| v.as_str()).map(String::from),
        role: node_data
            .pointer("/Spec/Role")
            .and_then(|v| v.as_str())
            .map(String::from),
        status: node_data
            .pointer("/Status/State")
            .and_then(|v| v.as_str())
            .map(String::from),
        manager_address: node_data
            .pointer("/ManagerStatus/Addr")
            .and_then(|v| v.as_str())
            .map(String::from),
    }
}

pub fn hostname() -> String {
    // /proc/sys/kernel/hostname is synchronous and cheap; avoids a libc dependency.
    std::fs::read_to_string("/proc/sys/kernel/hostname")
        .map(|s| s.trim().to_string())
        .unwrap_or_else(|_| "unknown".to_string())
}

pub fn username() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("LOGNAME"))
        .unwrap_or_else(|_| "unknown".to_string())
}

pub fn os_name() -> String {
    "Linux".to_string()
}

pub fn kernel_version() -> String {
    std::fs::read_to_string("/proc/sys/kernel/osrelease")
        .map(|s| s.trim().to_string())
        .unwrap_or_else(|_| "unknown".to_string())
}

/// `(envVar, fallback)` label pairs, configurable rather than hard-coded.
pub fn label_config() -> Vec<(&'static str, &'static str, &'static str)> {
    vec![
        ("env", "NODE_ENV", "prod"),
        ("region", "NODE_REGION", "us-west"),
        ("app", "NODE_APP", ""),
    ]
}

pub fn read_labels() -> HashMap<String, String> {
    label_config()
        .into_iter()
        .map(|(key, env_var, fallback)| {
            let value = std::env::var(env_var)
                .ok()
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| fallback.to_string());
            (key.to_string(), value)
        })
        .collect()
}

pub async fn read_host_facts() -> HostFacts {
    let (resources, hypervisor, container_engine, swarm, ip_address) = tokio::join!(
        read_resources(),
        hypervisor_info(),
        container_engine_info(),
        swarm_info(),
        external_ip(),
    );

    HostFacts {
        resources,
        ip_address,
        hostname: hostname(),
        username: username(),
        os_name: os_name(),
        kernel_version: kernel_version(),
        hypervisor,
        container_engine,
        swarm,
        labels: read_labels(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_cpu_line_single_sample() {
        let pct = parse_cpu_line("cpu  100 0 50 850 0 0 0 0 0 0").unwrap();
        assert!((pct - 15.0).abs() < 1e-9);
    }

    #[test]
    fn ignores_non_cpu_lines() {
        assert_eq!(parse_cpu_line("cpu0 1 2 3 4"), None);
    }

    #[test]
    fn meminfo_prefers_mem_available() {
        let fixture = "MemTotal:       16384000 kB\nMemFree:         1000000 kB\nMemAvailable:    8192000 kB\nBuffers:          200000 kB\nCached:          1000000 kB\n";
        let (total, available, pct) = parse_meminfo(fixture);
        assert_eq!(total, 16000);
        assert_eq!(available, 8000);
        assert!((pct - 50.0).abs() < 0.1);
    }

    #[test]
    fn meminfo_falls_back_without_mem_available() {
        let fixture =
            "MemTotal:       16384000 kB\nMemFree:         1000000 kB\nBuffers:          200000 kB\nCached:          1000000 kB\n";
        let (total, available, _pct) = parse_meminfo(fixture);
        assert_eq!(total, 16000);
        assert_eq!(available, (1000000 + 200000 + 1000000) / 1024);
    }

    #[test]
    fn meminfo_clamps_available_to_total() {
        let fixture =
            "MemTotal:       1000 kB\nMemFree:         900 kB\nBuffers:          900 kB\nCached:          900 kB\n";
        let (total, available, _pct) = parse_meminfo(fixture);
        assert_eq!(total, 0); // sub-1MiB total rounds to 0, matches integer MiB truncation
        assert_eq!(available, 0);
    }

    #[test]
    fn default_interface_skips_non_default_routes() {
        let fixture = "Iface\tDestination\tGateway\nens3\t00000102\t00000000\nens3\t00000000\t0101A8C0\n";
        assert_eq!(parse_default_interface(fixture), Some("ens3".to_string()));
    }

    #[test]
    fn default_interface_none_when_no_gateway_route() {
        let fixture = "Iface\tDestination\tGateway\nens3\t00000102\t00000000\n";
        assert_eq!(parse_default_interface(fixture), None);
    }

    #[test]
    fn status_is_busy_over_threshold() {
        let mut r = Resources {
            cpu_usage_percent: 10.0,
            total_cpu: 4.0,
            available_cpu: 3.6,
            total_memory_mib: 1000,
            available_memory_mib: 900,
            memory_usage_percent: 10.0,
            disk_usage_percent: 81.0,
        };
        assert_eq!(status_for(&r), "busy");
        r.disk_usage_percent = 80.0;
        assert_eq!(status_for(&r), "active");
    }
}

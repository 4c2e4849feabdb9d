use crate::managers::executor::OperationResult;
use crate::ops::OperationSpec;
use crate::services::inventory::ServerRecord;

/// Query OS name/version, machine architecture, and total RAM in one pass.
/// Output is `key=value` lines so the parser stays independent of distro
/// pretty-printing.
pub fn describe() -> OperationSpec {
    let script = [
        "set -u",
        ". /etc/os-release 2>/dev/null || true",
        "printf 'os=%s %s\\n' \"${NAME:-unknown}\" \"${VERSION_ID:-}\"",
        "printf 'arch=%s\\n' \"$(uname -m)\"",
        "awk '/^MemTotal:/ {printf \"ram_mb=%d\\n\", $2 / 1024}' /proc/meminfo",
    ]
    .join("\n");
    OperationSpec::command(script)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostFacts {
    pub os: String,
    pub arch: String,
    pub ram_mb: u64,
}

pub fn parse_output(output: &str) -> Option<HostFacts> {
    let mut os = None;
    let mut arch = None;
    let mut ram_mb = None;
    for line in output.lines() {
        let line = line.trim();
        if let Some(value) = line.strip_prefix("os=") {
            os = Some(value.trim().to_string());
        } else if let Some(value) = line.strip_prefix("arch=") {
            arch = Some(value.trim().to_string());
        } else if let Some(value) = line.strip_prefix("ram_mb=") {
            ram_mb = value.trim().parse::<u64>().ok();
        }
    }
    Some(HostFacts {
        os: os?,
        arch: arch?,
        ram_mb: ram_mb?,
    })
}

pub fn annotate(result: &OperationResult) -> Option<String> {
    if !result.success() {
        return None;
    }
    parse_output(&result.combined_output)
        .map(|facts| format!("os={} arch={} ram={}MB", facts.os, facts.arch, facts.ram_mb))
}

pub fn to_record(result: &OperationResult, recorded_at: String) -> Option<ServerRecord> {
    if !result.success() {
        return None;
    }
    let facts = parse_output(&result.combined_output)?;
    Some(ServerRecord {
        hostname: result.host.canonical_address.clone(),
        os: facts.os,
        arch: facts.arch,
        ram_mb: facts.ram_mb,
        recorded_at: Some(recorded_at),
    })
}

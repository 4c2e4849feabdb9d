use crate::errors::FleetError;
use crate::managers::resolver::HostToken;
use crate::utils::fs_atomic::atomic_write_text_file;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Read a line-oriented host list. Blank lines and lines whose first
/// non-whitespace character is `#` are dropped here, before any token reaches
/// the resolver.
pub fn load_host_tokens(path: impl AsRef<Path>) -> Result<Vec<HostToken>, FleetError> {
    let path = path.as_ref();
    let raw = std::fs::read_to_string(path).map_err(|err| {
        FleetError::config(format!(
            "Host list {} is not readable: {}",
            path.display(),
            err
        ))
        .with_hint("Pass --hosts with one host per line.")
    })?;
    let tokens = parse_host_lines(&raw);
    if tokens.is_empty() {
        return Err(FleetError::config(format!(
            "Host list {} contains no hosts",
            path.display()
        )));
    }
    Ok(tokens)
}

pub fn parse_host_lines(raw: &str) -> Vec<HostToken> {
    raw.lines()
        .map(|line| line.trim().trim_end_matches('\r'))
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(HostToken::new)
        .collect()
}

/// One record of the JSON server inventory written by `fleet facts` and read
/// back by `fleet lookup`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerRecord {
    pub hostname: String,
    #[serde(default)]
    pub os: String,
    #[serde(default)]
    pub arch: String,
    #[serde(default)]
    pub ram_mb: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recorded_at: Option<String>,
}

/// Case-insensitive hostname index over the inventory file. Duplicate
/// hostnames keep the last record seen, matching the file's append history.
#[derive(Debug, Default)]
pub struct ServerIndex {
    records: BTreeMap<String, ServerRecord>,
}

impl ServerIndex {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, FleetError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|err| {
            FleetError::config(format!(
                "Inventory {} is not readable: {}",
                path.display(),
                err
            ))
            .with_hint("Run `fleet facts --inventory-out <path>` to create it.")
        })?;
        let rows: Vec<ServerRecord> = serde_json::from_str(&raw).map_err(|err| {
            FleetError::config(format!(
                "Inventory {} is not a JSON list of server records: {}",
                path.display(),
                err
            ))
        })?;
        Ok(Self::from_records(rows))
    }

    pub fn from_records(rows: Vec<ServerRecord>) -> Self {
        let mut records = BTreeMap::new();
        for row in rows {
            if row.hostname.trim().is_empty() {
                continue;
            }
            records.insert(row.hostname.to_lowercase(), row);
        }
        Self { records }
    }

    pub fn hostnames(&self) -> Vec<&str> {
        self.records
            .values()
            .map(|row| row.hostname.as_str())
            .collect()
    }

    pub fn lookup(&self, hostname: &str) -> Result<&ServerRecord, FleetError> {
        self.records
            .get(&hostname.to_lowercase())
            .ok_or_else(|| FleetError::not_found(format!("Hostname not found: {}", hostname)))
    }
}

pub fn write_records(path: impl AsRef<Path>, records: &[ServerRecord]) -> Result<(), FleetError> {
    let payload = serde_json::to_string_pretty(records)
        .map_err(|err| FleetError::internal(format!("Failed to encode inventory: {}", err)))?;
    atomic_write_text_file(path.as_ref(), &payload, 0o644).map_err(|err| {
        FleetError::io(format!(
            "Failed to write inventory {}: {}",
            path.as_ref().display(),
            err
        ))
    })
}

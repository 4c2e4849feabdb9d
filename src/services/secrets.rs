use crate::errors::FleetError;
use std::collections::BTreeMap;
use std::path::Path;

/// Key-value secrets loaded from a `.secrets`-style file. Values are handed to
/// the redaction pass so they never survive into logs or reports.
#[derive(Debug, Clone, Default)]
pub struct SecretsFile {
    entries: BTreeMap<String, String>,
}

impl SecretsFile {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, FleetError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|err| {
            FleetError::config(format!(
                "Secrets file {} is not readable: {}",
                path.display(),
                err
            ))
            .with_hint("Create a KEY=VALUE file or omit --secrets.")
        })?;
        Ok(Self::parse(&raw))
    }

    pub fn parse(raw: &str) -> Self {
        let mut entries = BTreeMap::new();
        for line in raw.lines() {
            let line = line.trim().trim_end_matches('\r');
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let line = line.strip_prefix("export ").unwrap_or(line);
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let key = key.trim();
            if key.is_empty() {
                continue;
            }
            let value = strip_quotes(value.trim());
            entries.insert(key.to_string(), value.to_string());
        }
        Self { entries }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(|v| v.as_str())
    }

    pub fn require(&self, key: &str) -> Result<&str, FleetError> {
        self.get(key).ok_or_else(|| {
            FleetError::config(format!("Secrets file is missing required key {}", key))
        })
    }

    /// Every loaded value, for the redaction pass.
    pub fn values(&self) -> Vec<String> {
        self.entries.values().cloned().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn strip_quotes(value: &str) -> &str {
    if value.len() >= 2 {
        let bytes = value.as_bytes();
        if (bytes[0] == b'"' && bytes[value.len() - 1] == b'"')
            || (bytes[0] == b'\'' && bytes[value.len() - 1] == b'\'')
        {
            return &value[1..value.len() - 1];
        }
    }
    value
}

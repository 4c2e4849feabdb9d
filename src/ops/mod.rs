pub mod facts;
pub mod packages;
pub mod power;
pub mod probe;
pub mod sync;
pub mod users;

use crate::constants::network::TIMEOUT_CONNECT_DEFAULT_SECS;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone)]
pub enum StdinSource {
    Bytes(Vec<u8>),
    File(PathBuf),
}

/// One unit of remote work plus its transport knobs. The executor treats the
/// command as opaque; concrete fleet actions build these in the `ops` modules.
#[derive(Debug, Clone)]
pub struct OperationSpec {
    pub remote_command: String,
    pub connect_timeout: Duration,
    pub stdin: Option<StdinSource>,
    pub environment: BTreeMap<String, String>,
}

impl OperationSpec {
    pub fn command(remote_command: impl Into<String>) -> Self {
        Self {
            remote_command: remote_command.into(),
            connect_timeout: Duration::from_secs(TIMEOUT_CONNECT_DEFAULT_SECS),
            stdin: None,
            environment: BTreeMap::new(),
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_stdin(mut self, stdin: StdinSource) -> Self {
        self.stdin = Some(stdin);
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.environment.insert(key.into(), value.into());
        self
    }

    pub fn uses_stdin(&self) -> bool {
        self.stdin.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_defaults_match_transport_contract() {
        let spec = OperationSpec::command("uptime");
        assert_eq!(spec.connect_timeout, Duration::from_secs(5));
        assert!(!spec.uses_stdin());
        assert!(spec.environment.is_empty());
    }

    #[test]
    fn builders_compose() {
        let spec = OperationSpec::command("cat")
            .with_stdin(StdinSource::Bytes(b"payload".to_vec()))
            .with_env("FLEET_MODE", "batch")
            .with_connect_timeout(Duration::from_secs(10));
        assert!(spec.uses_stdin());
        assert_eq!(spec.environment.get("FLEET_MODE").map(String::as_str), Some("batch"));
        assert_eq!(spec.connect_timeout, Duration::from_secs(10));
    }
}

use crate::errors::FleetError;
use crate::utils::fs_atomic::atomic_write_text_file;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostKeyPolicy {
    /// No verification. Only defensible on a fully trusted network.
    Accept,
    /// Trust-on-first-use: persist unseen fingerprints, reject changed ones.
    AcceptNew,
    /// Reject both unknown and changed fingerprints.
    Pin,
}

impl HostKeyPolicy {
    pub fn parse(raw: &str) -> Result<Self, FleetError> {
        match raw.trim().to_lowercase().as_str() {
            "accept" => Ok(HostKeyPolicy::Accept),
            "accept-new" | "tofu" => Ok(HostKeyPolicy::AcceptNew),
            "pin" => Ok(HostKeyPolicy::Pin),
            other => Err(
                FleetError::config(format!("Unknown host key policy: {}", other))
                    .with_hint("Use one of: accept, accept-new, pin."),
            ),
        }
    }
}

/// File-backed `host fingerprint` pairs (SHA256, base64-encoded). The store is
/// consulted from per-host worker threads, so the map sits behind a mutex.
#[derive(Debug)]
pub struct KnownHostsStore {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, String>>,
}

impl KnownHostsStore {
    pub fn load(path: PathBuf) -> Result<Self, FleetError> {
        let mut entries = BTreeMap::new();
        match std::fs::read_to_string(&path) {
            Ok(raw) => {
                for line in raw.lines() {
                    let line = line.trim();
                    if line.is_empty() || line.starts_with('#') {
                        continue;
                    }
                    if let Some((host, fingerprint)) = line.split_once(char::is_whitespace) {
                        entries.insert(host.to_string(), fingerprint.trim().to_string());
                    }
                }
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => {
                return Err(FleetError::config(format!(
                    "Known-hosts file {} is not readable: {}",
                    path.display(),
                    err
                )));
            }
        }
        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    pub fn fingerprint_for(&self, host: &str) -> Option<String> {
        let entries = self.entries.lock().unwrap_or_else(|err| err.into_inner());
        entries.get(host).cloned()
    }

    /// Apply `policy` to an observed fingerprint. AcceptNew records unseen
    /// hosts before returning.
    pub fn verify(
        &self,
        policy: HostKeyPolicy,
        host: &str,
        observed: &str,
    ) -> Result<(), FleetError> {
        if policy == HostKeyPolicy::Accept {
            return Ok(());
        }
        let known = self.fingerprint_for(host);
        match (policy, known) {
            (HostKeyPolicy::Pin, None) => Err(FleetError::denied(format!(
                "Host key for {} is not pinned",
                host
            ))
            .with_hint("Record the fingerprint with --host-key-policy accept-new first.")),
            (_, Some(expected)) if expected != observed => Err(FleetError::denied(format!(
                "Host key mismatch for {} (expected {}, got {})",
                host, expected, observed
            ))),
            (HostKeyPolicy::AcceptNew, None) => self.record(host, observed),
            _ => Ok(()),
        }
    }

    fn record(&self, host: &str, fingerprint: &str) -> Result<(), FleetError> {
        let mut entries = self.entries.lock().unwrap_or_else(|err| err.into_inner());
        entries.insert(host.to_string(), fingerprint.to_string());
        let mut content = String::new();
        for (host, fingerprint) in entries.iter() {
            content.push_str(host);
            content.push(' ');
            content.push_str(fingerprint);
            content.push('\n');
        }
        atomic_write_text_file(&self.path, &content, 0o600).map_err(|err| {
            FleetError::io(format!(
                "Failed to update known-hosts file {}: {}",
                self.path.display(),
                err
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tmp_store() -> KnownHostsStore {
        let path = std::env::temp_dir().join(format!("fleet-kh-{}", uuid::Uuid::new_v4()));
        KnownHostsStore::load(path).unwrap()
    }

    #[test]
    fn policy_parse_accepts_known_names() {
        assert_eq!(
            HostKeyPolicy::parse("accept-new").unwrap(),
            HostKeyPolicy::AcceptNew
        );
        assert_eq!(HostKeyPolicy::parse("PIN").unwrap(), HostKeyPolicy::Pin);
        assert!(HostKeyPolicy::parse("never").is_err());
    }

    #[test]
    fn accept_new_records_then_rejects_changes() {
        let store = tmp_store();
        store
            .verify(HostKeyPolicy::AcceptNew, "alpha.lan", "SHA256:aaa")
            .unwrap();
        assert_eq!(
            store.fingerprint_for("alpha.lan").as_deref(),
            Some("SHA256:aaa")
        );
        store
            .verify(HostKeyPolicy::AcceptNew, "alpha.lan", "SHA256:aaa")
            .unwrap();
        let err = store
            .verify(HostKeyPolicy::AcceptNew, "alpha.lan", "SHA256:bbb")
            .unwrap_err();
        assert_eq!(err.code, "DENIED");
        let _ = std::fs::remove_file(store.path);
    }

    #[test]
    fn pin_rejects_unknown_hosts() {
        let store = tmp_store();
        let err = store
            .verify(HostKeyPolicy::Pin, "beta.lan", "SHA256:ccc")
            .unwrap_err();
        assert_eq!(err.code, "DENIED");
    }

    #[test]
    fn recorded_fingerprints_survive_reload() {
        let store = tmp_store();
        store
            .verify(HostKeyPolicy::AcceptNew, "gamma.lan", "SHA256:ddd")
            .unwrap();
        let path = store.path.clone();
        drop(store);
        let reloaded = KnownHostsStore::load(path.clone()).unwrap();
        assert_eq!(
            reloaded.fingerprint_for("gamma.lan").as_deref(),
            Some("SHA256:ddd")
        );
        let _ = std::fs::remove_file(path);
    }
}

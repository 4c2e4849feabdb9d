use crate::constants::{exit_codes, limits, network};
use crate::errors::FleetError;
use crate::managers::keys::Credential;
use crate::managers::resolver::HostSpec;
use crate::ops::{OperationSpec, StdinSource};
use crate::services::known_hosts::{HostKeyPolicy, KnownHostsStore};
use crate::services::logger::Logger;
use async_trait::async_trait;
use base64::Engine;
use chrono::{DateTime, Utc};
use ssh2::{OpenFlags, OpenType, Session};
use std::io::{Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeStatus {
    Success,
    Failure,
}

/// Outcome of one operation against one host. Immutable once built.
#[derive(Debug, Clone)]
pub struct OperationResult {
    pub host: HostSpec,
    pub status: OutcomeStatus,
    pub exit_code: i64,
    pub combined_output: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl OperationResult {
    pub fn success(&self) -> bool {
        self.status == OutcomeStatus::Success
    }

    /// Outcome of a command that ran on the remote side.
    pub fn remote(
        host: HostSpec,
        exit_code: i64,
        combined_output: String,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            host,
            status: if exit_code == 0 {
                OutcomeStatus::Success
            } else {
                OutcomeStatus::Failure
            },
            exit_code,
            combined_output,
            started_at,
            finished_at: Utc::now(),
        }
    }

    /// Network-level failure: the remote command never started.
    pub fn transport_failure(host: HostSpec, started_at: DateTime<Utc>, message: String) -> Self {
        Self {
            host,
            status: OutcomeStatus::Failure,
            exit_code: exit_codes::NEVER_CONNECTED,
            combined_output: message,
            started_at,
            finished_at: Utc::now(),
        }
    }

    pub fn cancelled(host: HostSpec, started_at: DateTime<Utc>) -> Self {
        Self {
            host,
            status: OutcomeStatus::Failure,
            exit_code: exit_codes::CANCELLED,
            combined_output: "run deadline reached before this host completed".to_string(),
            started_at,
            finished_at: Utc::now(),
        }
    }

    pub fn credential_rejected(host: HostSpec, credential: &Credential) -> Self {
        let now = Utc::now();
        Self {
            host,
            status: OutcomeStatus::Failure,
            exit_code: exit_codes::CREDENTIAL_REJECTED,
            combined_output: format!(
                "{}: {}",
                credential.key_path.display(),
                credential.rejection_reason()
            ),
            started_at: now,
            finished_at: now,
        }
    }
}

/// Seam between the orchestrator and the transport, so batches are testable
/// against stub runners.
#[async_trait]
pub trait RemoteRunner: Send + Sync {
    async fn run(
        &self,
        host: &HostSpec,
        cred: Option<&Credential>,
        spec: &OperationSpec,
    ) -> OperationResult;
}

#[derive(Debug, Clone)]
pub struct SshConfig {
    pub username: String,
    pub port: u16,
    pub host_key_policy: HostKeyPolicy,
}

/// `ssh2`-backed executor. One session per call, no pooling: each host stays
/// an isolated failure domain. All transport work runs on blocking threads.
pub struct SshExecutor {
    logger: Logger,
    config: SshConfig,
    known_hosts: Arc<KnownHostsStore>,
}

impl SshExecutor {
    pub fn new(logger: Logger, config: SshConfig, known_hosts: Arc<KnownHostsStore>) -> Self {
        Self {
            logger: logger.child("ssh"),
            config,
            known_hosts,
        }
    }

    /// Upload a local directory tree over SFTP, one host per call, reported
    /// through the same OperationResult shape as command runs.
    pub async fn push_dir(
        &self,
        host: &HostSpec,
        cred: Option<&Credential>,
        local_dir: &Path,
        remote_dir: &str,
        connect_timeout: Duration,
    ) -> OperationResult {
        let started_at = Utc::now();
        let host = host.clone();
        let host_on_panic = host.clone();
        let cred = cred.cloned();
        let config = self.config.clone();
        let known_hosts = self.known_hosts.clone();
        let local_dir = local_dir.to_path_buf();
        let remote_dir = remote_dir.to_string();
        self.logger.debug(
            "push_dir",
            Some(&serde_json::json!({
                "host": host.canonical_address,
                "local_dir": local_dir.display().to_string(),
            })),
        );
        let task = tokio::task::spawn_blocking(move || {
            push_dir_blocking(
                &host,
                cred.as_ref(),
                &config,
                &known_hosts,
                &local_dir,
                &remote_dir,
                connect_timeout,
                started_at,
            )
        })
        .await;
        match task {
            Ok(result) => result,
            Err(err) => OperationResult::transport_failure(
                host_on_panic,
                started_at,
                format!("executor task failed: {}", err),
            ),
        }
    }
}

#[async_trait]
impl RemoteRunner for SshExecutor {
    async fn run(
        &self,
        host: &HostSpec,
        cred: Option<&Credential>,
        spec: &OperationSpec,
    ) -> OperationResult {
        let started_at = Utc::now();
        let host = host.clone();
        let host_on_panic = host.clone();
        let cred = cred.cloned();
        let spec = spec.clone();
        let config = self.config.clone();
        let known_hosts = self.known_hosts.clone();
        self.logger.debug(
            "exec",
            Some(&serde_json::json!({ "host": host.canonical_address })),
        );
        let task = tokio::task::spawn_blocking(move || {
            exec_blocking(&host, cred.as_ref(), &spec, &config, &known_hosts, started_at)
        })
        .await;
        match task {
            Ok(result) => result,
            // A lost worker means the host state is unknown; surface it as a
            // failure instead of poisoning the whole batch.
            Err(err) => OperationResult::transport_failure(
                host_on_panic,
                started_at,
                format!("executor task failed: {}", err),
            ),
        }
    }
}

fn connect_session(
    address: &str,
    cred: Option<&Credential>,
    config: &SshConfig,
    known_hosts: &KnownHostsStore,
    connect_timeout: Duration,
) -> Result<Session, FleetError> {
    let mut addrs = (address, config.port).to_socket_addrs().map_err(|err| {
        FleetError::transport(format!("Failed to resolve {}: {}", address, err))
    })?;
    let addr = addrs
        .next()
        .ok_or_else(|| FleetError::transport(format!("No addresses for {}", address)))?;
    let tcp = TcpStream::connect_timeout(&addr, connect_timeout).map_err(|err| {
        FleetError::transport(format!("Failed to connect to {}: {}", address, err))
    })?;
    tcp.set_read_timeout(Some(connect_timeout)).ok();
    tcp.set_write_timeout(Some(connect_timeout)).ok();

    let mut session =
        Session::new().map_err(|_| FleetError::transport("Failed to create SSH session"))?;
    session.set_tcp_stream(tcp);
    session.handshake().map_err(|err| {
        FleetError::transport(format!("SSH handshake with {} failed: {}", address, err))
    })?;

    let observed = fingerprint_host_key_sha256(&session).ok_or_else(|| {
        FleetError::transport(format!("No host key presented by {}", address))
    })?;
    known_hosts.verify(config.host_key_policy, address, &observed)?;

    // Batch-mode: key or agent auth only, so nothing can ever prompt.
    match cred {
        Some(credential) => session
            .userauth_pubkey_file(&config.username, None, &credential.key_path, None)
            .map_err(|err| {
                FleetError::denied(format!(
                    "Key authentication for {}@{} failed: {}",
                    config.username, address, err
                ))
            })?,
        None => session.userauth_agent(&config.username).map_err(|err| {
            FleetError::denied(format!(
                "Agent authentication for {}@{} failed: {}",
                config.username, address, err
            ))
        })?,
    }
    if !session.authenticated() {
        return Err(FleetError::denied(format!(
            "SSH authentication for {}@{} failed",
            config.username, address
        )));
    }
    session.set_keepalive(true, network::KEEPALIVE_INTERVAL_SECS);
    Ok(session)
}

fn fingerprint_host_key_sha256(session: &Session) -> Option<String> {
    let hash = session.host_key_hash(ssh2::HashType::Sha256)?;
    let encoded = base64::engine::general_purpose::STANDARD_NO_PAD.encode(hash);
    Some(format!("SHA256:{}", encoded))
}

struct CaptureState {
    buffer: Vec<u8>,
    total: u64,
    truncated: bool,
}

impl CaptureState {
    fn new() -> Self {
        Self {
            buffer: Vec::new(),
            total: 0,
            truncated: false,
        }
    }

    fn capture(&mut self, chunk: &[u8]) {
        self.total += chunk.len() as u64;
        if self.buffer.len() >= limits::MAX_CAPTURE_BYTES {
            self.truncated = true;
            return;
        }
        let remaining = limits::MAX_CAPTURE_BYTES - self.buffer.len();
        if chunk.len() > remaining {
            self.buffer.extend_from_slice(&chunk[..remaining]);
            self.truncated = true;
        } else {
            self.buffer.extend_from_slice(chunk);
        }
    }

    fn into_string(self) -> String {
        let mut text = String::from_utf8_lossy(&self.buffer).to_string();
        if self.truncated {
            text.push_str(&format!(
                "\n[output truncated after {} of {} bytes]",
                limits::MAX_CAPTURE_BYTES,
                self.total
            ));
        }
        text
    }
}

fn exec_blocking(
    host: &HostSpec,
    cred: Option<&Credential>,
    spec: &OperationSpec,
    config: &SshConfig,
    known_hosts: &KnownHostsStore,
    started_at: DateTime<Utc>,
) -> OperationResult {
    // Resolve stdin bytes before touching the network, so a bad local path
    // never turns into a half-run remote command.
    let stdin_bytes = match &spec.stdin {
        None => None,
        Some(StdinSource::Bytes(bytes)) => Some(bytes.clone()),
        Some(StdinSource::File(path)) => match std::fs::read(path) {
            Ok(bytes) => Some(bytes),
            Err(err) => {
                return OperationResult::transport_failure(
                    host.clone(),
                    started_at,
                    format!("stdin file {} is not readable: {}", path.display(), err),
                )
            }
        },
    };

    let session = match connect_session(
        &host.canonical_address,
        cred,
        config,
        known_hosts,
        spec.connect_timeout,
    ) {
        Ok(session) => session,
        Err(err) => {
            return OperationResult::transport_failure(host.clone(), started_at, err.message)
        }
    };

    let mut channel = match session.channel_session() {
        Ok(channel) => channel,
        Err(err) => {
            return OperationResult::transport_failure(
                host.clone(),
                started_at,
                format!("Failed to open SSH channel: {}", err),
            )
        }
    };
    for (key, value) in &spec.environment {
        // Best effort: sshd only honors AcceptEnv-whitelisted names.
        let _ = channel.setenv(key, value);
    }
    if let Err(err) = channel.exec(&spec.remote_command) {
        return OperationResult::transport_failure(
            host.clone(),
            started_at,
            format!("Failed to start remote command: {}", err),
        );
    }
    session.set_blocking(false);

    // With no stdin payload the channel gets EOF up front. The batch loop
    // feeding hosts from its own stdin must never share that stream with the
    // remote command.
    let mut stdin_done = match &stdin_bytes {
        None => {
            let _ = channel.send_eof();
            true
        }
        Some(bytes) if bytes.is_empty() => {
            let _ = channel.send_eof();
            true
        }
        Some(_) => false,
    };
    let mut stdin_offset = 0usize;

    let mut capture = CaptureState::new();
    let mut buf = [0u8; 8192];
    loop {
        let mut progressed = false;
        if let (false, Some(bytes)) = (stdin_done, stdin_bytes.as_ref()) {
            match channel.write(&bytes[stdin_offset..]) {
                Ok(n) if n > 0 => {
                    stdin_offset = std::cmp::min(stdin_offset + n, bytes.len());
                    progressed = true;
                    if stdin_offset >= bytes.len() {
                        let _ = channel.send_eof();
                        stdin_done = true;
                    }
                }
                Ok(_) => {}
                Err(err) => {
                    if err.kind() != std::io::ErrorKind::WouldBlock {
                        stdin_done = true;
                    }
                }
            }
        }
        match channel.read(&mut buf) {
            Ok(n) if n > 0 => {
                capture.capture(&buf[..n]);
                progressed = true;
            }
            Ok(_) => {}
            Err(err) => {
                if err.kind() != std::io::ErrorKind::WouldBlock {
                    return OperationResult::transport_failure(
                        host.clone(),
                        started_at,
                        format!("SSH stdout read failed: {}", err),
                    );
                }
            }
        }
        match channel.stderr().read(&mut buf) {
            Ok(n) if n > 0 => {
                capture.capture(&buf[..n]);
                progressed = true;
            }
            Ok(_) => {}
            Err(err) => {
                if err.kind() != std::io::ErrorKind::WouldBlock {
                    return OperationResult::transport_failure(
                        host.clone(),
                        started_at,
                        format!("SSH stderr read failed: {}", err),
                    );
                }
            }
        }

        if channel.eof() {
            break;
        }
        if !progressed {
            std::thread::sleep(Duration::from_millis(network::POLL_SLEEP_MS));
        }
    }

    session.set_blocking(true);
    let _ = channel.wait_close();
    let exit_code = i64::from(channel.exit_status().unwrap_or(-1));
    OperationResult::remote(host.clone(), exit_code, capture.into_string(), started_at)
}

#[allow(clippy::too_many_arguments)]
fn push_dir_blocking(
    host: &HostSpec,
    cred: Option<&Credential>,
    config: &SshConfig,
    known_hosts: &KnownHostsStore,
    local_dir: &Path,
    remote_dir: &str,
    connect_timeout: Duration,
    started_at: DateTime<Utc>,
) -> OperationResult {
    if !local_dir.is_dir() {
        return OperationResult::transport_failure(
            host.clone(),
            started_at,
            format!("local directory {} does not exist", local_dir.display()),
        );
    }
    let session = match connect_session(
        &host.canonical_address,
        cred,
        config,
        known_hosts,
        connect_timeout,
    ) {
        Ok(session) => session,
        Err(err) => {
            return OperationResult::transport_failure(host.clone(), started_at, err.message)
        }
    };
    let sftp = match session.sftp() {
        Ok(sftp) => sftp,
        Err(err) => {
            return OperationResult::transport_failure(
                host.clone(),
                started_at,
                format!("Failed to open SFTP subsystem: {}", err),
            )
        }
    };

    // SFTP resolves relative paths against the login home, which is what a
    // `~/`-prefixed destination means.
    let remote_root = PathBuf::from(
        remote_dir
            .strip_prefix("~/")
            .unwrap_or(remote_dir)
            .trim_end_matches('/'),
    );

    let mut transcript = String::new();
    let mut uploaded = 0usize;
    let walker = walkdir::WalkDir::new(local_dir)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| entry.ok());
    for entry in walker {
        let Ok(rel) = entry.path().strip_prefix(local_dir) else {
            continue;
        };
        if rel.as_os_str().is_empty() {
            let _ = ensure_remote_dir(&sftp, &remote_root);
            continue;
        }
        let remote_path = remote_root.join(rel);
        if entry.file_type().is_dir() {
            let _ = ensure_remote_dir(&sftp, &remote_path);
            continue;
        }
        if !entry.file_type().is_file() {
            continue;
        }
        if let Err(err) = upload_file(&sftp, entry.path(), &remote_path) {
            transcript.push_str(&format!("failed {}: {}\n", rel.display(), err.message));
            return OperationResult::remote(host.clone(), 1, transcript, started_at);
        }
        transcript.push_str(&format!("uploaded {}\n", rel.display()));
        uploaded += 1;
    }
    transcript.push_str(&format!("{} file(s) uploaded\n", uploaded));
    OperationResult::remote(host.clone(), 0, transcript, started_at)
}

fn ensure_remote_dir(sftp: &ssh2::Sftp, remote_path: &Path) -> Result<(), FleetError> {
    let mut current = PathBuf::new();
    for part in remote_path.components() {
        current.push(part);
        if current.as_os_str().is_empty() {
            continue;
        }
        if sftp.stat(&current).is_ok() {
            continue;
        }
        let _ = sftp.mkdir(&current, 0o755);
    }
    Ok(())
}

fn upload_file(sftp: &ssh2::Sftp, local: &Path, remote: &Path) -> Result<(), FleetError> {
    let mut local_file = std::fs::File::open(local).map_err(|err| {
        FleetError::io(format!("{} is not readable: {}", local.display(), err))
    })?;
    let mode = file_mode(local);
    let mut remote_file = sftp
        .open_mode(
            remote,
            OpenFlags::WRITE | OpenFlags::CREATE | OpenFlags::TRUNCATE,
            mode,
            OpenType::File,
        )
        .map_err(|err| FleetError::transport(format!("SFTP open failed: {}", err)))?;
    std::io::copy(&mut local_file, &mut remote_file)
        .map_err(|err| FleetError::transport(format!("SFTP write failed: {}", err)))?;
    Ok(())
}

fn file_mode(local: &Path) -> i32 {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Ok(metadata) = std::fs::metadata(local) {
            if metadata.permissions().mode() & 0o111 != 0 {
                return 0o755;
            }
        }
    }
    #[cfg(not(unix))]
    let _ = local;
    0o644
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::managers::keys::PermissionClass;

    fn host() -> HostSpec {
        HostSpec {
            raw_token: "alpha".to_string(),
            canonical_address: "alpha.lan".to_string(),
            domain_applied: true,
        }
    }

    #[test]
    fn remote_zero_exit_is_success() {
        let result = OperationResult::remote(host(), 0, "ok".to_string(), Utc::now());
        assert!(result.success());
    }

    #[test]
    fn remote_nonzero_exit_is_failure() {
        let result = OperationResult::remote(host(), 100, String::new(), Utc::now());
        assert!(!result.success());
        assert_eq!(result.exit_code, 100);
    }

    #[test]
    fn sentinel_codes_stay_distinguishable() {
        let never = OperationResult::transport_failure(host(), Utc::now(), "refused".to_string());
        let cancelled = OperationResult::cancelled(host(), Utc::now());
        let rejected = OperationResult::credential_rejected(
            host(),
            &Credential {
                key_path: "/keys/id_alpha".into(),
                permission_class: PermissionClass::TooOpen,
            },
        );
        assert_eq!(never.exit_code, exit_codes::NEVER_CONNECTED);
        assert_eq!(cancelled.exit_code, exit_codes::CANCELLED);
        assert_eq!(rejected.exit_code, exit_codes::CREDENTIAL_REJECTED);
        assert!(rejected.combined_output.contains("too open"));
    }

    #[test]
    fn capture_caps_and_flags_truncation() {
        let mut capture = CaptureState::new();
        capture.capture(&vec![b'x'; limits::MAX_CAPTURE_BYTES + 10]);
        assert!(capture.truncated);
        let text = capture.into_string();
        assert!(text.contains("output truncated"));
    }
}

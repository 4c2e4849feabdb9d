use crate::errors::FleetError;
use crate::managers::executor::OperationResult;
use crate::ops::{OperationSpec, StdinSource};
use crate::utils::text::escape_shell_value;
use base64::Engine;
use once_cell::sync::Lazy;
use regex::Regex;
use sha2::{Digest, Sha256};

static USERNAME_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z_][a-z0-9_-]{0,31}$").expect("username pattern"));

#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub password: String,
    pub public_key_line: String,
}

/// Idempotent sudo-user provisioning. The password and public key travel on
/// the session's stdin; command lines are visible to every local process on
/// the remote side, so nothing secret may appear in one.
pub fn describe(user: &NewUser) -> Result<OperationSpec, FleetError> {
    if !USERNAME_PATTERN.is_match(&user.username) {
        return Err(FleetError::config(format!(
            "Invalid username: {}",
            user.username
        ))
        .with_hint("Use a lowercase POSIX name (letters, digits, _ and -)."));
    }
    if user.password.is_empty() || user.password.contains('\n') {
        return Err(FleetError::config(
            "Password must be a non-empty single line",
        ));
    }
    let key_line = normalize_public_key_line(&user.public_key_line)?;

    let script = [
        "set -eu".to_string(),
        "umask 077".to_string(),
        format!("new_user={}", escape_shell_value(&user.username)),
        "IFS= read -r new_password".to_string(),
        "IFS= read -r key_line".to_string(),
        "if ! id -u \"$new_user\" >/dev/null 2>&1; then useradd -m -s /bin/bash \"$new_user\"; fi"
            .to_string(),
        "printf '%s:%s\\n' \"$new_user\" \"$new_password\" | chpasswd".to_string(),
        "usermod -aG sudo \"$new_user\"".to_string(),
        "home=$(getent passwd \"$new_user\" | cut -d: -f6)".to_string(),
        "install -d -m 700 -o \"$new_user\" -g \"$new_user\" \"$home/.ssh\"".to_string(),
        "auth=\"$home/.ssh/authorized_keys\"".to_string(),
        "[ -f \"$auth\" ] || : > \"$auth\"".to_string(),
        "chmod 600 \"$auth\"".to_string(),
        "chown \"$new_user\":\"$new_user\" \"$auth\"".to_string(),
        "if grep -qxF \"$key_line\" \"$auth\"; then echo key_present; else printf '%s\\n' \"$key_line\" >> \"$auth\"; echo key_added; fi"
            .to_string(),
    ]
    .join("\n");

    let stdin = format!("{}\n{}\n", user.password, key_line);
    Ok(OperationSpec::command(script).with_stdin(StdinSource::Bytes(stdin.into_bytes())))
}

pub fn annotate(result: &OperationResult) -> Option<String> {
    if !result.success() {
        return None;
    }
    result
        .combined_output
        .lines()
        .rev()
        .map(str::trim)
        .find(|line| *line == "key_added" || *line == "key_present")
        .map(|marker| marker.replace('_', " "))
}

pub fn normalize_public_key_line(raw: &str) -> Result<String, FleetError> {
    let normalized = raw.replace('\r', "");
    let lines: Vec<&str> = normalized
        .lines()
        .map(|line| line.trim())
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .collect();
    if lines.len() != 1 {
        return Err(FleetError::config(
            "Public key must be exactly one key line",
        )
        .with_hint("Remove extra lines and comments; keep \"<type> <base64> [comment]\"."));
    }
    let line = lines[0];
    if line.contains('\0') || line.split_whitespace().count() < 2 {
        return Err(FleetError::config("Public key has invalid format")
            .with_hint("Expected: \"<type> <base64> [comment]\"."));
    }
    Ok(line.to_string())
}

pub fn fingerprint_public_key_sha256(line: &str) -> Result<String, FleetError> {
    let key_blob = line
        .split_whitespace()
        .nth(1)
        .ok_or_else(|| FleetError::config("Public key has invalid format"))?;
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(key_blob.as_bytes())
        .unwrap_or_else(|_| key_blob.as_bytes().to_vec());
    let hash = Sha256::digest(&bytes);
    let encoded = base64::engine::general_purpose::STANDARD_NO_PAD.encode(hash);
    Ok(format!("SHA256:{}", encoded))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::managers::resolver::HostSpec;
    use chrono::Utc;

    fn user() -> NewUser {
        NewUser {
            username: "deploy".to_string(),
            password: "correct horse".to_string(),
            public_key_line: "ssh-ed25519 AAAAC3NzaC1lZDI1NTE5AAAAIM8u deploy@lab".to_string(),
        }
    }

    #[test]
    fn secrets_travel_on_stdin_not_argv() {
        let spec = describe(&user()).unwrap();
        assert!(spec.uses_stdin());
        assert!(!spec.remote_command.contains("correct horse"));
        assert!(!spec.remote_command.contains("AAAAC3NzaC1lZDI1NTE5"));
        match spec.stdin.as_ref().unwrap() {
            StdinSource::Bytes(bytes) => {
                let payload = String::from_utf8(bytes.clone()).unwrap();
                assert!(payload.starts_with("correct horse\n"));
                assert!(payload.contains("ssh-ed25519"));
            }
            other => panic!("expected byte stdin, got {:?}", other),
        }
    }

    #[test]
    fn rejects_bad_usernames() {
        let mut bad = user();
        bad.username = "Deploy User".to_string();
        assert!(describe(&bad).is_err());
    }

    #[test]
    fn rejects_multiline_passwords() {
        let mut bad = user();
        bad.password = "a\nb".to_string();
        assert!(describe(&bad).is_err());
    }

    #[test]
    fn key_normalization_rejects_extra_lines() {
        assert!(normalize_public_key_line("ssh-rsa AAAA a\nssh-rsa BBBB b").is_err());
        assert!(normalize_public_key_line("# comment\nssh-rsa AAAA host").is_ok());
        assert!(normalize_public_key_line("just-one-token").is_err());
    }

    #[test]
    fn fingerprint_is_stable_sha256() {
        let line = "ssh-ed25519 AAAAC3NzaC1lZDI1NTE5AAAAIM8u deploy@lab";
        let first = fingerprint_public_key_sha256(line).unwrap();
        let second = fingerprint_public_key_sha256(line).unwrap();
        assert_eq!(first, second);
        assert!(first.starts_with("SHA256:"));
    }

    #[test]
    fn annotation_reports_marker() {
        let result = OperationResult::remote(
            HostSpec {
                raw_token: "alpha".to_string(),
                canonical_address: "alpha.lan".to_string(),
                domain_applied: true,
            },
            0,
            "key_added\n".to_string(),
            Utc::now(),
        );
        assert_eq!(annotate(&result).as_deref(), Some("key added"));
    }
}

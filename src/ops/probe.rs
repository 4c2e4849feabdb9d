use crate::managers::executor::OperationResult;
use crate::ops::OperationSpec;

/// Connectivity probe: proves login, shell, and name resolution in one line.
pub fn describe() -> OperationSpec {
    OperationSpec::command("echo \"Connection OK\" && whoami && hostname")
}

pub fn annotate(result: &OperationResult) -> Option<String> {
    if !result.success() {
        return None;
    }
    let mut lines = result.combined_output.lines().skip(1);
    let user = lines.next()?.trim();
    let hostname = lines.next()?.trim();
    if user.is_empty() || hostname.is_empty() {
        return None;
    }
    Some(format!("{}@{}", user, hostname))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::managers::resolver::HostSpec;
    use chrono::Utc;

    fn result(exit_code: i64, output: &str) -> OperationResult {
        OperationResult::remote(
            HostSpec {
                raw_token: "alpha".to_string(),
                canonical_address: "alpha.lan".to_string(),
                domain_applied: true,
            },
            exit_code,
            output.to_string(),
            Utc::now(),
        )
    }

    #[test]
    fn annotation_reports_user_and_hostname() {
        let out = annotate(&result(0, "Connection OK\nroot\nalpha\n"));
        assert_eq!(out.as_deref(), Some("root@alpha"));
    }

    #[test]
    fn failed_probe_has_no_annotation() {
        assert!(annotate(&result(255, "")).is_none());
    }
}

use crate::managers::executor::OperationResult;
use crate::ops::OperationSpec;

/// Non-interactive package refresh and upgrade. The frontend is forced inline
/// in the script because sshd rarely accepts arbitrary env names; the env map
/// carries it too for servers that do.
pub fn describe(autoremove: bool) -> OperationSpec {
    let mut script = vec![
        "set -e",
        "export DEBIAN_FRONTEND=noninteractive",
        "apt-get -q update",
        "apt-get -qy upgrade",
    ];
    if autoremove {
        script.push("apt-get -qy autoremove");
    }
    OperationSpec::command(script.join("\n")).with_env("DEBIAN_FRONTEND", "noninteractive")
}

/// Pull apt's own "N upgraded, ..." recap line for the summary log.
pub fn annotate(result: &OperationResult) -> Option<String> {
    if !result.success() {
        return None;
    }
    result
        .combined_output
        .lines()
        .rev()
        .find(|line| line.contains("upgraded,") && line.contains("newly installed"))
        .map(|line| line.trim().to_string())
}

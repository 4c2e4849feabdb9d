use crate::ops::OperationSpec;
use crate::utils::text::escape_shell_value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerAction {
    Halt,
    Reboot,
}

/// Schedule a shutdown or reboot. A delay of zero becomes `+0`, which still
/// broadcasts the wall message before acting.
pub fn describe(action: PowerAction, delay_minutes: u32, message: &str) -> OperationSpec {
    let flag = match action {
        PowerAction::Halt => "-h",
        PowerAction::Reboot => "-r",
    };
    OperationSpec::command(format!(
        "shutdown {} +{} {}",
        flag,
        delay_minutes,
        escape_shell_value(message)
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn halt_and_reboot_flags() {
        assert!(describe(PowerAction::Halt, 5, "maintenance")
            .remote_command
            .starts_with("shutdown -h +5"));
        assert!(describe(PowerAction::Reboot, 0, "kernel update")
            .remote_command
            .starts_with("shutdown -r +0"));
    }

    #[test]
    fn message_is_shell_quoted() {
        let spec = describe(PowerAction::Halt, 1, "back in 5'");
        assert!(spec.remote_command.ends_with("'back in 5'\\'''"));
    }
}

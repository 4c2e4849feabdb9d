use crate::constants::network::{SSH_DEFAULT_PORT, TIMEOUT_CONNECT_DEFAULT_SECS};
use crate::ops::power::PowerAction;
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "fleet",
    version,
    about = "Batch SSH operations across a home-lab fleet"
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// Host list file, one host per line (blank lines and # comments ignored)
    #[arg(long, global = true, default_value = "hosts.txt")]
    pub hosts: PathBuf,

    /// Default domain appended to bare host names (e.g. ".lan")
    #[arg(long, global = true, default_value = "")]
    pub domain: String,

    /// Remote login user (falls back to USER_NAME from --secrets, then root)
    #[arg(long, global = true)]
    pub user: Option<String>,

    #[arg(long, global = true, default_value_t = SSH_DEFAULT_PORT)]
    pub port: u16,

    /// KEY=VALUE secrets file (USER_NAME, SSH_KEY_PATH, NEW_USER_* ...)
    #[arg(long, global = true)]
    pub secrets: Option<PathBuf>,

    /// Per-host key override table, one `hostname|keypath` per line
    #[arg(long, global = true)]
    pub key_overrides: Option<PathBuf>,

    /// Per-host key path template, e.g. "~/.ssh/id_{host}"
    #[arg(long, global = true)]
    pub key_template: Option<String>,

    /// Hosts processed at once (1 = sequential, matching the classic loops)
    #[arg(long, global = true, default_value_t = 1)]
    pub concurrency: usize,

    /// Abort the whole run after this many seconds; unfinished hosts are
    /// recorded as failures
    #[arg(long, global = true)]
    pub run_timeout_secs: Option<u64>,

    #[arg(long, global = true, default_value_t = TIMEOUT_CONNECT_DEFAULT_SECS)]
    pub connect_timeout_secs: u64,

    /// Host key trust policy: accept, accept-new or pin
    #[arg(long, global = true, default_value = "accept-new")]
    pub host_key_policy: String,

    /// Fingerprint store backing accept-new and pin
    #[arg(long, global = true, default_value = "~/.config/fleet/known_hosts")]
    pub known_hosts: PathBuf,

    /// Summary log path (default: logs/<command>-summary.log)
    #[arg(long, global = true)]
    pub summary_log: Option<PathBuf>,

    /// Detail log path (default: logs/<command>-detail.log)
    #[arg(long, global = true)]
    pub detail_log: Option<PathBuf>,

    /// Start both logs fresh instead of appending
    #[arg(long, global = true)]
    pub truncate_logs: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Check SSH connectivity to every host
    Ping,

    /// Collect OS, architecture and RAM facts
    Facts {
        /// Also write the collected facts as a JSON inventory
        #[arg(long)]
        inventory_out: Option<PathBuf>,
    },

    /// Refresh and upgrade packages on every host
    Update {
        /// Run apt-get autoremove after the upgrade
        #[arg(long)]
        autoremove: bool,
    },

    /// Provision a sudo user with a password and SSH key
    AddUser {
        /// Username (falls back to NEW_USER_NAME from --secrets)
        #[arg(long)]
        username: Option<String>,

        /// Public key file (falls back to NEW_USER_PUBKEY_PATH from --secrets)
        #[arg(long)]
        public_key: Option<PathBuf>,
    },

    /// Schedule shutdown or reboot on every host
    Power {
        #[arg(value_enum)]
        action: PowerActionArg,

        #[arg(long, default_value_t = 1)]
        delay_minutes: u32,

        /// Wall message shown to logged-in users
        #[arg(long, default_value = "fleet maintenance")]
        message: String,
    },

    /// Push a local script directory to every host over SFTP
    Sync {
        local_dir: PathBuf,

        #[arg(long, default_value = "~/scripts")]
        remote_dir: String,
    },

    /// Run an arbitrary command on every host
    Exec { command: String },

    /// Look up a host in the JSON inventory (offline, no SSH)
    Lookup {
        /// Hostname to show; omit to list all known hostnames
        host: Option<String>,

        #[arg(long, default_value = "server-informations.json")]
        inventory: PathBuf,
    },
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::Ping => "ping",
            Command::Facts { .. } => "facts",
            Command::Update { .. } => "update",
            Command::AddUser { .. } => "add-user",
            Command::Power { .. } => "power",
            Command::Sync { .. } => "sync",
            Command::Exec { .. } => "exec",
            Command::Lookup { .. } => "lookup",
        }
    }
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerActionArg {
    Halt,
    Reboot,
}

impl From<PowerActionArg> for PowerAction {
    fn from(value: PowerActionArg) -> Self {
        match value {
            PowerActionArg::Halt => PowerAction::Halt,
            PowerActionArg::Reboot => PowerAction::Reboot,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_exec_with_global_flags() {
        let cli = Cli::try_parse_from([
            "fleet",
            "--hosts",
            "lab-hosts.txt",
            "--domain",
            ".lan",
            "--concurrency",
            "4",
            "exec",
            "uptime",
        ])
        .unwrap();
        assert_eq!(cli.global.hosts, PathBuf::from("lab-hosts.txt"));
        assert_eq!(cli.global.domain, ".lan");
        assert_eq!(cli.global.concurrency, 4);
        match cli.command {
            Command::Exec { command } => assert_eq!(command, "uptime"),
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn global_flags_parse_after_subcommand() {
        let cli = Cli::try_parse_from(["fleet", "ping", "--domain", ".lan"]).unwrap();
        assert_eq!(cli.global.domain, ".lan");
        assert_eq!(cli.command.name(), "ping");
    }

    #[test]
    fn power_defaults() {
        let cli = Cli::try_parse_from(["fleet", "power", "reboot"]).unwrap();
        match cli.command {
            Command::Power {
                action,
                delay_minutes,
                ..
            } => {
                assert_eq!(action, PowerActionArg::Reboot);
                assert_eq!(delay_minutes, 1);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }
}

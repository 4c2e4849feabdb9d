use crate::cli::{Cli, Command};
use crate::constants::process;
use crate::errors::FleetError;
use crate::managers::executor::{OperationResult, RemoteRunner, SshConfig, SshExecutor};
use crate::managers::keys::{self, KeyResolver};
use crate::managers::orchestrator::{BatchRun, CredResolver, HostJob, Orchestrator};
use crate::ops::{self, users::NewUser, OperationSpec};
use crate::services::inventory::{self, ServerIndex, ServerRecord};
use crate::services::known_hosts::{HostKeyPolicy, KnownHostsStore};
use crate::services::logger::Logger;
use crate::services::reporter::{Reporter, ReportSinks};
use crate::services::secrets::SecretsFile;
use crate::utils::user_paths::expand_home_path;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Wire the services together and run one subcommand. Returns the process
/// exit code; configuration errors bubble up as `FleetError`.
pub async fn run(cli: Cli) -> Result<i32, FleetError> {
    let logger = Logger::new("fleet");
    match &cli.command {
        Command::Lookup { host, inventory } => run_lookup(host.as_deref(), inventory),
        _ => run_batch(logger, cli).await,
    }
}

fn run_lookup(host: Option<&str>, inventory: &Path) -> Result<i32, FleetError> {
    let index = ServerIndex::load(inventory)?;
    match host {
        None => {
            for name in index.hostnames() {
                println!("{}", name);
            }
            Ok(process::EXIT_OK)
        }
        Some(host) => match index.lookup(host) {
            Ok(record) => {
                let rendered = serde_json::to_string_pretty(record)
                    .map_err(|err| FleetError::internal(err.to_string()))?;
                println!("{}", rendered);
                Ok(process::EXIT_OK)
            }
            Err(err) => {
                eprintln!("fleet: {}", err);
                Ok(process::EXIT_HOST_FAILURES)
            }
        },
    }
}

async fn run_batch(logger: Logger, cli: Cli) -> Result<i32, FleetError> {
    let global = &cli.global;
    let hosts = inventory::load_host_tokens(&global.hosts)?;
    let secrets = match &global.secrets {
        Some(path) => Some(SecretsFile::load(path)?),
        None => None,
    };

    let username = global
        .user
        .clone()
        .or_else(|| {
            secrets
                .as_ref()
                .and_then(|s| s.get("USER_NAME").map(str::to_string))
        })
        .unwrap_or_else(|| "root".to_string());

    let resolve_cred = build_cred_resolver(global, secrets.as_ref())?;

    let policy = HostKeyPolicy::parse(&global.host_key_policy)?;
    let known_hosts = Arc::new(KnownHostsStore::load(expand_home_path(&global.known_hosts))?);
    let executor = Arc::new(SshExecutor::new(
        logger.clone(),
        SshConfig {
            username,
            port: global.port,
            host_key_policy: policy,
        },
        known_hosts,
    ));

    let connect_timeout = Duration::from_secs(global.connect_timeout_secs);
    let orchestrator = Orchestrator::new(logger.clone(), global.domain.clone())
        .with_concurrency(global.concurrency)
        .with_run_timeout(global.run_timeout_secs.map(Duration::from_secs));

    let spec = match &cli.command {
        Command::Ping => Some(ops::probe::describe()),
        Command::Facts { .. } => Some(ops::facts::describe()),
        Command::Update { autoremove } => Some(ops::packages::describe(*autoremove)),
        Command::AddUser {
            username,
            public_key,
        } => {
            let new_user = resolve_new_user(username.as_deref(), public_key.as_deref(), secrets.as_ref())?;
            logger.info(
                "provisioning user",
                Some(&serde_json::json!({
                    "username": new_user.username,
                    "key_fingerprint": ops::users::fingerprint_public_key_sha256(
                        &new_user.public_key_line
                    )?,
                })),
            );
            Some(ops::users::describe(&new_user)?)
        }
        Command::Power {
            action,
            delay_minutes,
            message,
        } => Some(ops::power::describe((*action).into(), *delay_minutes, message)),
        Command::Exec { command } => Some(OperationSpec::command(command.clone())),
        Command::Sync { .. } | Command::Lookup { .. } => None,
    };

    let run = match (spec, &cli.command) {
        (Some(spec), _) => {
            let runner: Arc<dyn RemoteRunner> = executor.clone();
            orchestrator
                .run(
                    &hosts,
                    runner,
                    spec.with_connect_timeout(connect_timeout),
                    resolve_cred,
                )
                .await
        }
        (
            None,
            Command::Sync {
                local_dir,
                remote_dir,
            },
        ) => {
            let job: Arc<dyn HostJob> = Arc::new(ops::sync::ScriptSync::new(
                executor.clone(),
                local_dir.clone(),
                remote_dir.clone(),
                connect_timeout,
            ));
            orchestrator.run_with(&hosts, resolve_cred, job).await
        }
        (None, _) => return Err(FleetError::internal("Command has no batch operation")),
    };

    write_inventory_if_requested(&logger, &cli.command, &run)?;

    let sinks = report_sinks(&cli);
    let reporter = Reporter::new(
        logger.clone(),
        secrets.as_ref().map(SecretsFile::values).unwrap_or_default(),
    );
    let annotate = annotator(&cli.command);
    reporter.report(&run, &sinks, &*annotate)?;
    Ok(run.exit_code())
}

fn build_cred_resolver(
    global: &crate::cli::GlobalArgs,
    secrets: Option<&SecretsFile>,
) -> Result<CredResolver, FleetError> {
    let overrides = match &global.key_overrides {
        Some(path) => KeyResolver::load_overrides(path)?,
        None => BTreeMap::new(),
    };
    let key_resolver = KeyResolver::new(overrides, global.key_template.clone());
    let shared_key: Option<PathBuf> = secrets
        .and_then(|s| s.get("SSH_KEY_PATH"))
        .map(expand_home_path);
    Ok(Arc::new(move |token, _spec| {
        if key_resolver.is_configured() {
            key_resolver.resolve_key(token)
        } else {
            shared_key
                .clone()
                .map(keys::validate_key_file)
        }
    }))
}

fn resolve_new_user(
    username: Option<&str>,
    public_key: Option<&Path>,
    secrets: Option<&SecretsFile>,
) -> Result<NewUser, FleetError> {
    let secrets = secrets.ok_or_else(|| {
        FleetError::config("add-user needs --secrets for the new user's password")
            .with_hint("Put NEW_USER_PASSWORD (and optionally NEW_USER_NAME) in the secrets file.")
    })?;
    let username = username
        .map(str::to_string)
        .or_else(|| secrets.get("NEW_USER_NAME").map(str::to_string))
        .ok_or_else(|| {
            FleetError::config("add-user needs --username or NEW_USER_NAME in the secrets file")
        })?;
    let password = secrets.require("NEW_USER_PASSWORD")?.to_string();
    let key_path = public_key
        .map(Path::to_path_buf)
        .or_else(|| secrets.get("NEW_USER_PUBKEY_PATH").map(expand_home_path))
        .ok_or_else(|| {
            FleetError::config(
                "add-user needs --public-key or NEW_USER_PUBKEY_PATH in the secrets file",
            )
        })?;
    let raw_key = std::fs::read_to_string(&key_path).map_err(|err| {
        FleetError::config(format!(
            "Public key {} is not readable: {}",
            key_path.display(),
            err
        ))
    })?;
    let public_key_line = ops::users::normalize_public_key_line(&raw_key)?;
    Ok(NewUser {
        username,
        password,
        public_key_line,
    })
}

fn write_inventory_if_requested(
    logger: &Logger,
    command: &Command,
    run: &BatchRun,
) -> Result<(), FleetError> {
    let Command::Facts {
        inventory_out: Some(path),
    } = command
    else {
        return Ok(());
    };
    let recorded_at = chrono::Utc::now().to_rfc3339();
    let records: Vec<ServerRecord> = run
        .results
        .iter()
        .filter_map(|result| ops::facts::to_record(result, recorded_at.clone()))
        .collect();
    inventory::write_records(path, &records)?;
    logger.info(
        "inventory written",
        Some(&serde_json::json!({
            "path": path.display().to_string(),
            "hosts": records.len(),
        })),
    );
    Ok(())
}

fn report_sinks(cli: &Cli) -> ReportSinks {
    let name = cli.command.name();
    ReportSinks {
        summary_path: cli
            .global
            .summary_log
            .clone()
            .unwrap_or_else(|| PathBuf::from(format!("logs/{}-summary.log", name))),
        detail_path: cli
            .global
            .detail_log
            .clone()
            .unwrap_or_else(|| PathBuf::from(format!("logs/{}-detail.log", name))),
        truncate: cli.global.truncate_logs,
    }
}

fn annotator(command: &Command) -> Box<dyn Fn(&OperationResult) -> Option<String>> {
    match command {
        Command::Ping => Box::new(ops::probe::annotate),
        Command::Facts { .. } => Box::new(ops::facts::annotate),
        Command::Update { .. } => Box::new(ops::packages::annotate),
        Command::AddUser { .. } => Box::new(ops::users::annotate),
        Command::Sync { .. } => Box::new(ops::sync::annotate),
        _ => Box::new(|_| None),
    }
}

use crate::constants::process;
use crate::managers::executor::{OperationResult, RemoteRunner};
use crate::managers::keys::Credential;
use crate::managers::resolver::{self, HostSpec, HostToken};
use crate::ops::OperationSpec;
use crate::services::logger::Logger;
use async_trait::async_trait;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use uuid::Uuid;

pub type CredResolver = Arc<dyn Fn(&HostToken, &HostSpec) -> Option<Credential> + Send + Sync>;

/// One per-host unit of work. Command operations go through `RemoteRunner`;
/// transfer-style actions (script sync) supply their own job.
#[async_trait]
pub trait HostJob: Send + Sync {
    async fn run(&self, host: &HostSpec, cred: Option<&Credential>) -> OperationResult;
}

struct CommandJob {
    runner: Arc<dyn RemoteRunner>,
    spec: OperationSpec,
}

#[async_trait]
impl HostJob for CommandJob {
    async fn run(&self, host: &HostSpec, cred: Option<&Credential>) -> OperationResult {
        self.runner.run(host, cred, &self.spec).await
    }
}

/// Aggregate outcome of one batch. Results keep host-list order regardless of
/// completion order.
#[derive(Debug)]
pub struct BatchRun {
    pub run_id: Uuid,
    pub results: Vec<OperationResult>,
    pub success_count: usize,
    pub failure_count: usize,
}

impl BatchRun {
    pub fn from_results(run_id: Uuid, results: Vec<OperationResult>) -> Self {
        let success_count = results.iter().filter(|result| result.success()).count();
        let failure_count = results.len() - success_count;
        Self {
            run_id,
            results,
            success_count,
            failure_count,
        }
    }

    pub fn succeeded_hosts(&self) -> Vec<&str> {
        self.results
            .iter()
            .filter(|result| result.success())
            .map(|result| result.host.canonical_address.as_str())
            .collect()
    }

    pub fn failed_hosts(&self) -> Vec<&str> {
        self.results
            .iter()
            .filter(|result| !result.success())
            .map(|result| result.host.canonical_address.as_str())
            .collect()
    }

    /// The process-level success signal for scripting callers.
    pub fn exit_code(&self) -> i32 {
        if self.failure_count > 0 {
            process::EXIT_HOST_FAILURES
        } else {
            process::EXIT_OK
        }
    }
}

/// Drives one operation across a host list: resolve, gate on the credential,
/// execute, accumulate. One host's failure never stops the rest.
pub struct Orchestrator {
    logger: Logger,
    default_domain: String,
    concurrency: usize,
    run_timeout: Option<Duration>,
}

impl Orchestrator {
    pub fn new(logger: Logger, default_domain: impl Into<String>) -> Self {
        Self {
            logger: logger.child("batch"),
            default_domain: default_domain.into(),
            concurrency: 1,
            run_timeout: None,
        }
    }

    pub fn with_concurrency(mut self, limit: usize) -> Self {
        self.concurrency = limit.max(1);
        self
    }

    pub fn with_run_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.run_timeout = timeout;
        self
    }

    pub async fn run(
        &self,
        hosts: &[HostToken],
        runner: Arc<dyn RemoteRunner>,
        spec: OperationSpec,
        resolve_cred: CredResolver,
    ) -> BatchRun {
        let job: Arc<dyn HostJob> = Arc::new(CommandJob { runner, spec });
        self.run_with(hosts, resolve_cred, job).await
    }

    pub async fn run_with(
        &self,
        hosts: &[HostToken],
        resolve_cred: CredResolver,
        job: Arc<dyn HostJob>,
    ) -> BatchRun {
        let run_id = Uuid::new_v4();
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let deadline = self
            .run_timeout
            .map(|timeout| tokio::time::Instant::now() + timeout);
        self.logger.info(
            "run started",
            Some(&serde_json::json!({
                "run_id": run_id.to_string(),
                "hosts": hosts.len(),
                "concurrency": self.concurrency,
            })),
        );

        let tasks = hosts.iter().enumerate().map(|(index, token)| {
            let spec = resolver::resolve(token, &self.default_domain);
            let cred = resolve_cred(token, &spec);
            let semaphore = semaphore.clone();
            let job = job.clone();
            let logger = self.logger.clone();
            async move {
                // The credential gate runs before any network attempt.
                if let Some(credential) = cred.as_ref() {
                    if !credential.is_strict() {
                        logger.warn(
                            "credential rejected",
                            Some(&serde_json::json!({
                                "host": spec.canonical_address,
                                "reason": credential.rejection_reason(),
                            })),
                        );
                        return (index, OperationResult::credential_rejected(spec, credential));
                    }
                }
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => return (index, OperationResult::cancelled(spec, chrono::Utc::now())),
                };
                let started_at = chrono::Utc::now();
                let result = match deadline {
                    Some(deadline) => {
                        if tokio::time::Instant::now() >= deadline {
                            OperationResult::cancelled(spec, started_at)
                        } else {
                            match tokio::time::timeout_at(
                                deadline,
                                job.run(&spec, cred.as_ref()),
                            )
                            .await
                            {
                                Ok(result) => result,
                                Err(_) => OperationResult::cancelled(spec, started_at),
                            }
                        }
                    }
                    None => job.run(&spec, cred.as_ref()).await,
                };
                logger.debug(
                    "host finished",
                    Some(&serde_json::json!({
                        "host": result.host.canonical_address,
                        "exit_code": result.exit_code,
                    })),
                );
                (index, result)
            }
        });

        // Results land in their source slot so host order survives any
        // completion order.
        let mut slots: Vec<Option<OperationResult>> = (0..hosts.len()).map(|_| None).collect();
        for (index, result) in join_all(tasks).await {
            slots[index] = Some(result);
        }
        let results = slots
            .into_iter()
            .zip(hosts)
            .map(|(slot, token)| {
                slot.unwrap_or_else(|| {
                    OperationResult::cancelled(
                        resolver::resolve(token, &self.default_domain),
                        chrono::Utc::now(),
                    )
                })
            })
            .collect();

        let run = BatchRun::from_results(run_id, results);
        self.logger.info(
            "run finished",
            Some(&serde_json::json!({
                "run_id": run.run_id.to_string(),
                "succeeded": run.success_count,
                "failed": run.failure_count,
            })),
        );
        run
    }
}

use crate::managers::executor::{OperationResult, SshExecutor};
use crate::managers::keys::Credential;
use crate::managers::orchestrator::HostJob;
use crate::managers::resolver::HostSpec;
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Script-directory push. A transfer rather than a remote command, so it
/// plugs into the orchestrator as its own job instead of an OperationSpec.
pub struct ScriptSync {
    executor: Arc<SshExecutor>,
    local_dir: PathBuf,
    remote_dir: String,
    connect_timeout: Duration,
}

impl ScriptSync {
    pub fn new(
        executor: Arc<SshExecutor>,
        local_dir: PathBuf,
        remote_dir: String,
        connect_timeout: Duration,
    ) -> Self {
        Self {
            executor,
            local_dir,
            remote_dir,
            connect_timeout,
        }
    }
}

#[async_trait]
impl HostJob for ScriptSync {
    async fn run(&self, host: &HostSpec, cred: Option<&Credential>) -> OperationResult {
        self.executor
            .push_dir(
                host,
                cred,
                &self.local_dir,
                &self.remote_dir,
                self.connect_timeout,
            )
            .await
    }
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
        .find(|line| line.ends_with("file(s) uploaded"))
        .map(str::to_string)
}

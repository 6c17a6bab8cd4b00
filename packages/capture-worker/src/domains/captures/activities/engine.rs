use std::time::Duration;

use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::workspace::CaptureWorkspace;
use crate::config::CaptureConfig;
use crate::domains::captures::error::CaptureError;
use crate::kernel::{run_supervised, SupervisedOutput, TerminationPolicy};

/// Fully resolved engine command line for one capture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineInvocation {
    pub program: String,
    pub args: Vec<String>,
}

impl EngineInvocation {
    pub fn new(
        config: &CaptureConfig,
        url: &str,
        workspace: &CaptureWorkspace,
        proxy_port: u16,
    ) -> Result<Self, CaptureError> {
        let (program, prefix) = config
            .engine_command
            .split_first()
            .ok_or_else(|| CaptureError::Configuration("engine command is empty".into()))?;

        let mut args = prefix.to_vec();
        args.push(url.to_string());
        args.extend([
            "--output".to_string(),
            workspace.archive_path.to_string_lossy().into_owned(),
            "--format".to_string(),
            workspace.format.engine_name().to_string(),
            "--json-summary-output".to_string(),
            workspace.summary_path.to_string_lossy().into_owned(),
            "--export-attachments-output".to_string(),
            workspace.attachments_dir.to_string_lossy().into_owned(),
            "--proxy-port".to_string(),
            proxy_port.to_string(),
        ]);
        args.extend(config.engine_options.to_args());

        Ok(Self {
            program: program.clone(),
            args,
        })
    }

    pub fn command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command.args(&self.args);
        command
    }
}

/// Run the engine under `deadline`, stopping it through `policy` when needed.
pub async fn run_engine(
    invocation: &EngineInvocation,
    deadline: Duration,
    policy: &TerminationPolicy,
    shutdown: &CancellationToken,
) -> Result<SupervisedOutput, CaptureError> {
    info!(program = %invocation.program, ?deadline, "starting engine");

    run_supervised(invocation.command(), deadline, policy, shutdown)
        .await
        .map_err(|source| CaptureError::Spawn {
            program: invocation.program.clone(),
            source,
        })
}

//! Process runner trait

use std::time::Duration;

use async_trait::async_trait;
use tracing::info;

use crate::error::ExecError;
use crate::result::{CommandResult, CommandSpec};

/// Capability to run external commands
///
/// Implementors only provide [`run`](ProcessRunner::run) and
/// [`run_with_timeout`](ProcessRunner::run_with_timeout). Callers go through
/// [`execute`](ProcessRunner::execute) / [`execute_checked`](ProcessRunner::execute_checked),
/// which honor [`CommandSpec::dry_run`] before any implementation is reached.
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    /// Run the command to completion
    async fn run(&self, cmd: &CommandSpec) -> Result<CommandResult, ExecError>;

    /// Run the command, failing with [`ExecError::Timeout`] after `timeout`
    async fn run_with_timeout(
        &self,
        cmd: &CommandSpec,
        timeout: Duration,
    ) -> Result<CommandResult, ExecError>;

    /// Short label used in logs
    fn runner_type(&self) -> &'static str;

    /// Run the command unless it is a dry run
    async fn execute(&self, cmd: &CommandSpec) -> Result<CommandResult, ExecError> {
        if cmd.dry_run {
            info!(command = %cmd, "dry run - command not executed");
            return Ok(CommandResult::skipped());
        }
        self.run(cmd).await
    }

    /// Like [`execute`](ProcessRunner::execute), but a non-zero exit status is an error
    async fn execute_checked(&self, cmd: &CommandSpec) -> Result<CommandResult, ExecError> {
        let result = self.execute(cmd).await?;
        if !result.success() {
            return Err(ExecError::CommandFailed {
                command: cmd.to_string(),
                status: result.status,
                stderr: result.stderr.trim().to_string(),
            });
        }
        Ok(result)
    }
}

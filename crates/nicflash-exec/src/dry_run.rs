//! Runner wrapper that never spawns anything

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::info;

use crate::error::ExecError;
use crate::result::{CommandResult, CommandSpec};
use crate::traits::ProcessRunner;

/// Wraps another runner and turns every invocation into a logged no-op
///
/// Used when the daemon is started with tool invocations forced to dry-run.
pub struct DryRunRunner {
    inner: Arc<dyn ProcessRunner>,
}

impl DryRunRunner {
    /// Wrap `inner`
    pub fn new(inner: Arc<dyn ProcessRunner>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl ProcessRunner for DryRunRunner {
    async fn run(&self, cmd: &CommandSpec) -> Result<CommandResult, ExecError> {
        info!(
            command = %cmd,
            runner = self.inner.runner_type(),
            "dry run - command not executed"
        );
        Ok(CommandResult::skipped())
    }

    async fn run_with_timeout(
        &self,
        cmd: &CommandSpec,
        _timeout: Duration,
    ) -> Result<CommandResult, ExecError> {
        self.run(cmd).await
    }

    fn runner_type(&self) -> &'static str {
        "dry-run"
    }
}

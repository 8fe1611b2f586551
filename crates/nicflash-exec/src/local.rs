//! Local command execution using `tokio::process`

use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, error, instrument};

use crate::error::ExecError;
use crate::result::{CommandResult, CommandSpec};
use crate::traits::ProcessRunner;

/// Local command runner
///
/// Spawns programs directly (no shell) and captures their output. Output
/// lines are echoed at debug level as they arrive so long-running vendor
/// tools leave a trail while they work.
#[derive(Debug, Clone)]
pub struct LocalRunner;

impl LocalRunner {
    /// Create a new local runner
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Internal method to execute command
    async fn spawn(&self, cmd: &CommandSpec) -> Result<CommandResult, ExecError> {
        let start = Instant::now();

        debug!(command = %cmd, cwd = ?cmd.cwd, "executing local command");

        let mut command = Command::new(&cmd.program);
        command
            .args(&cmd.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &cmd.cwd {
            command.current_dir(dir);
        }

        let mut child = command.spawn().map_err(|e| ExecError::SpawnError {
            command: cmd.to_string(),
            message: e.to_string(),
        })?;

        let (stdout, stderr, exit) = tokio::join!(
            collect_lines(child.stdout.take(), "stdout"),
            collect_lines(child.stderr.take(), "stderr"),
            child.wait(),
        );
        let io_error = |e: std::io::Error| ExecError::IoError(e.to_string());
        let stdout = stdout.map_err(io_error)?;
        let stderr = stderr.map_err(io_error)?;
        let exit = exit.map_err(io_error)?;

        let duration = start.elapsed();
        let status = exit.code().unwrap_or(-1);

        debug!(
            command = %cmd,
            status = status,
            duration = ?duration,
            "command completed"
        );

        if !exit.success() {
            error!(
                command = %cmd,
                status = status,
                stderr = %stderr.trim(),
                "command failed"
            );
        }

        Ok(CommandResult {
            status,
            stdout,
            stderr,
            duration,
        })
    }
}

/// Read `reader` to the end, logging each line as it arrives
async fn collect_lines<R>(reader: Option<R>, stream: &'static str) -> std::io::Result<String>
where
    R: AsyncRead + Unpin,
{
    let Some(reader) = reader else {
        return Ok(String::new());
    };
    let mut segments = BufReader::new(reader).split(b'\n');
    let mut collected = String::new();
    while let Some(segment) = segments.next_segment().await? {
        let line = String::from_utf8_lossy(&segment);
        let line = line.trim_end_matches('\r');
        if !line.trim().is_empty() {
            debug!(stream, "{}", line.trim());
        }
        collected.push_str(line);
        collected.push('\n');
    }
    Ok(collected)
}

impl Default for LocalRunner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProcessRunner for LocalRunner {
    #[instrument(skip_all, fields(program = %cmd.program), level = "debug")]
    async fn run(&self, cmd: &CommandSpec) -> Result<CommandResult, ExecError> {
        self.spawn(cmd).await
    }

    #[instrument(skip_all, fields(program = %cmd.program), level = "debug")]
    async fn run_with_timeout(
        &self,
        cmd: &CommandSpec,
        timeout_duration: Duration,
    ) -> Result<CommandResult, ExecError> {
        let start = Instant::now();

        match timeout(timeout_duration, self.spawn(cmd)).await {
            Ok(result) => result,
            Err(_) => {
                error!(
                    command = %cmd,
                    timeout = ?timeout_duration,
                    elapsed = ?start.elapsed(),
                    "command timed out"
                );
                Err(ExecError::Timeout {
                    command: cmd.to_string(),
                    timeout: timeout_duration,
                })
            }
        }
    }

    fn runner_type(&self) -> &'static str {
        "local"
    }
}

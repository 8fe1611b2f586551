//! Error types for nicflash-exec

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur while running an external command
#[derive(Error, Debug, Clone)]
pub enum ExecError {
    /// Command exited with a non-zero status
    #[error("`{command}` failed with status {status}: {stderr}")]
    CommandFailed {
        /// Rendered command line
        command: String,
        /// Exit status code
        status: i32,
        /// Stderr output
        stderr: String,
    },

    /// Command timed out
    #[error("`{command}` timed out after {timeout:?}")]
    Timeout {
        /// Rendered command line
        command: String,
        /// Timeout duration that was exceeded
        timeout: Duration,
    },

    /// Process spawn error
    #[error("failed to spawn `{command}`: {message}")]
    SpawnError {
        /// Rendered command line
        command: String,
        /// Underlying OS error
        message: String,
    },

    /// I/O error while collecting output
    #[error("I/O error: {0}")]
    IoError(String),
}

impl ExecError {
    /// Check if error is retryable
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, ExecError::Timeout { .. })
    }
}

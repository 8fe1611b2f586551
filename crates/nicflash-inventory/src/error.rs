//! Error types for nicflash-inventory

use thiserror::Error;

/// Errors that can occur during inventory operations
#[derive(Error, Debug, Clone)]
pub enum InventoryError {
    /// A diagnostic tool could not be run or exited with an error
    #[error("{tool} failed: {message}")]
    ToolFailed {
        /// Tool name
        tool: String,
        /// Error details
        message: String,
    },

    /// sysfs could not be read
    #[error("sysfs error: {0}")]
    Sysfs(String),

    /// Failed to parse tool output
    #[error("parse error: {0}")]
    ParseError(String),
}

impl InventoryError {
    /// Check if error is retryable
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, InventoryError::ToolFailed { .. })
    }
}

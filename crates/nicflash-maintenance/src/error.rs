//! Error types for nicflash-maintenance

use std::time::Duration;

use thiserror::Error;

/// Errors reported by the control-plane seams
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    /// Object does not exist
    #[error("not found: {0}")]
    NotFound(String),

    /// Stale resource version or object already exists
    #[error("conflict: {0}")]
    Conflict(String),

    /// Request rejected for now (eviction blocked by a disruption budget)
    #[error("too many requests: {0}")]
    TooManyRequests(String),

    /// Anything else, including transport failures
    #[error("API request failed: {0}")]
    Other(String),
}

impl ApiError {
    /// Check if error is retryable
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        !matches!(self, ApiError::NotFound(_))
    }
}

/// A single drain attempt failed
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DrainError {
    /// Listing or evicting pods failed
    #[error(transparent)]
    Api(#[from] ApiError),

    /// Evictable pods remained on the node past the attempt deadline
    #[error("drain of node {node} timed out after {timeout:?}")]
    Timeout {
        /// Node being drained
        node: String,
        /// Per-attempt deadline
        timeout: Duration,
    },
}

/// Errors returned by [`Coordinator::run`](crate::Coordinator::run)
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MaintenanceError {
    /// Election parameters are unusable; nothing was touched
    #[error("invalid leader election config: {0}")]
    InvalidElectionConfig(String),

    /// Shutdown was requested before the window opened
    #[error("shutdown requested before the maintenance window opened")]
    Shutdown,

    /// Node could not be marked unschedulable
    #[error("failed to cordon node {node} after {attempts} attempts: {source}")]
    Cordon {
        /// Node name
        node: String,
        /// Attempts made
        attempts: u32,
        /// Last error
        source: ApiError,
    },

    /// Node could not be drained
    #[error("failed to drain node {node} after {attempts} attempts: {source}")]
    Drain {
        /// Node name
        node: String,
        /// Attempts made
        attempts: u32,
        /// Last error
        source: DrainError,
    },

    /// Node could not be made schedulable again
    #[error("failed to uncordon node {node} after {attempts} attempts: {source}")]
    Uncordon {
        /// Node name
        node: String,
        /// Attempts made
        attempts: u32,
        /// Last error
        source: ApiError,
    },
}

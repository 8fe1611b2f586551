//! Error types for nicflash-artifact

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while fetching an artifact
#[derive(Error, Debug)]
pub enum ArtifactError {
    /// Declared checksum is not a 32 character hex digest
    #[error("invalid checksum {0:?}: expected 32 hexadecimal characters")]
    InvalidChecksum(String),

    /// Downloaded content does not match the declared checksum
    #[error("checksum mismatch in downloaded file {url}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        /// Source URL
        url: String,
        /// Declared digest
        expected: String,
        /// Digest of the received content
        actual: String,
    },

    /// HTTP request failed
    #[error("unable to download {url}: {message}")]
    Download {
        /// Source URL
        url: String,
        /// Transport error or HTTP status
        message: String,
    },

    /// Local filesystem error
    #[error("I/O error on {path}: {source}")]
    Io {
        /// File involved
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },
}

impl ArtifactError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Check if error is retryable
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, ArtifactError::Download { .. })
    }
}

//! Error types for nicflash-core

use std::path::PathBuf;

use nicflash_artifact::ArtifactError;
use nicflash_exec::ExecError;
use nicflash_inventory::InventoryError;
use thiserror::Error;

/// Errors raised while staging or applying a firmware update
#[derive(Error, Debug)]
pub enum EngineError {
    /// No package URL declared
    #[error("empty firmware URL")]
    EmptyFirmwareUrl,

    /// No adapter selected
    #[error("no MAC addresses requested")]
    NoSelectors,

    /// Selected adapter is not present on this node
    #[error("MAC not found: {0}")]
    SelectorNotFound(String),

    /// Download, checksum or cache failure
    #[error(transparent)]
    Artifact(#[from] ArtifactError),

    /// Hardware enumeration failed
    #[error(transparent)]
    Inventory(#[from] InventoryError),

    /// External tool failed to run or exited non-zero
    #[error(transparent)]
    Exec(#[from] ExecError),

    /// Extracted package is unusable
    #[error("invalid staged file {path}: {reason}")]
    Staging {
        /// Offending path
        path: PathBuf,
        /// What is wrong with it
        reason: String,
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

    /// Tool result file could not be parsed
    #[error("unable to parse update result {path}: {message}")]
    Report {
        /// Result file
        path: PathBuf,
        /// Parser message
        message: String,
    },

    /// Tool reported a module that did not update
    #[error("Invalid update result: {result} for MAC: {selector} module {module} version {version}")]
    ModuleFailure {
        /// Adapter MAC as requested
        selector: String,
        /// Module type
        module: String,
        /// Module version
        version: String,
        /// Result string reported by the tool
        result: String,
    },
}

impl EngineError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether the failure happened before any hardware was touched
    #[must_use]
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            EngineError::EmptyFirmwareUrl
                | EngineError::NoSelectors
                | EngineError::SelectorNotFound(_)
                | EngineError::Artifact(_)
                | EngineError::Staging { .. }
        )
    }
}

/// Errors that can occur in the reconciler
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// Update engine failure, message kept verbatim
    #[error("{0}")]
    Engine(String),

    /// Maintenance window failure (lease, cordon, drain, uncordon)
    #[error("{0}")]
    Maintenance(String),

    /// Leadership was lost before the flash started
    #[error("leadership lost before flashing started")]
    LeadershipLost,

    /// The flash task ended without reporting back
    #[error("flash task ended without reporting a result")]
    FlashAborted,

    /// Writing the resource status failed
    #[error("status update failed: {0}")]
    Status(String),

    /// Actor communication error
    #[error("actor communication error: {0}")]
    ActorError(String),
}

impl From<EngineError> for CoreError {
    fn from(e: EngineError) -> Self {
        CoreError::Engine(e.to_string())
    }
}

//! Error types for the Kubernetes client

use nicflash_maintenance::ApiError;
use thiserror::Error;

/// Errors that can occur when talking to the API server
#[derive(Error, Debug)]
pub enum KubeError {
    /// Request failed or the API server returned an error status
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    /// Neither in-cluster nor kubeconfig configuration was usable
    #[error("unable to infer client configuration: {0}")]
    Infer(#[from] kube::config::InferConfigError),

    /// Client or request could not be configured
    #[error("invalid client configuration: {0}")]
    Config(String),
}

impl KubeError {
    /// HTTP status returned by the API server, if any
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            KubeError::Kube(kube::Error::Api(response)) => Some(response.code),
            _ => None,
        }
    }
}

impl From<KubeError> for ApiError {
    fn from(err: KubeError) -> Self {
        let message = err.to_string();
        match err.status() {
            Some(404) => ApiError::NotFound(message),
            Some(409) => ApiError::Conflict(message),
            Some(429) => ApiError::TooManyRequests(message),
            _ => ApiError::Other(message),
        }
    }
}

/// Map a `kube` failure onto the maintenance seam's error
pub(crate) fn api_error(err: kube::Error) -> ApiError {
    KubeError::from(err).into()
}

/// Result type for client operations
pub type Result<T> = std::result::Result<T, KubeError>;

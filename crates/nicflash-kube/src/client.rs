//! Connection to the API server

use kube::{Client, Config};
use tracing::info;

use crate::error::{KubeError, Result};

/// Client for the Kubernetes API server
#[derive(Clone)]
pub struct KubeClient {
    client: Client,
}

impl KubeClient {
    /// Wrap an existing `kube::Client`
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Client configured from the environment
    ///
    /// Uses the pod's service account inside a cluster and the local
    /// kubeconfig outside one. `api_server` replaces the inferred URL.
    ///
    /// # Errors
    /// Returns an error if no configuration can be found or `api_server` is
    /// not a valid URL.
    pub async fn infer(api_server: Option<&str>) -> Result<Self> {
        let mut config = Config::infer().await?;
        if let Some(url) = api_server {
            config.cluster_url = url
                .parse()
                .map_err(|e| KubeError::Config(format!("invalid API server URL {url}: {e}")))?;
        }
        info!(cluster_url = %config.cluster_url, "Kubernetes client configured");
        Ok(Self::new(Client::try_from(config)?))
    }

    /// Unauthenticated client for `url` (e.g. `kubectl proxy`)
    ///
    /// # Errors
    /// Returns an error if `url` is not a valid URL.
    pub fn from_url(url: &str) -> Result<Self> {
        let cluster_url = url
            .parse()
            .map_err(|e| KubeError::Config(format!("invalid API server URL {url}: {e}")))?;
        Ok(Self::new(Client::try_from(Config::new(cluster_url))?))
    }

    pub(crate) fn client(&self) -> Client {
        self.client.clone()
    }
}

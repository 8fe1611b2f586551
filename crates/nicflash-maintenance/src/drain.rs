//! Pod eviction

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, instrument};

use crate::error::{ApiError, DrainError};
use crate::node::NodeApi;

/// Evicts every unprotected pod from a node
pub struct Drainer {
    api: Arc<dyn NodeApi>,
    timeout: Duration,
    poll_interval: Duration,
}

impl Drainer {
    /// Deadline of a single drain attempt
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(90);

    /// Create a drainer with the default deadline and a 2 s poll interval
    pub fn new(api: Arc<dyn NodeApi>) -> Self {
        Self {
            api,
            timeout: Self::DEFAULT_TIMEOUT,
            poll_interval: Duration::from_secs(2),
        }
    }

    /// Set the per-attempt deadline
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set how often the node is re-listed while waiting for pods to go
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// One drain attempt
    ///
    /// # Errors
    /// Returns [`DrainError::Timeout`] if evictable pods are still present when
    /// the deadline passes, or [`DrainError::Api`] on a non-retryable API error.
    #[instrument(skip(self))]
    pub async fn drain(&self, node: &str) -> Result<(), DrainError> {
        match tokio::time::timeout(self.timeout, self.evict_all(node)).await {
            Ok(result) => result,
            Err(_) => Err(DrainError::Timeout {
                node: node.to_string(),
                timeout: self.timeout,
            }),
        }
    }

    async fn evict_all(&self, node: &str) -> Result<(), DrainError> {
        let mut requested: HashSet<(String, String)> = HashSet::new();

        loop {
            let pending: Vec<_> = self
                .api
                .list_pods(node)
                .await?
                .into_iter()
                .filter(|p| p.is_evictable())
                .collect();

            if pending.is_empty() {
                info!(node, evicted = requested.len(), "node drained");
                return Ok(());
            }

            for pod in pending {
                let key = (pod.namespace, pod.name);
                if requested.contains(&key) {
                    continue;
                }
                match self.api.evict_pod(&key.0, &key.1).await {
                    Ok(()) | Err(ApiError::NotFound(_)) => {
                        info!(namespace = %key.0, pod = %key.1, "evicting pod");
                        requested.insert(key);
                    }
                    Err(ApiError::TooManyRequests(reason)) => {
                        debug!(namespace = %key.0, pod = %key.1, %reason, "eviction blocked, will retry");
                    }
                    Err(e) => return Err(e.into()),
                }
            }

            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

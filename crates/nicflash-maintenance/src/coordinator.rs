//! Maintenance window: lease, cordon, drain, work, uncordon, release

use std::future::Future;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::watch;
use tracing::{error, info, instrument, warn};

use crate::backoff::Backoff;
use crate::cancel::{CancelHandle, CancelSignal};
use crate::drain::Drainer;
use crate::error::{ApiError, DrainError, MaintenanceError};
use crate::lease::{ElectionConfig, LeaderElector, LeaseApi};
use crate::node::NodeApi;

/// Where the coordinator currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowState {
    /// Not holding the lease
    NotLeading,
    /// Marking the node unschedulable
    Cordoning,
    /// Evicting pods
    Draining,
    /// Running the caller's work
    Running,
    /// Making the node schedulable again
    Uncordoning,
}

/// Failure of one cordon-and-drain attempt
#[derive(Error, Debug)]
enum PrepareError {
    #[error("cordon: {0}")]
    Cordon(ApiError),
    #[error("drain: {0}")]
    Drain(DrainError),
}

/// Runs work inside a cluster-wide exclusive maintenance window
pub struct Coordinator {
    elector: Arc<LeaderElector>,
    nodes: Arc<dyn NodeApi>,
    drainer: Drainer,
    node_name: String,
    backoff: Backoff,
    shutdown: CancelSignal,
    state: watch::Sender<WindowState>,
}

impl Coordinator {
    /// Create a coordinator for `node_name`
    pub fn new(
        leases: Arc<dyn LeaseApi>,
        nodes: Arc<dyn NodeApi>,
        election: ElectionConfig,
        node_name: impl Into<String>,
    ) -> Self {
        let (state, _) = watch::channel(WindowState::NotLeading);
        Self {
            elector: Arc::new(LeaderElector::new(leases, election)),
            drainer: Drainer::new(Arc::clone(&nodes)),
            nodes,
            node_name: node_name.into(),
            backoff: Backoff::default(),
            shutdown: CancelSignal::never(),
            state,
        }
    }

    /// Override the retry schedule for cordon, drain and uncordon
    #[must_use]
    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Replace the drainer (e.g. to change its deadline)
    #[must_use]
    pub fn with_drainer(mut self, drainer: Drainer) -> Self {
        self.drainer = drainer;
        self
    }

    /// Stop campaigning once `shutdown` fires
    ///
    /// An open window is still completed.
    #[must_use]
    pub fn with_shutdown(mut self, shutdown: CancelSignal) -> Self {
        self.shutdown = shutdown;
        self
    }

    /// Node this coordinator acts on
    #[must_use]
    pub fn node_name(&self) -> &str {
        &self.node_name
    }

    /// Current window state
    #[must_use]
    pub fn state(&self) -> WindowState {
        *self.state.borrow()
    }

    /// Watch window state transitions
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<WindowState> {
        self.state.subscribe()
    }

    /// Run `work` while holding the lease
    ///
    /// With `requires_drain` the node is cordoned and drained first and
    /// uncordoned afterwards, whatever happened in between. `work` is skipped
    /// if cordon or drain gave up. Its boolean result is only logged. The
    /// [`CancelSignal`] it receives fires if leadership is lost; the work is
    /// never interrupted.
    ///
    /// # Errors
    /// - [`MaintenanceError::InvalidElectionConfig`] before anything is touched
    /// - [`MaintenanceError::Shutdown`] if shutdown fired before leadership
    ///   was taken; nothing was touched
    /// - [`MaintenanceError::Cordon`] / [`MaintenanceError::Drain`] when retries
    ///   are exhausted
    /// - [`MaintenanceError::Uncordon`], which takes precedence over a drain error
    #[instrument(skip(self, work), fields(node = %self.node_name))]
    pub async fn run<F, Fut>(&self, work: F, requires_drain: bool) -> Result<(), MaintenanceError>
    where
        F: FnOnce(CancelSignal) -> Fut + Send,
        Fut: Future<Output = bool> + Send + 'static,
    {
        self.elector.config().validate()?;

        if !self.elector.acquire(&self.shutdown).await {
            return Err(MaintenanceError::Shutdown);
        }
        if self.shutdown.is_cancelled() {
            self.elector.release().await;
            info!("shutdown requested while acquiring, lease released");
            return Err(MaintenanceError::Shutdown);
        }

        let lost = CancelHandle::new();
        let renewal = self.elector.spawn_renewal(lost.clone());

        let result = self.window(work, lost.signal(), requires_drain).await;

        renewal.stop().await;
        self.elector.release().await;
        self.set_state(WindowState::NotLeading);
        info!("stopped leading");

        if let Err(e) = &result {
            error!(error = %e, "error during (un)cordon or drain actions");
        }
        result
    }

    async fn window<F, Fut>(
        &self,
        work: F,
        cancel: CancelSignal,
        requires_drain: bool,
    ) -> Result<(), MaintenanceError>
    where
        F: FnOnce(CancelSignal) -> Fut + Send,
        Fut: Future<Output = bool> + Send + 'static,
    {
        let mut failure = None;

        if requires_drain {
            info!("cordoning & draining node");
            if let Err(e) = self.cordon_and_drain().await {
                failure = Some(e);
            }
        } else {
            info!("drain skipped");
        }

        if failure.is_none() {
            self.set_state(WindowState::Running);
            info!("maintenance work started");
            match tokio::spawn(work(cancel)).await {
                Ok(true) => info!("maintenance work finished"),
                Ok(false) => warn!("maintenance work finished incomplete"),
                Err(e) => error!(error = %e, "maintenance work aborted"),
            }
        }

        if requires_drain {
            self.set_state(WindowState::Uncordoning);
            if let Err(e) = self.uncordon().await
                && let Some(previous) = failure.replace(e)
            {
                warn!(error = %previous, "superseded by uncordon failure");
            }
        }

        failure.map_or(Ok(()), Err)
    }

    async fn cordon_and_drain(&self) -> Result<(), MaintenanceError> {
        let node = self.node_name.as_str();

        let outcome = self
            .backoff
            .retry("cordon and drain", || async move {
                self.set_state(WindowState::Cordoning);
                self.nodes
                    .set_unschedulable(node, true)
                    .await
                    .map_err(PrepareError::Cordon)?;

                self.set_state(WindowState::Draining);
                self.drainer.drain(node).await.map_err(PrepareError::Drain)
            })
            .await;

        match outcome {
            Ok(()) => Ok(()),
            Err(exhausted) => Err(match exhausted.last {
                PrepareError::Cordon(source) => MaintenanceError::Cordon {
                    node: node.to_string(),
                    attempts: exhausted.attempts,
                    source,
                },
                PrepareError::Drain(source) => MaintenanceError::Drain {
                    node: node.to_string(),
                    attempts: exhausted.attempts,
                    source,
                },
            }),
        }
    }

    async fn uncordon(&self) -> Result<(), MaintenanceError> {
        let node = self.node_name.as_str();
        info!("uncordoning node");

        self.backoff
            .retry("uncordon", || async move {
                self.nodes.set_unschedulable(node, false).await
            })
            .await
            .map_err(|exhausted| MaintenanceError::Uncordon {
                node: node.to_string(),
                attempts: exhausted.attempts,
                source: exhausted.last,
            })
    }

    fn set_state(&self, state: WindowState) {
        self.state.send_replace(state);
    }
}

//! Lease-based leader election

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, instrument, warn};

use crate::cancel::{CancelHandle, CancelSignal};
use crate::error::{ApiError, MaintenanceError};

/// Shared lease contents
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LeaseRecord {
    /// Current holder; empty when free
    pub holder_identity: String,
    /// Validity of a renewal
    pub lease_duration_seconds: i32,
    /// When the current holder took the lease
    pub acquire_time: Option<DateTime<Utc>>,
    /// Last renewal
    pub renew_time: Option<DateTime<Utc>>,
    /// Number of holder changes
    pub lease_transitions: i32,
    /// Optimistic concurrency token; `None` before creation
    pub resource_version: Option<String>,
}

impl LeaseRecord {
    fn lease_duration(&self) -> Duration {
        Duration::from_secs(u64::try_from(self.lease_duration_seconds).unwrap_or_default())
    }
}

/// Last lease contents seen and the local time they were first seen
///
/// Expiry is judged against this local clock, never against the remote
/// `renew_time`, so clock skew between nodes cannot shorten a lease.
#[derive(Debug)]
struct Observed {
    record: LeaseRecord,
    at: Instant,
}

/// Storage of the shared lease
#[async_trait]
pub trait LeaseApi: Send + Sync {
    /// Current lease, `None` if it does not exist
    async fn get_lease(&self, namespace: &str, name: &str)
    -> Result<Option<LeaseRecord>, ApiError>;

    /// Create the lease; [`ApiError::Conflict`] if it already exists
    async fn create_lease(
        &self,
        namespace: &str,
        name: &str,
        record: &LeaseRecord,
    ) -> Result<LeaseRecord, ApiError>;

    /// Replace the lease; [`ApiError::Conflict`] if `record.resource_version` is stale
    async fn update_lease(
        &self,
        namespace: &str,
        name: &str,
        record: &LeaseRecord,
    ) -> Result<LeaseRecord, ApiError>;
}

/// Leader election parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElectionConfig {
    /// Lease object name
    pub lease_name: String,
    /// Namespace holding the lease
    pub namespace: String,
    /// This process's identity (the node name)
    pub identity: String,
    /// How long a renewal stays valid
    pub lease_duration: Duration,
    /// Leadership is lost without a successful renewal for this long
    pub renew_deadline: Duration,
    /// Interval between acquire and renew attempts
    pub retry_period: Duration,
}

impl ElectionConfig {
    /// Lease shared by all daemons of a deployment
    pub const DEFAULT_LEASE_NAME: &'static str = "nicflash-daemon-lease";
    /// Environment variable overriding [`lease_duration`](Self::lease_duration)
    pub const LEASE_DURATION_ENV: &'static str = "LEASE_DURATION_SECONDS";

    /// Defaults: 60 s lease, 15 s renew deadline, 5 s retry period
    pub fn new(namespace: impl Into<String>, identity: impl Into<String>) -> Self {
        Self {
            lease_name: Self::DEFAULT_LEASE_NAME.to_string(),
            namespace: namespace.into(),
            identity: identity.into(),
            lease_duration: Duration::from_secs(60),
            renew_deadline: Duration::from_secs(15),
            retry_period: Duration::from_secs(5),
        }
    }

    /// Apply `LEASE_DURATION_SECONDS` if set
    #[must_use]
    pub fn with_env_override(self) -> Self {
        match std::env::var(Self::LEASE_DURATION_ENV) {
            Ok(raw) => self.with_lease_duration_override(&raw),
            Err(_) => self,
        }
    }

    /// Apply a lease duration given in seconds as text
    ///
    /// Unparseable or zero values are logged and ignored.
    #[must_use]
    pub fn with_lease_duration_override(mut self, raw: &str) -> Self {
        match raw.trim().parse::<u64>() {
            Ok(secs) if secs > 0 => {
                info!(seconds = secs, "lease duration overridden");
                self.lease_duration = Duration::from_secs(secs);
            }
            _ => {
                warn!(
                    value = raw,
                    default = self.lease_duration.as_secs(),
                    "invalid {}, using default",
                    Self::LEASE_DURATION_ENV
                );
            }
        }
        self
    }

    /// Check the parameters before campaigning
    ///
    /// # Errors
    /// Returns [`MaintenanceError::InvalidElectionConfig`] unless the identity
    /// and lease name are set and `lease_duration > renew_deadline > retry_period`.
    pub fn validate(&self) -> Result<(), MaintenanceError> {
        let invalid = |msg: &str| Err(MaintenanceError::InvalidElectionConfig(msg.to_string()));

        if self.identity.trim().is_empty() {
            return invalid("identity must not be empty");
        }
        if self.lease_name.trim().is_empty() {
            return invalid("lease name must not be empty");
        }
        if self.lease_duration <= self.renew_deadline {
            return invalid("lease duration must be greater than renew deadline");
        }
        if self.renew_deadline <= self.retry_period {
            return invalid("renew deadline must be greater than retry period");
        }
        if self.retry_period.is_zero() {
            return invalid("retry period must be positive");
        }
        Ok(())
    }

    fn lease_duration_seconds(&self) -> i32 {
        i32::try_from(self.lease_duration.as_secs()).unwrap_or(i32::MAX)
    }
}

/// Campaigns for, renews and releases the shared lease
pub struct LeaderElector {
    api: Arc<dyn LeaseApi>,
    config: ElectionConfig,
    observed: Mutex<Option<Observed>>,
}

impl LeaderElector {
    /// Create an elector
    pub fn new(api: Arc<dyn LeaseApi>, config: ElectionConfig) -> Self {
        Self {
            api,
            config,
            observed: Mutex::new(None),
        }
    }

    /// Remember `record`, restarting the local clock when it changed
    fn observe(&self, record: &LeaseRecord) -> Instant {
        let mut observed = self
            .observed
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        match observed.as_ref() {
            Some(seen) if seen.record == *record => seen.at,
            _ => {
                let at = Instant::now();
                *observed = Some(Observed {
                    record: record.clone(),
                    at,
                });
                at
            }
        }
    }

    /// Election parameters
    #[must_use]
    pub fn config(&self) -> &ElectionConfig {
        &self.config
    }

    /// One acquire-or-renew round
    ///
    /// Returns `Ok(true)` while this identity holds the lease and `Ok(false)`
    /// if another live holder has it or a concurrent writer won the race.
    ///
    /// # Errors
    /// Propagates API errors other than conflicts.
    pub async fn try_acquire_or_renew(&self) -> Result<bool, ApiError> {
        let cfg = &self.config;
        let now = Utc::now();

        let Some(current) = self.api.get_lease(&cfg.namespace, &cfg.lease_name).await? else {
            let record = LeaseRecord {
                holder_identity: cfg.identity.clone(),
                lease_duration_seconds: cfg.lease_duration_seconds(),
                acquire_time: Some(now),
                renew_time: Some(now),
                lease_transitions: 0,
                resource_version: None,
            };
            return match self
                .api
                .create_lease(&cfg.namespace, &cfg.lease_name, &record)
                .await
            {
                Ok(_) => {
                    info!(lease = %cfg.lease_name, "lease created");
                    Ok(true)
                }
                Err(ApiError::Conflict(_)) => Ok(false),
                Err(e) => Err(e),
            };
        };

        let observed_at = self.observe(&current);
        let held_by_self = current.holder_identity == cfg.identity;
        if !held_by_self
            && !current.holder_identity.is_empty()
            && observed_at.elapsed() <= current.lease_duration()
        {
            debug!(holder = %current.holder_identity, "lease held by another node");
            return Ok(false);
        }

        let mut next = current.clone();
        if !held_by_self {
            next.acquire_time = Some(now);
            next.lease_transitions = current.lease_transitions.saturating_add(1);
        }
        next.holder_identity = cfg.identity.clone();
        next.lease_duration_seconds = cfg.lease_duration_seconds();
        next.renew_time = Some(now);

        match self
            .api
            .update_lease(&cfg.namespace, &cfg.lease_name, &next)
            .await
        {
            Ok(stored) => {
                self.observe(&stored);
                if !held_by_self {
                    info!(previous = %current.holder_identity, "lease acquired");
                }
                Ok(true)
            }
            Err(ApiError::Conflict(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Campaign until this identity holds the lease or `stop` fires
    ///
    /// Returns `true` once leading, `false` if stopped first.
    #[instrument(skip(self, stop), fields(identity = %self.config.identity))]
    pub async fn acquire(&self, stop: &CancelSignal) -> bool {
        info!(lease = %self.config.lease_name, "attempting to acquire leader lease");
        loop {
            if stop.is_cancelled() {
                info!("campaign stopped");
                return false;
            }
            match self.try_acquire_or_renew().await {
                Ok(true) => {
                    info!("started leading");
                    return true;
                }
                Ok(false) => {}
                Err(e) => warn!(error = %e, "error acquiring lease - retrying"),
            }
            tokio::select! {
                () = stop.cancelled() => {}
                () = tokio::time::sleep(self.config.retry_period) => {}
            }
        }
    }

    /// Keep renewing in the background
    ///
    /// `lost` is cancelled if no renewal succeeds within the renew deadline;
    /// the task then exits.
    pub fn spawn_renewal(self: &Arc<Self>, lost: CancelHandle) -> RenewalTask {
        let (stop_tx, stop_rx) = oneshot::channel();
        let elector = Arc::clone(self);
        let handle = tokio::spawn(async move { elector.renew_loop(lost, stop_rx).await });
        RenewalTask {
            stop: Some(stop_tx),
            handle,
        }
    }

    async fn renew_loop(&self, lost: CancelHandle, mut stop: oneshot::Receiver<()>) {
        let cfg = &self.config;
        let mut last_renewal = Instant::now();

        loop {
            tokio::select! {
                _ = &mut stop => return,
                () = tokio::time::sleep(cfg.retry_period) => {}
            }

            match tokio::time::timeout(cfg.renew_deadline, self.try_acquire_or_renew()).await {
                Ok(Ok(true)) => last_renewal = Instant::now(),
                Ok(Ok(false)) => warn!("lease taken over by another holder"),
                Ok(Err(e)) => warn!(error = %e, "failed to renew lease"),
                Err(_) => warn!("lease renewal timed out"),
            }

            if last_renewal.elapsed() >= cfg.renew_deadline {
                error!(
                    deadline = ?cfg.renew_deadline,
                    "leadership lost: no successful renewal within deadline"
                );
                lost.cancel();
                return;
            }
        }
    }

    /// Clear the holder so another node can take over without waiting
    ///
    /// Failures are only logged; the lease then expires on its own.
    #[instrument(skip(self), fields(identity = %self.config.identity))]
    pub async fn release(&self) {
        let cfg = &self.config;
        info!("releasing the lease");

        let mut record = match self.api.get_lease(&cfg.namespace, &cfg.lease_name).await {
            Ok(Some(record)) => record,
            Ok(None) => {
                warn!("lease disappeared before release");
                return;
            }
            Err(e) => {
                error!(error = %e, "failed to get the lease record");
                return;
            }
        };

        if record.holder_identity != cfg.identity {
            warn!(holder = %record.holder_identity, "lease no longer held, leaving it alone");
            return;
        }

        record.holder_identity.clear();
        if let Err(e) = self
            .api
            .update_lease(&cfg.namespace, &cfg.lease_name, &record)
            .await
        {
            error!(error = %e, "failed to update the lease record");
        }
    }
}

/// Handle to the background renewal task
///
/// Dropping the handle aborts the task.
pub struct RenewalTask {
    stop: Option<oneshot::Sender<()>>,
    handle: JoinHandle<()>,
}

impl Drop for RenewalTask {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

impl RenewalTask {
    /// Stop renewing and wait for the task to exit
    pub async fn stop(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Err(e) = (&mut self.handle).await {
            warn!(error = %e, "renewal task ended abnormally");
        }
    }
}

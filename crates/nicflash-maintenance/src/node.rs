//! Node scheduling and pod eviction seam

use async_trait::async_trait;

use crate::error::ApiError;

/// What drain needs to know about a pod
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PodInfo {
    /// Namespace
    pub namespace: String,
    /// Name
    pub name: String,
    /// `status.phase`
    pub phase: String,
    /// Kind of the controlling owner, if any
    pub controller_kind: Option<String>,
    /// Static pod mirrored by the kubelet
    pub mirror: bool,
}

impl PodInfo {
    /// Mirror and DaemonSet pods are left in place
    #[must_use]
    pub fn is_protected(&self) -> bool {
        self.mirror || self.controller_kind.as_deref() == Some("DaemonSet")
    }

    /// Pod has terminated
    #[must_use]
    pub fn is_finished(&self) -> bool {
        matches!(self.phase.as_str(), "Succeeded" | "Failed")
    }

    /// Pod has to leave the node before maintenance
    #[must_use]
    pub fn is_evictable(&self) -> bool {
        !self.is_protected() && !self.is_finished()
    }
}

/// Node operations used by the maintenance window
#[async_trait]
pub trait NodeApi: Send + Sync {
    /// Set `spec.unschedulable` on the node
    async fn set_unschedulable(&self, node: &str, unschedulable: bool) -> Result<(), ApiError>;

    /// Pods bound to the node
    async fn list_pods(&self, node: &str) -> Result<Vec<PodInfo>, ApiError>;

    /// Request eviction of one pod
    ///
    /// Returns [`ApiError::TooManyRequests`] when a disruption budget blocks it.
    async fn evict_pod(&self, namespace: &str, name: &str) -> Result<(), ApiError>;
}

//! In-process control plane for tests
//!
//! Both fakes keep their state behind a `Mutex` and can be told to fail, so
//! every error path of the coordinator can be driven without a cluster.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;

use crate::error::ApiError;
use crate::lease::{LeaseApi, LeaseRecord};
use crate::node::{NodeApi, PodInfo};

/// Lease storage with resource-version checks
#[derive(Debug, Default)]
pub struct InMemoryLeaseStore {
    leases: Mutex<HashMap<(String, String), LeaseRecord>>,
    version: AtomicUsize,
    failing_requests: AtomicUsize,
}

impl InMemoryLeaseStore {
    /// Empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current lease contents
    pub fn lease(&self, namespace: &str, name: &str) -> Option<LeaseRecord> {
        lock(&self.leases)
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    /// Store a lease directly, assigning a fresh resource version
    pub fn insert(&self, namespace: &str, name: &str, mut record: LeaseRecord) {
        record.resource_version = Some(self.next_version());
        lock(&self.leases)
            .insert((namespace.to_string(), name.to_string()), record);
    }

    /// Fail the next `n` requests with [`ApiError::Other`]
    pub fn fail_next_requests(&self, n: usize) {
        self.failing_requests.store(n, Ordering::SeqCst);
    }

    fn next_version(&self) -> String {
        (self.version.fetch_add(1, Ordering::SeqCst) + 1).to_string()
    }

    fn check_failure(&self) -> Result<(), ApiError> {
        let failing = self
            .failing_requests
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        match failing {
            Ok(_) => Err(ApiError::Other("injected failure".to_string())),
            Err(_) => Ok(()),
        }
    }
}

#[async_trait]
impl LeaseApi for InMemoryLeaseStore {
    async fn get_lease(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<LeaseRecord>, ApiError> {
        self.check_failure()?;
        Ok(self.lease(namespace, name))
    }

    async fn create_lease(
        &self,
        namespace: &str,
        name: &str,
        record: &LeaseRecord,
    ) -> Result<LeaseRecord, ApiError> {
        self.check_failure()?;
        let key = (namespace.to_string(), name.to_string());
        let mut leases = lock(&self.leases);
        if leases.contains_key(&key) {
            return Err(ApiError::Conflict(format!("lease {name} already exists")));
        }
        let mut stored = record.clone();
        stored.resource_version = Some(self.next_version());
        leases.insert(key, stored.clone());
        Ok(stored)
    }

    async fn update_lease(
        &self,
        namespace: &str,
        name: &str,
        record: &LeaseRecord,
    ) -> Result<LeaseRecord, ApiError> {
        self.check_failure()?;
        let key = (namespace.to_string(), name.to_string());
        let mut leases = lock(&self.leases);
        let Some(current) = leases.get(&key) else {
            return Err(ApiError::NotFound(format!("lease {name}")));
        };
        if current.resource_version != record.resource_version {
            return Err(ApiError::Conflict(format!("lease {name} was modified")));
        }
        let mut stored = record.clone();
        stored.resource_version = Some(self.next_version());
        leases.insert(key, stored.clone());
        Ok(stored)
    }
}

/// Recorded [`NodeApi`] call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeCall {
    /// `set_unschedulable(node, value)`
    SetUnschedulable {
        /// Node name
        node: String,
        /// Requested value
        unschedulable: bool,
    },
    /// `list_pods(node)`
    ListPods {
        /// Node name
        node: String,
    },
    /// `evict_pod(namespace, name)`
    Evict {
        /// Pod namespace
        namespace: String,
        /// Pod name
        name: String,
    },
}

/// Nodes and pods with a call log and failure switches
#[derive(Debug, Default)]
pub struct InMemoryNodeApi {
    unschedulable: Mutex<HashMap<String, bool>>,
    pods: Mutex<HashMap<String, Vec<PodInfo>>>,
    calls: Mutex<Vec<NodeCall>>,
    fail_cordon: AtomicBool,
    fail_uncordon: AtomicBool,
    fail_list_pods: AtomicBool,
    pods_ignore_eviction: AtomicBool,
}

impl InMemoryNodeApi {
    /// No nodes, no pods
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a pod to a node
    pub fn add_pod(&self, node: &str, pod: PodInfo) {
        lock(&self.pods).entry(node.to_string()).or_default().push(pod);
    }

    /// Whether the node is currently cordoned
    pub fn is_unschedulable(&self, node: &str) -> bool {
        lock(&self.unschedulable).get(node).copied().unwrap_or(false)
    }

    /// Calls made so far, in order
    pub fn calls(&self) -> Vec<NodeCall> {
        lock(&self.calls).clone()
    }

    /// Number of `set_unschedulable` calls with the given value
    pub fn count_set_unschedulable(&self, value: bool) -> usize {
        lock(&self.calls)
            .iter()
            .filter(|c| {
                matches!(c, NodeCall::SetUnschedulable { unschedulable, .. } if *unschedulable == value)
            })
            .count()
    }

    /// Make cordon requests fail
    pub fn set_fail_cordon(&self, fail: bool) {
        self.fail_cordon.store(fail, Ordering::SeqCst);
    }

    /// Make uncordon requests fail
    pub fn set_fail_uncordon(&self, fail: bool) {
        self.fail_uncordon.store(fail, Ordering::SeqCst);
    }

    /// Make pod listing fail
    pub fn set_fail_list_pods(&self, fail: bool) {
        self.fail_list_pods.store(fail, Ordering::SeqCst);
    }

    /// Accept evictions without removing the pods
    pub fn set_pods_ignore_eviction(&self, ignore: bool) {
        self.pods_ignore_eviction.store(ignore, Ordering::SeqCst);
    }

    fn record(&self, call: NodeCall) {
        lock(&self.calls).push(call);
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

#[async_trait]
impl NodeApi for InMemoryNodeApi {
    async fn set_unschedulable(&self, node: &str, unschedulable: bool) -> Result<(), ApiError> {
        self.record(NodeCall::SetUnschedulable {
            node: node.to_string(),
            unschedulable,
        });
        let failing = if unschedulable {
            &self.fail_cordon
        } else {
            &self.fail_uncordon
        };
        if failing.load(Ordering::SeqCst) {
            return Err(ApiError::Other("injected failure".to_string()));
        }
        lock(&self.unschedulable).insert(node.to_string(), unschedulable);
        Ok(())
    }

    async fn list_pods(&self, node: &str) -> Result<Vec<PodInfo>, ApiError> {
        self.record(NodeCall::ListPods {
            node: node.to_string(),
        });
        if self.fail_list_pods.load(Ordering::SeqCst) {
            return Err(ApiError::Other("injected failure".to_string()));
        }
        Ok(lock(&self.pods).get(node).cloned().unwrap_or_default())
    }

    async fn evict_pod(&self, namespace: &str, name: &str) -> Result<(), ApiError> {
        self.record(NodeCall::Evict {
            namespace: namespace.to_string(),
            name: name.to_string(),
        });
        if self.pods_ignore_eviction.load(Ordering::SeqCst) {
            return Ok(());
        }
        let mut pods = lock(&self.pods);
        let mut found = false;
        for node_pods in pods.values_mut() {
            let before = node_pods.len();
            node_pods.retain(|p| !(p.namespace == namespace && p.name == name));
            found |= node_pods.len() != before;
        }
        if found {
            Ok(())
        } else {
            Err(ApiError::NotFound(format!("pod {namespace}/{name}")))
        }
    }
}

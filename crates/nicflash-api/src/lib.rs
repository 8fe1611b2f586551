//! nicflash-api: Shared resource types
//!
//! The `FirmwareNode` custom resource and its status conditions, shared by
//! the reconciler, the Kubernetes client and the daemon, plus the
//! `FirmwareCluster` resource that is split into per-node resources.

pub mod cluster;
pub mod condition;
pub mod resource;

pub use cluster::{
    ClusterNodeSpec, FirmwareCluster, FirmwareClusterSpec, FirmwareClusterStatus, SyncStatus,
    stale_node_names,
};
pub use condition::{
    Condition, ConditionStatus, FLASH_CONDITION, FlashReason, find_condition, set_condition,
};
pub use kube::ResourceExt;
pub use resource::{
    FirmwareNode, FirmwareNodeSpec, FirmwareNodeStatus, HssiCardStatus, HssiSpec, NicStatus,
};

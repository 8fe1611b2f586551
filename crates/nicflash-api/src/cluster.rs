//! The `FirmwareCluster` custom resource
//!
//! One cluster-wide object listing the nodes to update. It is split into a
//! `FirmwareNode` per listed node that exists in the cluster.

use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::resource::{FirmwareNode, FirmwareNodeSpec, HssiSpec};

/// Desired firmware across the cluster
#[derive(CustomResource, Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "nicflash.io",
    version = "v1",
    kind = "FirmwareCluster",
    namespaced,
    status = "FirmwareClusterStatus",
    derive = "PartialEq",
    derive = "Default"
)]
#[serde(rename_all = "camelCase")]
pub struct FirmwareClusterSpec {
    /// Nodes and the adapters to update on each
    #[serde(default)]
    pub nodes: Vec<ClusterNodeSpec>,
    /// Applied to every node resource
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub dry_run: bool,
    /// Applied to every node resource
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub drain_skip: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClusterNodeSpec {
    pub node_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hssi: Option<HssiSpec>,
}

/// Outcome of the last split
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum SyncStatus {
    InProgress,
    Succeeded,
    Failed,
    /// Not the resource this controller honours
    Ignored,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FirmwareClusterStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sync_status: Option<SyncStatus>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub last_sync_error: String,
}

impl FirmwareCluster {
    /// Only a cluster resource with this name is split
    pub const DEFAULT_NAME: &'static str = "nicflash";
    /// Label marking nodes that carry an accelerator card
    pub const NODE_LABEL: &'static str = "nicflash.io/network-accelerator";

    /// Node resources for every listed node present in `cluster_nodes`
    ///
    /// Listed nodes the cluster does not know are dropped; spec order is kept.
    #[must_use]
    pub fn split(&self, cluster_nodes: &[String], namespace: &str) -> Vec<FirmwareNode> {
        self.spec
            .nodes
            .iter()
            .filter(|n| cluster_nodes.iter().any(|name| *name == n.node_name))
            .map(|n| {
                let mut node = FirmwareNode::for_node(&n.node_name, namespace);
                node.spec = FirmwareNodeSpec {
                    hssi: n.hssi.clone(),
                    dry_run: self.spec.dry_run,
                    drain_skip: self.spec.drain_skip,
                };
                node
            })
            .collect()
    }
}

/// Names of `existing` resources that have no counterpart in `desired`
#[must_use]
pub fn stale_node_names(existing: &[FirmwareNode], desired: &[FirmwareNode]) -> Vec<String> {
    existing
        .iter()
        .map(ResourceExt::name_any)
        .filter(|name| !desired.iter().any(|d| d.name_any() == *name))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hssi(url: &str) -> Option<HssiSpec> {
        Some(HssiSpec {
            firmware_url: url.to_string(),
            checksum: String::new(),
            macs: vec!["64:4c:36:11:1b:a8".to_string()],
        })
    }

    fn cluster() -> FirmwareCluster {
        FirmwareCluster::new(
            FirmwareCluster::DEFAULT_NAME,
            FirmwareClusterSpec {
                nodes: vec![
                    ClusterNodeSpec {
                        node_name: "worker-2".to_string(),
                        hssi: hssi("http://files/b.tar.gz"),
                    },
                    ClusterNodeSpec {
                        node_name: "worker-9".to_string(),
                        hssi: hssi("http://files/c.tar.gz"),
                    },
                    ClusterNodeSpec {
                        node_name: "worker-1".to_string(),
                        hssi: hssi("http://files/a.tar.gz"),
                    },
                ],
                dry_run: true,
                drain_skip: false,
            },
        )
    }

    #[test]
    fn test_split_keeps_known_nodes_in_spec_order() {
        let known = vec!["worker-1".to_string(), "worker-2".to_string()];

        let nodes = cluster().split(&known, "nicflash");

        let names: Vec<String> = nodes.iter().map(ResourceExt::name_any).collect();
        assert_eq!(names, vec!["worker-2", "worker-1"]);
        assert_eq!(nodes[0].namespace().as_deref(), Some("nicflash"));
        assert_eq!(
            nodes[1].spec.hssi.as_ref().map(|h| h.firmware_url.as_str()),
            Some("http://files/a.tar.gz")
        );
        assert!(nodes.iter().all(|n| n.spec.dry_run && !n.spec.drain_skip));
    }

    #[test]
    fn test_split_without_known_nodes() {
        assert!(cluster().split(&[], "nicflash").is_empty());
    }

    #[test]
    fn test_stale_node_names() {
        let existing = vec![
            FirmwareNode::for_node("worker-1", "nicflash"),
            FirmwareNode::for_node("worker-3", "nicflash"),
        ];
        let desired = cluster().split(&["worker-1".to_string()], "nicflash");

        assert_eq!(stale_node_names(&existing, &desired), vec!["worker-3"]);
    }

    #[test]
    fn test_status_serialized_shape() {
        let status = FirmwareClusterStatus {
            sync_status: Some(SyncStatus::Ignored),
            last_sync_error: "only nicflash is handled".to_string(),
        };
        let json = serde_json::to_value(&status).unwrap();

        assert_eq!(json["syncStatus"], "Ignored");
        assert_eq!(json["lastSyncError"], "only nicflash is handled");
    }
}

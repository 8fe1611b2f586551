//! The `FirmwareNode` custom resource

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::condition::{Condition, FLASH_CONDITION, find_condition};

/// Desired firmware of the network adapters on one node
#[derive(CustomResource, Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "nicflash.io",
    version = "v1",
    kind = "FirmwareNode",
    namespaced,
    status = "FirmwareNodeStatus",
    shortname = "fwnode",
    derive = "PartialEq",
    derive = "Default"
)]
#[serde(rename_all = "camelCase")]
pub struct FirmwareNodeSpec {
    /// Network adapters to update; `None` means nothing is requested
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hssi: Option<HssiSpec>,
    /// Go through the motions without touching hardware
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub dry_run: bool,
    /// Update without cordoning and draining the node
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub drain_skip: bool,
}

impl FirmwareNode {
    /// Empty resource for a node, nothing requested
    pub fn for_node(name: impl AsRef<str>, namespace: impl Into<String>) -> Self {
        let mut node = Self::new(name.as_ref(), FirmwareNodeSpec::default());
        node.metadata.namespace = Some(namespace.into());
        node
    }

    /// `metadata.generation`, zero before the object is stored
    #[must_use]
    pub fn generation(&self) -> i64 {
        self.metadata.generation.unwrap_or_default()
    }

    /// The `Flashed` condition, if recorded
    #[must_use]
    pub fn flash_condition(&self) -> Option<&Condition> {
        self.status
            .as_ref()
            .and_then(|s| find_condition(&s.conditions, FLASH_CONDITION))
    }

    /// Status, created empty if absent
    pub fn status_mut(&mut self) -> &mut FirmwareNodeStatus {
        self.status.get_or_insert_with(FirmwareNodeStatus::default)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct HssiSpec {
    #[serde(rename = "firmwareURL", default)]
    pub firmware_url: String,
    /// MD5 of the package, optional
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub checksum: String,
    /// MAC addresses of the adapters to update
    #[serde(default)]
    pub macs: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FirmwareNodeStatus {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inventory: Vec<HssiCardStatus>,
}

/// One FPGA card and its network adapters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct HssiCardStatus {
    #[serde(rename = "PCIAddr")]
    pub pci_addr: String,
    #[serde(default)]
    pub nics: Vec<NicStatus>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct NicStatus {
    #[serde(rename = "MAC")]
    pub mac: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub version: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub interface: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::{CustomResourceExt, ResourceExt};

    #[test]
    fn test_deserialize_from_cluster_json() {
        let json = r#"{
            "apiVersion": "nicflash.io/v1",
            "kind": "FirmwareNode",
            "metadata": {"name": "worker-1", "namespace": "nicflash", "generation": 3, "resourceVersion": "991"},
            "spec": {
                "hssi": {
                    "firmwareURL": "http://files/nvmupdate.tar.gz",
                    "checksum": "900150983cd24fb0d6963f7d28e17f72",
                    "macs": ["64:4c:36:11:1b:a8"]
                },
                "drainSkip": true
            }
        }"#;

        let node: FirmwareNode = serde_json::from_str(json).unwrap();

        assert_eq!(node.generation(), 3);
        assert_eq!(node.resource_version().as_deref(), Some("991"));
        let hssi = node.spec.hssi.clone().unwrap();
        assert_eq!(hssi.firmware_url, "http://files/nvmupdate.tar.gz");
        assert_eq!(hssi.macs, vec!["64:4c:36:11:1b:a8"]);
        assert!(node.spec.drain_skip);
        assert!(!node.spec.dry_run);
        assert!(node.flash_condition().is_none());
    }

    #[test]
    fn test_for_node_serializes_minimal_object() {
        let node = FirmwareNode::for_node("worker-1", "nicflash");
        let json = serde_json::to_value(&node).unwrap();

        assert_eq!(json["apiVersion"], "nicflash.io/v1");
        assert_eq!(json["kind"], "FirmwareNode");
        assert_eq!(json["metadata"]["name"], "worker-1");
        assert_eq!(json["metadata"]["namespace"], "nicflash");
        assert!(json["spec"].get("hssi").is_none());
        assert!(json.get("status").is_none());
        assert_eq!(node.generation(), 0);
    }

    #[test]
    fn test_crd_has_status_subresource() {
        let crd = FirmwareNode::crd();
        assert_eq!(crd.spec.names.plural, "firmwarenodes");
        let version = &crd.spec.versions[0];
        assert!(version.subresources.as_ref().unwrap().status.is_some());
    }
}

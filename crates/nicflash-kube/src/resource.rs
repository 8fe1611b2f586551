//! `FirmwareNode` resources

use async_trait::async_trait;
use kube::api::{Api, DeleteParams, ListParams, Patch, PatchParams, PostParams};
use nicflash_api::{FirmwareNode, FirmwareNodeSpec, ResourceExt};
use nicflash_core::{CoreError, StatusSink};
use serde_json::{Value, json};
use tracing::{info, instrument};

use crate::client::KubeClient;
use crate::error::{KubeError, Result};

/// Merge patch body for `field`, pinned to `resource_version` when known
pub(crate) fn versioned_patch(field: &str, value: Value, resource_version: Option<String>) -> Value {
    let mut patch = json!({ field: value });
    if let Some(rv) = resource_version {
        patch["metadata"] = json!({ "resourceVersion": rv });
    }
    patch
}

impl KubeClient {
    fn firmware_nodes(&self, namespace: &str) -> Api<FirmwareNode> {
        Api::namespaced(self.client(), namespace)
    }

    fn namespace_of(node: &FirmwareNode) -> Result<String> {
        node.namespace()
            .ok_or_else(|| KubeError::Config(format!("FirmwareNode {} has no namespace", node.name_any())))
    }

    /// Fetch a resource, `None` if it does not exist
    ///
    /// # Errors
    /// Returns an error if the request fails.
    pub async fn get_firmware_node(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<FirmwareNode>> {
        Ok(self.firmware_nodes(namespace).get_opt(name).await?)
    }

    /// All resources in `namespace`
    ///
    /// # Errors
    /// Returns an error if the request fails.
    pub async fn list_firmware_nodes(&self, namespace: &str) -> Result<Vec<FirmwareNode>> {
        let list = self
            .firmware_nodes(namespace)
            .list(&ListParams::default())
            .await?;
        Ok(list.items)
    }

    /// Create a resource
    ///
    /// # Errors
    /// Returns `KubeError::Kube` with status 409 if it already exists.
    #[instrument(skip(self, node), fields(name = %node.name_any()))]
    pub async fn create_firmware_node(&self, node: &FirmwareNode) -> Result<FirmwareNode> {
        let namespace = Self::namespace_of(node)?;
        let created = self
            .firmware_nodes(&namespace)
            .create(&PostParams::default(), node)
            .await?;
        info!("FirmwareNode created");
        Ok(created)
    }

    /// Replace the spec of an existing resource
    ///
    /// # Errors
    /// Returns an error if the resource does not exist or the request fails.
    #[instrument(skip(self, spec))]
    pub async fn update_firmware_node_spec(
        &self,
        namespace: &str,
        name: &str,
        spec: &FirmwareNodeSpec,
    ) -> Result<FirmwareNode> {
        let patch = json!({ "spec": {
            "hssi": spec.hssi,
            "dryRun": spec.dry_run,
            "drainSkip": spec.drain_skip,
        }});
        let updated = self
            .firmware_nodes(namespace)
            .patch(name, &PatchParams::default(), &Patch::Merge(&patch))
            .await?;
        info!("FirmwareNode spec updated");
        Ok(updated)
    }

    /// Delete a resource; a missing one is not an error
    ///
    /// # Errors
    /// Returns an error if the request fails.
    #[instrument(skip(self))]
    pub async fn delete_firmware_node(&self, namespace: &str, name: &str) -> Result<()> {
        match self
            .firmware_nodes(namespace)
            .delete(name, &DeleteParams::default())
            .await
        {
            Ok(_) => {
                info!("FirmwareNode deleted");
                Ok(())
            }
            Err(kube::Error::Api(response)) if response.code == 404 => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Write the status subresource
    ///
    /// The write carries the object's resource version, so a stale `node` is
    /// rejected with 409 instead of overwriting a newer status.
    ///
    /// # Errors
    /// Returns `KubeError::Kube` with status 409 if `node` is stale.
    pub async fn update_firmware_node_status(&self, node: &FirmwareNode) -> Result<FirmwareNode> {
        let namespace = Self::namespace_of(node)?;
        let patch = versioned_patch(
            "status",
            serde_json::to_value(&node.status).map_err(|e| KubeError::Config(e.to_string()))?,
            node.resource_version(),
        );
        Ok(self
            .firmware_nodes(&namespace)
            .patch_status(&node.name_any(), &PatchParams::default(), &Patch::Merge(&patch))
            .await?)
    }
}

#[async_trait]
impl StatusSink for KubeClient {
    async fn publish_status(&self, node: &FirmwareNode) -> std::result::Result<FirmwareNode, CoreError> {
        self.update_firmware_node_status(node)
            .await
            .map_err(|e| CoreError::Status(e.to_string()))
    }
}

//! Split of a `FirmwareCluster` into per-node resources

use k8s_openapi::api::core::v1::Node;
use kube::api::{Api, ListParams, Patch, PatchParams};
use nicflash_api::{FirmwareCluster, FirmwareClusterStatus, FirmwareNode, ResourceExt, SyncStatus, stale_node_names};
use tracing::{debug, error, info, instrument, warn};

use crate::client::KubeClient;
use crate::error::{KubeError, Result};
use crate::resource::versioned_patch;

impl KubeClient {
    fn firmware_clusters(&self, namespace: &str) -> Api<FirmwareCluster> {
        Api::namespaced(self.client(), namespace)
    }

    /// All cluster resources in `namespace`
    ///
    /// # Errors
    /// Returns an error if the request fails.
    pub async fn list_firmware_clusters(&self, namespace: &str) -> Result<Vec<FirmwareCluster>> {
        let list = self
            .firmware_clusters(namespace)
            .list(&ListParams::default())
            .await?;
        Ok(list.items)
    }

    /// Write the status subresource of a cluster resource
    ///
    /// # Errors
    /// Returns an error if the request fails.
    pub async fn update_firmware_cluster_status(
        &self,
        cluster: &FirmwareCluster,
        status: FirmwareClusterStatus,
    ) -> Result<FirmwareCluster> {
        let namespace = cluster
            .namespace()
            .ok_or_else(|| KubeError::Config(format!("FirmwareCluster {} has no namespace", cluster.name_any())))?;
        let patch = versioned_patch(
            "status",
            serde_json::to_value(&status).map_err(|e| KubeError::Config(e.to_string()))?,
            None,
        );
        Ok(self
            .firmware_clusters(&namespace)
            .patch_status(&cluster.name_any(), &PatchParams::default(), &Patch::Merge(&patch))
            .await?)
    }

    /// Names of the nodes carrying `label`, whatever its value
    ///
    /// # Errors
    /// Returns an error if the request fails.
    pub async fn labelled_node_names(&self, label: &str) -> Result<Vec<String>> {
        let nodes: Api<Node> = Api::all(self.client());
        let list = nodes.list(&ListParams::default().labels(label)).await?;
        Ok(list.items.iter().map(ResourceExt::name_any).collect())
    }
}

/// Keeps the `FirmwareNode` resources of a namespace in line with its
/// `FirmwareCluster`
pub struct ClusterSync {
    client: KubeClient,
    namespace: String,
    name: String,
}

impl ClusterSync {
    pub fn new(client: KubeClient, namespace: impl Into<String>) -> Self {
        Self {
            client,
            namespace: namespace.into(),
            name: FirmwareCluster::DEFAULT_NAME.to_string(),
        }
    }

    /// Honour a cluster resource with another name
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Sync every cluster resource in the namespace
    ///
    /// Resources other than the honoured one are marked `Ignored`.
    ///
    /// # Errors
    /// Returns the first error of listing or of syncing the honoured
    /// resource. Status write failures are logged only.
    #[instrument(skip(self), fields(namespace = %self.namespace))]
    pub async fn sync_all(&self) -> Result<()> {
        let mut result = Ok(());
        for cluster in self.client.list_firmware_clusters(&self.namespace).await? {
            if cluster.name_any() == self.name {
                if let Err(e) = self.sync(&cluster).await {
                    result = Err(e);
                }
            } else {
                debug!(name = %cluster.name_any(), "FirmwareCluster ignored");
                self.set_status(
                    &cluster,
                    SyncStatus::Ignored,
                    format!(
                        "only FirmwareCluster '{}' in namespace '{}' is handled",
                        self.name, self.namespace
                    ),
                )
                .await;
            }
        }
        result
    }

    /// Apply one cluster resource and record the outcome in its status
    ///
    /// # Errors
    /// Returns the error that stopped the split.
    pub async fn sync(&self, cluster: &FirmwareCluster) -> Result<()> {
        match self.apply(cluster).await {
            Ok(()) => {
                self.set_status(cluster, SyncStatus::Succeeded, String::new()).await;
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "FirmwareCluster sync failed");
                self.set_status(cluster, SyncStatus::Failed, e.to_string()).await;
                Err(e)
            }
        }
    }

    /// Create, update and delete node resources to match `cluster`
    ///
    /// # Errors
    /// Returns the first failed request.
    #[instrument(skip(self, cluster), fields(name = %cluster.name_any()))]
    pub async fn apply(&self, cluster: &FirmwareCluster) -> Result<()> {
        let known = self.client.labelled_node_names(FirmwareCluster::NODE_LABEL).await?;
        let desired = cluster.split(&known, &self.namespace);

        let existing = self.client.list_firmware_nodes(&self.namespace).await?;
        for name in stale_node_names(&existing, &desired) {
            info!(node = %name, "removing FirmwareNode no longer requested");
            self.client.delete_firmware_node(&self.namespace, &name).await?;
        }

        for node in &desired {
            self.create_or_update(node).await?;
        }
        info!(nodes = desired.len(), "FirmwareCluster applied");
        Ok(())
    }

    async fn create_or_update(&self, node: &FirmwareNode) -> Result<()> {
        let name = node.name_any();
        match self.client.get_firmware_node(&self.namespace, &name).await? {
            None => {
                self.client.create_firmware_node(node).await?;
            }
            Some(previous) if previous.spec == node.spec => {
                debug!(node = %name, "FirmwareNode unchanged");
            }
            Some(_) => {
                self.client
                    .update_firmware_node_spec(&self.namespace, &name, &node.spec)
                    .await?;
            }
        }
        Ok(())
    }

    async fn set_status(&self, cluster: &FirmwareCluster, sync_status: SyncStatus, message: String) {
        let status = FirmwareClusterStatus {
            sync_status: Some(sync_status),
            last_sync_error: message,
        };
        if cluster.status.as_ref() == Some(&status) {
            return;
        }
        if let Err(e) = self.client.update_firmware_cluster_status(cluster, status).await {
            warn!(error = %e, name = %cluster.name_any(), "failed to update FirmwareCluster status");
        }
    }
}

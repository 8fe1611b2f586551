//! Cordon, pod listing and eviction

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Node, Pod};
use kube::api::{Api, EvictParams, ListParams};
use nicflash_maintenance::{ApiError, NodeApi, PodInfo};
use tracing::debug;

use crate::client::KubeClient;
use crate::error::api_error;

/// Annotation the kubelet puts on mirror pods of static manifests
const MIRROR_ANNOTATION: &str = "kubernetes.io/config.mirror";

fn pod_info(pod: Pod) -> PodInfo {
    let metadata = pod.metadata;
    let controller_kind = metadata
        .owner_references
        .unwrap_or_default()
        .into_iter()
        .find(|o| o.controller.unwrap_or(false))
        .map(|o| o.kind);
    PodInfo {
        mirror: metadata
            .annotations
            .is_some_and(|a| a.contains_key(MIRROR_ANNOTATION)),
        namespace: metadata.namespace.unwrap_or_default(),
        name: metadata.name.unwrap_or_default(),
        phase: pod.status.and_then(|s| s.phase).unwrap_or_default(),
        controller_kind,
    }
}

#[async_trait]
impl NodeApi for KubeClient {
    async fn set_unschedulable(&self, node: &str, unschedulable: bool) -> Result<(), ApiError> {
        let nodes: Api<Node> = Api::all(self.client());
        if unschedulable {
            nodes.cordon(node).await.map_err(api_error)?;
        } else {
            nodes.uncordon(node).await.map_err(api_error)?;
        }
        debug!(node, unschedulable, "node patched");
        Ok(())
    }

    async fn list_pods(&self, node: &str) -> Result<Vec<PodInfo>, ApiError> {
        let pods: Api<Pod> = Api::all(self.client());
        let params = ListParams::default().fields(&format!("spec.nodeName={node}"));
        let list = pods.list(&params).await.map_err(api_error)?;
        Ok(list.items.into_iter().map(pod_info).collect())
    }

    async fn evict_pod(&self, namespace: &str, name: &str) -> Result<(), ApiError> {
        let pods: Api<Pod> = Api::namespaced(self.client(), namespace);
        pods.evict(name, &EvictParams::default())
            .await
            .map_err(api_error)?;
        debug!(namespace, name, "eviction requested");
        Ok(())
    }
}

//! `coordination.k8s.io/v1` leases

use async_trait::async_trait;
use k8s_openapi::api::coordination::v1::{Lease, LeaseSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{MicroTime, ObjectMeta};
use kube::api::{Api, PostParams};
use nicflash_maintenance::{ApiError, LeaseApi, LeaseRecord};

use crate::client::KubeClient;
use crate::error::api_error;

fn to_lease(namespace: &str, name: &str, record: &LeaseRecord) -> Lease {
    Lease {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            resource_version: record.resource_version.clone(),
            ..ObjectMeta::default()
        },
        spec: Some(LeaseSpec {
            holder_identity: Some(record.holder_identity.clone()),
            lease_duration_seconds: Some(record.lease_duration_seconds),
            acquire_time: record.acquire_time.map(MicroTime),
            renew_time: record.renew_time.map(MicroTime),
            lease_transitions: Some(record.lease_transitions),
            ..LeaseSpec::default()
        }),
    }
}

fn to_record(lease: Lease) -> LeaseRecord {
    let spec = lease.spec.unwrap_or_default();
    LeaseRecord {
        holder_identity: spec.holder_identity.unwrap_or_default(),
        lease_duration_seconds: spec.lease_duration_seconds.unwrap_or_default(),
        acquire_time: spec.acquire_time.map(|t| t.0),
        renew_time: spec.renew_time.map(|t| t.0),
        lease_transitions: spec.lease_transitions.unwrap_or_default(),
        resource_version: lease.metadata.resource_version,
    }
}

impl KubeClient {
    fn leases(&self, namespace: &str) -> Api<Lease> {
        Api::namespaced(self.client(), namespace)
    }
}

#[async_trait]
impl LeaseApi for KubeClient {
    async fn get_lease(&self, namespace: &str, name: &str) -> Result<Option<LeaseRecord>, ApiError> {
        let lease = self.leases(namespace).get_opt(name).await.map_err(api_error)?;
        Ok(lease.map(to_record))
    }

    async fn create_lease(
        &self,
        namespace: &str,
        name: &str,
        record: &LeaseRecord,
    ) -> Result<LeaseRecord, ApiError> {
        self.leases(namespace)
            .create(&PostParams::default(), &to_lease(namespace, name, record))
            .await
            .map(to_record)
            .map_err(api_error)
    }

    async fn update_lease(
        &self,
        namespace: &str,
        name: &str,
        record: &LeaseRecord,
    ) -> Result<LeaseRecord, ApiError> {
        self.leases(namespace)
            .replace(name, &PostParams::default(), &to_lease(namespace, name, record))
            .await
            .map(to_record)
            .map_err(api_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_lease_body_carries_micro_time_and_version() {
        let renewed = Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap()
            + chrono::Duration::microseconds(250);
        let record = LeaseRecord {
            holder_identity: "worker-1".to_string(),
            lease_duration_seconds: 137,
            acquire_time: Some(renewed),
            renew_time: Some(renewed),
            lease_transitions: 2,
            resource_version: Some("42".to_string()),
        };

        let lease = to_lease("nicflash", "lease", &record);
        let json = serde_json::to_value(&lease).unwrap();
        assert_eq!(json["spec"]["renewTime"], "2024-05-01T12:30:00.000250Z");
        assert_eq!(json["metadata"]["resourceVersion"], "42");

        assert_eq!(to_record(lease), record);
    }

    #[test]
    fn test_empty_spec_reads_as_free_lease() {
        let lease: Lease = serde_json::from_str(
            r#"{"apiVersion":"coordination.k8s.io/v1","kind":"Lease",
                "metadata":{"name":"l","namespace":"n","resourceVersion":"7"},"spec":{}}"#,
        )
        .unwrap();
        let record = to_record(lease);
        assert!(record.holder_identity.is_empty());
        assert!(record.renew_time.is_none());
        assert_eq!(record.resource_version.as_deref(), Some("7"));
    }
}

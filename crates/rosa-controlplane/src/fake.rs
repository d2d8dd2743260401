//! In-memory object store and fixtures for tests
//!
//! Applies merge patches the way the API server does, including the
//! `metadata.resourceVersion` precondition and garbage collection of
//! deleting objects whose last finalizer was removed.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ObjectReference;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference, Time};
use serde_json::Value;

use rosa_common::crd::{
    AwsRolesRef, CapiClusterSpec, CapiClusterStatus, Cluster, ROSAControlPlane,
    RosaControlPlaneSpec, ROSA_CONTROL_PLANE_KIND,
};
use rosa_common::{Error, Result};

use crate::store::ControlPlaneStore;

type Key = (String, String);

fn key(namespace: &str, name: &str) -> Key {
    (namespace.to_string(), name.to_string())
}

#[derive(Default)]
pub struct FakeStore {
    control_planes: Mutex<HashMap<Key, Value>>,
    clusters: Mutex<HashMap<Key, Cluster>>,
    secrets: Mutex<HashMap<Key, HashMap<String, Vec<u8>>>>,
    writes: AtomicUsize,
    fail_reads: AtomicBool,
}

impl FakeStore {
    pub fn insert_control_plane(&self, mut cp: ROSAControlPlane) {
        if cp.metadata.resource_version.is_none() {
            cp.metadata.resource_version = Some("1".to_string());
        }
        let k = key(
            cp.metadata.namespace.as_deref().unwrap_or_default(),
            cp.metadata.name.as_deref().unwrap_or_default(),
        );
        let value = serde_json::to_value(&cp).unwrap();
        self.control_planes.lock().unwrap().insert(k, value);
    }

    pub fn insert_cluster(&self, cluster: Cluster) {
        let k = key(
            cluster.metadata.namespace.as_deref().unwrap_or_default(),
            cluster.metadata.name.as_deref().unwrap_or_default(),
        );
        self.clusters.lock().unwrap().insert(k, cluster);
    }

    pub fn insert_secret(&self, namespace: &str, name: &str, data_key: &str, value: Vec<u8>) {
        self.secrets
            .lock()
            .unwrap()
            .entry(key(namespace, name))
            .or_default()
            .insert(data_key.to_string(), value);
    }

    pub fn control_plane(&self, namespace: &str, name: &str) -> Option<ROSAControlPlane> {
        self.control_planes
            .lock()
            .unwrap()
            .get(&key(namespace, name))
            .map(|v| serde_json::from_value(v.clone()).unwrap())
    }

    /// Simulate another writer replacing the whole status
    pub fn replace_status(&self, namespace: &str, name: &str, status: Value) {
        let mut objects = self.control_planes.lock().unwrap();
        let obj = objects.get_mut(&key(namespace, name)).unwrap();
        obj["status"] = status;
        bump_resource_version(obj);
    }

    /// Simulate another writer merging into the object
    pub fn external_merge(&self, namespace: &str, name: &str, patch: Value) {
        let mut objects = self.control_planes.lock().unwrap();
        let obj = objects.get_mut(&key(namespace, name)).unwrap();
        json_patch::merge(obj, &patch);
        bump_resource_version(obj);
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn apply(
        &self,
        namespace: &str,
        name: &str,
        patch: &Value,
        status_only: bool,
    ) -> Result<ROSAControlPlane> {
        let k = key(namespace, name);
        let mut objects = self.control_planes.lock().unwrap();
        let Some(obj) = objects.get_mut(&k) else {
            return Err(Error::Kube {
                source: kube::Error::Api(kube::core::ErrorResponse {
                    status: "Failure".to_string(),
                    message: format!("{} not found", name),
                    reason: "NotFound".to_string(),
                    code: 404,
                }),
            });
        };

        if let Some(expected) = patch.pointer("/metadata/resourceVersion") {
            if obj.pointer("/metadata/resourceVersion") != Some(expected) {
                return Err(Error::conflict(
                    ROSA_CONTROL_PLANE_KIND,
                    format!("{}/{}", namespace, name),
                    "the object has been modified",
                ));
            }
        }

        let mut effective = patch.clone();
        if let Some(meta) = effective
            .pointer_mut("/metadata")
            .and_then(Value::as_object_mut)
        {
            meta.remove("resourceVersion");
        }
        if let Some(map) = effective.as_object_mut() {
            if status_only {
                map.retain(|k, _| k == "status");
            } else {
                map.remove("status");
            }
        }
        json_patch::merge(obj, &effective);
        bump_resource_version(obj);
        self.writes.fetch_add(1, Ordering::SeqCst);

        let updated: ROSAControlPlane = serde_json::from_value(obj.clone()).unwrap();
        let finalizers_empty = updated.metadata.finalizers.as_ref().map_or(true, Vec::is_empty);
        if updated.metadata.deletion_timestamp.is_some() && finalizers_empty {
            objects.remove(&k);
        }
        Ok(updated)
    }
}

fn bump_resource_version(obj: &mut Value) {
    let current: u64 = obj
        .pointer("/metadata/resourceVersion")
        .and_then(Value::as_str)
        .and_then(|s| s.parse().ok())
        .unwrap_or(0);
    obj["metadata"]["resourceVersion"] = Value::from((current + 1).to_string());
}

#[async_trait]
impl ControlPlaneStore for FakeStore {
    async fn get_control_plane(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<ROSAControlPlane>> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(Error::internal_with_context("store", "injected read failure"));
        }
        Ok(self.control_plane(namespace, name))
    }

    async fn get_cluster(&self, namespace: &str, name: &str) -> Result<Option<Cluster>> {
        Ok(self.clusters.lock().unwrap().get(&key(namespace, name)).cloned())
    }

    async fn patch_control_plane(
        &self,
        namespace: &str,
        name: &str,
        patch: &Value,
    ) -> Result<ROSAControlPlane> {
        self.apply(namespace, name, patch, false)
    }

    async fn patch_control_plane_status(
        &self,
        namespace: &str,
        name: &str,
        patch: &Value,
    ) -> Result<ROSAControlPlane> {
        self.apply(namespace, name, patch, true)
    }

    async fn get_secret_value(
        &self,
        namespace: &str,
        name: &str,
        data_key: &str,
    ) -> Result<Option<Vec<u8>>> {
        Ok(self
            .secrets
            .lock()
            .unwrap()
            .get(&key(namespace, name))
            .and_then(|data| data.get(data_key).cloned()))
    }
}

pub fn sample_cluster(name: &str, namespace: &str) -> Cluster {
    Cluster {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            ..Default::default()
        },
        spec: CapiClusterSpec {
            control_plane_ref: Some(ObjectReference {
                api_version: Some("controlplane.cluster.x-k8s.io/v1beta2".to_string()),
                kind: Some("ROSAControlPlane".to_string()),
                name: Some("c1".to_string()),
                namespace: Some(namespace.to_string()),
                ..Default::default()
            }),
            ..Default::default()
        },
        status: Some(CapiClusterStatus {
            infrastructure_ready: true,
            ..Default::default()
        }),
    }
}

pub fn sample_control_plane(name: &str, namespace: &str, owner: &str) -> ROSAControlPlane {
    ROSAControlPlane {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            resource_version: Some("1".to_string()),
            owner_references: Some(vec![OwnerReference {
                api_version: "cluster.x-k8s.io/v1beta1".to_string(),
                kind: "Cluster".to_string(),
                name: owner.to_string(),
                uid: format!("uid-{}", owner),
                ..Default::default()
            }]),
            ..Default::default()
        },
        spec: RosaControlPlaneSpec {
            subnets: vec!["subnet-1".to_string(), "subnet-2".to_string()],
            machine_cidr: "10.0.0.0/16".to_string(),
            region: "us-west-2".to_string(),
            version: "4.14.0".to_string(),
            roles_ref: AwsRolesRef {
                ingress_arn: "arn:aws:iam::123:role/ingress".to_string(),
                image_registry_arn: "arn:aws:iam::123:role/registry".to_string(),
                storage_arn: "arn:aws:iam::123:role/storage".to_string(),
                network_arn: "arn:aws:iam::123:role/network".to_string(),
                kube_cloud_controller_arn: "arn:aws:iam::123:role/kcm".to_string(),
                node_pool_management_arn: "arn:aws:iam::123:role/nodepool".to_string(),
                control_plane_operator_arn: "arn:aws:iam::123:role/cpo".to_string(),
                kms_provider_arn: "arn:aws:iam::123:role/kms".to_string(),
            },
            oidc_id: "oidc-1".to_string(),
            account_id: "123".to_string(),
            creator_arn: "arn:aws:iam::123:user/creator".to_string(),
            installer_role_arn: "arn:aws:iam::123:role/installer".to_string(),
            support_role_arn: "arn:aws:iam::123:role/support".to_string(),
            worker_role_arn: "arn:aws:iam::123:role/worker".to_string(),
            ..Default::default()
        },
        status: None,
    }
}

/// Mark an object as deleting
pub fn deleting(mut cp: ROSAControlPlane) -> ROSAControlPlane {
    cp.metadata.deletion_timestamp = Some(Time(chrono::Utc::now()));
    cp
}

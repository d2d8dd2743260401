//! Access to the objects the reconciler reads and writes
//!
//! All writes are JSON merge patches. A patch that carries
//! `metadata.resourceVersion` only applies if the stored object still has
//! that version; otherwise the write fails with [`Error::Conflict`].

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use kube::api::{Api, Patch, PatchParams};
use kube::Client;
#[cfg(test)]
use mockall::automock;
use serde_json::Value;

use rosa_common::crd::{Cluster, ROSAControlPlane, ROSA_CONTROL_PLANE_KIND};
use rosa_common::kube_utils::{is_conflict, is_not_found};
use rosa_common::{Error, Result, FIELD_MANAGER};

/// Object store used by the reconciler.
///
/// Trait object so tests can substitute an in-memory store.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ControlPlaneStore: Send + Sync {
    /// Get a control plane. `Ok(None)` if it does not exist.
    async fn get_control_plane(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<ROSAControlPlane>>;

    /// Get a CAPI cluster. `Ok(None)` if it does not exist.
    async fn get_cluster(&self, namespace: &str, name: &str) -> Result<Option<Cluster>>;

    /// Merge-patch a control plane's metadata and spec
    async fn patch_control_plane(
        &self,
        namespace: &str,
        name: &str,
        patch: &Value,
    ) -> Result<ROSAControlPlane>;

    /// Merge-patch a control plane's status subresource
    async fn patch_control_plane_status(
        &self,
        namespace: &str,
        name: &str,
        patch: &Value,
    ) -> Result<ROSAControlPlane>;

    /// Read one key of a secret. `Ok(None)` if the secret or key is missing.
    async fn get_secret_value(
        &self,
        namespace: &str,
        name: &str,
        key: &str,
    ) -> Result<Option<Vec<u8>>>;
}

/// Store backed by the Kubernetes API server
pub struct KubeStore {
    client: Client,
}

impl KubeStore {
    /// Create a store using the given client
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn params() -> PatchParams {
        PatchParams {
            field_manager: Some(FIELD_MANAGER.to_string()),
            ..Default::default()
        }
    }
}

fn map_write_error(namespace: &str, name: &str, err: kube::Error) -> Error {
    if is_conflict(&err) {
        Error::conflict(
            ROSA_CONTROL_PLANE_KIND,
            format!("{}/{}", namespace, name),
            err.to_string(),
        )
    } else {
        err.into()
    }
}

#[async_trait]
impl ControlPlaneStore for KubeStore {
    async fn get_control_plane(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<ROSAControlPlane>> {
        let api: Api<ROSAControlPlane> = Api::namespaced(self.client.clone(), namespace);
        match api.get(name).await {
            Ok(cp) => Ok(Some(cp)),
            Err(e) if is_not_found(&e) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn get_cluster(&self, namespace: &str, name: &str) -> Result<Option<Cluster>> {
        let api: Api<Cluster> = Api::namespaced(self.client.clone(), namespace);
        match api.get(name).await {
            Ok(cluster) => Ok(Some(cluster)),
            Err(e) if is_not_found(&e) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn patch_control_plane(
        &self,
        namespace: &str,
        name: &str,
        patch: &Value,
    ) -> Result<ROSAControlPlane> {
        let api: Api<ROSAControlPlane> = Api::namespaced(self.client.clone(), namespace);
        api.patch(name, &Self::params(), &Patch::Merge(patch))
            .await
            .map_err(|e| map_write_error(namespace, name, e))
    }

    async fn patch_control_plane_status(
        &self,
        namespace: &str,
        name: &str,
        patch: &Value,
    ) -> Result<ROSAControlPlane> {
        let api: Api<ROSAControlPlane> = Api::namespaced(self.client.clone(), namespace);
        api.patch_status(name, &Self::params(), &Patch::Merge(patch))
            .await
            .map_err(|e| map_write_error(namespace, name, e))
    }

    async fn get_secret_value(
        &self,
        namespace: &str,
        name: &str,
        key: &str,
    ) -> Result<Option<Vec<u8>>> {
        let api: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        match api.get(name).await {
            Ok(secret) => Ok(secret
                .data
                .and_then(|mut data| data.remove(key))
                .map(|bytes| bytes.0)),
            Err(e) if is_not_found(&e) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

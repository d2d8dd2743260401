//! Per-reconcile view of a control plane and its owning cluster
//!
//! A [`ControlPlaneScope`] is created when dispatch begins and closed when it
//! returns. Mutations made through it are buffered on the in-memory object
//! and written by [`ControlPlaneScope::close`] or
//! [`ControlPlaneScope::patch_object`].

use std::sync::Arc;
use std::time::Duration;

use kube::Client;
use tracing::debug;

use rosa_common::crd::{
    get_condition, set_condition, Cluster, Condition, ROSAControlPlane, RosaControlPlaneStatus,
    OWNED_CONDITIONS,
};
use rosa_common::kube_utils::client_from_kubeconfig;
use rosa_common::{Error, Result};

use crate::patch::PatchHelper;
use crate::store::ControlPlaneStore;

/// Secret key holding the workload cluster kubeconfig
const KUBECONFIG_SECRET_KEY: &str = "value";

/// Inputs for building a scope.
///
/// The cluster and control plane are optional so that a caller that failed
/// to load either gets an error instead of a half-built scope.
pub struct ControlPlaneScopeParams {
    /// Store used to flush changes
    pub store: Arc<dyn ControlPlaneStore>,
    /// Owning CAPI cluster
    pub cluster: Option<Cluster>,
    /// Control plane being reconciled
    pub control_plane: Option<ROSAControlPlane>,
    /// Timeout for clients built against the workload cluster
    pub remote_client_timeout: Duration,
}

/// Scope over one control plane for the duration of a reconcile
pub struct ControlPlaneScope {
    store: Arc<dyn ControlPlaneStore>,
    cluster: Cluster,
    control_plane: ROSAControlPlane,
    patch_helper: PatchHelper,
    remote_client_timeout: Duration,
}

impl std::fmt::Debug for ControlPlaneScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControlPlaneScope")
            .field("cluster", &self.name())
            .field("control_plane", &self.infra_cluster_name())
            .field("namespace", &self.namespace())
            .finish()
    }
}

impl ControlPlaneScope {
    /// Build a scope, snapshotting the control plane for later diffs.
    pub fn new(params: ControlPlaneScopeParams) -> Result<Self> {
        let cluster = params
            .cluster
            .ok_or_else(|| Error::invalid_scope("owner cluster is required"))?;
        let control_plane = params
            .control_plane
            .ok_or_else(|| Error::invalid_scope("control plane is required"))?;
        let patch_helper = PatchHelper::new(&control_plane)?;

        Ok(Self {
            store: params.store,
            cluster,
            control_plane,
            patch_helper,
            remote_client_timeout: params.remote_client_timeout,
        })
    }

    /// Name of the owning CAPI cluster
    pub fn name(&self) -> &str {
        self.cluster.metadata.name.as_deref().unwrap_or_default()
    }

    /// Name of the control plane object
    pub fn infra_cluster_name(&self) -> &str {
        self.control_plane.metadata.name.as_deref().unwrap_or_default()
    }

    /// Namespace of the owning CAPI cluster
    pub fn namespace(&self) -> &str {
        self.cluster.metadata.namespace.as_deref().unwrap_or_default()
    }

    /// Owning CAPI cluster
    pub fn cluster(&self) -> &Cluster {
        &self.cluster
    }

    /// Control plane being reconciled
    pub fn control_plane(&self) -> &ROSAControlPlane {
        &self.control_plane
    }

    /// Mutable control plane; changes are persisted on flush
    pub fn control_plane_mut(&mut self) -> &mut ROSAControlPlane {
        &mut self.control_plane
    }

    /// Status of the control plane, created empty if missing
    pub fn status_mut(&mut self) -> &mut RosaControlPlaneStatus {
        self.control_plane
            .status
            .get_or_insert_with(RosaControlPlaneStatus::default)
    }

    /// Set a condition, recording its value in the ledger if the controller
    /// owns it
    pub fn set_condition(&mut self, condition: Condition) {
        let type_ = condition.type_.clone();
        let conditions = &mut self.status_mut().conditions;
        set_condition(conditions, condition);
        if OWNED_CONDITIONS.contains(&type_.as_str()) {
            if let Some(stored) = get_condition(conditions, &type_).cloned() {
                self.patch_helper.record_owned_condition(&stored);
            }
        }
    }

    /// Persist pending changes now and start a new baseline
    pub async fn patch_object(&mut self) -> Result<()> {
        self.patch_helper
            .patch(self.store.as_ref(), &mut self.control_plane)
            .await
    }

    /// Persist pending changes and release the scope
    pub async fn close(mut self) -> Result<()> {
        debug!(control_plane = %self.infra_cluster_name(), "closing scope");
        self.patch_object().await
    }

    /// Build a client for the workload cluster from its kubeconfig secret.
    ///
    /// The client is built on each call and not cached on the scope.
    pub async fn remote_client(&self) -> Result<Client> {
        let secret_name = format!("{}-kubeconfig", self.name());
        let kubeconfig = self
            .store
            .get_secret_value(self.namespace(), &secret_name, KUBECONFIG_SECRET_KEY)
            .await?
            .ok_or_else(|| {
                Error::internal_with_context(
                    "remote_client",
                    format!(
                        "kubeconfig secret {}/{} not found",
                        self.namespace(),
                        secret_name
                    ),
                )
            })?;
        client_from_kubeconfig(&kubeconfig, self.remote_client_timeout).await
    }
}

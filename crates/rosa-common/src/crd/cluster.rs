//! Cluster API resources the controller reads but does not own
//!
//! Only the fields the controller consumes are modelled. The schemas belong
//! to Cluster API, so CRD generation is disabled for these kinds.

use k8s_openapi::api::core::v1::ObjectReference;
use kube::CustomResource;
use serde::{Deserialize, Serialize};

use super::types::ApiEndpoint;

/// Kind string of the CAPI cluster
pub const CLUSTER_KIND: &str = "Cluster";
/// API group of the CAPI cluster
pub const CLUSTER_GROUP: &str = "cluster.x-k8s.io";
/// Kind string of the ROSA infrastructure cluster
pub const ROSA_CLUSTER_KIND: &str = "ROSACluster";

/// Specification of a CAPI Cluster
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[kube(
    group = "cluster.x-k8s.io",
    version = "v1beta1",
    kind = "Cluster",
    plural = "clusters",
    status = "CapiClusterStatus",
    namespaced,
    schema = "disabled"
)]
#[serde(rename_all = "camelCase")]
pub struct CapiClusterSpec {
    /// Pauses reconciliation of the cluster and everything it owns
    #[serde(default)]
    pub paused: bool,

    /// Reference to the control plane provider object
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub control_plane_ref: Option<ObjectReference>,

    /// Reference to the infrastructure provider object
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub infrastructure_ref: Option<ObjectReference>,

    /// Endpoint of the workload cluster's API server
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub control_plane_endpoint: Option<ApiEndpoint>,
}

/// Status of a CAPI Cluster
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CapiClusterStatus {
    /// Infrastructure provider reported ready
    #[serde(default)]
    pub infrastructure_ready: bool,

    /// Control plane provider reported ready
    #[serde(default)]
    pub control_plane_ready: bool,

    /// Lifecycle phase
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,
}

impl Cluster {
    /// True if the cluster has `spec.paused` set
    pub fn is_paused(&self) -> bool {
        self.spec.paused
    }

    /// True once the infrastructure provider reported ready
    pub fn infrastructure_ready(&self) -> bool {
        self.status
            .as_ref()
            .is_some_and(|s| s.infrastructure_ready)
    }
}

/// Specification of a ROSACluster
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[kube(
    group = "infrastructure.cluster.x-k8s.io",
    version = "v1beta2",
    kind = "ROSACluster",
    plural = "rosaclusters",
    status = "RosaClusterStatus",
    namespaced,
    schema = "disabled"
)]
#[serde(rename_all = "camelCase")]
pub struct RosaClusterSpec {
    /// Endpoint of the workload cluster's API server
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub control_plane_endpoint: Option<ApiEndpoint>,
}

/// Status of a ROSACluster
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RosaClusterStatus {
    /// Infrastructure is ready
    #[serde(default)]
    pub ready: bool,
}

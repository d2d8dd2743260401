//! ROSAControlPlane Custom Resource Definition
//!
//! A ROSAControlPlane declares a ROSA hosted control plane: the AWS account,
//! network and IAM roles the managed OpenShift cluster is created with.
//! It is owned by a CAPI `Cluster` and acts as that cluster's control plane
//! provider.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::{ApiEndpoint, Condition};
use crate::kube_utils::base36_truncated_hash;

/// Kind string of the control plane resource
pub const ROSA_CONTROL_PLANE_KIND: &str = "ROSAControlPlane";

/// Overall readiness of the external managed cluster
pub const ROSA_CONTROL_PLANE_READY_CONDITION: &str = "ROSAControlPlaneReady";
/// The spec could be turned into a valid external cluster request
pub const ROSA_CONTROL_PLANE_VALID_CONDITION: &str = "ROSAControlPlaneValid";
/// The external cluster has been requested and is being installed
pub const ROSA_CONTROL_PLANE_CREATING_CONDITION: &str = "ROSAControlPlaneCreating";
/// The external cluster is being uninstalled
pub const ROSA_CONTROL_PLANE_DELETING_CONDITION: &str = "ROSAControlPlaneDeleting";

/// Condition types owned by this controller.
///
/// When the status is flushed these always win over whatever is on the
/// server, even if another writer changed them in the meantime.
pub const OWNED_CONDITIONS: &[&str] = &[
    ROSA_CONTROL_PLANE_READY_CONDITION,
    ROSA_CONTROL_PLANE_VALID_CONDITION,
    ROSA_CONTROL_PLANE_CREATING_CONDITION,
    ROSA_CONTROL_PLANE_DELETING_CONDITION,
];

/// Prefix of generated names that had to be hashed to fit
const CLUSTER_NAME_PREFIX: &str = "capa-";

/// Hashed names are this long including the prefix
const HASHED_NAME_LENGTH: usize = 32;

/// Longest cluster name the cluster-management service accepts
pub const MAX_EXTERNAL_NAME_LENGTH: usize = 54;

/// Specification for a ROSAControlPlane
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "controlplane.cluster.x-k8s.io",
    version = "v1beta2",
    kind = "ROSAControlPlane",
    plural = "rosacontrolplanes",
    shortname = "rosacp",
    status = "RosaControlPlaneStatus",
    namespaced,
    printcolumn = r#"{"name":"Cluster","type":"string","jsonPath":".metadata.labels['cluster\\.x-k8s\\.io/cluster-name']"}"#,
    printcolumn = r#"{"name":"Ready","type":"boolean","jsonPath":".status.ready"}"#,
    printcolumn = r#"{"name":"State","type":"string","jsonPath":".status.state"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct RosaControlPlaneSpec {
    /// Subnet IDs the cluster's nodes are placed in
    #[serde(default)]
    pub subnets: Vec<String>,

    /// Availability zones for the cluster's nodes
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub availability_zones: Vec<String>,

    /// CIDR block of the machine network
    #[serde(rename = "machineCIDR")]
    pub machine_cidr: String,

    /// AWS region
    pub region: String,

    /// OpenShift version (e.g. "4.14.0")
    pub version: String,

    /// Endpoint of the hosted API server, filled in once the cluster is ready
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub control_plane_endpoint: Option<ApiEndpoint>,

    /// ARNs of the operator roles
    pub roles_ref: AwsRolesRef,

    /// ID of the OIDC configuration
    #[serde(rename = "oidcID")]
    pub oidc_id: String,

    /// AWS account ID
    #[serde(rename = "accountID")]
    pub account_id: String,

    /// ARN of the identity that requested the cluster
    #[serde(rename = "creatorARN")]
    pub creator_arn: String,

    /// ARN of the installer account role
    #[serde(rename = "installerRoleARN")]
    pub installer_role_arn: String,

    /// ARN of the support account role
    #[serde(rename = "supportRoleARN")]
    pub support_role_arn: String,

    /// ARN of the worker instance role
    #[serde(rename = "workerRoleARN")]
    pub worker_role_arn: String,

    /// AWS identity used for AWS API calls
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity_ref: Option<AwsIdentityReference>,
}

/// ARNs of the IAM roles assumed by the cluster operators
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct AwsRolesRef {
    /// Role used by the ingress operator
    #[serde(rename = "ingressARN")]
    pub ingress_arn: String,

    /// Role used by the image registry operator
    #[serde(rename = "imageRegistryARN")]
    pub image_registry_arn: String,

    /// Role used by the EBS CSI driver
    #[serde(rename = "storageARN")]
    pub storage_arn: String,

    /// Role used by the cloud network config controller
    #[serde(rename = "networkARN")]
    pub network_arn: String,

    /// Role used by the kube cloud controller manager
    #[serde(rename = "kubeCloudControllerARN")]
    pub kube_cloud_controller_arn: String,

    /// Role used to manage node pools
    #[serde(rename = "nodePoolManagementARN")]
    pub node_pool_management_arn: String,

    /// Role used by the control plane operator
    #[serde(rename = "controlPlaneOperatorARN")]
    pub control_plane_operator_arn: String,

    /// Role used by the KMS provider
    #[serde(rename = "kmsProviderARN")]
    pub kms_provider_arn: String,
}

/// Reference to an AWS identity resource
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub struct AwsIdentityReference {
    /// Name of the identity
    pub name: String,
    /// Kind of the identity (e.g. AWSClusterControllerIdentity)
    pub kind: String,
}

/// Status for a ROSAControlPlane
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RosaControlPlaneStatus {
    /// True once the external cluster reports ready
    #[serde(default)]
    pub ready: bool,

    /// True once the control plane has been initialized
    #[serde(default)]
    pub initialized: bool,

    /// ID assigned to the cluster by the cluster-management service
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Last observed state of the external cluster
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,

    /// URL of the OpenShift web console
    #[serde(
        default,
        rename = "consoleURL",
        skip_serializing_if = "Option::is_none"
    )]
    pub console_url: Option<String>,

    /// Terminal problem that requires user intervention
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_message: Option<String>,

    /// Conditions representing the control plane state
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}

impl ROSAControlPlane {
    /// Name the external cluster is registered under.
    ///
    /// The object name is used as-is when the service accepts it; longer
    /// names fall back to a stable hashed form.
    pub fn external_cluster_name(&self) -> String {
        let name = self.metadata.name.as_deref().unwrap_or_default();
        if name.len() <= MAX_EXTERNAL_NAME_LENGTH {
            return name.to_string();
        }
        let namespace = self.metadata.namespace.as_deref().unwrap_or_default();
        generate_cluster_name(name, namespace, MAX_EXTERNAL_NAME_LENGTH)
    }

    /// Conditions currently recorded on the status
    pub fn conditions(&self) -> &[Condition] {
        self.status
            .as_ref()
            .map(|s| s.conditions.as_slice())
            .unwrap_or_default()
    }
}

/// Generate a cluster name for the external service from an object's identity.
///
/// Names that fit within `max_length` are returned as `<namespace>-<name>`
/// with dots replaced. Longer names are replaced by a hashed, prefixed form
/// so that the same object always maps to the same external name.
pub fn generate_cluster_name(resource_name: &str, namespace: &str, max_length: usize) -> String {
    let escaped = resource_name.replace('.', "-");
    let cluster_name = format!("{}-{}", namespace, escaped);

    if cluster_name.len() < max_length {
        return cluster_name;
    }

    let hash_length = HASHED_NAME_LENGTH - CLUSTER_NAME_PREFIX.len();
    format!(
        "{}{}",
        CLUSTER_NAME_PREFIX,
        base36_truncated_hash(&cluster_name, hash_length)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::{CustomResourceExt, Resource};

    #[test]
    fn crd_metadata() {
        let crd = ROSAControlPlane::crd();
        assert_eq!(
            crd.metadata.name.as_deref(),
            Some("rosacontrolplanes.controlplane.cluster.x-k8s.io")
        );
        assert_eq!(ROSAControlPlane::kind(&()), ROSA_CONTROL_PLANE_KIND);
        assert_eq!(
            ROSAControlPlane::api_version(&()),
            "controlplane.cluster.x-k8s.io/v1beta2"
        );
    }

    #[test]
    fn spec_uses_upstream_field_names() {
        let spec = RosaControlPlaneSpec {
            machine_cidr: "10.0.0.0/16".to_string(),
            oidc_id: "oidc".to_string(),
            roles_ref: AwsRolesRef {
                kms_provider_arn: "arn:kms".to_string(),
                ..Default::default()
            },
            ..Default::default()
        };
        let json = serde_json::to_value(&spec).unwrap();
        assert_eq!(json["machineCIDR"], "10.0.0.0/16");
        assert_eq!(json["oidcID"], "oidc");
        assert_eq!(json["rolesRef"]["kmsProviderARN"], "arn:kms");
        assert!(json.get("controlPlaneEndpoint").is_none());
    }

    #[test]
    fn status_console_url_field_name() {
        let status = RosaControlPlaneStatus {
            console_url: Some("https://console".to_string()),
            ..Default::default()
        };
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["consoleURL"], "https://console");
        assert!(json.get("conditions").is_none());
    }

    #[test]
    fn short_names_are_namespace_qualified() {
        assert_eq!(generate_cluster_name("c1", "ns1", 54), "ns1-c1");
        assert_eq!(generate_cluster_name("a.b", "ns", 54), "ns-a-b");
    }

    #[test]
    fn long_names_are_hashed_deterministically() {
        let long = "a".repeat(60);
        let first = generate_cluster_name(&long, "default", 54);
        let second = generate_cluster_name(&long, "default", 54);
        assert_eq!(first, second);
        assert!(first.starts_with(CLUSTER_NAME_PREFIX));
        assert_eq!(first.len(), HASHED_NAME_LENGTH);
    }

    #[test]
    fn external_name_uses_object_name_when_short() {
        let mut cp = ROSAControlPlane::new("c1", RosaControlPlaneSpec::default());
        cp.metadata.namespace = Some("ns1".to_string());
        assert_eq!(cp.external_cluster_name(), "c1");
    }

    #[test]
    fn external_name_is_hashed_when_too_long() {
        let mut cp = ROSAControlPlane::new(&"x".repeat(70), RosaControlPlaneSpec::default());
        cp.metadata.namespace = Some("ns1".to_string());
        let name = cp.external_cluster_name();
        assert!(name.starts_with(CLUSTER_NAME_PREFIX));
        assert!(name.len() <= MAX_EXTERNAL_NAME_LENGTH);
    }

    #[test]
    fn owned_conditions_cover_every_controller_condition() {
        for c in [
            ROSA_CONTROL_PLANE_READY_CONDITION,
            ROSA_CONTROL_PLANE_VALID_CONDITION,
            ROSA_CONTROL_PLANE_CREATING_CONDITION,
            ROSA_CONTROL_PLANE_DELETING_CONDITION,
        ] {
            assert!(OWNED_CONDITIONS.contains(&c));
        }
    }
}

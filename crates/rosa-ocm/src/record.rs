//! Cluster records submitted to the cluster-management service
//!
//! A [`ClusterRecord`] is built once from a control plane's spec and sent
//! as the body of a create call. It is never mutated after construction.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use rosa_common::crd::{AwsRolesRef, ROSAControlPlane};
use rosa_common::kube_utils::object_key;
use rosa_common::{Error, Result};

/// Product every record is created under
pub const PRODUCT_ID: &str = "rosa";
/// Release channel group versions are resolved in
pub const CHANNEL_GROUP: &str = "stable";
/// Cluster network plugin
pub const NETWORK_TYPE: &str = "OVNKubernetes";
/// Property key holding the ARN of whoever requested the cluster
pub const CREATOR_ARN_PROPERTY: &str = "rosa_creator_arn";

/// An operator role binding: which service account gets which role.
#[derive(Debug, Clone, Copy)]
pub struct OperatorRole {
    /// Service account name the operator runs as
    pub name: &'static str,
    /// Namespace of the service account
    pub namespace: &'static str,
    /// Picks the role ARN for this binding out of `spec.rolesRef`
    pub role_arn: fn(&AwsRolesRef) -> &str,
}

/// Every operator role a hosted control plane needs.
pub const OPERATOR_ROLES: [OperatorRole; 8] = [
    OperatorRole {
        name: "cloud-credentials",
        namespace: "openshift-ingress-operator",
        role_arn: |r| r.ingress_arn.as_str(),
    },
    OperatorRole {
        name: "installer-cloud-credentials",
        namespace: "openshift-image-registry",
        role_arn: |r| r.image_registry_arn.as_str(),
    },
    OperatorRole {
        name: "ebs-cloud-credentials",
        namespace: "openshift-cluster-csi-drivers",
        role_arn: |r| r.storage_arn.as_str(),
    },
    OperatorRole {
        name: "cloud-credentials",
        namespace: "openshift-cloud-network-config-controller",
        role_arn: |r| r.network_arn.as_str(),
    },
    OperatorRole {
        name: "kube-controller-manager",
        namespace: "kube-system",
        role_arn: |r| r.kube_cloud_controller_arn.as_str(),
    },
    OperatorRole {
        name: "kms-provider",
        namespace: "kube-system",
        role_arn: |r| r.kms_provider_arn.as_str(),
    },
    OperatorRole {
        name: "control-plane-operator",
        namespace: "kube-system",
        role_arn: |r| r.control_plane_operator_arn.as_str(),
    },
    OperatorRole {
        name: "capa-controller-manager",
        namespace: "kube-system",
        role_arn: |r| r.node_pool_management_arn.as_str(),
    },
];

/// Cluster description accepted by the create endpoint
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ClusterRecord {
    /// Cluster name, unique per organization
    pub name: String,
    /// Spread the hosted control plane across zones
    pub multi_az: bool,
    /// Product, always `rosa`
    pub product: IdRef,
    /// AWS region
    pub region: IdRef,
    /// OpenShift version and channel
    pub version: VersionRef,
    /// FIPS-validated cryptography
    pub fips: bool,
    /// Encrypt etcd at rest
    pub etcd_encryption: bool,
    /// Turn off monitoring of user workloads
    pub disable_user_workload_monitoring: bool,
    /// When the service may reclaim the cluster
    pub expiration_timestamp: DateTime<Utc>,
    /// Hosted control plane switch
    pub hypershift: Hypershift,
    /// Cluster networking
    pub network: Network,
    /// AWS account, subnets and STS roles
    pub aws: Aws,
    /// Availability zones for compute, when given
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nodes: Option<Nodes>,
    /// Free-form properties, including the creator ARN
    pub properties: BTreeMap<String, String>,
}

/// Reference to a service-side object by id
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct IdRef {
    /// Object id
    pub id: String,
}

impl IdRef {
    fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

/// OpenShift version to install
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct VersionRef {
    /// Version id, `openshift-v` followed by the release
    pub id: String,
    /// Update channel group
    pub channel_group: String,
}

/// Hosted control plane settings
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Hypershift {
    /// Always true for this controller
    pub enabled: bool,
}

/// Cluster network settings
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Network {
    /// Network plugin
    #[serde(rename = "type")]
    pub type_: String,
    /// CIDR the machines are placed in
    pub machine_cidr: String,
}

/// AWS placement of the cluster
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Aws {
    /// Account the cluster is installed into
    pub account_id: String,
    /// Subnets for the cluster
    pub subnet_ids: Vec<String>,
    /// STS role configuration
    pub sts: Sts,
}

/// STS roles the service assumes
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Sts {
    /// Installer role
    pub role_arn: String,
    /// Red Hat SRE support role
    pub support_role_arn: String,
    /// Per-operator roles, one per [`OPERATOR_ROLES`] entry
    pub operator_iam_roles: Vec<OperatorIamRole>,
    /// Roles attached to instances
    pub instance_iam_roles: InstanceIamRoles,
    /// OIDC provider configuration
    pub oidc_config: IdRef,
    /// Let the service create missing roles
    pub auto_mode: bool,
}

/// Role binding for one in-cluster operator
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct OperatorIamRole {
    /// Service account name
    pub name: String,
    /// Service account namespace
    pub namespace: String,
    /// Role the service account assumes
    pub role_arn: String,
}

/// Roles attached to cluster instances
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct InstanceIamRoles {
    /// Control plane instance role
    pub master_role_arn: String,
    /// Worker instance role
    pub worker_role_arn: String,
}

/// Compute node placement
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Nodes {
    /// Zones to spread workers across
    pub availability_zones: Vec<String>,
}

/// Build the record for a control plane.
///
/// The result depends only on `cp.spec`, `now` and `expires_in`. Fields the
/// service cannot default are checked here so a bad spec fails before any
/// network call.
pub fn build_cluster_record(
    cp: &ROSAControlPlane,
    now: DateTime<Utc>,
    expires_in: Duration,
) -> Result<ClusterRecord> {
    let spec = &cp.spec;
    let key = object_key(&cp.metadata);

    for (field, value) in [
        ("region", &spec.region),
        ("version", &spec.version),
        ("machineCIDR", &spec.machine_cidr),
        ("accountID", &spec.account_id),
        ("installerRoleARN", &spec.installer_role_arn),
        ("supportRoleARN", &spec.support_role_arn),
        ("oidcID", &spec.oidc_id),
    ] {
        if value.is_empty() {
            return Err(Error::validation_for(
                &key,
                format!("spec.{} must be set", field),
            ));
        }
    }

    let expires_in = chrono::Duration::from_std(expires_in)
        .map_err(|e| Error::validation_for(&key, format!("invalid expiration: {}", e)))?;

    let operator_iam_roles = OPERATOR_ROLES
        .iter()
        .map(|role| OperatorIamRole {
            name: role.name.to_string(),
            namespace: role.namespace.to_string(),
            role_arn: (role.role_arn)(&spec.roles_ref).to_string(),
        })
        .collect();

    let node_pool_role = spec.roles_ref.node_pool_management_arn.clone();
    let nodes = (!spec.availability_zones.is_empty()).then(|| Nodes {
        availability_zones: spec.availability_zones.clone(),
    });

    Ok(ClusterRecord {
        name: cp.external_cluster_name(),
        multi_az: true,
        product: IdRef::new(PRODUCT_ID),
        region: IdRef::new(&spec.region),
        version: VersionRef {
            id: spec.version.clone(),
            channel_group: CHANNEL_GROUP.to_string(),
        },
        fips: false,
        etcd_encryption: false,
        disable_user_workload_monitoring: true,
        expiration_timestamp: now + expires_in,
        hypershift: Hypershift { enabled: true },
        network: Network {
            type_: NETWORK_TYPE.to_string(),
            machine_cidr: spec.machine_cidr.clone(),
        },
        aws: Aws {
            account_id: spec.account_id.clone(),
            subnet_ids: spec.subnets.clone(),
            sts: Sts {
                role_arn: spec.installer_role_arn.clone(),
                support_role_arn: spec.support_role_arn.clone(),
                operator_iam_roles,
                instance_iam_roles: InstanceIamRoles {
                    master_role_arn: node_pool_role.clone(),
                    worker_role_arn: node_pool_role,
                },
                oidc_config: IdRef::new(&spec.oidc_id),
                auto_mode: true,
            },
        },
        nodes,
        properties: BTreeMap::from([(
            CREATOR_ARN_PROPERTY.to_string(),
            spec.creator_arn.clone(),
        )]),
    })
}

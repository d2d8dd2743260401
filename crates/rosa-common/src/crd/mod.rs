//! Custom Resource Definitions used by the controller

mod cluster;
mod control_plane;
mod types;

pub use cluster::{
    CapiClusterSpec, CapiClusterStatus, Cluster, ROSACluster, RosaClusterSpec, RosaClusterStatus,
    CLUSTER_GROUP, CLUSTER_KIND, ROSA_CLUSTER_KIND,
};
pub use control_plane::{
    generate_cluster_name, AwsIdentityReference, AwsRolesRef, ROSAControlPlane,
    RosaControlPlaneSpec, RosaControlPlaneStatus, MAX_EXTERNAL_NAME_LENGTH, OWNED_CONDITIONS,
    ROSA_CONTROL_PLANE_CREATING_CONDITION, ROSA_CONTROL_PLANE_DELETING_CONDITION,
    ROSA_CONTROL_PLANE_KIND, ROSA_CONTROL_PLANE_READY_CONDITION,
    ROSA_CONTROL_PLANE_VALID_CONDITION,
};
pub use types::{
    get_condition, is_condition_true, set_condition, ApiEndpoint, Condition, ConditionStatus,
};

//! Mapping events on related resources to control plane reconcile requests

use std::collections::HashMap;
use std::sync::Arc;

use kube::runtime::reflector::{ObjectRef, Store};
use kube::ResourceExt;
use tracing::trace;

use rosa_common::crd::{Cluster, ROSACluster, ROSAControlPlane, ROSA_CONTROL_PLANE_KIND};
use rosa_common::kube_utils::owner_cluster_ref;

/// Read access to CAPI clusters by key
pub trait ClusterLookup {
    /// Get a cluster by namespace and name
    fn get_cluster(&self, namespace: &str, name: &str) -> Option<Arc<Cluster>>;
}

impl ClusterLookup for Store<Cluster> {
    fn get_cluster(&self, namespace: &str, name: &str) -> Option<Arc<Cluster>> {
        self.get(&ObjectRef::new(name).within(namespace))
    }
}

impl ClusterLookup for HashMap<(String, String), Arc<Cluster>> {
    fn get_cluster(&self, namespace: &str, name: &str) -> Option<Arc<Cluster>> {
        self.get(&(namespace.to_string(), name.to_string())).cloned()
    }
}

/// Resolve the control plane a cluster points at, if it is one of ours
fn control_plane_ref(cluster: &Cluster) -> Option<ObjectRef<ROSAControlPlane>> {
    let cp_ref = cluster.spec.control_plane_ref.as_ref()?;
    if cp_ref.kind.as_deref() != Some(ROSA_CONTROL_PLANE_KIND) {
        return None;
    }
    let name = cp_ref.name.as_deref()?;
    let namespace = cp_ref
        .namespace
        .as_deref()
        .filter(|ns| !ns.is_empty())
        .or(cluster.metadata.namespace.as_deref())?;
    Some(ObjectRef::new(name).within(namespace))
}

/// Map a ROSACluster event to its cluster's control plane.
///
/// Deleting ROSAClusters, ROSAClusters without an owning cluster, and
/// clusters whose control plane is not a ROSAControlPlane produce nothing.
pub fn rosa_cluster_to_control_plane(
    rosa_cluster: &ROSACluster,
    lookup: &impl ClusterLookup,
) -> Option<ObjectRef<ROSAControlPlane>> {
    if rosa_cluster.metadata.deletion_timestamp.is_some() {
        trace!(rosa_cluster = %rosa_cluster.name_any(), "ROSACluster is deleting");
        return None;
    }
    let owner = owner_cluster_ref(&rosa_cluster.metadata)?;
    let namespace = rosa_cluster.namespace()?;
    let Some(cluster) = lookup.get_cluster(&namespace, &owner.name) else {
        trace!(
            rosa_cluster = %rosa_cluster.name_any(),
            cluster = %owner.name,
            "owning cluster not in cache"
        );
        return None;
    };
    control_plane_ref(&cluster)
}

/// Map a CAPI Cluster event to its control plane.
///
/// Only unpaused clusters with ready infrastructure trigger a reconcile.
pub fn cluster_to_control_plane(cluster: &Cluster) -> Option<ObjectRef<ROSAControlPlane>> {
    if cluster.metadata.deletion_timestamp.is_some()
        || cluster.is_paused()
        || !cluster.infrastructure_ready()
    {
        return None;
    }
    control_plane_ref(cluster)
}

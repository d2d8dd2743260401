//! Finalizer bookkeeping on object metadata
//!
//! These only mutate the in-memory object; the scope persists the change.

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

/// Finalizer that blocks deletion until the external cluster is gone
pub const CONTROL_PLANE_FINALIZER: &str = "rosacontrolplane.controlplane.cluster.x-k8s.io";

/// Check whether the controller's finalizer is present
pub fn has_finalizer(meta: &ObjectMeta) -> bool {
    meta.finalizers
        .as_ref()
        .is_some_and(|f| f.iter().any(|x| x == CONTROL_PLANE_FINALIZER))
}

/// Add the finalizer. Returns true if it was not already present.
pub fn add_finalizer(meta: &mut ObjectMeta) -> bool {
    if has_finalizer(meta) {
        return false;
    }
    meta.finalizers
        .get_or_insert_with(Vec::new)
        .push(CONTROL_PLANE_FINALIZER.to_string());
    true
}

/// Remove the finalizer. Returns true if it was present.
pub fn remove_finalizer(meta: &mut ObjectMeta) -> bool {
    let Some(finalizers) = meta.finalizers.as_mut() else {
        return false;
    };
    let before = finalizers.len();
    finalizers.retain(|f| f != CONTROL_PLANE_FINALIZER);
    before != finalizers.len()
}

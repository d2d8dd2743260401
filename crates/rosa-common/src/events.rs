//! Kubernetes Event recording for the control plane controller.
//!
//! Events are **fire-and-forget**: failures are logged as warnings and never
//! propagate errors. A failed event must never break reconciliation.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ObjectReference;
use kube::runtime::events::{EventType, Recorder, Reporter};
use kube::Client;
use tracing::warn;

/// Trait for publishing Kubernetes Events.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publish a Kubernetes Event on the given resource.
    ///
    /// * `resource_ref` - The Kubernetes object this event is about
    /// * `type_` - Normal or Warning
    /// * `reason` - Machine-readable reason string (e.g. "ClusterCreated")
    /// * `action` - What action was taken (e.g. "Create")
    /// * `note` - Optional human-readable message
    async fn publish(
        &self,
        resource_ref: &ObjectReference,
        type_: EventType,
        reason: &str,
        action: &str,
        note: Option<String>,
    );
}

/// Production implementation wrapping `kube::runtime::events::Recorder`.
pub struct KubeEventPublisher {
    recorder: Recorder,
}

impl KubeEventPublisher {
    /// Create a new publisher reporting as `controller_name`.
    pub fn new(client: Client, controller_name: &str) -> Self {
        let reporter = Reporter {
            controller: controller_name.to_string(),
            instance: std::env::var("POD_NAME").ok(),
        };
        Self {
            recorder: Recorder::new(client, reporter),
        }
    }
}

#[async_trait]
impl EventPublisher for KubeEventPublisher {
    async fn publish(
        &self,
        resource_ref: &ObjectReference,
        type_: EventType,
        reason: &str,
        action: &str,
        note: Option<String>,
    ) {
        let event = kube::runtime::events::Event {
            type_,
            reason: reason.to_string(),
            note,
            action: action.to_string(),
            secondary: None,
        };
        if let Err(e) = self.recorder.publish(&event, resource_ref).await {
            warn!(
                reason,
                action,
                error = %e,
                "Failed to publish Kubernetes event"
            );
        }
    }
}

/// Well-known event reason strings.
pub mod reasons {
    /// Finalizer added, object is now tracked
    pub const FINALIZER_ADDED: &str = "FinalizerAdded";
    /// External cluster creation was requested
    pub const CLUSTER_CREATED: &str = "ClusterCreated";
    /// External cluster creation was rejected or failed
    pub const CLUSTER_CREATE_FAILED: &str = "ClusterCreateFailed";
    /// External cluster reports ready
    pub const CLUSTER_READY: &str = "ClusterReady";
    /// External cluster reports an error state
    pub const CLUSTER_FAILED: &str = "ClusterFailed";
    /// External cluster deletion was requested
    pub const DELETION_STARTED: &str = "DeletionStarted";
    /// External cluster deletion failed
    pub const DELETION_FAILED: &str = "DeletionFailed";
    /// External cluster is gone and the finalizer was removed
    pub const DELETION_COMPLETE: &str = "DeletionComplete";
}

/// Well-known event action strings.
pub mod actions {
    /// Standard reconciliation loop
    pub const RECONCILE: &str = "Reconcile";
    /// Creating the external cluster
    pub const CREATE: &str = "Create";
    /// Deleting the external cluster
    pub const DELETE: &str = "Delete";
}

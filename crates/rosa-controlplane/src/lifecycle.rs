//! Driving the external cluster toward the state a control plane declares

use kube::runtime::controller::Action;
use kube::runtime::events::EventType;
use kube::Resource;
use tracing::{info, warn};

use rosa_common::crd::{
    ApiEndpoint, Condition, ROSAControlPlane, ROSA_CONTROL_PLANE_CREATING_CONDITION,
    ROSA_CONTROL_PLANE_DELETING_CONDITION, ROSA_CONTROL_PLANE_READY_CONDITION,
    ROSA_CONTROL_PLANE_VALID_CONDITION,
};
use rosa_common::events::{actions, reasons};
use rosa_common::{Error, Result};
use rosa_ocm::{build_cluster_record, ClusterManagementClient, ClusterState, ExternalCluster};

use crate::controller::Context;
use crate::scope::ControlPlaneScope;

/// Condition reasons set by the lifecycle
pub mod condition_reasons {
    /// The spec cannot be turned into a cluster request
    pub const INVALID_SPEC: &str = "InvalidSpec";
    /// The cluster-management service could not be reached or refused a call
    pub const RECONCILIATION_FAILED: &str = "ReconciliationFailed";
    /// The external cluster is being installed
    pub const INSTALLING: &str = "Installing";
    /// The external cluster finished installing
    pub const INSTALLED: &str = "Installed";
    /// The external cluster reported an error
    pub const CLUSTER_FAILED: &str = "ClusterFailed";
    /// The external cluster is being uninstalled
    pub const DELETING: &str = "Deleting";
    /// Uninstall of the external cluster failed
    pub const DELETION_FAILED: &str = "DeletionFailed";
}

use condition_reasons as why;

/// Look up the external cluster for a control plane.
///
/// The recorded id is tried first; if it is unknown to the service the
/// derived name is searched, so a lost status never leads to a duplicate.
pub async fn find_external_cluster(
    cp: &ROSAControlPlane,
    ocm: &dyn ClusterManagementClient,
) -> Result<Option<ExternalCluster>> {
    let recorded_id = cp
        .status
        .as_ref()
        .and_then(|s| s.id.as_deref())
        .filter(|id| !id.is_empty());
    if let Some(id) = recorded_id {
        if let Some(cluster) = ocm.get_cluster(id).await? {
            return Ok(Some(cluster));
        }
    }
    ocm.find_cluster_by_name(&cp.external_cluster_name()).await
}

/// Outcome of one teardown step
#[derive(Debug, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// The external cluster no longer exists
    Gone,
    /// Teardown is still running or must be retried
    Pending(Action),
}

pub(crate) async fn publish(
    ctx: &Context,
    cp: &ROSAControlPlane,
    type_: EventType,
    reason: &str,
    action: &str,
    note: String,
) {
    ctx.events
        .publish(&cp.object_ref(&()), type_, reason, action, Some(note))
        .await;
}

fn external_failure(scope: &mut ControlPlaneScope, reason: &str, err: &Error) {
    scope.set_condition(Condition::false_condition(
        ROSA_CONTROL_PLANE_READY_CONDITION,
        reason,
        err.to_string(),
    ));
}

/// Make sure the external cluster exists and mirror its state onto status.
pub async fn ensure_external_cluster(
    scope: &mut ControlPlaneScope,
    ctx: &Context,
) -> Result<Action> {
    let existing = match find_external_cluster(scope.control_plane(), ctx.ocm.as_ref()).await {
        Ok(existing) => existing,
        Err(e) => {
            warn!(error = %e, "failed to look up external cluster");
            external_failure(scope, why::RECONCILIATION_FAILED, &e);
            return Ok(Action::requeue(ctx.config.external_retry_delay));
        }
    };

    let cluster = match existing {
        Some(cluster) => cluster,
        None => match create_external_cluster(scope, ctx).await {
            Ok(cluster) => cluster,
            Err(action) => return Ok(action),
        },
    };

    Ok(apply_external_status(scope, ctx, &cluster).await)
}

/// Submit a new cluster. `Err` carries the action to return instead.
async fn create_external_cluster(
    scope: &mut ControlPlaneScope,
    ctx: &Context,
) -> std::result::Result<ExternalCluster, Action> {
    let record = match build_cluster_record(
        scope.control_plane(),
        ctx.clock.now(),
        ctx.config.expiration_horizon,
    ) {
        Ok(record) => record,
        Err(e) => {
            warn!(error = %e, "control plane spec is invalid");
            scope.set_condition(Condition::false_condition(
                ROSA_CONTROL_PLANE_VALID_CONDITION,
                why::INVALID_SPEC,
                e.to_string(),
            ));
            return Err(Action::await_change());
        }
    };
    scope.set_condition(Condition::true_condition(ROSA_CONTROL_PLANE_VALID_CONDITION));

    match ctx.ocm.create_cluster(&record).await {
        Ok(cluster) => {
            info!(cluster = %record.name, id = %cluster.id, "external cluster created");
            scope.set_condition(
                Condition::true_condition(ROSA_CONTROL_PLANE_CREATING_CONDITION)
                    .with_reason(why::INSTALLING),
            );
            publish(
                ctx,
                scope.control_plane(),
                EventType::Normal,
                reasons::CLUSTER_CREATED,
                actions::CREATE,
                format!("Requested cluster {} ({})", record.name, cluster.id),
            )
            .await;
            Ok(cluster)
        }
        Err(e) => {
            warn!(cluster = %record.name, error = %e, "failed to create external cluster");
            external_failure(scope, why::RECONCILIATION_FAILED, &e);
            publish(
                ctx,
                scope.control_plane(),
                EventType::Warning,
                reasons::CLUSTER_CREATE_FAILED,
                actions::CREATE,
                e.to_string(),
            )
            .await;
            Err(Action::requeue(ctx.config.external_retry_delay))
        }
    }
}

/// Mirror the external cluster's state onto the control plane's status
async fn apply_external_status(
    scope: &mut ControlPlaneScope,
    ctx: &Context,
    cluster: &ExternalCluster,
) -> Action {
    let was_ready = scope.control_plane().status.as_ref().is_some_and(|s| s.ready);
    let status = scope.status_mut();
    status.id = Some(cluster.id.clone());
    status.state = Some(cluster.state.to_string());

    match cluster.state {
        ClusterState::Ready => {
            status.ready = true;
            status.initialized = true;
            status.failure_message = None;
            if let Some(console) = cluster.console.as_ref().filter(|c| !c.url.is_empty()) {
                status.console_url = Some(console.url.clone());
            }
            let endpoint_unset = scope
                .control_plane()
                .spec
                .control_plane_endpoint
                .as_ref()
                .map_or(true, ApiEndpoint::is_zero);
            if endpoint_unset {
                if let Some((host, port)) = cluster.api_endpoint() {
                    scope.control_plane_mut().spec.control_plane_endpoint =
                        Some(ApiEndpoint { host, port });
                }
            }
            scope.set_condition(Condition::true_condition(ROSA_CONTROL_PLANE_READY_CONDITION));
            scope.set_condition(Condition::false_condition(
                ROSA_CONTROL_PLANE_CREATING_CONDITION,
                why::INSTALLED,
                "cluster installation finished",
            ));
            if !was_ready {
                info!(id = %cluster.id, "external cluster is ready");
                publish(
                    ctx,
                    scope.control_plane(),
                    EventType::Normal,
                    reasons::CLUSTER_READY,
                    actions::RECONCILE,
                    format!("Cluster {} is ready", cluster.id),
                )
                .await;
            }
            Action::requeue(ctx.config.resync_period)
        }
        ClusterState::Error => {
            let message = cluster
                .error_message()
                .unwrap_or("cluster is in error state")
                .to_string();
            status.ready = false;
            let newly_failed = status.failure_message.as_deref() != Some(message.as_str());
            status.failure_message = Some(message.clone());
            scope.set_condition(Condition::false_condition(
                ROSA_CONTROL_PLANE_READY_CONDITION,
                why::CLUSTER_FAILED,
                message.clone(),
            ));
            if newly_failed {
                warn!(id = %cluster.id, message = %message, "external cluster failed");
                publish(
                    ctx,
                    scope.control_plane(),
                    EventType::Warning,
                    reasons::CLUSTER_FAILED,
                    actions::RECONCILE,
                    message,
                )
                .await;
            }
            Action::requeue(ctx.config.resync_period)
        }
        state => {
            status.ready = false;
            scope.set_condition(Condition::false_condition(
                ROSA_CONTROL_PLANE_READY_CONDITION,
                state.as_str(),
                format!("cluster is {}", state),
            ));
            if state.is_provisioning() {
                scope.set_condition(
                    Condition::true_condition(ROSA_CONTROL_PLANE_CREATING_CONDITION)
                        .with_reason(why::INSTALLING),
                );
            }
            Action::requeue(ctx.config.wait_infra_period)
        }
    }
}

/// Tear down the external cluster.
///
/// Returns [`DeleteOutcome::Gone`] only once the service no longer knows
/// the cluster; until then the finalizer must stay.
pub async fn delete_external_cluster(
    scope: &mut ControlPlaneScope,
    ctx: &Context,
) -> Result<DeleteOutcome> {
    let existing = match find_external_cluster(scope.control_plane(), ctx.ocm.as_ref()).await {
        Ok(existing) => existing,
        Err(e) => {
            warn!(error = %e, "failed to look up external cluster for deletion");
            external_failure(scope, why::RECONCILIATION_FAILED, &e);
            return Ok(DeleteOutcome::Pending(Action::requeue(
                ctx.config.external_retry_delay,
            )));
        }
    };

    let Some(cluster) = existing else {
        return Ok(DeleteOutcome::Gone);
    };

    if cluster.state != ClusterState::Uninstalling {
        if let Err(e) = ctx.ocm.delete_cluster(&cluster.id).await {
            warn!(id = %cluster.id, error = %e, "failed to delete external cluster");
            external_failure(scope, why::DELETION_FAILED, &e);
            publish(
                ctx,
                scope.control_plane(),
                EventType::Warning,
                reasons::DELETION_FAILED,
                actions::DELETE,
                e.to_string(),
            )
            .await;
            return Ok(DeleteOutcome::Pending(Action::requeue(
                ctx.config.external_retry_delay,
            )));
        }
        info!(id = %cluster.id, "requested external cluster deletion");
        publish(
            ctx,
            scope.control_plane(),
            EventType::Normal,
            reasons::DELETION_STARTED,
            actions::DELETE,
            format!("Requested deletion of cluster {}", cluster.id),
        )
        .await;
    }

    let status = scope.status_mut();
    status.id = Some(cluster.id.clone());
    status.state = Some(ClusterState::Uninstalling.to_string());
    status.ready = false;
    scope.set_condition(
        Condition::true_condition(ROSA_CONTROL_PLANE_DELETING_CONDITION).with_reason(why::DELETING),
    );
    scope.set_condition(Condition::false_condition(
        ROSA_CONTROL_PLANE_READY_CONDITION,
        why::DELETING,
        "cluster is being deleted",
    ));
    Ok(DeleteOutcome::Pending(Action::requeue(
        ctx.config.wait_infra_period,
    )))
}

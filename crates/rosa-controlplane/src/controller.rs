//! ROSAControlPlane reconciler
//!
//! Each reconcile re-reads the object, resolves its owning CAPI cluster,
//! honours pausing, and then either drives the external cluster toward
//! existence or tears it down. All writes go through a
//! [`ControlPlaneScope`], which is flushed on every exit path.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use kube::runtime::controller::Action;
use kube::runtime::events::EventType;
use kube::{Client, ResourceExt};
use tracing::{debug, error, info, instrument, warn};

use rosa_common::crd::ROSAControlPlane;
use rosa_common::events::{actions, reasons, EventPublisher, KubeEventPublisher};
use rosa_common::kube_utils::{has_paused_annotation, object_key, owner_cluster_ref};
use rosa_common::{Error, Result};
use rosa_ocm::client::DEFAULT_REQUEST_TIMEOUT;
use rosa_ocm::{ClusterManagementClient, OcmClient, TokenSource};

use crate::config::ControllerConfig;
use crate::finalizer::{add_finalizer, remove_finalizer};
use crate::lifecycle::{self, publish, DeleteOutcome};
use crate::scope::{ControlPlaneScope, ControlPlaneScopeParams};
use crate::store::{ControlPlaneStore, KubeStore};

/// Name the controller reports events under
pub const CONTROLLER_NAME: &str = "rosacontrolplane-controller";

/// Source of the current time
pub trait Clock: Send + Sync {
    /// Current time
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Shared context for the ROSAControlPlane controller
///
/// Use [`ContextBuilder`] to construct instances:
///
/// ```text
/// let ctx = Context::builder(client, config).build()?;
/// ```
pub struct Context {
    /// Object store for control planes, clusters and secrets
    pub store: Arc<dyn ControlPlaneStore>,
    /// Cluster-management service client
    pub ocm: Arc<dyn ClusterManagementClient>,
    /// Kubernetes Event publisher
    pub events: Arc<dyn EventPublisher>,
    /// Time source for record expiration
    pub clock: Arc<dyn Clock>,
    /// Delays and endpoints
    pub config: ControllerConfig,
}

impl Context {
    /// Create a builder for constructing a Context
    pub fn builder(client: Client, config: ControllerConfig) -> ContextBuilder {
        ContextBuilder::new(client, config)
    }

    /// Create a context for testing with in-memory collaborators
    #[cfg(test)]
    pub fn for_testing(
        store: Arc<dyn ControlPlaneStore>,
        ocm: Arc<dyn ClusterManagementClient>,
        events: Arc<dyn EventPublisher>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            ocm,
            events,
            clock,
            config: ControllerConfig::default(),
        }
    }
}

/// Builder for constructing [`Context`] instances
pub struct ContextBuilder {
    client: Client,
    config: ControllerConfig,
    store: Option<Arc<dyn ControlPlaneStore>>,
    ocm: Option<Arc<dyn ClusterManagementClient>>,
    events: Option<Arc<dyn EventPublisher>>,
    clock: Option<Arc<dyn Clock>>,
}

impl ContextBuilder {
    fn new(client: Client, config: ControllerConfig) -> Self {
        Self {
            client,
            config,
            store: None,
            ocm: None,
            events: None,
            clock: None,
        }
    }

    /// Override the object store
    pub fn store(mut self, store: Arc<dyn ControlPlaneStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Override the cluster-management client
    pub fn ocm_client(mut self, ocm: Arc<dyn ClusterManagementClient>) -> Self {
        self.ocm = Some(ocm);
        self
    }

    /// Override the event publisher
    pub fn event_publisher(mut self, events: Arc<dyn EventPublisher>) -> Self {
        self.events = Some(events);
        self
    }

    /// Override the clock
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Build the Context.
    ///
    /// Without an explicit client, the cluster-management client is built
    /// from `OCM_TOKEN` with one pooled HTTP client for the process.
    pub fn build(self) -> Result<Context> {
        let ocm = match self.ocm {
            Some(ocm) => ocm,
            None => {
                let http = OcmClient::http_client(DEFAULT_REQUEST_TIMEOUT)?;
                let tokens = TokenSource::from_env(self.config.token_url.clone(), http.clone())?;
                info!(
                    url = %self.config.ocm_url,
                    token_kind = ?tokens.kind(),
                    "using cluster-management service"
                );
                Arc::new(OcmClient::new(http, self.config.ocm_url.clone(), Arc::new(tokens)))
            }
        };

        Ok(Context {
            store: self
                .store
                .unwrap_or_else(|| Arc::new(KubeStore::new(self.client.clone()))),
            ocm,
            events: self.events.unwrap_or_else(|| {
                Arc::new(KubeEventPublisher::new(self.client.clone(), CONTROLLER_NAME))
            }),
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
            config: self.config,
        })
    }
}

/// Reconcile a ROSAControlPlane
///
/// The object handed in by the watcher only identifies the key; the
/// current copy is read from the store. The whole call runs under the
/// configured reconcile deadline.
#[instrument(skip(cp, ctx), fields(control_plane = %object_key(&cp.metadata)))]
pub async fn reconcile(cp: Arc<ROSAControlPlane>, ctx: Arc<Context>) -> Result<Action> {
    let namespace = cp.namespace().unwrap_or_default();
    let name = cp.name_any();
    let deadline = ctx.config.reconcile_timeout;

    match tokio::time::timeout(deadline, reconcile_key(&ctx, &namespace, &name)).await {
        Ok(result) => result,
        Err(_) => Err(Error::Timeout {
            object: format!("{}/{}", namespace, name),
            seconds: deadline.as_secs(),
        }),
    }
}

/// Run one reconcile for the control plane at `namespace/name`
pub async fn reconcile_key(ctx: &Context, namespace: &str, name: &str) -> Result<Action> {
    let cp = match ctx.store.get_control_plane(namespace, name).await {
        Ok(Some(cp)) => cp,
        Ok(None) => {
            debug!("control plane no longer exists");
            return Ok(Action::await_change());
        }
        Err(e) => {
            warn!(error = %e, "failed to load control plane");
            return Ok(Action::requeue(ctx.config.transient_requeue_delay));
        }
    };

    let Some(owner) = owner_cluster_ref(&cp.metadata) else {
        info!("cluster controller has not set an owner reference yet");
        return Ok(Action::await_change());
    };
    let owner_name = owner.name.clone();
    let cluster = ctx
        .store
        .get_cluster(namespace, &owner_name)
        .await?
        .ok_or_else(|| {
            Error::invalid_scope(format!(
                "owner cluster {}/{} not found",
                namespace, owner_name
            ))
        })?;

    if cluster.is_paused() || has_paused_annotation(&cp.metadata) {
        info!(cluster = %owner_name, "reconciliation is paused");
        return Ok(Action::await_change());
    }

    let mut scope = ControlPlaneScope::new(ControlPlaneScopeParams {
        store: ctx.store.clone(),
        cluster: Some(cluster),
        control_plane: Some(cp),
        remote_client_timeout: ctx.config.remote_client_timeout,
    })?;

    let result = if scope.control_plane().metadata.deletion_timestamp.is_some() {
        reconcile_delete(&mut scope, ctx).await
    } else {
        reconcile_normal(&mut scope, ctx).await
    };

    match (result, scope.close().await) {
        (Ok(action), Ok(())) => Ok(action),
        (Ok(_), Err(e)) => Err(e),
        (Err(e), Ok(())) => Err(e),
        (Err(e), Err(close_err)) => {
            warn!(error = %close_err, "failed to persist control plane after failed reconcile");
            Err(e)
        }
    }
}

async fn reconcile_normal(scope: &mut ControlPlaneScope, ctx: &Context) -> Result<Action> {
    info!(cluster = %scope.name(), "reconciling control plane");

    if add_finalizer(&mut scope.control_plane_mut().metadata) {
        scope.patch_object().await?;
        publish(
            ctx,
            scope.control_plane(),
            EventType::Normal,
            reasons::FINALIZER_ADDED,
            actions::RECONCILE,
            "Added deletion finalizer".to_string(),
        )
        .await;
    }

    lifecycle::ensure_external_cluster(scope, ctx).await
}

async fn reconcile_delete(scope: &mut ControlPlaneScope, ctx: &Context) -> Result<Action> {
    info!(cluster = %scope.name(), "reconciling control plane deletion");

    match lifecycle::delete_external_cluster(scope, ctx).await? {
        DeleteOutcome::Pending(action) => Ok(action),
        DeleteOutcome::Gone => {
            if remove_finalizer(&mut scope.control_plane_mut().metadata) {
                info!("external cluster is gone, releasing control plane");
                publish(
                    ctx,
                    scope.control_plane(),
                    EventType::Normal,
                    reasons::DELETION_COMPLETE,
                    actions::DELETE,
                    "External cluster deleted".to_string(),
                )
                .await;
            }
            Ok(Action::await_change())
        }
    }
}

/// Error policy for the controller
pub fn error_policy(cp: Arc<ROSAControlPlane>, error: &Error, ctx: Arc<Context>) -> Action {
    error!(
        ?error,
        control_plane = %object_key(&cp.metadata),
        retryable = error.is_retryable(),
        "reconciliation failed"
    );
    Action::requeue(ctx.config.error_requeue_delay)
}

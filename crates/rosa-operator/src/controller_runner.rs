//! Controller runner - wires the ROSAControlPlane controller to its watches
//!
//! Returns boxed futures so the caller decides how to drive them.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use futures::StreamExt;
use kube::runtime::watcher::Config as WatcherConfig;
use kube::runtime::{reflector, watcher, Controller, WatchStreamExt};
use kube::{Api, Client};

use rosa_common::crd::{Cluster, ROSACluster, ROSAControlPlane};
use rosa_controlplane::controller::{error_policy, reconcile, Context};
use rosa_controlplane::{cluster_to_control_plane, rosa_cluster_to_control_plane};

/// Watcher timeout (seconds) - must be less than client read_timeout (30s)
/// This forces the API server to close the watch before the client times out,
/// preventing "body read timed out" errors on idle watches.
const WATCH_TIMEOUT_SECS: u32 = 25;

type BoxedTask = Pin<Box<dyn Future<Output = ()> + Send>>;

fn watcher_config(label_selector: Option<&str>) -> WatcherConfig {
    let config = WatcherConfig::default().timeout(WATCH_TIMEOUT_SECS);
    match label_selector {
        Some(selector) => config.labels(selector),
        None => config,
    }
}

/// Build the control plane controller and the cluster cache it reads from.
///
/// The watch filter applies to every watched kind, so one shard never sees
/// another shard's objects.
pub fn build_control_plane_controllers(client: Client, ctx: Arc<Context>) -> Vec<BoxedTask> {
    let selector = ctx.config.label_selector();
    let selector = selector.as_deref();

    let control_planes: Api<ROSAControlPlane> = Api::all(client.clone());
    let rosa_clusters: Api<ROSACluster> = Api::all(client.clone());
    let clusters: Api<Cluster> = Api::all(client);

    // ROSACluster events resolve their owner through this cache
    let (cluster_cache, cluster_writer) = reflector::store::<Cluster>();
    let cluster_reflector = reflector(
        cluster_writer,
        watcher(clusters.clone(), watcher_config(selector)),
    )
    .default_backoff()
    .applied_objects()
    .for_each(|_| std::future::ready(()));

    if let Some(selector) = selector {
        tracing::info!(%selector, "watch filter enabled");
    }
    tracing::info!("- ROSAControlPlane controller");

    let controller = Controller::new(control_planes, watcher_config(selector))
        .watches(rosa_clusters, watcher_config(selector), move |rosa_cluster| {
            rosa_cluster_to_control_plane(&rosa_cluster, &cluster_cache)
        })
        .watches(clusters, watcher_config(selector), |cluster| {
            cluster_to_control_plane(&cluster)
        })
        .shutdown_on_signal()
        .run(reconcile, error_policy, ctx)
        .for_each(log_reconcile_result("ROSAControlPlane"));

    vec![Box::pin(cluster_reflector), Box::pin(controller)]
}

fn log_reconcile_result<T: std::fmt::Debug, E: std::fmt::Debug>(
    controller_name: &'static str,
) -> impl Fn(Result<T, E>) -> std::future::Ready<()> {
    move |result| {
        match result {
            Ok(action) => tracing::debug!(?action, "{} reconciliation completed", controller_name),
            Err(e) => tracing::error!(error = ?e, "{} reconciliation error", controller_name),
        }
        std::future::ready(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn watcher_config_carries_selector() {
        let config = watcher_config(Some("cluster.x-k8s.io/watch-filter=a"));
        assert_eq!(
            config.label_selector.as_deref(),
            Some("cluster.x-k8s.io/watch-filter=a")
        );
        assert_eq!(config.timeout, Some(WATCH_TIMEOUT_SECS));
    }

    #[test]
    fn watcher_config_without_filter_watches_everything() {
        let config = watcher_config(None);
        assert!(config.label_selector.is_none());
    }
}

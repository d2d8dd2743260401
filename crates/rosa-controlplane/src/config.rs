//! Controller configuration

use std::time::Duration;

use rosa_ocm::client::DEFAULT_OCM_URL;
use rosa_ocm::token::DEFAULT_TOKEN_URL;

/// Settings for the control plane controller, fixed at construction time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerConfig {
    /// Only reconcile objects labelled `cluster.x-k8s.io/watch-filter=<value>`
    pub watch_filter: Option<String>,
    /// Requeue delay while the external cluster is installing or uninstalling
    pub wait_infra_period: Duration,
    /// Requeue delay after a failed call to the cluster-management service
    pub external_retry_delay: Duration,
    /// Requeue delay after a transient failure loading the object
    pub transient_requeue_delay: Duration,
    /// Requeue delay applied by the error policy
    pub error_requeue_delay: Duration,
    /// Re-check interval for clusters that settled in a terminal state
    pub resync_period: Duration,
    /// Deadline for a single reconcile call
    pub reconcile_timeout: Duration,
    /// How far in the future new external clusters expire
    pub expiration_horizon: Duration,
    /// Timeout for clients built against workload clusters
    pub remote_client_timeout: Duration,
    /// Base URL of the cluster-management service
    pub ocm_url: String,
    /// Token endpoint used to exchange refresh tokens
    pub token_url: String,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            watch_filter: None,
            wait_infra_period: Duration::from_secs(30),
            external_retry_delay: Duration::from_secs(10),
            transient_requeue_delay: Duration::from_secs(5),
            error_requeue_delay: Duration::from_secs(5),
            resync_period: Duration::from_secs(600),
            reconcile_timeout: Duration::from_secs(120),
            expiration_horizon: Duration::from_secs(3600),
            remote_client_timeout: Duration::from_secs(60),
            ocm_url: DEFAULT_OCM_URL.to_string(),
            token_url: DEFAULT_TOKEN_URL.to_string(),
        }
    }
}

impl ControllerConfig {
    /// Label selector matching the configured watch filter, if any
    pub fn label_selector(&self) -> Option<String> {
        self.watch_filter
            .as_deref()
            .filter(|v| !v.is_empty())
            .map(|v| format!("{}={}", rosa_common::WATCH_FILTER_LABEL, v))
    }
}

//! Reconciler for ROSAControlPlane resources
//!
//! Turns a declared control plane into a hosted cluster at the
//! cluster-management service and tears it down again on deletion.
//!
//! Related crates:
//! - `rosa-common`: CRDs, errors, events and the kind registry
//! - `rosa-ocm`: cluster-management service client and record construction

pub mod config;
pub mod controller;
pub mod finalizer;
pub mod lifecycle;
pub mod mapping;
pub mod patch;
pub mod scope;
pub mod store;

#[cfg(test)]
mod fake;

pub use config::ControllerConfig;
pub use controller::{error_policy, reconcile, Clock, Context, ContextBuilder, SystemClock};
pub use mapping::{cluster_to_control_plane, rosa_cluster_to_control_plane, ClusterLookup};
pub use scope::{ControlPlaneScope, ControlPlaneScopeParams};
pub use store::{ControlPlaneStore, KubeStore};

pub use rosa_common::{Error, Result};

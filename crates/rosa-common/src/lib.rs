//! Common types for the ROSA control plane controller: CRDs, errors, and utilities

#![deny(missing_docs)]

pub mod crd;
pub mod error;
pub mod events;
pub mod kube_utils;
pub mod registry;
pub mod telemetry;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Annotation that pauses reconciliation of a single object
pub const PAUSED_ANNOTATION: &str = "cluster.x-k8s.io/paused";

/// Label used to shard objects between controller instances
pub const WATCH_FILTER_LABEL: &str = "cluster.x-k8s.io/watch-filter";

/// Field manager name used for every write made by the controller
pub const FIELD_MANAGER: &str = "rosacontrolplane-controller";

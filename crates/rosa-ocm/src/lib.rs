//! OpenShift Cluster Manager integration
//!
//! Builds the cluster records the controller submits and talks to the
//! clusters_mgmt API to create, look up and delete clusters.

#![deny(missing_docs)]

pub mod client;
pub mod cluster;
pub mod record;
pub mod token;

pub use client::{ClusterManagementClient, OcmClient, DEFAULT_OCM_URL};
pub use cluster::{ClusterState, ExternalCluster};
pub use record::{build_cluster_record, ClusterRecord, OPERATOR_ROLES};
pub use token::{TokenSource, DEFAULT_TOKEN_URL};

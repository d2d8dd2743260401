//! Process-wide registry of the kinds this controller understands
//!
//! The registry is built once on first use and shared by everything that
//! needs to map an `(apiVersion, kind)` pair from an owner or object
//! reference back to a typed resource.

use std::sync::OnceLock;

use kube::discovery::ApiResource;

use crate::crd::{Cluster, ROSACluster, ROSAControlPlane};
use crate::kube_utils::parse_api_version;

/// Kinds known to the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KnownKind {
    /// ROSAControlPlane (controlplane.cluster.x-k8s.io)
    ControlPlane,
    /// Cluster (cluster.x-k8s.io)
    Cluster,
    /// ROSACluster (infrastructure.cluster.x-k8s.io)
    RosaCluster,
}

/// All KnownKind variants for iteration.
const ALL_KINDS: &[KnownKind] = &[
    KnownKind::ControlPlane,
    KnownKind::Cluster,
    KnownKind::RosaCluster,
];

impl KnownKind {
    fn api_resource(&self) -> ApiResource {
        match self {
            Self::ControlPlane => ApiResource::erase::<ROSAControlPlane>(&()),
            Self::Cluster => ApiResource::erase::<Cluster>(&()),
            Self::RosaCluster => ApiResource::erase::<ROSACluster>(&()),
        }
    }

    /// Whether the controller owns the CRD for this kind
    pub fn owns_crd(&self) -> bool {
        matches!(self, Self::ControlPlane)
    }
}

/// Registry mapping known kinds to their API resources
#[derive(Debug)]
pub struct KindRegistry {
    entries: Vec<(KnownKind, ApiResource)>,
}

impl KindRegistry {
    fn build() -> Self {
        Self {
            entries: ALL_KINDS.iter().map(|k| (*k, k.api_resource())).collect(),
        }
    }

    /// API resource of a known kind
    pub fn api_resource(&self, kind: KnownKind) -> Option<&ApiResource> {
        self.entries
            .iter()
            .find(|(k, _)| *k == kind)
            .map(|(_, ar)| ar)
    }

    /// Resolve an `(apiVersion, kind)` pair to a known kind.
    ///
    /// Only the group has to match, so references written against another
    /// served version of the same kind still resolve.
    pub fn resolve(&self, api_version: &str, kind: &str) -> Option<KnownKind> {
        let (group, _) = parse_api_version(api_version);
        self.entries
            .iter()
            .find(|(_, ar)| ar.group == group && ar.kind == kind)
            .map(|(k, _)| *k)
    }

    /// Iterate the registered kinds
    pub fn kinds(&self) -> impl Iterator<Item = KnownKind> + '_ {
        self.entries.iter().map(|(k, _)| *k)
    }
}

static REGISTRY: OnceLock<KindRegistry> = OnceLock::new();

/// The process-wide kind registry, built on first call
pub fn registry() -> &'static KindRegistry {
    REGISTRY.get_or_init(KindRegistry::build)
}

/// Convenience check for whether an `(apiVersion, kind)` pair is `kind`
pub fn is_kind(api_version: &str, kind_str: &str, kind: KnownKind) -> bool {
    registry().resolve(api_version, kind_str) == Some(kind)
}

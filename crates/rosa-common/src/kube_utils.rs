//! Shared Kubernetes utilities using kube-rs

use std::time::Duration;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};

use crate::registry::{is_kind, KnownKind};
use crate::{Error, PAUSED_ANNOTATION};

/// Check whether a kube error is a 404 from the API server
pub fn is_not_found(err: &kube::Error) -> bool {
    matches!(err, kube::Error::Api(ae) if ae.code == 404)
}

/// Check whether a kube error is a 409 from the API server
pub fn is_conflict(err: &kube::Error) -> bool {
    matches!(err, kube::Error::Api(ae) if ae.code == 409)
}

/// Parse API version into (group, version)
pub fn parse_api_version(api_version: &str) -> (String, String) {
    match api_version.split_once('/') {
        Some((group, version)) => (group.to_string(), version.to_string()),
        None => (String::new(), api_version.to_string()),
    }
}

/// Find the owner reference pointing at a CAPI `Cluster`.
///
/// The reference must name kind `Cluster` in the `cluster.x-k8s.io` group;
/// the API version within that group is not checked.
pub fn owner_cluster_ref(meta: &ObjectMeta) -> Option<&OwnerReference> {
    meta.owner_references
        .as_deref()
        .unwrap_or_default()
        .iter()
        .find(|r| is_kind(&r.api_version, &r.kind, KnownKind::Cluster))
}

/// True if the object carries the CAPI paused annotation
pub fn has_paused_annotation(meta: &ObjectMeta) -> bool {
    meta.annotations
        .as_ref()
        .is_some_and(|a| a.contains_key(PAUSED_ANNOTATION))
}

/// Format a `namespace/name` key for log lines and errors
pub fn object_key(meta: &ObjectMeta) -> String {
    format!(
        "{}/{}",
        meta.namespace.as_deref().unwrap_or_default(),
        meta.name.as_deref().unwrap_or_default()
    )
}

/// Hash `input` with SHA-256 and render it in base36, truncated to `len`.
///
/// The digest is read as a big-endian unsigned integer, matching how other
/// Cluster API providers derive names, so generated names stay stable
/// across implementations.
pub fn base36_truncated_hash(input: &str, len: usize) -> String {
    use aws_lc_rs::digest;
    let hash = digest::digest(&digest::SHA256, input.as_bytes());
    let mut encoded = to_base36(hash.as_ref());
    encoded.truncate(len);
    encoded
}

fn to_base36(bytes: &[u8]) -> String {
    const ALPHABET: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

    let mut number: Vec<u8> = bytes.iter().copied().skip_while(|b| *b == 0).collect();
    if number.is_empty() {
        return "0".to_string();
    }

    let mut digits = Vec::new();
    while !number.is_empty() {
        let mut remainder: u32 = 0;
        let mut quotient = Vec::with_capacity(number.len());
        for byte in &number {
            let acc = (remainder << 8) | u32::from(*byte);
            let q = acc / 36;
            remainder = acc % 36;
            if !(quotient.is_empty() && q == 0) {
                quotient.push(q as u8);
            }
        }
        digits.push(ALPHABET[remainder as usize]);
        number = quotient;
    }

    digits.iter().rev().map(|d| *d as char).collect()
}

/// Build a client for a workload cluster from raw kubeconfig bytes
pub async fn client_from_kubeconfig(kubeconfig: &[u8], timeout: Duration) -> Result<Client, Error> {
    let text = std::str::from_utf8(kubeconfig).map_err(|e| {
        Error::internal_with_context("remote_client", format!("kubeconfig is not UTF-8: {}", e))
    })?;
    let kubeconfig = Kubeconfig::from_yaml(text).map_err(|e| {
        Error::internal_with_context(
            "remote_client",
            format!("failed to parse kubeconfig: {}", e),
        )
    })?;
    let mut config = Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
        .await
        .map_err(|e| {
            Error::internal_with_context(
                "remote_client",
                format!("failed to load kubeconfig: {}", e),
            )
        })?;
    config.connect_timeout = Some(timeout);
    config.read_timeout = Some(timeout);
    config.write_timeout = Some(timeout);
    Client::try_from(config).map_err(|e| {
        Error::internal_with_context("remote_client", format!("failed to create client: {}", e))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn api_error(code: u16) -> kube::Error {
        kube::Error::Api(kube::core::ErrorResponse {
            status: "Failure".to_string(),
            message: "test".to_string(),
            reason: "Test".to_string(),
            code,
        })
    }

    fn owner(api_version: &str, kind: &str, name: &str) -> OwnerReference {
        OwnerReference {
            api_version: api_version.to_string(),
            kind: kind.to_string(),
            name: name.to_string(),
            uid: format!("uid-{}", name),
            ..Default::default()
        }
    }

    #[test]
    fn status_code_helpers() {
        assert!(is_not_found(&api_error(404)));
        assert!(!is_not_found(&api_error(409)));
        assert!(is_conflict(&api_error(409)));
        assert!(!is_conflict(&api_error(500)));
    }

    #[test]
    fn parse_api_version_splits_group() {
        assert_eq!(
            parse_api_version("cluster.x-k8s.io/v1beta1"),
            ("cluster.x-k8s.io".to_string(), "v1beta1".to_string())
        );
        assert_eq!(parse_api_version("v1"), (String::new(), "v1".to_string()));
    }

    #[test]
    fn owner_cluster_ref_ignores_other_owners() {
        let meta = ObjectMeta {
            owner_references: Some(vec![
                owner("apps/v1", "ReplicaSet", "rs"),
                owner("example.com/v1", "Cluster", "imposter"),
                owner("cluster.x-k8s.io/v1beta1", "Cluster", "c1"),
            ]),
            ..Default::default()
        };
        assert_eq!(owner_cluster_ref(&meta).map(|r| r.name.as_str()), Some("c1"));
    }

    #[test]
    fn owner_cluster_ref_none_without_owners() {
        assert!(owner_cluster_ref(&ObjectMeta::default()).is_none());
    }

    #[test]
    fn paused_annotation_presence_is_enough() {
        let mut meta = ObjectMeta::default();
        assert!(!has_paused_annotation(&meta));
        meta.annotations = Some(BTreeMap::from([(
            PAUSED_ANNOTATION.to_string(),
            String::new(),
        )]));
        assert!(has_paused_annotation(&meta));
    }

    #[test]
    fn object_key_format() {
        let meta = ObjectMeta {
            name: Some("c1".to_string()),
            namespace: Some("ns1".to_string()),
            ..Default::default()
        };
        assert_eq!(object_key(&meta), "ns1/c1");
    }

    #[test]
    fn base36_matches_known_values() {
        assert_eq!(to_base36(&[0]), "0");
        assert_eq!(to_base36(&[35]), "z");
        assert_eq!(to_base36(&[36]), "10");
        assert_eq!(to_base36(&[0x01, 0x00]), "74");
    }

    #[test]
    fn truncated_hash_is_stable_and_bounded() {
        let a = base36_truncated_hash("ns1-cluster", 27);
        let b = base36_truncated_hash("ns1-cluster", 27);
        assert_eq!(a, b);
        assert_eq!(a.len(), 27);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(a, base36_truncated_hash("ns2-cluster", 27));
    }

    #[tokio::test]
    async fn client_from_kubeconfig_rejects_garbage() {
        let result = client_from_kubeconfig(b"not: [valid", Duration::from_secs(60)).await;
        assert!(result.is_err());
    }
}

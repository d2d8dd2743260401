//! Clusters as reported back by the cluster-management service

use reqwest::Url;
use serde::{Deserialize, Serialize};

/// Lifecycle state of an external cluster
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClusterState {
    /// Request accepted, inputs being validated
    Validating,
    /// Waiting on account roles or OIDC setup
    Waiting,
    /// Queued for installation
    Pending,
    /// Being installed
    Installing,
    /// Installed and serving
    Ready,
    /// Installation or operation failed
    Error,
    /// Being uninstalled
    Uninstalling,
    /// Hibernating
    Hibernating,
    /// Shutting down into hibernation
    PoweringDown,
    /// Waking from hibernation
    Resuming,
    /// Any state this controller does not know about yet
    #[default]
    #[serde(other)]
    Unknown,
}

impl ClusterState {
    /// True while the service is still bringing the cluster up
    pub fn is_provisioning(&self) -> bool {
        matches!(
            self,
            Self::Validating | Self::Waiting | Self::Pending | Self::Installing
        )
    }

    /// State name as the service spells it
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Validating => "validating",
            Self::Waiting => "waiting",
            Self::Pending => "pending",
            Self::Installing => "installing",
            Self::Ready => "ready",
            Self::Error => "error",
            Self::Uninstalling => "uninstalling",
            Self::Hibernating => "hibernating",
            Self::PoweringDown => "powering_down",
            Self::Resuming => "resuming",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for ClusterState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A cluster known to the service
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalCluster {
    /// Service-assigned identifier
    pub id: String,
    /// Cluster name
    #[serde(default)]
    pub name: String,
    /// Lifecycle state
    #[serde(default)]
    pub state: ClusterState,
    /// API server endpoint, present once installed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api: Option<UrlRef>,
    /// Web console, present once installed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub console: Option<UrlRef>,
    /// Extra detail about the state
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ClusterStatusDetail>,
}

impl ExternalCluster {
    /// Human-readable reason the cluster is in an error state, if given
    pub fn error_message(&self) -> Option<&str> {
        let status = self.status.as_ref()?;
        status
            .provision_error_message
            .as_deref()
            .filter(|m| !m.is_empty())
            .or(status.description.as_deref().filter(|m| !m.is_empty()))
    }

    /// Host and port of the API server, taken from its URL.
    ///
    /// IPv6 hosts are returned without brackets. A URL without an explicit
    /// port gets its scheme's default.
    pub fn api_endpoint(&self) -> Option<(String, i32)> {
        let url = Url::parse(&self.api.as_ref()?.url).ok()?;
        let host = url.host_str()?.trim_start_matches('[').trim_end_matches(']');
        if host.is_empty() {
            return None;
        }
        let port = url.port_or_known_default()?;
        Some((host.to_string(), i32::from(port)))
    }
}

/// Object carrying a URL
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrlRef {
    /// Absolute URL
    #[serde(default)]
    pub url: String,
}

/// Detail attached to the cluster state
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterStatusDetail {
    /// Free-form description of the state
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Reason installation failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provision_error_message: Option<String>,
}

/// Page of clusters returned by a search
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ClusterList {
    /// Matching clusters
    #[serde(default)]
    pub items: Vec<ExternalCluster>,
}

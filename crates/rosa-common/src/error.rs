//! Error types for the ROSA control plane controller
//!
//! Errors are structured with fields to aid debugging in production.
//! Each variant carries the object or cluster it relates to so that
//! log lines and status conditions can name the failing resource.

use thiserror::Error;

/// Default context value when no specific context is available
pub const UNKNOWN_CONTEXT: &str = "unknown";

/// Main error type for control plane reconciliation
#[derive(Debug, Error)]
pub enum Error {
    /// Kubernetes API error
    #[error("kubernetes error: {source}")]
    Kube {
        /// The underlying kube-rs error
        #[from]
        source: kube::Error,
    },

    /// Optimistic concurrency failure: the object changed since it was read
    #[error("conflict writing {kind} {name}: {message}")]
    Conflict {
        /// Kind of the object being written
        kind: String,
        /// namespace/name of the object
        name: String,
        /// Which field or precondition conflicted
        message: String,
    },

    /// External cluster-management service error
    #[error("external service error for {cluster}: {message}")]
    ExternalService {
        /// Name of the external cluster the call was about
        cluster: String,
        /// Description of what failed
        message: String,
        /// HTTP status returned by the service, if any
        status: Option<u16>,
    },

    /// A scope was built from missing inputs (programming error)
    #[error("invalid scope: {message}")]
    InvalidScope {
        /// Which input was missing
        message: String,
    },

    /// Validation error for CRD specs
    #[error("validation error for {object}: {message}")]
    Validation {
        /// namespace/name of the object with invalid configuration
        object: String,
        /// Description of what's invalid
        message: String,
    },

    /// Serialization/deserialization error
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of what failed
        message: String,
    },

    /// Reconcile exceeded its deadline
    #[error("reconcile of {object} timed out after {seconds}s")]
    Timeout {
        /// namespace/name of the object being reconciled
        object: String,
        /// Deadline that elapsed
        seconds: u64,
    },

    /// Internal/operational error
    #[error("internal error [{context}]: {message}")]
    Internal {
        /// Description of what failed
        message: String,
        /// Context where the error occurred (e.g., "scope", "store", "token")
        context: String,
    },
}

impl Error {
    /// Create a conflict error for an object
    pub fn conflict(
        kind: impl Into<String>,
        name: impl Into<String>,
        msg: impl Into<String>,
    ) -> Self {
        Self::Conflict {
            kind: kind.into(),
            name: name.into(),
            message: msg.into(),
        }
    }

    /// Create an external service error without an HTTP status
    pub fn external(cluster: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::ExternalService {
            cluster: cluster.into(),
            message: msg.into(),
            status: None,
        }
    }

    /// Create an external service error carrying the HTTP status code
    pub fn external_with_status(
        cluster: impl Into<String>,
        status: u16,
        msg: impl Into<String>,
    ) -> Self {
        Self::ExternalService {
            cluster: cluster.into(),
            message: msg.into(),
            status: Some(status),
        }
    }

    /// Create an invalid scope error
    pub fn invalid_scope(msg: impl Into<String>) -> Self {
        Self::InvalidScope {
            message: msg.into(),
        }
    }

    /// Create a validation error for an object
    pub fn validation_for(object: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Validation {
            object: object.into(),
            message: msg.into(),
        }
    }

    /// Create a serialization error with the given message
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
        }
    }

    /// Create an internal error with the given message
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal {
            message: msg.into(),
            context: UNKNOWN_CONTEXT.to_string(),
        }
    }

    /// Create an internal error with context
    pub fn internal_with_context(context: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Internal {
            message: msg.into(),
            context: context.into(),
        }
    }

    /// Check if this error is retryable
    ///
    /// Invalid scopes, validation and serialization errors need a code or
    /// spec change. Conflicts resolve on the next read. External service
    /// errors are retryable unless the service rejected the request outright.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Kube { source } => !matches!(
                source,
                kube::Error::Api(ae)
                    if (400..500).contains(&ae.code) && ae.code != 409 && ae.code != 429
            ),
            Error::Conflict { .. } => true,
            Error::ExternalService { status, .. } => {
                !matches!(
                    status,
                    Some(code) if (400..500).contains(code) && *code != 409 && *code != 429
                )
            }
            Error::InvalidScope { .. } => false,
            Error::Validation { .. } => false,
            Error::Serialization { .. } => false,
            Error::Timeout { .. } => true,
            Error::Internal { .. } => true,
        }
    }

    /// Check if this error is an optimistic concurrency conflict
    pub fn is_conflict(&self) -> bool {
        match self {
            Error::Conflict { .. } => true,
            Error::Kube { source } => crate::kube_utils::is_conflict(source),
            _ => false,
        }
    }

    /// Get the HTTP status code from the external service, if any
    pub fn external_status(&self) -> Option<u16> {
        match self {
            Error::ExternalService { status, .. } => *status,
            _ => None,
        }
    }
}

//! Provider error types and kube-rs error mapping
//!
//! Not-found and already-exists are expected conditions that callers branch
//! on, so they get dedicated variants instead of being folded into the
//! transport error.

use crate::registry::ProviderKind;
use thiserror::Error;

/// Errors returned by providers and their collaborators
#[derive(Debug, Error)]
pub enum ProviderError {
    /// No factory registered under the name
    #[error("No {kind} provider registered as '{name}'")]
    ProviderNotFound { kind: ProviderKind, name: String },

    /// A factory is already registered under the name
    #[error("Duplicate {kind} provider registration '{name}'")]
    DuplicateProvider { kind: ProviderKind, name: String },

    /// Remote resource not found
    #[error("Resource not found: {kind}/{name} in namespace {namespace}")]
    ResourceNotFound {
        kind: String,
        name: String,
        namespace: String,
    },

    /// Remote resource already exists
    #[error("Resource already exists: {kind}/{name} in namespace {namespace}")]
    AlreadyExists {
        kind: String,
        name: String,
        namespace: String,
    },

    /// Write rejected because of a concurrent modification
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Observed document lacks a field or has the wrong shape
    #[error("Malformed document: {path} is not {expected}")]
    MalformedDocument { path: String, expected: &'static str },

    /// Feature used before its one-time initialization
    #[error("Feature '{0}' is not initialized")]
    FeatureNotInitialized(String),

    /// Member probe failed
    #[error("Probe error: {0}")]
    Probe(String),

    /// Cluster descriptor failed validation
    #[error("Invalid cluster descriptor: {0}")]
    InvalidDescriptor(#[from] kstone_common::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Error from kube-rs client
    #[cfg(feature = "kubernetes")]
    #[error("Kubernetes API error: {0}")]
    KubeError(#[from] kube::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ProviderError {
    pub fn malformed(path: &[&str], expected: &'static str) -> Self {
        let path = if path.is_empty() {
            "<root>".to_string()
        } else {
            path.join(".")
        };
        ProviderError::MalformedDocument { path, expected }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            ProviderError::ResourceNotFound { .. } | ProviderError::ProviderNotFound { .. }
        )
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, ProviderError::AlreadyExists { .. })
    }

    /// Map a kube-rs error for one resource onto the provider taxonomy
    #[cfg(feature = "kubernetes")]
    pub fn from_kube(err: kube::Error, kind: &str, namespace: &str, name: &str) -> Self {
        match err {
            kube::Error::Api(ae) if ae.code == 404 => ProviderError::ResourceNotFound {
                kind: kind.to_string(),
                name: name.to_string(),
                namespace: namespace.to_string(),
            },
            kube::Error::Api(ae) if ae.code == 409 && ae.reason == "AlreadyExists" => {
                ProviderError::AlreadyExists {
                    kind: kind.to_string(),
                    name: name.to_string(),
                    namespace: namespace.to_string(),
                }
            }
            kube::Error::Api(ae) if ae.code == 409 => ProviderError::Conflict(ae.message),
            other => ProviderError::KubeError(other),
        }
    }
}

impl From<ProviderError> for kstone_common::Error {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::InvalidDescriptor(inner) => inner,
            other => kstone_common::Error::System(other.to_string()),
        }
    }
}

/// Result type alias for provider operations
pub type ProviderResult<T> = std::result::Result<T, ProviderError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_classification() {
        let err = ProviderError::ResourceNotFound {
            kind: "EtcdCluster".to_string(),
            name: "a".to_string(),
            namespace: "ns".to_string(),
        };
        assert!(err.is_not_found());
        assert!(!err.is_already_exists());
        assert_eq!(
            err.to_string(),
            "Resource not found: EtcdCluster/a in namespace ns"
        );
    }

    #[test]
    fn test_malformed_path() {
        let err = ProviderError::malformed(&["spec", "template", "env"], "a list");
        assert_eq!(
            err.to_string(),
            "Malformed document: spec.template.env is not a list"
        );

        let err = ProviderError::malformed(&[], "an object");
        assert_eq!(err.to_string(), "Malformed document: <root> is not an object");
    }

    #[cfg(feature = "kubernetes")]
    #[test]
    fn test_kube_error_mapping() {
        let api_err = |code: u16, reason: &str| {
            kube::Error::Api(kube::core::ErrorResponse {
                status: "Failure".to_string(),
                message: format!("{} happened", reason),
                reason: reason.to_string(),
                code,
            })
        };

        let err = ProviderError::from_kube(api_err(404, "NotFound"), "EtcdCluster", "ns", "a");
        assert!(err.is_not_found());

        let err =
            ProviderError::from_kube(api_err(409, "AlreadyExists"), "EtcdCluster", "ns", "a");
        assert!(err.is_already_exists());

        let err = ProviderError::from_kube(api_err(409, "Conflict"), "EtcdCluster", "ns", "a");
        assert!(matches!(err, ProviderError::Conflict(_)));

        let err = ProviderError::from_kube(api_err(500, "InternalError"), "EtcdCluster", "ns", "a");
        assert!(matches!(err, ProviderError::KubeError(_)));
    }
}

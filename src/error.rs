//! Error types for the sync core
//!
//! Errors are structured with fields to aid debugging in production. Each
//! variant carries the context a caller needs to act on it: which external
//! target was involved, how many attempts were spent, which cache token was
//! malformed.

use thiserror::Error;

/// Default context value when no specific context is available
pub const UNKNOWN_CONTEXT: &str = "unknown";

/// Main error type for vipsync operations
#[derive(Debug, Error)]
pub enum Error {
    /// Kubernetes API error
    #[error("kubernetes error: {source}")]
    Kube {
        /// The underlying kube-rs error
        #[from]
        source: kube::Error,
    },

    /// A composite "namespace/name" cache token did not split into exactly
    /// two components
    #[error("malformed namespace/name token: {token:?}")]
    MalformedKey {
        /// The offending token as found in the cache record
        token: String,
    },

    /// Input validation error on a status operation
    #[error("validation error for {target}: {message}")]
    Validation {
        /// The external resource the operation was aimed at ("namespace/name")
        target: String,
        /// Description of what's invalid
        message: String,
    },

    /// A status write kept failing until the attempt cap was reached
    #[error("{operation} for {namespace}/{name} gave up after {attempts} attempts")]
    RetriesExhausted {
        /// The reconciler operation that was retried
        operation: String,
        /// Namespace of the external target
        namespace: String,
        /// Name of the external target
        name: String,
        /// Total attempts spent, including the first
        attempts: u32,
    },

    /// Serialization/deserialization error
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of what failed
        message: String,
    },

    /// Internal/operational error
    #[error("internal error [{context}]: {message}")]
    Internal {
        /// Description of what failed
        message: String,
        /// Context where the error occurred (e.g., "reconciler", "resync")
        context: String,
    },
}

impl Error {
    /// Create a malformed-key error for a composite cache token
    pub fn malformed_key(token: impl Into<String>) -> Self {
        Self::MalformedKey {
            token: token.into(),
        }
    }

    /// Create a validation error for a specific external target
    pub fn validation_for(target: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Validation {
            target: target.into(),
            message: msg.into(),
        }
    }

    /// Create a retries-exhausted error for a single status-update target
    pub fn retries_exhausted(
        operation: impl Into<String>,
        namespace: impl Into<String>,
        name: impl Into<String>,
        attempts: u32,
    ) -> Self {
        Self::RetriesExhausted {
            operation: operation.into(),
            namespace: namespace.into(),
            name: name.into(),
            attempts,
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
    /// Malformed keys, validation failures, and serialization errors require
    /// a config or code fix and are never retried. Kubernetes errors depend
    /// on the status code: write conflicts (409) and transport/5xx failures
    /// are transient, other 4xx responses are not. A retries-exhausted error
    /// is terminal by definition.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Kube { source } => match source {
                kube::Error::Api(ae) => ae.code == 409 || !(400..500).contains(&ae.code),
                _ => true,
            },
            Error::MalformedKey { .. } => false,
            Error::Validation { .. } => false,
            Error::RetriesExhausted { .. } => false,
            Error::Serialization { .. } => false,
            Error::Internal { .. } => true,
        }
    }

    /// Get the external target if this error names one
    pub fn target(&self) -> Option<String> {
        match self {
            Error::Validation { target, .. } => Some(target.clone()),
            Error::RetriesExhausted {
                namespace, name, ..
            } => Some(format!("{}/{}", namespace, name)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conflict_error() -> Error {
        Error::Kube {
            source: kube::Error::Api(kube::error::ErrorResponse {
                status: "Failure".to_string(),
                message: "Operation cannot be fulfilled".to_string(),
                reason: "Conflict".to_string(),
                code: 409,
            }),
        }
    }

    fn not_found_error() -> Error {
        Error::Kube {
            source: kube::Error::Api(kube::error::ErrorResponse {
                status: "Failure".to_string(),
                message: "ingresses.networking.k8s.io \"web\" not found".to_string(),
                reason: "NotFound".to_string(),
                code: 404,
            }),
        }
    }

    /// Story: a malformed SNI fan-out token is a hard error, not a skip
    ///
    /// The cache carries composite "namespace/name" tokens for hostname
    /// sharding. A token that does not split cleanly means the cache record
    /// itself is corrupt; retrying cannot fix it.
    #[test]
    fn story_malformed_token_is_a_hard_error() {
        let err = Error::malformed_key("default");
        assert!(err.to_string().contains("malformed"));
        assert!(err.to_string().contains("default"));
        assert!(!err.is_retryable());
    }

    /// Story: write conflicts retry, other client errors do not
    ///
    /// The retry loop exists to absorb optimistic-concurrency conflicts.
    /// A 404 on fetch means the resource legitimately does not exist yet and
    /// the watch loop will re-trigger; retrying here would be wasted work.
    #[test]
    fn story_conflicts_are_retryable_not_found_is_not() {
        assert!(conflict_error().is_retryable());
        assert!(!not_found_error().is_retryable());
    }

    /// Story: exhausted retries surface which target kept failing
    #[test]
    fn story_retries_exhausted_names_the_target() {
        let err = Error::retries_exhausted("apply_ingress_status", "prod", "web", 3);
        assert!(err.to_string().contains("prod/web"));
        assert!(err.to_string().contains("3 attempts"));
        assert_eq!(err.target(), Some("prod/web".to_string()));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_validation_error_carries_target() {
        let err = Error::validation_for("prod/db-lb", "expected exactly one hostname, got 2");
        assert!(err.to_string().contains("prod/db-lb"));
        assert_eq!(err.target(), Some("prod/db-lb".to_string()));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_internal_error_default_context() {
        let err = Error::internal("unexpected state");
        assert!(err.to_string().contains("[unknown]"));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_internal_error_with_context() {
        let err = Error::internal_with_context("resync", "walk aborted");
        assert!(err.to_string().contains("[resync]"));
        assert!(err.to_string().contains("walk aborted"));
    }

    #[test]
    fn test_serialization_error_not_retryable() {
        let err = Error::serialization("invalid status payload");
        assert!(!err.is_retryable());
        assert_eq!(err.target(), None);
    }
}

//! Error types for the devinfra operator
//!
//! Errors carry enough context (resource names, the operation that failed)
//! to be useful in logs and Requirement conditions. The variants map directly
//! onto how the reconciler reacts to them: conflicts requeue immediately,
//! validation errors wait for a spec change, everything else backs off.

use thiserror::Error;

/// Default context value when no specific context is available
pub const UNKNOWN_CONTEXT: &str = "unknown";

/// Main error type for devinfra controllers
#[derive(Debug, Error)]
pub enum Error {
    /// Kubernetes API error
    #[error("kubernetes error: {source}")]
    Kube {
        /// The underlying kube-rs error
        #[from]
        source: kube::Error,
    },

    /// Optimistic-concurrency collision, or a precondition that no longer
    /// holds between read and write
    #[error("conflict on {kind} {name}: {message}")]
    Conflict {
        /// Resource kind that was being written
        kind: String,
        /// Resource name
        name: String,
        /// What collided
        message: String,
    },

    /// A resource the reconciler depends on does not exist
    #[error("{kind} {name} not found")]
    NotFound {
        /// Resource kind
        kind: String,
        /// Resource name
        name: String,
    },

    /// Invalid Requirement spec; permanent until the user edits the resource
    #[error("invalid spec for {resource}: {message}")]
    Validation {
        /// Name of the resource with the invalid spec
        resource: String,
        /// Description of what's invalid
        message: String,
        /// The invalid field path (e.g., "spec.template.applications[0].name")
        field: Option<String>,
    },

    /// Serialization/deserialization error
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of what failed
        message: String,
    },

    /// A single reconciliation exceeded its deadline
    #[error("reconciliation of {resource} timed out after {seconds}s")]
    Timeout {
        /// The resource being reconciled
        resource: String,
        /// The deadline that was exceeded
        seconds: u64,
    },

    /// Internal/operational error
    #[error("internal error [{context}]: {message}")]
    Internal {
        /// Description of what failed
        message: String,
        /// Where the error occurred (e.g., "reconciler", "runner")
        context: String,
    },
}

impl Error {
    /// Create a conflict error for a resource
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

    /// Create a not-found error for a resource
    pub fn not_found(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self::NotFound {
            kind: kind.into(),
            name: name.into(),
        }
    }

    /// Create a validation error without resource context
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            resource: UNKNOWN_CONTEXT.to_string(),
            message: msg.into(),
            field: None,
        }
    }

    /// Create a validation error naming the offending field
    pub fn validation_for_field(field: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Validation {
            resource: UNKNOWN_CONTEXT.to_string(),
            message: msg.into(),
            field: Some(field.into()),
        }
    }

    /// Attach the resource name to a validation error
    pub fn for_resource(self, name: impl Into<String>) -> Self {
        match self {
            Self::Validation { message, field, .. } => Self::Validation {
                resource: name.into(),
                message,
                field,
            },
            other => other,
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

    /// True for optimistic-concurrency collisions, including raw 409s from the API server
    pub fn is_conflict(&self) -> bool {
        match self {
            Error::Conflict { .. } => true,
            Error::Kube { source } => is_kube_conflict(source),
            _ => false,
        }
    }

    /// Check if this error is retryable
    ///
    /// Validation and serialization errors need a spec or code change.
    /// Kubernetes 4xx errors other than 409/429 are not retried either.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Kube { source } => match source {
                kube::Error::Api(ae) => {
                    !(400..500).contains(&ae.code) || ae.code == 409 || ae.code == 429
                }
                _ => true,
            },
            Error::Conflict { .. } => true,
            Error::NotFound { .. } => true,
            Error::Validation { .. } => false,
            Error::Serialization { .. } => false,
            Error::Timeout { .. } => true,
            Error::Internal { .. } => true,
        }
    }

    /// Short label used for metrics and log fields
    pub fn kind_label(&self) -> &'static str {
        match self {
            Error::Kube { .. } => "kube",
            Error::Conflict { .. } => "conflict",
            Error::NotFound { .. } => "not_found",
            Error::Validation { .. } => "validation",
            Error::Serialization { .. } => "serialization",
            Error::Timeout { .. } => "timeout",
            Error::Internal { .. } => "internal",
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::serialization(e.to_string())
    }
}

/// True if the kube error is an HTTP 409 from the API server
pub fn is_kube_conflict(err: &kube::Error) -> bool {
    matches!(err, kube::Error::Api(ae) if ae.code == 409)
}

/// True if the kube error is an HTTP 404 from the API server
pub fn is_kube_not_found(err: &kube::Error) -> bool {
    matches!(err, kube::Error::Api(ae) if ae.code == 404)
}

/// Convert a kube error from a call on a named resource, turning a 404 into
/// [`Error::NotFound`]
pub fn for_named(kind: &str, name: &str, err: kube::Error) -> Error {
    if is_kube_not_found(&err) {
        Error::not_found(kind, name)
    } else {
        err.into()
    }
}

//! Error types for the clusterclaims controller
//!
//! Errors are structured with fields to aid debugging in production.
//! Not-found lookups never reach this type: the object store turns them into
//! `Ok(None)` / `Ok(())` before they can be mistaken for a failure.

use thiserror::Error;

use crate::kind_registry::RecordKind;

/// Main error type for clusterclaims operations
#[derive(Debug, Error)]
pub enum Error {
    /// Kubernetes API error
    #[error("kubernetes error: {source}")]
    Kube {
        /// The underlying kube-rs error
        #[from]
        source: kube::Error,
    },

    /// A record kind has no API mapping in the kind registry
    #[error("record kind {kind:?} is not registered with the API server")]
    UnknownKind {
        /// The kind that could not be resolved
        kind: RecordKind,
    },

    /// Serialization/deserialization error
    #[error("serialization error for {kind}: {message}")]
    Serialization {
        /// Description of what failed
        message: String,
        /// The record kind being converted
        kind: String,
    },
}

impl Error {
    /// Create a serialization error with record kind context
    pub fn serialization_for_kind(kind: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
            kind: kind.into(),
        }
    }

    /// Check if this error is retryable
    ///
    /// Serialization errors need a fixed binary. Kubernetes errors are
    /// retryable unless the server rejected the request outright (4xx other
    /// than conflict and throttling).
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Kube { source } => match source {
                kube::Error::Api(ae) => {
                    !(400..500).contains(&ae.code) || ae.code == 409 || ae.code == 429
                }
                _ => true,
            },
            Error::UnknownKind { .. } => true,
            Error::Serialization { .. } => false,
        }
    }

    /// Short label used for the `error_type` metric attribute
    pub fn kind_label(&self) -> &'static str {
        match self {
            Error::Kube { .. } => "kube",
            Error::UnknownKind { .. } => "unknown_kind",
            Error::Serialization { .. } => "serialization",
        }
    }
}

/// Returns true when a kube error is an API 404
pub fn is_not_found(err: &kube::Error) -> bool {
    matches!(err, kube::Error::Api(ae) if ae.code == 404)
}

//! Error types for the versioned resource client
//!
//! Provides a single error enum covering transport failures, missing
//! objects, write-visibility timeouts and request cancellation.

use thiserror::Error;

/// Unified error type for the resource client
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Internal Errors
    // =========================================================================
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    // =========================================================================
    // Transport Errors
    // =========================================================================
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    #[error("Transport error during {operation}: {reason}")]
    Transport { operation: String, reason: String },

    #[error("Resource not found: {kind}/{name}")]
    NotFound { kind: String, name: String },

    #[error("Resource already exists: {kind}/{name}")]
    AlreadyExists { kind: String, name: String },

    #[error("Conflict on {kind}/{name}: {reason}")]
    Conflict {
        kind: String,
        name: String,
        reason: String,
    },

    #[error("Invalid resource object: {0}")]
    InvalidObject(String),

    // =========================================================================
    // Consistency Errors
    // =========================================================================
    #[error("Search index did not reflect {operation} of {name} after {attempts} attempts")]
    VisibilityTimeout {
        operation: String,
        name: String,
        attempts: u32,
    },

    // =========================================================================
    // Request Lifecycle Errors
    // =========================================================================
    #[error("Request cancelled")]
    Cancelled,

    #[error("Request deadline exceeded")]
    DeadlineExceeded,

    // =========================================================================
    // Metrics Errors
    // =========================================================================
    #[error("Metrics registration error: {0}")]
    Metrics(#[from] prometheus::Error),

    // =========================================================================
    // Parse Errors
    // =========================================================================
    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("YAML parse error: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Shorthand for a not-found error on a resource kind
    pub fn not_found(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Error::NotFound {
            kind: kind.into(),
            name: name.into(),
        }
    }

    /// Shorthand for an opaque transport failure
    pub fn transport(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::Transport {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    /// Check if the target object does not exist
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::NotFound { .. } => true,
            Error::Kube(kube::Error::Api(resp)) => resp.code == 404,
            _ => false,
        }
    }

    /// Check if the write went through but the search index lagged behind
    pub fn is_visibility_timeout(&self) -> bool {
        matches!(self, Error::VisibilityTimeout { .. })
    }

    /// Check if the request was aborted by its caller
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Error::Cancelled | Error::DeadlineExceeded)
    }

    /// Check if this error is transient
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Transport { .. } | Error::VisibilityTimeout { .. } => true,
            Error::Kube(kube::Error::Api(resp)) => resp.code == 429 || resp.code >= 500,
            Error::Kube(_) => true,
            _ => false,
        }
    }
}

/// Result type alias for the resource client
pub type Result<T> = std::result::Result<T, Error>;

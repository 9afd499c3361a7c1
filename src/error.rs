//! Central error types for the uptime operator
//!
//! Uses `thiserror` for ergonomic, type-safe error handling with
//! automatic `Display` and `Error` trait implementations.

use thiserror::Error;

/// Why persisting a finalizer change on a watched resource failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistFailure {
    /// The resource changed since it was observed
    Conflict,
    /// The resource no longer exists
    NotFound,
    /// Any other API failure
    Other,
}

/// Central error type for the uptime operator
#[derive(Error, Debug)]
pub enum Error {
    /// Kubernetes API error from kube-rs
    #[error("Kubernetes API error: {0}")]
    KubeError(#[from] kube::Error),

    /// JSON serialization error
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Network failure talking to a provider or the notification sink
    #[error("HTTP request error: {0}")]
    HttpError(#[from] reqwest::Error),

    /// Missing or malformed uptime check annotation
    #[error("invalid uptime check annotations on '{resource}': {message}")]
    ValidationError { resource: String, message: String },

    /// Provider answered with an unexpected HTTP status
    #[error("got status {status}, expected {expected}. Body: {body}")]
    TransportError {
        status: u16,
        expected: String,
        body: String,
    },

    /// Provider answered with a body we could not understand
    #[error("Malformed provider response: {0}")]
    DecodeError(String),

    /// Adding or removing the finalizer on a watched resource failed
    #[error("Failed to update finalizers of {resource} ({kind:?}): {message}")]
    FinalizerPersistError {
        resource: String,
        kind: PersistFailure,
        message: String,
    },

    /// Configuration validation error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// The metrics or probe server could not bind or stopped serving
    #[error("HTTP server error on {addr}: {message}")]
    ServerError { addr: String, message: String },

    /// A wait was abandoned because the surrounding context was cancelled
    #[error("Operation cancelled")]
    Cancelled,
}

/// Result type alias for operator operations
pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    /// Build a validation error for the given watched resource
    pub fn validation(resource: &str, message: impl Into<String>) -> Self {
        Error::ValidationError {
            resource: resource.to_string(),
            message: message.into(),
        }
    }

    /// Classify a failed conditional update of a watched resource
    pub fn finalizer_persist(resource: &str, err: &kube::Error) -> Self {
        let kind = match err {
            kube::Error::Api(resp) if resp.code == 404 => PersistFailure::NotFound,
            kube::Error::Api(resp) if resp.code == 409 => PersistFailure::Conflict,
            _ => PersistFailure::Other,
        };
        Error::FinalizerPersistError {
            resource: resource.to_string(),
            kind,
            message: err.to_string(),
        }
    }

    /// Check if this error type should trigger a quick retry
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            Error::KubeError(_)
                | Error::HttpError(_)
                | Error::TransportError { .. }
                | Error::DecodeError(_)
                | Error::FinalizerPersistError { .. }
        )
    }

    /// True when the watched resource is already gone, which callers may ignore
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::FinalizerPersistError { kind, .. } => *kind == PersistFailure::NotFound,
            Error::KubeError(kube::Error::Api(resp)) => resp.code == 404,
            _ => false,
        }
    }

    /// Short label used for the reconcile error metric
    pub fn metric_label(&self) -> &'static str {
        match self {
            Error::KubeError(_) => "kube",
            Error::SerializationError(_) => "serialization",
            Error::HttpError(_) => "http",
            Error::ValidationError { .. } => "validation",
            Error::TransportError { .. } => "transport",
            Error::DecodeError(_) => "decode",
            Error::FinalizerPersistError { .. } => "finalizer",
            Error::ConfigError(_) => "config",
            Error::ServerError { .. } => "server",
            Error::Cancelled => "cancelled",
        }
    }
}

//! Error types for Whatsupdoc.
//!
//! This module defines a unified error enum that covers every failure the
//! request pipeline can see: configuration, I/O, the generative model, the
//! retrieval service, prompt rendering, the messaging platform and timeouts.
//! Errors are also classified into an [`ErrorKind`] so callers can decide
//! whether to retry and which user-facing message to show.

use thiserror::Error;

/// Unified error type for Whatsupdoc.
///
/// All fallible functions in the workspace return `Result<T, AppError>`.
/// A single bad request must never take the process down, so errors are
/// represented and propagated, never panicked on.
#[derive(Error, Debug)]
pub enum AppError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O and filesystem errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generative model errors
    #[error("LLM error: {0}")]
    Llm(String),

    /// Vector retrieval service errors
    #[error("Retrieval error: {0}")]
    Retrieval(String),

    /// Prompt system errors
    #[error("Prompt error: {0}")]
    Prompt(String),

    /// Messaging platform errors (Slack Web API, webhook payloads)
    #[error("Platform error: {0}")]
    Platform(String),

    /// An external call exceeded its time budget
    #[error("{service} request timed out after {seconds}s")]
    Timeout {
        /// Name of the external service
        service: &'static str,
        /// The budget that was exceeded
        seconds: u64,
    },

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic errors
    #[error("{0}")]
    Other(String),
}

/// Coarse classification of an [`AppError`].
///
/// Used to pick a retry policy and a user-facing message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The request itself is malformed
    InvalidInput,
    /// Temporary unavailability, worth retrying
    Transient,
    /// The call did not finish in time, worth retrying
    Timeout,
    /// Quota or capacity exhausted
    Capacity,
    /// Credentials rejected
    Authentication,
    /// The backend explicitly does not implement the operation
    Unavailable,
    /// Anything else
    Internal,
}

impl AppError {
    /// Classify this error.
    ///
    /// Remote services report most failures as free text, so classification
    /// inspects the rendered message for known markers. Checks run from the
    /// most to the least specific.
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::Timeout { .. } => return ErrorKind::Timeout,
            AppError::Config(_) | AppError::Prompt(_) => return ErrorKind::Internal,
            AppError::Serialization(_) => return ErrorKind::InvalidInput,
            _ => {}
        }

        let text = self.to_string().to_lowercase();
        let has = |needles: &[&str]| needles.iter().any(|n| text.contains(n));

        if has(&["not implemented", "unimplemented", "(501"]) {
            ErrorKind::Unavailable
        } else if has(&["quota", "rate limit", "rate_limited", "resource_exhausted", "(429"]) {
            ErrorKind::Capacity
        } else if has(&[
            "unauthorized",
            "unauthenticated",
            "authentication",
            "permission",
            "(401",
            "(403",
        ]) {
            ErrorKind::Authentication
        } else if has(&["timeout", "timed out", "deadline"]) {
            ErrorKind::Timeout
        } else if has(&["unavailable", "(502", "(503", "(504", "connection", "reset by peer"]) {
            ErrorKind::Transient
        } else {
            ErrorKind::Internal
        }
    }

    /// Whether a bounded retry may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::Transient | ErrorKind::Timeout)
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for AppError {
    fn from(err: serde_yaml::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

/// Convenience type alias for Results with AppError.
pub type AppResult<T> = Result<T, AppError>;

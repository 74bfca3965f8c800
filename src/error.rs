//! Failure taxonomy shared by the remote client, the concurrency layer and the
//! export/reimport pipeline.
//!
//! Every variant maps onto a [`FailureClass`], which is what the rate limiter and the
//! retry policy branch on. The HTTP status mapping lives in [`Error::from_status`].

use reqwest::StatusCode;

/// Coarse classification of a failure, used to decide how the wrappers react.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Transient remote or IO failure, worth another attempt
    Transient,
    /// The remote service asked us to slow down
    RateLimited,
    /// Never retried (schema mismatch, cancellation)
    Fatal,
    /// Bug or broken invariant on our side
    Programmer,
}

/// Errors produced while talking to the remote API or moving table data around
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Resource does not exist (HTTP 404)
    #[error("not found: {0}")]
    NotFound(String),

    /// Remote rate limit exceeded (HTTP 429)
    #[error("rate limit exceeded: {0}")]
    RateLimited(String),

    /// Unexpected content type or missing field in a response
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// A mutation did not answer with the accepted status
    #[error("unexpected status for {endpoint}: expected {expected}, got {actual}")]
    UnexpectedStatus {
        /// Endpoint that was called
        endpoint: String,
        /// Status we expected
        expected: u16,
        /// Status we got
        actual: u16,
    },

    /// Any other non-success status
    #[error("remote error (status {status}): {message}")]
    Remote {
        /// HTTP status code
        status: u16,
        /// Message returned by the service
        message: String,
    },

    /// Transport failure (connect, timeout, reset)
    #[error("network error: {0}")]
    Network(String),

    /// Local snapshot and live remote table disagree
    #[error(
        "table '{table}' is incompatible: {}{property} mismatch (expected {expected:?}, found {found:?})",
        column.as_ref().map(|c| format!("column '{c}' ")).unwrap_or_default()
    )]
    SchemaIncompatible {
        /// Table name
        table: String,
        /// Offending column, if the mismatch is column-level
        column: Option<String>,
        /// Which property differs (name, type, calculated, presence)
        property: String,
        /// Value in the local snapshot
        expected: String,
        /// Value on the remote side
        found: String,
    },

    /// File system failure
    #[error("IO error: {0}")]
    Io(String),

    /// Operation abandoned because cancellation was requested
    #[error("operation cancelled")]
    Cancelled,

    /// Internal failure such as a panicked task or a broken invariant
    #[error("internal error: {0}")]
    Internal(String),
}

/// Result alias used across the crate
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Classify this failure for the rate limiter and the retry policy.
    pub fn class(&self) -> FailureClass {
        match self {
            Error::RateLimited(_) => FailureClass::RateLimited,
            Error::Network(_) | Error::Io(_) => FailureClass::Transient,
            Error::Remote { status, .. } if *status >= 500 => FailureClass::Transient,
            Error::SchemaIncompatible { .. } | Error::Cancelled => FailureClass::Fatal,
            Error::Internal(_) => FailureClass::Programmer,
            // Client-side status problems and bad payloads: not transient in principle,
            // but the default retry mode still retries them.
            Error::NotFound(_)
            | Error::MalformedResponse(_)
            | Error::UnexpectedStatus { .. }
            | Error::Remote { .. } => FailureClass::Programmer,
        }
    }

    /// Whether this is the rate-limit signal absorbed by the rate limiter.
    pub fn is_rate_limited(&self) -> bool {
        self.class() == FailureClass::RateLimited
    }

    /// Map a non-success HTTP status and body message to an error.
    pub fn from_status(status: StatusCode, message: impl Into<String>) -> Self {
        let message = message.into();
        match status.as_u16() {
            404 => Error::NotFound(message),
            429 => Error::RateLimited(message),
            code => Error::Remote {
                status: code,
                message,
            },
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            return Error::MalformedResponse(err.to_string());
        }
        if let Some(status) = err.status() {
            return Error::from_status(status, err.to_string());
        }
        Error::Network(err.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::MalformedResponse(err.to_string())
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(err: tokio::task::JoinError) -> Self {
        if err.is_cancelled() {
            Error::Cancelled
        } else {
            Error::Internal(format!("task panicked: {err}"))
        }
    }
}

//! Call-side error taxonomy
//!
//! Every failed call to the authorization server ends up as exactly one
//! [`CallError`]. HTTP-level failures carry a [`ClassifiedError`] whose
//! [`ErrorKind`] is drawn from a closed set, so callers can `match` on it
//! exhaustively instead of inspecting status codes or message strings.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Closed classification of an HTTP failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "status")]
pub enum ErrorKind {
    /// 401 - the client credentials were rejected
    CredentialsInvalid,
    /// 404 - generic resource not found
    NotFound,
    /// 404 whose message names a realm
    RealmNotFound,
    /// 409 - the resource already exists or was modified concurrently
    Conflict,
    /// 400 - the server rejected the request as malformed or not allowed
    InvalidOperation,
    /// 403 - authenticated but not permitted
    Forbidden,
    /// 503 - upstream unavailable, also used to report an open circuit
    ServiceUnavailable,
    /// 500, 502 or 504
    ServerError,
    /// Any other status, retained verbatim
    Unclassified(u16),
}

impl ErrorKind {
    /// Short stable label, suitable for log fields and metric tags
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CredentialsInvalid => "credentials_invalid",
            Self::NotFound => "not_found",
            Self::RealmNotFound => "realm_not_found",
            Self::Conflict => "conflict",
            Self::InvalidOperation => "invalid_operation",
            Self::Forbidden => "forbidden",
            Self::ServiceUnavailable => "service_unavailable",
            Self::ServerError => "server_error",
            Self::Unclassified(_) => "unclassified",
        }
    }

    /// Whether this kind is one of the two not-found variants
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound | Self::RealmNotFound)
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unclassified(status) => write!(f, "unclassified({status})"),
            other => f.write_str(other.as_str()),
        }
    }
}

/// An HTTP failure after classification
///
/// Produced by [`classify`](crate::classify::classify). The raw body is kept
/// for diagnostics; `message` is the human-readable part extracted from it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind} (HTTP {http_status}): {message}")]
pub struct ClassifiedError {
    /// Classification of the failure
    pub kind: ErrorKind,
    /// HTTP status code returned by the server
    pub http_status: u16,
    /// Message extracted from the response body
    pub message: String,
    /// Response body as received, `None` when the server sent nothing
    pub raw_body: Option<String>,
}

impl ClassifiedError {
    /// Failures worth another attempt: any 5xx and 408 Request Timeout.
    pub fn is_retryable(&self) -> bool {
        self.http_status == 408 || (500..=599).contains(&self.http_status)
    }
}

/// Failure of a call to the authorization server
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CallError {
    /// The server answered with a non-success status
    #[error(transparent)]
    Status(#[from] ClassifiedError),

    /// The request never produced a response (connect, TLS, I/O)
    #[error("transport failure: {message}")]
    Transport {
        /// Underlying error description
        message: String,
        /// Whether the HTTP client gave up because of its own timeout
        timed_out: bool,
    },

    /// A single attempt exceeded the per-attempt deadline
    #[error("attempt timed out after {0:?}")]
    Timeout(Duration),

    /// A success response could not be decoded
    #[error("failed to decode response: {0}")]
    Decode(String),

    /// The surrounding call was cancelled
    #[error("call cancelled")]
    Cancelled,
}

impl CallError {
    /// Error reported when the circuit breaker refuses to let a call through.
    pub fn circuit_open() -> Self {
        Self::Status(ClassifiedError {
            kind: ErrorKind::ServiceUnavailable,
            http_status: 503,
            message: "circuit open: calls to the authorization server are suspended".to_string(),
            raw_body: None,
        })
    }

    /// Whether the retry policy may be consulted for this failure
    ///
    /// Transport failures and per-attempt timeouts are transient; HTTP
    /// failures defer to [`ClassifiedError::is_retryable`]. Decode errors and
    /// cancellation are never retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Status(classified) => classified.is_retryable(),
            Self::Transport { .. } | Self::Timeout(_) => true,
            Self::Decode(_) | Self::Cancelled => false,
        }
    }

    /// The classification, when this failure came from an HTTP status
    pub fn classified(&self) -> Option<&ClassifiedError> {
        match self {
            Self::Status(classified) => Some(classified),
            _ => None,
        }
    }

    /// The error kind, when this failure came from an HTTP status
    pub fn kind(&self) -> Option<ErrorKind> {
        self.classified().map(|c| c.kind)
    }
}

impl From<reqwest::Error> for CallError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            Self::Decode(e.to_string())
        } else {
            Self::Transport {
                message: e.to_string(),
                timed_out: e.is_timeout(),
            }
        }
    }
}

//! Validation-side errors

use keygate_http::CallError;

/// Result alias for this crate
pub type AuthResult<T> = Result<T, AuthError>;

/// Why a token could not be turned into trusted claims
///
/// `KeySetUnavailable` is not a token error: it
/// means the key set could not be fetched, not that the token is bad.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AuthError {
    /// Malformed token, bad signature, unsupported algorithm or failed claim check
    #[error("invalid token: {0}")]
    InvalidToken(String),

    /// Signature is valid but `exp` is in the past
    #[error("token has expired")]
    ExpiredToken,

    /// No key with this id exists, even after a forced refresh
    #[error("signing key '{key_id}' not found in the key set")]
    KeyNotFound {
        /// The `kid` taken from the token header
        key_id: String,
    },

    /// The key set could not be fetched from the authorization server
    #[error("signing key set unavailable: {0}")]
    KeySetUnavailable(#[source] CallError),

    /// Settings that cannot be used to build a validator or key store
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
}

impl AuthError {
    pub(crate) fn invalid(reason: impl Into<String>) -> Self {
        Self::InvalidToken(reason.into())
    }

    /// Whether verification failed because of the authorization server
    /// rather than the token itself
    pub fn is_integration_failure(&self) -> bool {
        matches!(self, Self::KeySetUnavailable(_))
    }

    /// Whether the caller should treat this as a rejected token
    pub fn is_token_rejection(&self) -> bool {
        matches!(
            self,
            Self::InvalidToken(_) | Self::ExpiredToken | Self::KeyNotFound { .. }
        )
    }
}

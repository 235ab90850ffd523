//! Bearer token validation against a cached JWKS
//!
//! [`TokenValidator::validate`] turns a compact JWS into [`TokenClaims`]:
//! - Header decoding and `kid` extraction (no "try every key" fallback)
//! - Key resolution through the shared [`KeyStore`]
//! - Algorithm allow-list (RSA family only) and key/header `alg` agreement
//! - Signature verification, then `exp`/`nbf` with optional clock skew
//! - Optional issuer and audience checks
//! - Role normalization
//!
//! Results are never cached; every call re-verifies the token.

use super::claims::TokenClaims;
use super::jwks::KeyStore;
use crate::config::KeygateConfig;
use crate::error::{AuthError, AuthResult};
use jsonwebtoken::errors::ErrorKind as JwtErrorKind;
use jsonwebtoken::{Algorithm, Validation, decode, decode_header};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

const RSA_ALGORITHMS: &[Algorithm] = &[
    Algorithm::RS256,
    Algorithm::RS384,
    Algorithm::RS512,
    Algorithm::PS256,
    Algorithm::PS384,
    Algorithm::PS512,
];

/// JWT validator backed by a [`KeyStore`]
///
/// # Example
///
/// ```rust,no_run
/// # use keygate_auth::KeygateConfig;
/// # use keygate_auth::jwt::TokenValidator;
/// # tokio_test::block_on(async {
/// let config = KeygateConfig::new("https://sso.example.com/realms/acme/protocol/openid-connect/certs");
/// let validator = TokenValidator::from_config(&config)?;
///
/// let claims = validator.validate("eyJ0eXAiOiJKV1QiLCJhbGc...").await?;
/// println!("{:?} in realm {:?} has roles {:?}", claims.subject, claims.realm, claims.roles);
/// # Ok::<(), keygate_auth::AuthError>(())
/// # });
/// ```
#[derive(Debug, Clone)]
pub struct TokenValidator {
    key_store: Arc<KeyStore>,
    expected_issuer: Option<String>,
    expected_audience: Option<String>,
    clock_skew: Duration,
    allowed_algorithms: Vec<Algorithm>,
}

impl TokenValidator {
    /// Create a validator accepting RS256 with no issuer/audience checks
    pub fn new(key_store: Arc<KeyStore>) -> Self {
        Self {
            key_store,
            expected_issuer: None,
            expected_audience: None,
            clock_skew: Duration::ZERO,
            allowed_algorithms: vec![Algorithm::RS256],
        }
    }

    /// Create a validator and its HTTP-backed key store from configuration
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidConfiguration`] when the configuration
    /// fails [`KeygateConfig::validate`] or names a non-RSA algorithm.
    pub fn from_config(config: &KeygateConfig) -> AuthResult<Self> {
        config.validate().map_err(AuthError::InvalidConfiguration)?;
        let key_store = Arc::new(KeyStore::from_config(config)?);

        let mut validator = Self::new(key_store)
            .with_clock_skew(config.clock_skew)
            .with_algorithms(config.allowed_algorithms.clone())?;
        validator.expected_issuer = config.expected_issuer.clone();
        validator.expected_audience = config.expected_audience.clone();
        Ok(validator)
    }

    /// Require the `iss` claim to equal `issuer`
    pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.expected_issuer = Some(issuer.into());
        self
    }

    /// Require the `aud` claim to contain `audience`
    pub fn with_audience(mut self, audience: impl Into<String>) -> Self {
        self.expected_audience = Some(audience.into());
        self
    }

    /// Set the leeway applied to `exp` and `nbf`
    ///
    /// Sub-second parts are dropped.
    pub fn with_clock_skew(mut self, leeway: Duration) -> Self {
        self.clock_skew = leeway;
        self
    }

    /// Set the accepted header algorithms
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidConfiguration`] if the list is empty or
    /// contains anything outside the RSA family. HMAC and EC algorithms cannot
    /// be verified with RSA key material.
    pub fn with_algorithms(mut self, algorithms: Vec<Algorithm>) -> AuthResult<Self> {
        if algorithms.is_empty() {
            return Err(AuthError::InvalidConfiguration(
                "at least one algorithm must be allowed".to_string(),
            ));
        }
        if let Some(unsupported) = algorithms.iter().find(|a| !RSA_ALGORITHMS.contains(a)) {
            return Err(AuthError::InvalidConfiguration(format!(
                "algorithm {unsupported:?} is not an RSA signature algorithm"
            )));
        }
        self.allowed_algorithms = algorithms;
        Ok(self)
    }

    /// The key store used for key resolution
    pub fn key_store(&self) -> &Arc<KeyStore> {
        &self.key_store
    }

    /// Expected issuer, if configured
    pub fn expected_issuer(&self) -> Option<&str> {
        self.expected_issuer.as_deref()
    }

    /// Expected audience, if configured
    pub fn expected_audience(&self) -> Option<&str> {
        self.expected_audience.as_deref()
    }

    /// Validate a compact token and return its normalized claims
    ///
    /// # Errors
    ///
    /// - [`AuthError::InvalidToken`]: empty or malformed token, missing `kid`,
    ///   disallowed algorithm, unusable key, bad signature, `nbf` in the
    ///   future, or issuer/audience mismatch
    /// - [`AuthError::ExpiredToken`]: valid signature but `exp` has passed
    /// - [`AuthError::KeyNotFound`]: `kid` unknown even after a refresh
    /// - [`AuthError::KeySetUnavailable`]: the key set could not be fetched
    pub async fn validate(&self, token: &str) -> AuthResult<TokenClaims> {
        let token = token.trim();
        if token.is_empty() {
            return Err(AuthError::invalid("empty token"));
        }
        if token.split('.').count() != 3 {
            return Err(AuthError::invalid("token must have three segments"));
        }

        let header = decode_header(token).map_err(|e| {
            debug!(error = %e, "Failed to decode JWT header");
            AuthError::invalid(format!("invalid header: {e}"))
        })?;

        if !self.allowed_algorithms.contains(&header.alg) {
            warn!(
                algorithm = ?header.alg,
                allowed = ?self.allowed_algorithms,
                "JWT algorithm not allowed"
            );
            return Err(AuthError::invalid(format!(
                "algorithm {:?} not allowed",
                header.alg
            )));
        }

        let key_id = header
            .kid
            .as_deref()
            .filter(|kid| !kid.is_empty())
            .ok_or_else(|| {
                debug!("JWT missing kid (key ID) in header");
                AuthError::invalid("missing kid in header")
            })?;

        let key = self.key_store.resolve(key_id).await?;

        if !key.is_rsa() || !key.is_for_signature() {
            warn!(key_id = key_id, "Resolved key is not an RSA signature key");
            return Err(AuthError::invalid(format!(
                "key '{key_id}' is not an RSA signature key"
            )));
        }
        // Key sets are refreshed as a whole; a present key is used even past its own exp.
        if !key.is_valid() {
            debug!(key_id = key_id, "Using key outside its declared validity window");
        }
        if let Some(key_alg) = key.algorithm_name()
            && key.algorithm() != Some(header.alg)
        {
            warn!(
                key_id = key_id,
                key_algorithm = key_alg,
                token_algorithm = ?header.alg,
                "Token algorithm does not match key algorithm"
            );
            return Err(AuthError::invalid(format!(
                "token algorithm {:?} does not match key algorithm {key_alg}",
                header.alg
            )));
        }

        let decoding_key = key.decoding_key().map_err(|e| {
            warn!(key_id = key_id, error = %e, "Failed to build decoding key");
            AuthError::invalid(format!("unusable key '{key_id}': {e}"))
        })?;

        let validation = self.validation_for(header.alg);

        let token_data = decode::<serde_json::Value>(token, &decoding_key, &validation)
            .map_err(|e| {
                let err = match e.kind() {
                    JwtErrorKind::ExpiredSignature => AuthError::ExpiredToken,
                    JwtErrorKind::ImmatureSignature => AuthError::invalid("token not yet valid"),
                    JwtErrorKind::InvalidSignature => AuthError::invalid("invalid signature"),
                    JwtErrorKind::InvalidIssuer => AuthError::invalid("issuer mismatch"),
                    JwtErrorKind::InvalidAudience => AuthError::invalid("audience mismatch"),
                    JwtErrorKind::MissingRequiredClaim(claim) => {
                        AuthError::invalid(format!("missing {claim} claim"))
                    }
                    _ => AuthError::invalid(e.to_string()),
                };
                warn!(key_id = key_id, error = %e, "JWT validation failed");
                err
            })?;

        let claims = TokenClaims::from_raw(&token_data.claims)?;

        debug!(
            key_id = key_id,
            subject = ?claims.subject,
            realm = ?claims.realm,
            algorithm = ?header.alg,
            "JWT validation successful"
        );

        Ok(claims)
    }

    fn validation_for(&self, algorithm: Algorithm) -> Validation {
        let mut validation = Validation::new(algorithm);
        validation.leeway = self.clock_skew.as_secs();
        validation.validate_nbf = true;
        validation.set_required_spec_claims(&["exp"]);

        match &self.expected_audience {
            Some(audience) => validation.set_audience(&[audience]),
            None => validation.validate_aud = false,
        }
        if let Some(issuer) = &self.expected_issuer {
            validation.set_issuer(&[issuer]);
        }
        validation
    }
}

/// Strip the `Bearer` scheme from an `Authorization` header value
///
/// The scheme is matched case-insensitively. Returns `None` for other
/// schemes or an empty credential.
pub fn extract_bearer(authorization: &str) -> Option<&str> {
    let (scheme, token) = authorization.trim().split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

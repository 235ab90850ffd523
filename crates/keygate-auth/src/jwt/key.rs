//! Signing keys and key sets (RFC 7517)
//!
//! A [`KeySet`] is immutable once built. Refreshing the cache never edits a
//! set in place; it builds a new one and publishes it as a whole, the same
//! way authorization servers rotate their published keys.

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, DecodingKey};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// An RSA public key published by the authorization server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SigningKey {
    #[serde(rename = "kid")]
    key_id: String,

    #[serde(rename = "kty")]
    key_type: String,

    #[serde(rename = "use", default, skip_serializing_if = "Option::is_none")]
    key_use: Option<String>,

    #[serde(rename = "alg", default, skip_serializing_if = "Option::is_none")]
    algorithm: Option<String>,

    #[serde(rename = "n")]
    modulus: String,

    #[serde(rename = "e")]
    exponent: String,

    #[serde(
        rename = "nbf",
        default,
        with = "chrono::serde::ts_seconds_option",
        skip_serializing_if = "Option::is_none"
    )]
    not_before: Option<DateTime<Utc>>,

    #[serde(
        rename = "exp",
        default,
        with = "chrono::serde::ts_seconds_option",
        skip_serializing_if = "Option::is_none"
    )]
    expires_at: Option<DateTime<Utc>>,
}

impl SigningKey {
    /// An RSA signature key from its base64url-encoded modulus and exponent
    pub fn rsa(
        key_id: impl Into<String>,
        modulus: impl Into<String>,
        exponent: impl Into<String>,
    ) -> Self {
        Self {
            key_id: key_id.into(),
            key_type: "RSA".to_string(),
            key_use: Some("sig".to_string()),
            algorithm: None,
            modulus: modulus.into(),
            exponent: exponent.into(),
            not_before: None,
            expires_at: None,
        }
    }

    /// Set the declared algorithm (e.g. `RS256`)
    pub fn with_algorithm(mut self, algorithm: impl Into<String>) -> Self {
        self.algorithm = Some(algorithm.into());
        self
    }

    /// Set the declared key usage (`sig` or `enc`)
    pub fn with_use(mut self, key_use: impl Into<String>) -> Self {
        self.key_use = Some(key_use.into());
        self
    }

    /// Restrict the key to a validity window
    pub fn with_validity(
        mut self,
        not_before: Option<DateTime<Utc>>,
        expires_at: Option<DateTime<Utc>>,
    ) -> Self {
        self.not_before = not_before;
        self.expires_at = expires_at;
        self
    }

    /// Key identifier (`kid`)
    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    /// Key type (`kty`)
    pub fn key_type(&self) -> &str {
        &self.key_type
    }

    /// Declared usage (`use`)
    pub fn key_use(&self) -> Option<&str> {
        self.key_use.as_deref()
    }

    /// Declared algorithm name (`alg`)
    pub fn algorithm_name(&self) -> Option<&str> {
        self.algorithm.as_deref()
    }

    /// Declared algorithm, `None` when absent or not a known JWS algorithm
    pub fn algorithm(&self) -> Option<Algorithm> {
        self.algorithm
            .as_deref()
            .and_then(|alg| Algorithm::from_str(alg).ok())
    }

    /// Base64url-encoded modulus (`n`)
    pub fn modulus(&self) -> &str {
        &self.modulus
    }

    /// Base64url-encoded public exponent (`e`)
    pub fn exponent(&self) -> &str {
        &self.exponent
    }

    /// Start of the validity window (`nbf`)
    pub fn not_before(&self) -> Option<DateTime<Utc>> {
        self.not_before
    }

    /// End of the validity window (`exp`)
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    /// Size of the modulus in bits, `None` when it is not valid base64url
    pub fn modulus_bits(&self) -> Option<usize> {
        let bytes = URL_SAFE_NO_PAD.decode(self.modulus.as_bytes()).ok()?;
        let leading_zero_bits = bytes
            .iter()
            .position(|b| *b != 0)
            .map(|i| i * 8 + bytes[i].leading_zeros() as usize)?;
        Some(bytes.len() * 8 - leading_zero_bits)
    }

    /// Whether `now` is past the key's expiry; keys without expiry never expire
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|exp| now > exp)
    }

    /// [`is_expired_at`](Self::is_expired_at) against the current time
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// Whether `now` falls inside the key's validity window
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        let started = self.not_before.is_none_or(|nbf| now >= nbf);
        started && !self.is_expired_at(now)
    }

    /// [`is_valid_at`](Self::is_valid_at) against the current time
    pub fn is_valid(&self) -> bool {
        self.is_valid_at(Utc::now())
    }

    /// Whether this is an RSA key
    pub fn is_rsa(&self) -> bool {
        self.key_type == "RSA"
    }

    /// Whether the key may verify signatures. A key without `use` may.
    pub fn is_for_signature(&self) -> bool {
        self.key_use.as_deref().is_none_or(|u| u == "sig")
    }

    /// Verification key for `jsonwebtoken`
    ///
    /// # Errors
    ///
    /// Returns an error when the modulus or exponent is not valid base64url.
    pub fn decoding_key(&self) -> Result<DecodingKey, jsonwebtoken::errors::Error> {
        DecodingKey::from_rsa_components(&self.modulus, &self.exponent)
    }
}

/// Signing keys indexed by key id
#[derive(Debug, Clone, Default)]
pub struct KeySet {
    keys: HashMap<String, Arc<SigningKey>>,
}

/// The JSON document served by a JWKS endpoint
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JwksDocument {
    /// Raw key entries; not every entry is necessarily a usable RSA key
    #[serde(default)]
    pub keys: Vec<serde_json::Value>,
}

impl KeySet {
    /// Build a set from keys. When ids repeat, the first occurrence wins.
    pub fn new(keys: impl IntoIterator<Item = SigningKey>) -> Self {
        let mut map = HashMap::new();
        for key in keys {
            map.entry(key.key_id.clone())
                .or_insert_with(|| Arc::new(key));
        }
        Self { keys: map }
    }

    /// Build a set from raw JWKS entries, skipping entries that are not
    /// well-formed RSA keys
    pub fn from_entries(entries: Vec<serde_json::Value>) -> Self {
        let keys = entries.into_iter().filter_map(|entry| {
            match serde_json::from_value::<SigningKey>(entry) {
                Ok(key) if key.modulus_bits().is_some() => Some(key),
                Ok(key) => {
                    debug!(key_id = %key.key_id, "Skipping JWK with undecodable modulus");
                    None
                }
                Err(e) => {
                    debug!(error = %e, "Skipping JWK that is not an RSA key");
                    None
                }
            }
        });
        Self::new(keys)
    }

    /// Parse a JWKS JSON document
    ///
    /// # Errors
    ///
    /// Returns an error when the text is not a JSON object.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let document: JwksDocument = serde_json::from_str(json)?;
        Ok(document.into())
    }

    /// Exact-match lookup by key id
    pub fn get(&self, key_id: &str) -> Option<&Arc<SigningKey>> {
        self.keys.get(key_id)
    }

    /// Whether a key with this id is present
    pub fn contains(&self, key_id: &str) -> bool {
        self.keys.contains_key(key_id)
    }

    /// Number of keys
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Whether the set holds no keys
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Key ids in no particular order
    pub fn key_ids(&self) -> impl Iterator<Item = &str> {
        self.keys.keys().map(String::as_str)
    }
}

impl From<JwksDocument> for KeySet {
    fn from(document: JwksDocument) -> Self {
        Self::from_entries(document.keys)
    }
}

/// A key set together with when it was fetched
#[derive(Debug, Clone)]
pub struct CachedKeySet {
    key_set: KeySet,
    fetched_at: Instant,
    ttl: Duration,
}

impl CachedKeySet {
    /// Wrap a freshly fetched set
    pub fn new(key_set: KeySet, ttl: Duration) -> Self {
        Self {
            key_set,
            fetched_at: Instant::now(),
            ttl,
        }
    }

    /// The cached keys
    pub fn key_set(&self) -> &KeySet {
        &self.key_set
    }

    /// When the set was fetched
    pub fn fetched_at(&self) -> Instant {
        self.fetched_at
    }

    /// Time-to-live this entry was created with
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Time since the set was fetched
    pub fn age(&self) -> Duration {
        self.fetched_at.elapsed()
    }

    /// Check if this cache entry is still within its TTL
    pub fn is_fresh(&self) -> bool {
        self.age() < self.ttl
    }
}

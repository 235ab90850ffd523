//! Validator and key store configuration

use crate::jwt::DEFAULT_KEY_SET_TTL;
use jsonwebtoken::Algorithm;
use keygate_http::CallConfig;
use serde::{Deserialize, Serialize};
use serde_with::{DurationSeconds, serde_as};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment prefix used by [`KeygateConfig::from_file`]
pub const ENV_PREFIX: &str = "KEYGATE";

/// Settings for trusting one authorization server
///
/// Durations are whole seconds; the nested `fetch` settings use
/// milliseconds like every other [`CallConfig`].
///
/// ```toml
/// jwks_uri = "https://sso.example.com/realms/acme/protocol/openid-connect/certs"
/// expected_issuer = "https://sso.example.com/realms/acme"
/// key_set_ttl = 300
/// clock_skew = 30
///
/// [fetch]
/// timeout = 5000
///
/// [fetch.retry]
/// max_attempts = 4
/// initial_interval = 200
/// ```
#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeygateConfig {
    /// JWKS endpoint of the authorization server
    pub jwks_uri: String,
    /// Required `iss` value, if any
    pub expected_issuer: Option<String>,
    /// Required `aud` entry, if any
    pub expected_audience: Option<String>,
    /// How long a fetched key set is served without refetching
    #[serde_as(as = "DurationSeconds<u64>")]
    pub key_set_ttl: Duration,
    /// Leeway applied to `exp` and `nbf`
    #[serde_as(as = "DurationSeconds<u64>")]
    pub clock_skew: Duration,
    /// Signature algorithms accepted in token headers
    pub allowed_algorithms: Vec<Algorithm>,
    /// Timeout and retry settings for key set fetches
    pub fetch: CallConfig,
    /// Accept a plain `http` JWKS URI for non-loopback hosts
    pub allow_insecure_http: bool,
}

impl Default for KeygateConfig {
    fn default() -> Self {
        Self {
            jwks_uri: String::new(),
            expected_issuer: None,
            expected_audience: None,
            key_set_ttl: DEFAULT_KEY_SET_TTL,
            clock_skew: Duration::ZERO,
            allowed_algorithms: vec![Algorithm::RS256],
            fetch: CallConfig::default(),
            allow_insecure_http: false,
        }
    }
}

/// Configuration loading errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Configuration file not found
    #[error("Configuration file not found: {0}")]
    FileNotFound(PathBuf),

    /// Unsupported configuration file format
    #[error("Unsupported configuration file format. Use .toml, .yaml, .yml, or .json")]
    UnsupportedFormat,

    /// Error parsing configuration
    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] config::ConfigError),

    /// Values that parse but cannot be used
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

impl KeygateConfig {
    /// Configuration for `jwks_uri` with every other setting at its default
    pub fn new(jwks_uri: impl Into<String>) -> Self {
        Self {
            jwks_uri: jwks_uri.into(),
            ..Self::default()
        }
    }

    /// Check the settings for values that cannot work
    ///
    /// # Errors
    ///
    /// Returns a description of the first problem found.
    pub fn validate(&self) -> Result<(), String> {
        if self.jwks_uri.trim().is_empty() {
            return Err("jwks_uri must not be empty".to_string());
        }
        if self.allowed_algorithms.is_empty() {
            return Err("allowed_algorithms must not be empty".to_string());
        }
        if self.key_set_ttl.is_zero() {
            return Err("key_set_ttl must be greater than zero".to_string());
        }
        if self.fetch.timeout.is_zero() {
            return Err("fetch.timeout must be greater than zero".to_string());
        }
        self.fetch
            .retry
            .validate()
            .map_err(|e| format!("fetch.retry: {e}"))
    }

    /// Load configuration from a file, overlaid with `KEYGATE__*` environment
    /// variables
    ///
    /// The format is chosen by extension: `.toml`, `.yaml`/`.yml` or `.json`.
    /// Nested keys use `__` in variable names, so
    /// `KEYGATE__FETCH__RETRY__MAX_ATTEMPTS=5` sets `fetch.retry.max_attempts`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file is missing, has an unknown
    /// extension, fails to parse, or holds values rejected by
    /// [`validate`](Self::validate).
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// use keygate_auth::KeygateConfig;
    ///
    /// let config = KeygateConfig::from_file("keygate.toml")?;
    /// # Ok::<(), keygate_auth::ConfigError>(())
    /// ```
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::from_file_with_prefix(path, ENV_PREFIX)
    }

    /// Like [`from_file`](Self::from_file) with a custom environment prefix
    ///
    /// # Errors
    ///
    /// See [`from_file`](Self::from_file).
    pub fn from_file_with_prefix(
        path: impl AsRef<Path>,
        env_prefix: &str,
    ) -> Result<Self, ConfigError> {
        use config::{Config, Environment, File, FileFormat};

        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.to_path_buf()));
        }

        let format = match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => FileFormat::Toml,
            Some("yaml") | Some("yml") => FileFormat::Yaml,
            Some("json") => FileFormat::Json,
            _ => return Err(ConfigError::UnsupportedFormat),
        };

        let file = path.to_str().ok_or(ConfigError::UnsupportedFormat)?;

        let loaded: Self = Config::builder()
            .add_source(File::new(file, format))
            .add_source(
                Environment::with_prefix(env_prefix)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        loaded.validate().map_err(ConfigError::Invalid)?;
        Ok(loaded)
    }
}

//! JWKS (JSON Web Key Set) fetching and caching
//!
//! [`KeyStore`] resolves signing keys by `kid`:
//!
//! - **TTL-based caching**: a fresh cached set that contains the key answers
//!   without any network call
//! - **Refresh on miss**: an unknown `kid` or a stale set triggers exactly one
//!   fetch, after which the lookup is retried once
//! - **Atomic publication**: refreshed sets replace the old one in a single
//!   pointer swap, so readers see either the old set or the new one in full
//! - **Single-flight**: concurrent misses share one fetch instead of
//!   stampeding the authorization server during key rotation
//!
//! Reads never take a lock. The only lock serializes refreshes.

use super::key::{CachedKeySet, JwksDocument, KeySet, SigningKey};
use crate::config::KeygateConfig;
use crate::error::{AuthError, AuthResult};
use arc_swap::ArcSwapOption;
use async_trait::async_trait;
use keygate_http::{CallConfig, CallError, CallObserver, RetryExecutor, get_json};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};
use url::Url;

/// Default key-set TTL (10 minutes)
pub const DEFAULT_KEY_SET_TTL: Duration = Duration::from_secs(600);

/// Where signing key sets come from
#[async_trait]
pub trait KeySetSource: Send + Sync + std::fmt::Debug {
    /// Fetch the current key set
    async fn fetch(&self) -> Result<KeySet, CallError>;
}

/// Fetches key sets from a JWKS endpoint over HTTP
///
/// Transient failures (5xx, 408, connection errors, timeouts) are retried
/// according to the configured [`CallConfig`]; other statuses fail at once.
#[derive(Debug, Clone)]
pub struct HttpKeySetSource {
    jwks_uri: Url,
    http_client: reqwest::Client,
    executor: RetryExecutor,
}

impl HttpKeySetSource {
    /// Create a source for `jwks_uri` with default call settings
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidConfiguration`] when the URI does not parse
    /// or is not HTTPS (plain HTTP is accepted for loopback hosts only).
    pub fn new(jwks_uri: &str) -> AuthResult<Self> {
        Self::with_call_config(jwks_uri, CallConfig::default(), false)
    }

    /// Create a source with explicit call settings
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidConfiguration`] when the URI is rejected or
    /// the HTTP client cannot be built.
    pub fn with_call_config(
        jwks_uri: &str,
        call: CallConfig,
        allow_insecure_http: bool,
    ) -> AuthResult<Self> {
        let jwks_uri = parse_jwks_uri(jwks_uri, allow_insecure_http)?;

        let http_client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .timeout(call.timeout)
            .build()
            .map_err(|e| AuthError::InvalidConfiguration(format!("HTTP client: {e}")))?;

        Ok(Self {
            jwks_uri,
            http_client,
            executor: RetryExecutor::new(call),
        })
    }

    /// Create a source from the `jwks_uri`, `fetch` and
    /// `allow_insecure_http` settings
    ///
    /// # Errors
    ///
    /// See [`with_call_config`](Self::with_call_config).
    pub fn from_config(config: &KeygateConfig) -> AuthResult<Self> {
        Self::with_call_config(
            &config.jwks_uri,
            config.fetch.clone(),
            config.allow_insecure_http,
        )
    }

    /// Report fetch outcomes to a circuit breaker
    pub fn with_observer(mut self, observer: Arc<dyn CallObserver>) -> Self {
        self.executor = self.executor.with_observer(observer);
        self
    }

    /// Get the JWKS endpoint URI
    pub fn jwks_uri(&self) -> &str {
        self.jwks_uri.as_str()
    }
}

#[async_trait]
impl KeySetSource for HttpKeySetSource {
    async fn fetch(&self) -> Result<KeySet, CallError> {
        info!(jwks_uri = %self.jwks_uri, "Fetching JWKS from endpoint");

        let document: JwksDocument = self
            .executor
            .run("fetch_jwks", || get_json(&self.http_client, self.jwks_uri.as_str()))
            .await?;

        let entries = document.keys.len();
        let key_set = KeySet::from(document);
        if key_set.len() < entries {
            debug!(
                jwks_uri = %self.jwks_uri,
                entries,
                usable = key_set.len(),
                "Some JWKS entries were not usable RSA keys"
            );
        }
        Ok(key_set)
    }
}

fn parse_jwks_uri(jwks_uri: &str, allow_insecure_http: bool) -> AuthResult<Url> {
    let url = Url::parse(jwks_uri)
        .map_err(|e| AuthError::InvalidConfiguration(format!("JWKS URI '{jwks_uri}': {e}")))?;

    let loopback = matches!(url.host_str(), Some("localhost" | "127.0.0.1" | "[::1]"));

    match url.scheme() {
        "https" => Ok(url),
        "http" if loopback || allow_insecure_http => Ok(url),
        _ => Err(AuthError::InvalidConfiguration(
            "JWKS endpoint must use HTTPS (HTTP only allowed for localhost)".to_string(),
        )),
    }
}

/// Signing-key cache in front of a [`KeySetSource`]
///
/// Share one instance (behind an `Arc`) between every validator that trusts
/// the same authorization server.
///
/// # Example
///
/// ```rust,no_run
/// # use keygate_auth::jwt::{HttpKeySetSource, KeyStore};
/// # use std::sync::Arc;
/// # tokio_test::block_on(async {
/// let source = HttpKeySetSource::new("https://sso.example.com/realms/acme/protocol/openid-connect/certs")?;
/// let store = KeyStore::new(Arc::new(source));
///
/// let key = store.resolve("a1b2c3").await?;
/// println!("key {} uses {:?}", key.key_id(), key.algorithm());
/// # Ok::<(), keygate_auth::AuthError>(())
/// # });
/// ```
#[derive(Debug)]
pub struct KeyStore {
    source: Arc<dyn KeySetSource>,
    ttl: Duration,
    current: ArcSwapOption<CachedKeySet>,
    refresh_lock: Mutex<()>,
    refresh_count: AtomicU64,
}

impl KeyStore {
    /// Create a key store with the default TTL
    pub fn new(source: Arc<dyn KeySetSource>) -> Self {
        Self::with_ttl(source, DEFAULT_KEY_SET_TTL)
    }

    /// Create a key store with a custom TTL
    ///
    /// Shorter TTL = faster pickup of rotated keys without a miss.
    /// Longer TTL = fewer requests to the authorization server.
    pub fn with_ttl(source: Arc<dyn KeySetSource>, ttl: Duration) -> Self {
        Self {
            source,
            ttl,
            current: ArcSwapOption::empty(),
            refresh_lock: Mutex::new(()),
            refresh_count: AtomicU64::new(0),
        }
    }

    /// Create an HTTP-backed key store from configuration
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidConfiguration`] when the JWKS URI is rejected.
    pub fn from_config(config: &KeygateConfig) -> AuthResult<Self> {
        let source = HttpKeySetSource::from_config(config)?;
        Ok(Self::with_ttl(Arc::new(source), config.key_set_ttl))
    }

    /// Resolve a signing key by id
    ///
    /// Served from cache when the cached set is fresh and holds `key_id`;
    /// otherwise the set is refreshed once and the lookup retried.
    ///
    /// # Errors
    ///
    /// - [`AuthError::KeyNotFound`] if the key is absent after the refresh
    /// - [`AuthError::KeySetUnavailable`] if the refresh itself failed
    pub async fn resolve(&self, key_id: &str) -> AuthResult<Arc<SigningKey>> {
        let observed = self.current.load_full();

        if let Some(cached) = &observed
            && cached.is_fresh()
            && let Some(key) = cached.key_set().get(key_id)
        {
            debug!(key_id = key_id, "Using cached signing key");
            return Ok(Arc::clone(key));
        }

        debug!(
            key_id = key_id,
            cached = observed.is_some(),
            "Signing key not in a fresh cached set, refreshing"
        );

        let refreshed = self.refresh_unless_superseded(observed.as_ref()).await?;

        refreshed.key_set().get(key_id).cloned().ok_or_else(|| {
            warn!(key_id = key_id, "Key ID not found in JWKS after refresh");
            AuthError::KeyNotFound {
                key_id: key_id.to_string(),
            }
        })
    }

    /// Force a refresh, ignoring the cache
    ///
    /// Intended for schedulers and rotation webhooks. Performs the same
    /// atomic replacement as a refresh triggered by [`resolve`](Self::resolve).
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::KeySetUnavailable`] if the fetch failed; the
    /// previously cached set is left in place.
    pub async fn refresh(&self) -> AuthResult<Arc<CachedKeySet>> {
        let _guard = self.refresh_lock.lock().await;
        self.fetch_and_publish().await
    }

    /// The cached set, if any, regardless of freshness
    pub fn cached(&self) -> Option<Arc<CachedKeySet>> {
        self.current.load_full()
    }

    /// Key ids in the cached set
    pub fn cached_key_ids(&self) -> Vec<String> {
        self.cached()
            .map(|cached| cached.key_set().key_ids().map(str::to_owned).collect())
            .unwrap_or_default()
    }

    /// Drop the cached set; the next resolve fetches again
    pub fn invalidate(&self) {
        self.current.store(None);
        debug!("JWKS cache cleared");
    }

    /// Number of successful fetches so far
    pub fn refresh_count(&self) -> u64 {
        self.refresh_count.load(Ordering::Relaxed)
    }

    /// Cache TTL
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Refresh, unless another task published a new set while we waited
    /// for the refresh lock, in which case that set is reused.
    async fn refresh_unless_superseded(
        &self,
        observed: Option<&Arc<CachedKeySet>>,
    ) -> AuthResult<Arc<CachedKeySet>> {
        let _guard = self.refresh_lock.lock().await;

        let current = self.current.load_full();
        if let Some(current) = current {
            let superseded = observed.is_none_or(|seen| !Arc::ptr_eq(seen, &current));
            if superseded {
                debug!("Reusing key set published by a concurrent refresh");
                return Ok(current);
            }
        }

        self.fetch_and_publish().await
    }

    /// Must be called with `refresh_lock` held.
    async fn fetch_and_publish(&self) -> AuthResult<Arc<CachedKeySet>> {
        let key_set = self.source.fetch().await.map_err(|e| {
            error!(source = ?self.source, error = %e, "Failed to fetch JWKS");
            AuthError::KeySetUnavailable(e)
        })?;

        let key_count = key_set.len();
        let cached = Arc::new(CachedKeySet::new(key_set, self.ttl));
        self.current.store(Some(Arc::clone(&cached)));
        self.refresh_count.fetch_add(1, Ordering::Relaxed);

        info!(key_count, "Successfully fetched JWKS");
        Ok(cached)
    }
}

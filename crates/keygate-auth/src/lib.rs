//! # Keygate Auth - Bearer token validation with a rotating JWKS
//!
//! Verifies tokens issued by a Keycloak-style authorization server locally,
//! using its published signing keys, without a round trip per request.
//!
//! ## Key Features
//!
//! - **Key caching** - TTL-bounded key set, refreshed once on an unknown `kid`
//!   so key rotation recovers without downtime
//! - **Lock-free reads** - refreshed sets are published with an atomic swap
//! - **Single-flight refresh** - concurrent misses share one fetch
//! - **Resilient fetches** - classified errors and backoff from [`keygate_http`]
//! - **Normalized claims** - flat `roles` and nested `realm_access.roles`
//!   produce the same role list
//!
//! ## Architecture
//!
//! - [`jwt`] - signing keys, [`KeyStore`], [`TokenValidator`], claims
//! - [`config`] - [`KeygateConfig`] loading from files and environment
//! - [`error`] - [`AuthError`]
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use keygate_auth::{KeygateConfig, TokenValidator};
//!
//! # tokio_test::block_on(async {
//! let config = KeygateConfig::from_file("keygate.toml")
//!     .map_err(|e| keygate_auth::AuthError::InvalidConfiguration(e.to_string()))?;
//! let validator = TokenValidator::from_config(&config)?;
//!
//! match validator.validate("eyJ0eXAi...").await {
//!     Ok(claims) if claims.has_role("admin") => println!("admin {:?}", claims.subject),
//!     Ok(_) => println!("authenticated, not an admin"),
//!     Err(e) if e.is_integration_failure() => println!("cannot verify right now: {e}"),
//!     Err(e) => println!("rejected: {e}"),
//! }
//! # Ok::<(), keygate_auth::AuthError>(())
//! # });
//! ```

pub mod config;
pub mod error;
pub mod jwt;

pub use config::{ConfigError, KeygateConfig};
pub use error::{AuthError, AuthResult};
pub use jwt::{KeyStore, SigningKey, TokenClaims, TokenValidator};

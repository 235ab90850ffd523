//! JWT infrastructure: key material, key caching and token validation
//!
//! ```text
//! ┌──────────────────┐   kid    ┌────────────┐  miss/stale  ┌────────────────┐
//! │  TokenValidator  │ ───────▶ │  KeyStore  │ ───────────▶ │  KeySetSource  │
//! │ (sig, exp, nbf)  │ ◀─────── │ (ArcSwap)  │ ◀─────────── │ (HTTP + retry) │
//! └────────┬─────────┘   key    └────────────┘   KeySet     └────────────────┘
//!          │
//!          ▼
//!   extract_roles → TokenClaims
//! ```
//!
//! # Modules
//!
//! - `key` - `SigningKey`, `KeySet` and cache entries
//! - `jwks` - JWKS fetching and caching
//! - `validator` - JWT validation against the cached key set
//! - `claims` - Claims normalization

pub mod claims;
pub mod jwks;
pub mod key;
pub mod validator;

pub use claims::{TokenClaims, extract_roles, realm_from_issuer};
pub use jwks::{DEFAULT_KEY_SET_TTL, HttpKeySetSource, KeySetSource, KeyStore};
pub use key::{CachedKeySet, JwksDocument, KeySet, SigningKey};
pub use validator::{TokenValidator, extract_bearer};

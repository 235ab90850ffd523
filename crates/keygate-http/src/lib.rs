//! # Keygate HTTP - Resilient calls to the authorization server
//!
//! Decides what a failed call means and whether it is worth trying again.
//!
//! ## Architecture
//!
//! - [`classify`] - pure mapping of `(status, body)` to a [`ClassifiedError`]
//! - [`retry`] - exponential backoff policy and per-sequence [`RetryState`]
//! - [`executor`] - [`RetryExecutor`], which drives an operation through the
//!   policy with per-attempt timeouts, cancellation and circuit-breaker signals
//! - [`response`] - helpers that turn `reqwest` responses into [`CallError`]s
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use keygate_http::{CallConfig, RetryExecutor, get_json};
//!
//! # tokio_test::block_on(async {
//! let client = reqwest::Client::new();
//! let executor = RetryExecutor::new(CallConfig::default());
//!
//! let realm: serde_json::Value = executor
//!     .run("fetch_realm", || get_json(&client, "https://sso.example.com/realms/acme"))
//!     .await?;
//! # Ok::<(), keygate_http::CallError>(())
//! # });
//! ```
//!
//! ## Retry Eligibility
//!
//! Only 5xx responses, 408 Request Timeout, transport failures and
//! per-attempt timeouts are retried. Every other failure is returned on the
//! first attempt.

pub mod classify;
pub mod error;
pub mod executor;
pub mod response;
pub mod retry;

#[doc(inline)]
pub use classify::{NO_BODY_MESSAGE, classify, extract_message};
#[doc(inline)]
pub use error::{CallError, ClassifiedError, ErrorKind};
#[doc(inline)]
pub use executor::{CallConfig, CallObserver, NoopObserver, RetryExecutor};
#[doc(inline)]
pub use response::{check_response, get_json};
#[doc(inline)]
pub use retry::{RetryConfig, RetryDecision, RetryPolicy, RetryState};

/// Re-exported so callers can cancel in-flight call sequences
pub use tokio_util::sync::CancellationToken;

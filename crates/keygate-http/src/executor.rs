//! Retrying call driver
//!
//! [`RetryExecutor`] runs an async operation under a [`RetryPolicy`]:
//!
//! - a fresh [`RetryState`](crate::retry::RetryState) per `run` call
//! - a per-attempt deadline
//! - cancellation through a [`CancellationToken`], honoured both while an
//!   attempt is in flight and during the backoff wait
//! - success/failure signals to a [`CallObserver`] (typically a circuit breaker)
//!
//! The terminal error is returned exactly as the last attempt produced it.

use crate::error::CallError;
use crate::retry::{RetryConfig, RetryDecision, RetryPolicy};
use serde::{Deserialize, Serialize};
use serde_with::{DurationMilliSeconds, serde_as};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

/// Configuration for one class of outbound calls
#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CallConfig {
    /// Retry and backoff settings
    pub retry: RetryConfig,
    /// Deadline for a single attempt
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub timeout: Duration,
}

impl Default for CallConfig {
    fn default() -> Self {
        Self {
            retry: RetryConfig::default(),
            timeout: Duration::from_secs(10),
        }
    }
}

/// Receives the outcome of every attempt
///
/// This is the seam to an external circuit breaker: the executor reports
/// successes and classified failures, and asks before each attempt whether
/// calls are currently permitted. The breaker's state machine lives on the
/// other side of this trait.
pub trait CallObserver: Send + Sync {
    /// Whether the next attempt may be issued
    fn permits_call(&self) -> bool {
        true
    }

    /// An attempt succeeded
    fn on_success(&self) {}

    /// An attempt failed
    fn on_failure(&self, _error: &CallError) {}
}

/// Observer that ignores everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl CallObserver for NoopObserver {}

/// Runs operations with retry, backoff, per-attempt timeout and cancellation
#[derive(Clone)]
pub struct RetryExecutor {
    policy: RetryPolicy,
    timeout: Duration,
    observer: Arc<dyn CallObserver>,
}

impl std::fmt::Debug for RetryExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryExecutor")
            .field("policy", &self.policy)
            .field("timeout", &self.timeout)
            .field("observer", &"<dyn CallObserver>")
            .finish()
    }
}

impl Default for RetryExecutor {
    fn default() -> Self {
        Self::new(CallConfig::default())
    }
}

impl RetryExecutor {
    /// Create an executor from configuration
    pub fn new(config: CallConfig) -> Self {
        Self {
            policy: RetryPolicy::new(config.retry),
            timeout: config.timeout,
            observer: Arc::new(NoopObserver),
        }
    }

    /// Report attempt outcomes to `observer`
    pub fn with_observer(mut self, observer: Arc<dyn CallObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// The retry policy in use
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Per-attempt deadline
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run `operation` until it succeeds or the policy gives up
    ///
    /// # Errors
    ///
    /// Returns the error of the last attempt unchanged, or
    /// [`CallError::circuit_open`] when the observer refuses the call.
    pub async fn run<F, Fut, T>(&self, operation_name: &str, operation: F) -> Result<T, CallError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, CallError>>,
    {
        self.run_with_cancel(operation_name, &CancellationToken::new(), operation)
            .await
    }

    /// Like [`run`](Self::run), stopping early when `cancel` fires
    ///
    /// Cancellation during an attempt or during the backoff wait returns
    /// [`CallError::Cancelled`] and no further attempt is made.
    ///
    /// # Errors
    ///
    /// Returns the error of the last attempt unchanged,
    /// [`CallError::Cancelled`], or [`CallError::circuit_open`].
    pub async fn run_with_cancel<F, Fut, T>(
        &self,
        operation_name: &str,
        cancel: &CancellationToken,
        mut operation: F,
    ) -> Result<T, CallError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, CallError>>,
    {
        let mut state = self.policy.start();

        loop {
            if cancel.is_cancelled() {
                return Err(CallError::Cancelled);
            }

            if !self.observer.permits_call() {
                warn!(
                    operation = operation_name,
                    attempt = state.attempt(),
                    "Call rejected, circuit open"
                );
                return Err(CallError::circuit_open());
            }

            let outcome = tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    debug!(
                        operation = operation_name,
                        attempt = state.attempt(),
                        "Call cancelled mid-attempt"
                    );
                    return Err(CallError::Cancelled);
                }
                result = tokio::time::timeout(self.timeout, operation()) => {
                    result.unwrap_or(Err(CallError::Timeout(self.timeout)))
                }
            };

            let err = match outcome {
                Ok(value) => {
                    self.observer.on_success();
                    if state.attempt() > 1 {
                        debug!(
                            operation = operation_name,
                            attempt = state.attempt(),
                            "Call succeeded after retry"
                        );
                    }
                    return Ok(value);
                }
                Err(err) => err,
            };

            self.observer.on_failure(&err);

            match self.policy.decide(state, &err) {
                RetryDecision::Retry { delay, next } => {
                    warn!(
                        operation = operation_name,
                        attempt = state.attempt(),
                        max_attempts = state.max_attempts(),
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Retryable failure, backing off"
                    );

                    tokio::select! {
                        biased;
                        () = cancel.cancelled() => {
                            debug!(operation = operation_name, "Call cancelled during backoff");
                            return Err(CallError::Cancelled);
                        }
                        () = tokio::time::sleep(delay) => {}
                    }

                    state = next;
                }
                RetryDecision::Propagate => {
                    if err.is_retryable() {
                        error!(
                            operation = operation_name,
                            attempts = state.attempt(),
                            error = %err,
                            "Retries exhausted"
                        );
                    } else {
                        debug!(
                            operation = operation_name,
                            attempt = state.attempt(),
                            error = %err,
                            "Non-retryable failure"
                        );
                    }
                    return Err(err);
                }
            }
        }
    }
}

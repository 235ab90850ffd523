//! Retry policy with exponential backoff
//!
//! The policy is split in two:
//!
//! - [`RetryPolicy`] is immutable configuration, shared freely between tasks.
//! - [`RetryState`] is a small `Copy` value owned by exactly one call sequence.
//!   It is created by [`RetryPolicy::start`], handed back by every retry
//!   decision, and dropped when the sequence ends.
//!
//! Because the attempt counter only ever lives in a local variable of the
//! call sequence that owns it, two concurrent sequences cannot observe or
//! disturb each other's backoff timing.
//!
//! Backoff after attempt `n` is
//! `min(initial_interval * multiplier^(n-1), max_interval)`, optionally
//! jittered before the cap is applied.

use crate::error::CallError;
use serde::{Deserialize, Serialize};
use serde_with::{DurationMilliSeconds, serde_as};
use std::time::Duration;

/// Retry configuration for calls to the authorization server
#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total number of attempts, including the first one
    pub max_attempts: u32,
    /// Delay after the first failed attempt
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub initial_interval: Duration,
    /// Exponential backoff multiplier
    pub multiplier: f64,
    /// Upper bound for any single delay
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub max_interval: Duration,
    /// Jitter factor (0.0 - 1.0) to avoid thundering herd
    pub jitter_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_interval: Duration::from_millis(100),
            multiplier: 2.0,
            max_interval: Duration::from_secs(30),
            jitter_factor: 0.0,
        }
    }
}

impl RetryConfig {
    /// Create a new retry configuration with the default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a retry configuration tuned for flaky networks
    pub fn for_network() -> Self {
        Self {
            max_attempts: 5,
            initial_interval: Duration::from_millis(200),
            multiplier: 1.5,
            max_interval: Duration::from_secs(60),
            jitter_factor: 0.2,
        }
    }

    /// A single attempt, never retried
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Check the configuration for values the backoff formula cannot use
    ///
    /// # Errors
    ///
    /// Returns a description of the first offending field.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_attempts == 0 {
            return Err("max_attempts must be at least 1".to_string());
        }
        if !self.multiplier.is_finite() || self.multiplier < 1.0 {
            return Err(format!(
                "multiplier must be a finite number >= 1.0, got {}",
                self.multiplier
            ));
        }
        if !(0.0..=1.0).contains(&self.jitter_factor) {
            return Err(format!(
                "jitter_factor must be within 0.0..=1.0, got {}",
                self.jitter_factor
            ));
        }
        if self.initial_interval > self.max_interval {
            return Err(format!(
                "initial_interval ({:?}) exceeds max_interval ({:?})",
                self.initial_interval, self.max_interval
            ));
        }
        Ok(())
    }
}

/// Attempt bookkeeping for one logical call sequence
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryState {
    attempt: u32,
    max_attempts: u32,
    initial_interval: Duration,
    multiplier: f64,
    max_interval: Duration,
    jitter_factor: f64,
}

impl RetryState {
    /// Fresh state positioned on the first attempt
    pub fn new(config: &RetryConfig) -> Self {
        Self {
            attempt: 1,
            max_attempts: config.max_attempts,
            initial_interval: config.initial_interval,
            multiplier: config.multiplier,
            max_interval: config.max_interval,
            jitter_factor: config.jitter_factor,
        }
    }

    /// The attempt currently in progress, starting at 1
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Configured attempt budget
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Whether another attempt is allowed after the current one fails
    pub fn should_retry(&self) -> bool {
        self.attempt < self.max_attempts
    }

    /// Delay to wait after the current attempt fails
    ///
    /// Never exceeds the configured `max_interval`, jitter included.
    pub fn next_delay(&self) -> Duration {
        let exponent = self.attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let mut delay_secs = self.initial_interval.as_secs_f64() * self.multiplier.powi(exponent);

        if self.jitter_factor > 0.0 {
            delay_secs *= 1.0 + (fastrand::f64() - 0.5) * 2.0 * self.jitter_factor;
        }

        let capped_secs = delay_secs.min(self.max_interval.as_secs_f64()).max(0.0);
        Duration::try_from_secs_f64(capped_secs)
            .unwrap_or(self.max_interval)
            .min(self.max_interval)
    }

    /// State for the following attempt
    #[must_use]
    pub fn advance(self) -> Self {
        Self {
            attempt: self.attempt.saturating_add(1),
            ..self
        }
    }
}

/// Outcome of consulting the policy after a failed attempt
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RetryDecision {
    /// Wait `delay`, then run the next attempt with `next`
    Retry {
        /// Backoff before the next attempt
        delay: Duration,
        /// State for the next attempt
        next: RetryState,
    },
    /// Stop and surface the original error unchanged
    Propagate,
}

/// Shared, immutable retry policy
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    /// Create a policy from configuration
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// The underlying configuration
    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Begin a new call sequence
    pub fn start(&self) -> RetryState {
        RetryState::new(&self.config)
    }

    /// Decide what to do after `state`'s attempt failed with `error`
    ///
    /// Non-retryable failures (4xx other than 408, decode errors,
    /// cancellation) propagate immediately. Retryable failures advance the
    /// state exactly once, unless the attempt budget is spent.
    pub fn decide(&self, state: RetryState, error: &CallError) -> RetryDecision {
        if !error.is_retryable() || !state.should_retry() {
            return RetryDecision::Propagate;
        }

        RetryDecision::Retry {
            delay: state.next_delay(),
            next: state.advance(),
        }
    }
}

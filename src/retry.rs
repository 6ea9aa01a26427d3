//! Retry policy normalization.
//!
//! The `retries` parameter accepts a boolean, an integer or a structured
//! [`RetryPolicy`]. Booleans and integers expand to the structured policy with
//! default backoff. The policy only describes retry behavior; executing
//! retries is left to the transport.
//!
//! # Example
//!
//! ```
//! use reqnorm::retry::{RetryDecision, RetryInput, normalize_retry};
//!
//! let policy = normalize_retry(RetryInput::from(2)).unwrap();
//! assert_eq!(policy.max_retries(), 2);
//!
//! match policy.should_retry(503, 1) {
//!     RetryDecision::Retry { delay, retry } => {
//!         println!("retry #{retry} in {delay:?}");
//!     }
//!     RetryDecision::DoNotRetry { reason } => println!("giving up: {reason}"),
//! }
//! ```

use std::time::Duration;

use rand::Rng;
use serde::Serialize;
use tracing::{debug, instrument};

use crate::error::NormalizeError;

/// Retries granted by `retries=true`.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default base delay for exponential backoff (1 second).
const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);

/// Default maximum delay cap (32 seconds).
const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(32);

/// Default backoff multiplier (doubles each retry).
const DEFAULT_BACKOFF_MULTIPLIER: f32 = 2.0;

/// Default maximum jitter added to delays (500ms).
const DEFAULT_MAX_JITTER: Duration = Duration::from_millis(500);

/// Statuses that carry a meaningful `Retry-After` and are retried by default.
pub const DEFAULT_RETRY_STATUSES: [u16; 3] = [413, 429, 503];

/// Decision on whether to retry after a response status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    Retry {
        /// How long to wait before retrying.
        delay: Duration,
        /// Which retry this will be (1-indexed).
        retry: u32,
    },
    DoNotRetry {
        /// Human-readable reason why retry is not attempted.
        reason: String,
    },
}

/// Structured retry policy with exponential backoff.
///
/// # Default Values
///
/// - `max_retries`: 3
/// - `base_delay`: 1 second
/// - `max_delay`: 32 seconds
/// - `backoff_multiplier`: 2.0
/// - `max_jitter`: 500ms
/// - `retry_statuses`: 413, 429, 503
/// - `respect_retry_after`: true
///
/// # Delay Calculation
///
/// ```text
/// delay = min(base_delay * multiplier^(retry - 1), max_delay) + jitter
/// ```
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetryPolicy {
    /// Retries after the initial attempt.
    max_retries: u32,
    base_delay: Duration,
    max_delay: Duration,
    backoff_multiplier: f32,
    max_jitter: Duration,
    retry_statuses: Vec<u16>,
    respect_retry_after: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            backoff_multiplier: DEFAULT_BACKOFF_MULTIPLIER,
            max_jitter: DEFAULT_MAX_JITTER,
            retry_statuses: DEFAULT_RETRY_STATUSES.to_vec(),
            respect_retry_after: true,
        }
    }
}

impl RetryPolicy {
    /// Creates a policy with custom backoff settings.
    ///
    /// # Arguments
    ///
    /// * `max_retries` - Retries after the initial attempt (0 disables retrying)
    /// * `base_delay` - Delay before the first retry
    /// * `max_delay` - Maximum delay cap
    /// * `backoff_multiplier` - Multiplier for exponential increase
    #[must_use]
    pub fn new(
        max_retries: u32,
        base_delay: Duration,
        max_delay: Duration,
        backoff_multiplier: f32,
    ) -> Self {
        Self {
            max_retries,
            base_delay,
            max_delay,
            backoff_multiplier,
            ..Self::default()
        }
    }

    /// Default backoff with a custom retry count.
    #[must_use]
    pub fn with_max_retries(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Self::default()
        }
    }

    /// A policy that never retries.
    #[must_use]
    pub fn disabled() -> Self {
        Self::with_max_retries(0)
    }

    #[must_use]
    pub fn with_jitter(mut self, max_jitter: Duration) -> Self {
        self.max_jitter = max_jitter;
        self
    }

    #[must_use]
    pub fn with_retry_statuses(mut self, statuses: impl IntoIterator<Item = u16>) -> Self {
        self.retry_statuses = statuses.into_iter().collect();
        self
    }

    #[must_use]
    pub fn with_respect_retry_after(mut self, respect: bool) -> Self {
        self.respect_retry_after = respect;
        self
    }

    #[must_use]
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.max_retries > 0
    }

    #[must_use]
    pub fn respects_retry_after(&self) -> bool {
        self.respect_retry_after
    }

    #[must_use]
    pub fn is_retryable_status(&self, status: u16) -> bool {
        self.retry_statuses.contains(&status)
    }

    /// Decides whether a response with `status` should be retried.
    ///
    /// # Arguments
    ///
    /// * `status` - HTTP status of the failed attempt
    /// * `retries_done` - Retries already performed (0 after the initial attempt)
    #[instrument(level = "debug", skip(self), fields(max_retries = self.max_retries))]
    pub fn should_retry(&self, status: u16, retries_done: u32) -> RetryDecision {
        if !self.is_retryable_status(status) {
            return RetryDecision::DoNotRetry {
                reason: format!("status {status} is not retryable"),
            };
        }

        if retries_done >= self.max_retries {
            debug!(retries_done, max = self.max_retries, "retries exhausted");
            return RetryDecision::DoNotRetry {
                reason: format!("max retries ({}) exhausted", self.max_retries),
            };
        }

        let retry = retries_done + 1;
        let delay = self.delay_for(retry);
        debug!(retry, delay_ms = delay.as_millis(), "will retry");
        RetryDecision::Retry { delay, retry }
    }

    /// Backoff before the `retry`-th retry (1-indexed), jitter included.
    #[must_use]
    pub fn delay_for(&self, retry: u32) -> Duration {
        self.backoff(retry) + self.jitter()
    }

    /// Backoff without jitter.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
    pub fn backoff(&self, retry: u32) -> Duration {
        let base_ms = self.base_delay.as_millis() as f64;
        let multiplier = f64::from(self.backoff_multiplier);
        let exponent = f64::from(retry.saturating_sub(1));
        let delay_ms = base_ms * multiplier.powf(exponent);
        let capped_ms = delay_ms.min(self.max_delay.as_millis() as f64);
        Duration::from_millis(capped_ms as u64)
    }

    #[allow(clippy::cast_possible_truncation)]
    fn jitter(&self) -> Duration {
        let max_ms = self.max_jitter.as_millis() as u64;
        if max_ms == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::thread_rng().gen_range(0..=max_ms))
    }
}

/// Accepted shapes for the `retries` request parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum RetryInput {
    /// `true` enables the default policy, `false` disables retrying.
    Enabled(bool),
    /// Number of retries with default backoff.
    Retries(u32),
    Policy(RetryPolicy),
}

impl From<bool> for RetryInput {
    fn from(enabled: bool) -> Self {
        Self::Enabled(enabled)
    }
}

impl From<u32> for RetryInput {
    fn from(retries: u32) -> Self {
        Self::Retries(retries)
    }
}

impl From<RetryPolicy> for RetryInput {
    fn from(policy: RetryPolicy) -> Self {
        Self::Policy(policy)
    }
}

/// Normalizes a `retries` value into a [`RetryPolicy`].
///
/// # Errors
///
/// Returns [`NormalizeError::TypeMismatch`] when a structured policy has a
/// non-finite or negative backoff multiplier.
#[instrument(level = "debug")]
pub fn normalize_retry(input: RetryInput) -> Result<RetryPolicy, NormalizeError> {
    let policy = match input {
        RetryInput::Enabled(true) => RetryPolicy::default(),
        RetryInput::Enabled(false) => RetryPolicy::disabled(),
        RetryInput::Retries(retries) => RetryPolicy::with_max_retries(retries),
        RetryInput::Policy(policy) => {
            if !policy.backoff_multiplier.is_finite() || policy.backoff_multiplier < 0.0 {
                return Err(NormalizeError::mismatch(
                    "retries",
                    "finite, non-negative backoff multiplier",
                    policy.backoff_multiplier.to_string(),
                ));
            }
            policy
        }
    };
    debug!(max_retries = policy.max_retries, "normalized retry policy");
    Ok(policy)
}

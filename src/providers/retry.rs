//! Retry configuration, delay calculation, and the retry driver loop.
//!
//! [`RetryConfig`] is a plain value with pure delay functions. The driver,
//! `with_retry()`, sleeps through the injected [`Clock`], so backoff can be
//! asserted in tests without waiting on wall time.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::warn;

use crate::clock::Clock;
use crate::{MimirError, Result, telemetry};

/// Configuration for retry behaviour on transient errors.
///
/// Uses exponential backoff with optional jitter:
///
/// ```rust
/// # use mimir::RetryConfig;
/// # use std::time::Duration;
/// let config = RetryConfig::new()
///     .max_retries(5)
///     .base_delay(Duration::from_millis(200))
///     .jitter(true);
/// assert_eq!(config.max_attempts(), 6);
/// ```
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Retries after the initial attempt. 0 = no retry. Default: 3.
    pub max_retries: u32,
    /// Delay before the first retry; doubles per retry. Default: 500ms.
    pub base_delay: Duration,
    /// Maximum delay between retries (caps exponential growth). Default: 30s.
    pub max_delay: Duration,
    /// Whether to add random jitter in `[0, base_delay]`. Default: true.
    pub jitter: bool,
    /// Timeout applied to every individual attempt. Default: 30s.
    pub attempt_timeout: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            jitter: true,
            attempt_timeout: Duration::from_secs(30),
        }
    }
}

impl RetryConfig {
    /// Create a new config with sensible defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a config that disables retries (single attempt).
    pub fn disabled() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Set the number of retries after the initial attempt.
    pub fn max_retries(mut self, n: u32) -> Self {
        self.max_retries = n;
        self
    }

    /// Set the base delay before the first retry.
    pub fn base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    /// Set the maximum delay between retries.
    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Enable or disable jitter.
    pub fn jitter(mut self, enabled: bool) -> Self {
        self.jitter = enabled;
        self
    }

    /// Set the per-attempt timeout.
    pub fn attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    /// Total attempts, including the initial request.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Calculate the delay for a given retry number (0-indexed).
    ///
    /// Uses exponential backoff: `base_delay * 2^attempt`, capped at `max_delay`.
    /// Does NOT include jitter; see [`effective_delay()`](Self::effective_delay)
    /// for the full calculation.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let delay = self
            .base_delay
            .saturating_mul(2u32.saturating_pow(attempt));
        delay.min(self.max_delay)
    }

    /// Calculate the effective delay, respecting provider `retry_after` hints.
    ///
    /// If a `retry_after` duration is provided (from a `RateLimited` error),
    /// it takes precedence over the calculated backoff and is used as-is.
    /// Otherwise jitter, when enabled, adds a uniform `[0, base_delay]`.
    pub fn effective_delay(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        if let Some(hint) = retry_after {
            return hint;
        }
        let delay = self.delay_for_attempt(attempt);
        if self.jitter && !self.base_delay.is_zero() {
            let extra = rand::thread_rng().gen_range(Duration::ZERO..=self.base_delay);
            delay.saturating_add(extra)
        } else {
            delay
        }
    }

    /// Reject a zero attempt timeout.
    pub fn validate(&self) -> Result<()> {
        if self.attempt_timeout.is_zero() {
            return Err(MimirError::Configuration(
                "attempt timeout must be non-zero".into(),
            ));
        }
        Ok(())
    }
}

/// Execute an async operation with retry logic.
///
/// Retries on transient errors (as classified by [`MimirError::is_transient()`])
/// up to `config.max_retries` times, sleeping through `clock` between attempts
/// and respecting `retry_after` hints from `RateLimited` errors.
///
/// Every other error, including a `CircuitOpen` rejection, is returned
/// immediately. A transient error is also returned as-is once `keep_retrying`
/// reports false, before any backoff is slept.
pub(crate) async fn with_retry<F, Fut, T>(
    config: &RetryConfig,
    clock: &dyn Clock,
    target: &str,
    keep_retrying: impl Fn() -> bool,
    f: F,
) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0;
    loop {
        match f().await {
            Ok(result) => return Ok(result),
            Err(e)
                if e.is_transient() && attempt < config.max_retries && keep_retrying() =>
            {
                let delay = config.effective_delay(attempt, e.retry_after());
                metrics::counter!(telemetry::RETRIES_TOTAL, "target" => target.to_owned())
                    .increment(1);
                warn!(
                    target,
                    attempt = attempt + 1,
                    max_attempts = config.max_attempts(),
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "retrying after transient error"
                );
                clock.sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

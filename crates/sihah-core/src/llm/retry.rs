//! Bounded exponential backoff for retryable model failures.
//!
//! Attempt numbers are 1-based. The delay after attempt `n` is
//! `initial * multiplier^(n-1)`, capped at `max_backoff`. A provider's
//! `retry_after_ms` hint wins when it asks for a longer wait. Every attempt
//! and every sleep is bounded by the caller's deadline.

use std::future::Future;
use std::time::Duration;

use sihah_types::config::RetryConfig;
use sihah_types::llm::LlmError;
use tokio::time::Instant;
use tracing::warn;

/// Why a retried operation gave up.
#[derive(Debug)]
pub enum RetryFailure {
    /// The last attempt failed with a non-retryable error, or attempts ran out.
    Exhausted { attempts: u32, last: LlmError },
    /// The deadline passed during an attempt or would pass during a backoff.
    DeadlineExceeded { attempts: u32 },
}

/// Retry schedule for model invocations.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
            max_backoff: Duration::from_millis(config.max_backoff_ms),
            multiplier: if config.multiplier.is_finite() && config.multiplier >= 1.0 {
                config.multiplier
            } else {
                1.0
            },
        }
    }
}

impl RetryPolicy {
    /// Computed backoff after the given (1-based) attempt.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(32) as i32;
        let millis = self.initial_backoff.as_millis() as f64 * self.multiplier.powi(exp);
        let capped = millis.min(self.max_backoff.as_millis() as f64);
        Duration::from_millis(capped as u64)
    }

    /// Delay before the next attempt, honouring a provider `retry_after_ms`
    /// hint when it is longer than the computed backoff.
    pub fn delay_after(&self, attempt: u32, error: &LlmError) -> Duration {
        let computed = self.backoff(attempt);
        match error.retry_after_ms() {
            Some(ms) => computed.max(Duration::from_millis(ms)),
            None => computed,
        }
    }

    pub fn should_retry(&self, attempt: u32, error: &LlmError) -> bool {
        error.is_retryable() && attempt < self.max_attempts
    }

    /// Run `op` until it succeeds, fails permanently, runs out of attempts,
    /// or the deadline passes. Returns the value and the attempt count.
    pub async fn run<T, F, Fut>(&self, deadline: Instant, mut op: F) -> Result<(T, u32), RetryFailure>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, LlmError>>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let result = match tokio::time::timeout_at(deadline, op(attempt)).await {
                Ok(result) => result,
                Err(_) => return Err(RetryFailure::DeadlineExceeded { attempts: attempt }),
            };

            let error = match result {
                Ok(value) => return Ok((value, attempt)),
                Err(e) => e,
            };

            if !self.should_retry(attempt, &error) {
                return Err(RetryFailure::Exhausted {
                    attempts: attempt,
                    last: error,
                });
            }

            let delay = self.delay_after(attempt, &error);
            if Instant::now() + delay >= deadline {
                return Err(RetryFailure::DeadlineExceeded { attempts: attempt });
            }
            warn!(
                attempt,
                max_attempts = self.max_attempts,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "Model invocation failed, retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }
}

//! Retry/backoff policy
//!
//! A backend-agnostic higher-order wrapper: it receives the operation and
//! a classifier from the adapter and never inspects backend-specific error
//! shapes itself. Fatal failures propagate on first occurrence; transient
//! and rate-limited failures wait an exponentially increasing, jittered
//! delay and retry up to `max_attempts`.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::error::{Error, ErrorClass, Result};

/// Retry configuration for one backend
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of attempts per wire operation
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Initial backoff duration in milliseconds
    #[serde(default = "default_base_delay")]
    pub base_delay_ms: u64,

    /// Maximum backoff duration in milliseconds
    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,
}

fn default_max_attempts() -> u32 {
    5
}

fn default_base_delay() -> u64 {
    500
}

fn default_max_delay() -> u64 {
    30_000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay(),
            max_delay_ms: default_max_delay(),
        }
    }
}

impl RetryConfig {
    /// Deterministic delay before the attempt after `attempt` (0-based):
    /// `base * 2^attempt`, a rate-limit hint overrides when larger, the
    /// configured maximum always caps.
    pub fn delay_for_attempt(&self, attempt: u32, hint: Option<Duration>) -> Duration {
        let shift = attempt.min(20);
        let calculated = self.base_delay_ms.saturating_mul(1_u64 << shift);
        let hinted = hint.map(|d| d.as_millis() as u64).unwrap_or(0);
        let bounded = calculated.max(hinted).min(self.max_delay_ms);
        Duration::from_millis(bounded)
    }

    /// Apply ±25% jitter, still capped at the configured maximum
    pub fn jittered(&self, delay: Duration) -> Duration {
        let millis = delay.as_millis() as u64;
        let spread = millis / 4;
        if spread == 0 {
            return delay;
        }
        let low = millis - spread;
        let high = (millis + spread).min(self.max_delay_ms);
        Duration::from_millis(rand::rng().random_range(low..=high.max(low)))
    }
}

/// Run `operation` with bounded retries.
///
/// The classifier decides between transient, rate-limited and fatal
/// failures. Exhausting attempts surfaces the last failure wrapped as
/// `RetriesExhausted`. Cancellation aborts immediately during backoff and
/// best-effort aborts an in-flight attempt by dropping its future.
pub async fn with_retry<T, F, Fut, C>(
    config: &RetryConfig,
    cancel: &CancellationToken,
    classify: C,
    mut operation: F,
) -> Result<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T>>,
    C: Fn(&Error) -> ErrorClass,
{
    let max_attempts = config.max_attempts.max(1);

    for attempt in 0..max_attempts {
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            result = operation(attempt) => result,
        };

        let err = match result {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        let hint = match classify(&err) {
            ErrorClass::Fatal => return Err(err),
            ErrorClass::Transient => None,
            ErrorClass::RateLimited(hint) => hint,
        };

        if attempt + 1 >= max_attempts {
            return Err(Error::RetriesExhausted {
                attempts: max_attempts,
                source: Box::new(err),
            });
        }

        let delay = config.jittered(config.delay_for_attempt(attempt, hint));
        tracing::debug!(
            attempt = attempt + 1,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "transient failure, backing off"
        );

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            _ = tokio::time::sleep(delay) => {}
        }
    }

    unreachable!("loop returns on success, fatal error or exhaustion")
}

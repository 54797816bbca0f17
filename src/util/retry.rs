//! Bounded retry with exponential backoff for transient provider failures.

use std::future::Future;
use std::time::Duration;

use crate::error::ParleyError;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, the first one included.
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(30),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// `retries` further attempts after the first.
    pub fn with_retries(retries: u32) -> Self {
        Self {
            max_attempts: retries.saturating_add(1),
            ..Self::default()
        }
    }

    /// Run `operation` until it succeeds, fails with a non-retryable error,
    /// or the attempt budget is spent.
    pub async fn execute<F, Fut, T>(&self, mut operation: F) -> Result<T, ParleyError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ParleyError>>,
    {
        let mut backoff = self.initial_backoff;
        let mut attempt = 0;
        loop {
            attempt += 1;
            let error = match operation().await {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };
            if !error.is_retryable() || attempt >= self.max_attempts {
                return Err(error);
            }

            let delay = self.delay_for(&error, backoff);
            tracing::warn!(
                attempt,
                max_attempts = self.max_attempts,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "retrying provider request"
            );
            tokio::time::sleep(delay).await;
            backoff = backoff.mul_f64(self.multiplier).min(self.max_backoff);
        }
    }

    /// A server-provided `retry_after` wins over our own schedule.
    fn delay_for(&self, error: &ParleyError, backoff: Duration) -> Duration {
        if let ParleyError::RateLimited {
            retry_after_ms: Some(ms),
        } = error
        {
            return Duration::from_millis(*ms).min(self.max_backoff);
        }
        backoff.mul_f64(0.75 + jitter() * 0.5)
    }
}

/// Value in [0, 1) derived from the clock; enough to spread concurrent retries.
fn jitter() -> f64 {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .subsec_nanos();
    f64::from(nanos % 10_000) / 10_000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test(start_paused = true)]
    async fn retries_server_errors_until_success() {
        let calls = AtomicU32::new(0);
        let result = RetryPolicy::with_retries(3)
            .execute(|| {
                let attempt = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt < 2 {
                        Err(ParleyError::api(503, "unavailable"))
                    } else {
                        Ok("ok")
                    }
                }
            })
            .await;

        assert_eq!(result.ok(), Some("ok"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn auth_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<(), ParleyError> = RetryPolicy::with_retries(3)
            .execute(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(ParleyError::Authentication("bad key".into())) }
            })
            .await;

        assert!(matches!(result, Err(ParleyError::Authentication(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn stops_after_the_attempt_budget() {
        let calls = AtomicU32::new(0);
        let result: Result<(), ParleyError> = RetryPolicy::with_retries(2)
            .execute(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(ParleyError::Timeout(10)) }
            })
            .await;

        assert!(matches!(result, Err(ParleyError::Timeout(10))));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn rate_limit_hint_overrides_backoff_but_is_capped() {
        let policy = RetryPolicy::default();
        let hinted = ParleyError::RateLimited {
            retry_after_ms: Some(1_500),
        };
        assert_eq!(
            policy.delay_for(&hinted, Duration::from_millis(100)),
            Duration::from_millis(1_500)
        );

        let huge = ParleyError::RateLimited {
            retry_after_ms: Some(600_000),
        };
        assert_eq!(policy.delay_for(&huge, Duration::ZERO), policy.max_backoff);
    }
}

//! Retry Strategy — selective retry with exponential backoff and jitter (§4.3).
//!
//! Grounded on the teacher's `resilience/src/retry.rs`, narrowed to the
//! transient-only classification §4.3 specifies.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::ResilienceError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub backoff: f64,
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            backoff: 2.0,
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryConfig {
    /// §4.3: base delay `d = min(BASE_DELAY * BACKOFF^n, MAX_DELAY)`.
    pub fn base_delay_for_attempt(&self, attempt: u32) -> Duration {
        let scaled = self.base_delay.as_secs_f64() * self.backoff.powi(attempt as i32);
        Duration::from_secs_f64(scaled.min(self.max_delay.as_secs_f64()))
    }

    /// §4.3: jitter applied uniformly in `[0.5*d, 1.5*d)`.
    pub fn jittered_delay_for_attempt(&self, attempt: u32) -> Duration {
        let base = self.base_delay_for_attempt(attempt);
        let mut rng = rand::thread_rng();
        let factor = rng.gen_range(0.5..1.5);
        Duration::from_secs_f64(base.as_secs_f64() * factor)
    }
}

/// Runs `operation` under §4.3's retry policy: up to `max_attempts` tries,
/// only retrying `ResilienceError`s classified `Transient`; the last attempt
/// propagates the underlying failure (§4.3, §8 invariant 6).
pub async fn retry_transient<F, Fut, T>(config: &RetryConfig, endpoint: &str, mut operation: F) -> Result<T, ResilienceError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, ResilienceError>>,
{
    let mut last_err = None;
    for attempt in 0..config.max_attempts {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if !err.is_retryable() || attempt + 1 == config.max_attempts {
                    last_err = Some(err);
                    break;
                }
                let delay = config.jittered_delay_for_attempt(attempt);
                warn!(endpoint, attempt, delay_ms = delay.as_millis() as u64, error = %err, "retrying after transient failure");
                tokio::time::sleep(delay).await;
                last_err = Some(err);
            }
        }
    }
    Err(last_err.expect("loop always runs at least once"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn backoff_is_capped_and_non_decreasing() {
        let config = RetryConfig {
            max_attempts: 5,
            base_delay: Duration::from_secs(1),
            backoff: 2.0,
            max_delay: Duration::from_secs(3),
        };
        let delays: Vec<Duration> = (0..5).map(|n| config.base_delay_for_attempt(n)).collect();
        for pair in delays.windows(2) {
            assert!(pair[1] >= pair[0]);
        }
        assert!(delays.iter().all(|d| *d <= config.max_delay));
    }

    #[tokio::test]
    async fn retries_transient_up_to_max_attempts() {
        let config = RetryConfig {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
            backoff: 1.0,
            max_delay: Duration::from_millis(5),
        };
        let calls = AtomicU32::new(0);
        let result: Result<(), ResilienceError> = retry_transient(&config, "e", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(ResilienceError::Connect { endpoint: "e".into(), detail: "refused".into() }) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn domain_errors_are_not_retried() {
        let config = RetryConfig::default();
        let calls = AtomicU32::new(0);
        let result: Result<(), ResilienceError> = retry_transient(&config, "e", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(ResilienceError::Domain { endpoint: "e".into(), detail: "bad input".into() }) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn circuit_open_is_not_retried() {
        let config = RetryConfig::default();
        let calls = AtomicU32::new(0);
        let result: Result<(), ResilienceError> = retry_transient(&config, "e", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(ResilienceError::CircuitOpen { endpoint: "e".into() }) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}

//! Circuit Breaker — per-endpoint three-state gate (§4.2).
//!
//! Grounded on the teacher's `resilience/src/circuit_breaker.rs`, generalized
//! from a single named breaker into a registry of breakers keyed by endpoint
//! (§4.2, §9: "breakers are per-endpoint, never shared across endpoints").

use std::sync::atomic::{AtomicU32, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::ResilienceError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u64,
    pub open_timeout: Duration,
    pub half_open_max_calls: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            open_timeout: Duration::from_secs(60),
            half_open_max_calls: 3,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CircuitBreakerStats {
    pub state: CircuitState,
    pub failure_count: u64,
}

/// A single endpoint's breaker. All transitions and counter updates happen
/// through atomics guarded by the state word, giving exclusive-access
/// semantics per breaker instance without a lock on the hot path (§4.2, §5).
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    state: AtomicU8, // 0=Closed 1=Open 2=HalfOpen
    failure_count: AtomicU64,
    half_open_inflight: AtomicU32,
    opened_at_millis: AtomicU64,
    epoch: Instant,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            state: AtomicU8::new(0),
            failure_count: AtomicU64::new(0),
            half_open_inflight: AtomicU32::new(0),
            opened_at_millis: AtomicU64::new(0),
            epoch: Instant::now(),
        }
    }

    pub fn state(&self) -> CircuitState {
        match self.state.load(Ordering::Acquire) {
            0 => CircuitState::Closed,
            1 => CircuitState::Open,
            _ => CircuitState::HalfOpen,
        }
    }

    pub fn stats(&self) -> CircuitBreakerStats {
        CircuitBreakerStats {
            state: self.state(),
            failure_count: self.failure_count.load(Ordering::Relaxed),
        }
    }

    /// Gate a call: `Err(CircuitOpen)` fails fast; `Ok(())` means the caller
    /// may proceed (and, if half-open, holds one of the limited trial slots
    /// until it reports `on_success`/`on_failure`).
    pub fn try_acquire(&self, endpoint: &str) -> Result<(), ResilienceError> {
        match self.state() {
            CircuitState::Closed => Ok(()),
            CircuitState::Open => {
                let elapsed = self.elapsed_since_open();
                if elapsed >= self.config.open_timeout {
                    // First caller past the timeout drives the open->half-open
                    // transition (§4.2: "After OPEN_TIMEOUT elapses, the next
                    // request transitions the breaker to half_open").
                    if self
                        .state
                        .compare_exchange(1, 2, Ordering::AcqRel, Ordering::Acquire)
                        .is_ok()
                    {
                        self.half_open_inflight.store(0, Ordering::Relaxed);
                        info!(endpoint, "circuit breaker open -> half_open");
                    }
                    self.try_acquire(endpoint)
                } else {
                    Err(ResilienceError::CircuitOpen { endpoint: endpoint.to_string() })
                }
            }
            CircuitState::HalfOpen => {
                let inflight = self.half_open_inflight.fetch_add(1, Ordering::AcqRel);
                if inflight < self.config.half_open_max_calls {
                    Ok(())
                } else {
                    self.half_open_inflight.fetch_sub(1, Ordering::AcqRel);
                    Err(ResilienceError::CircuitOpen { endpoint: endpoint.to_string() })
                }
            }
        }
    }

    pub fn on_success(&self, endpoint: &str) {
        if self.state() == CircuitState::HalfOpen {
            self.close(endpoint, "half_open trial succeeded");
        } else {
            self.failure_count.store(0, Ordering::Relaxed);
        }
    }

    pub fn on_failure(&self, endpoint: &str) {
        if self.state() == CircuitState::HalfOpen {
            self.open(endpoint, "half_open trial failed");
            return;
        }
        let failures = self.failure_count.fetch_add(1, Ordering::AcqRel) + 1;
        if failures >= self.config.failure_threshold {
            self.open(endpoint, &format!("{failures} consecutive failures"));
        }
    }

    fn open(&self, endpoint: &str, reason: &str) {
        self.state.store(1, Ordering::Release);
        self.opened_at_millis.store(self.epoch.elapsed().as_millis() as u64, Ordering::Relaxed);
        warn!(endpoint, reason, "circuit breaker opened");
    }

    fn close(&self, endpoint: &str, reason: &str) {
        self.state.store(0, Ordering::Release);
        self.failure_count.store(0, Ordering::Relaxed);
        self.half_open_inflight.store(0, Ordering::Relaxed);
        info!(endpoint, reason, "circuit breaker closed");
    }

    fn elapsed_since_open(&self) -> Duration {
        let opened = self.opened_at_millis.load(Ordering::Relaxed);
        self.epoch.elapsed().saturating_sub(Duration::from_millis(opened))
    }
}

/// Lazily-created, per-endpoint breakers (§4.2, §9).
#[derive(Clone)]
pub struct CircuitBreakerRegistry {
    config: CircuitBreakerConfig,
    breakers: Arc<DashMap<String, Arc<CircuitBreaker>>>,
}

impl CircuitBreakerRegistry {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            breakers: Arc::new(DashMap::new()),
        }
    }

    pub fn for_endpoint(&self, endpoint: &str) -> Arc<CircuitBreaker> {
        self.breakers
            .entry(endpoint.to_string())
            .or_insert_with(|| Arc::new(CircuitBreaker::new(self.config.clone())))
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: 2,
            open_timeout: Duration::from_millis(50),
            half_open_max_calls: 1,
        }
    }

    #[test]
    fn opens_after_failure_threshold() {
        let cb = CircuitBreaker::new(cfg());
        cb.try_acquire("e").unwrap();
        cb.on_failure("e");
        assert_eq!(cb.state(), CircuitState::Closed);
        cb.try_acquire("e").unwrap();
        cb.on_failure("e");
        assert_eq!(cb.state(), CircuitState::Open);
    }

    #[test]
    fn open_denies_until_timeout() {
        let cb = CircuitBreaker::new(cfg());
        cb.on_failure("e");
        cb.on_failure("e");
        assert!(cb.try_acquire("e").is_err());
    }

    #[test]
    fn half_open_success_closes_and_resets_counters() {
        let cb = CircuitBreaker::new(cfg());
        cb.on_failure("e");
        cb.on_failure("e");
        std::thread::sleep(Duration::from_millis(60));
        cb.try_acquire("e").unwrap();
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        cb.on_success("e");
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.stats().failure_count, 0);
    }

    #[test]
    fn half_open_failure_reopens() {
        let cb = CircuitBreaker::new(cfg());
        cb.on_failure("e");
        cb.on_failure("e");
        std::thread::sleep(Duration::from_millis(60));
        cb.try_acquire("e").unwrap();
        cb.on_failure("e");
        assert_eq!(cb.state(), CircuitState::Open);
    }

    #[test]
    fn half_open_limits_concurrent_trials() {
        let cb = CircuitBreaker::new(cfg());
        cb.on_failure("e");
        cb.on_failure("e");
        std::thread::sleep(Duration::from_millis(60));
        cb.try_acquire("e").unwrap(); // consumes the single half-open slot
        assert!(cb.try_acquire("e").is_err());
    }

    #[test]
    fn registry_never_shares_breakers_across_endpoints() {
        let registry = CircuitBreakerRegistry::new(cfg());
        let a = registry.for_endpoint("https://a");
        let b = registry.for_endpoint("https://b");
        a.on_failure("a");
        a.on_failure("a");
        assert_eq!(a.state(), CircuitState::Open);
        assert_eq!(b.state(), CircuitState::Closed);
    }
}

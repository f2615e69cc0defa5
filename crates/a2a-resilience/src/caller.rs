//! Resilient Caller — composes breaker -> retry -> RPC (§4.4).

use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::circuit_breaker::CircuitBreakerRegistry;
use crate::error::ResilienceError;
use crate::retry::{retry_transient, RetryConfig};
use crate::transport::RpcTransport;

/// Composes the breaker as the outermost gate, the retry loop inside it, and
/// a per-attempt timeout innermost (§4.4: "the breaker decision is cheap and
/// must gate every retry; the retry accounts for transient faults within a
/// single breaker-closed call").
pub struct ResilientCaller {
    breakers: CircuitBreakerRegistry,
    retry: RetryConfig,
    transport: RpcTransport,
}

impl ResilientCaller {
    pub fn new(breakers: CircuitBreakerRegistry, retry: RetryConfig, transport: RpcTransport) -> Self {
        Self { breakers, retry, transport }
    }

    pub async fn call<Req, Resp>(&self, endpoint: &str, body: &Req, timeout: Duration) -> Result<Resp, ResilienceError>
    where
        Req: Serialize,
        Resp: DeserializeOwned,
    {
        let breaker = self.breakers.for_endpoint(endpoint);
        breaker.try_acquire(endpoint)?;

        let result = retry_transient(&self.retry, endpoint, || self.transport.post_json::<Req, Resp>(endpoint, body, timeout)).await;

        match &result {
            Ok(_) => breaker.on_success(endpoint),
            Err(err) if err.counts_toward_breaker() => breaker.on_failure(endpoint),
            Err(_) => {}
        }
        result
    }

    /// Same composition as [`ResilientCaller::call`] for body-less GET calls
    /// such as agent-card discovery (§6).
    pub async fn call_get<Resp>(&self, endpoint: &str, timeout: Duration) -> Result<Resp, ResilienceError>
    where
        Resp: DeserializeOwned,
    {
        let breaker = self.breakers.for_endpoint(endpoint);
        breaker.try_acquire(endpoint)?;

        let result = retry_transient(&self.retry, endpoint, || self.transport.get_json::<Resp>(endpoint, timeout)).await;

        match &result {
            Ok(_) => breaker.on_success(endpoint),
            Err(err) if err.counts_toward_breaker() => breaker.on_failure(endpoint),
            Err(_) => {}
        }
        result
    }
}

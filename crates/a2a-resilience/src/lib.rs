//! Resilient A2A transport (§4.1-§4.4).
//!
//! Ported from the teacher's V3 `resilience` crate: circuit breakers, retry
//! logic, health checks, and structured logging, narrowed to the failure
//! taxonomy and composition order §4.1-§4.4 specify.

pub mod caller;
pub mod circuit_breaker;
pub mod error;
pub mod retry;
pub mod structured_logging;
pub mod transport;

pub use caller::ResilientCaller;
pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerRegistry, CircuitBreakerStats, CircuitState};
pub use error::{FailureKind, ResilienceError};
pub use retry::{retry_transient, RetryConfig};
pub use structured_logging::init_tracing;
pub use transport::{PoolConfig, RpcTransport, TimeoutBucket};

//! Error taxonomy shared by the transport, circuit breaker, retry and caller
//! (§7 "Error Handling Design", §9 "exceptions used for control flow").

use thiserror::Error;

/// Classifies a failure for retry/breaker decisions (§4.2 "excluded failures",
/// §4.3 "retry only if the failure is transient").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Connect error, read timeout, or 5xx — counted by the breaker, retried.
    Transient,
    /// The breaker denied the call outright — never retried, it already
    /// encodes "wait" (§4.3).
    CircuitOpen,
    /// Malformed JSON-RPC / schema mismatch — counted by the breaker, not
    /// retried (§7).
    Protocol,
    /// Remote agent reported a domain-level failure (4xx-equivalent) — never
    /// counted by the breaker, never retried (§4.2, §4.3).
    Domain,
}

#[derive(Debug, Error)]
pub enum ResilienceError {
    #[error("circuit breaker for '{endpoint}' is open")]
    CircuitOpen { endpoint: String },

    #[error("connect error calling {endpoint}: {detail}")]
    Connect { endpoint: String, detail: String },

    #[error("timeout calling {endpoint} after {elapsed_ms}ms")]
    Timeout { endpoint: String, elapsed_ms: u64 },

    #[error("{endpoint} returned HTTP {status}")]
    HttpStatus { endpoint: String, status: u16 },

    #[error("malformed response from {endpoint}: {detail}")]
    Protocol { endpoint: String, detail: String },

    #[error("{endpoint} reported a domain error: {detail}")]
    Domain { endpoint: String, detail: String },

    #[error("retry attempts exhausted after {attempts} tries: {last}")]
    RetriesExhausted { attempts: u32, last: Box<ResilienceError> },
}

impl ResilienceError {
    pub fn kind(&self) -> FailureKind {
        match self {
            ResilienceError::CircuitOpen { .. } => FailureKind::CircuitOpen,
            ResilienceError::Connect { .. } | ResilienceError::Timeout { .. } => FailureKind::Transient,
            ResilienceError::HttpStatus { status, .. } if *status >= 500 => FailureKind::Transient,
            ResilienceError::HttpStatus { .. } => FailureKind::Domain,
            ResilienceError::Protocol { .. } => FailureKind::Protocol,
            ResilienceError::Domain { .. } => FailureKind::Domain,
            ResilienceError::RetriesExhausted { last, .. } => last.kind(),
        }
    }

    /// §4.2 "excluded failures": only connection errors, timeouts, and 5xx
    /// increment the breaker's failure counter.
    pub fn counts_toward_breaker(&self) -> bool {
        matches!(self.kind(), FailureKind::Transient | FailureKind::Protocol)
    }

    /// §4.3: retry only transient failures; circuit-open and domain/protocol
    /// failures are never retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind(), FailureKind::Transient)
    }
}

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error(transparent)]
    Transport(#[from] a2a_resilience::ResilienceError),

    #[error("agent '{0}' reported status=failed: {1}")]
    DomainFailure(String, String),

    #[error("response missing required 'metadata' field (§3 A2A invariant)")]
    MissingMetadata,
}

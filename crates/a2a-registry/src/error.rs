use thiserror::Error;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("agent '{0}' is already registered")]
    AlreadyRegistered(String),

    #[error("agent '{0}' is not registered")]
    NotFound(String),

    #[error("no online agent found for '{0}'")]
    NoCapableAgent(String),

    #[error("agent-card discovery failed for endpoint '{0}': {1}")]
    DiscoveryFailed(String, String),

    #[error("failed to persist registry snapshot: {0}")]
    Persist(#[from] std::io::Error),

    #[error("failed to deserialize registry snapshot: {0}")]
    Snapshot(#[from] serde_json::Error),
}

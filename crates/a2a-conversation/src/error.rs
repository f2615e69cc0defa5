use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConversationError {
    #[error("thread '{0}' was not found on disk")]
    NotFound(String),

    #[error("failed to persist thread state: {0}")]
    Persist(#[from] std::io::Error),

    #[error("failed to (de)serialize thread state: {0}")]
    Snapshot(#[from] serde_json::Error),
}

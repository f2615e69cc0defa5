use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("planner failed: {0}")]
    Planner(String),

    #[error(transparent)]
    Plan(#[from] a2a_types::PlanError),

    #[error(transparent)]
    Registry(#[from] a2a_registry::RegistryError),

    #[error(transparent)]
    Protocol(#[from] a2a_protocol::ProtocolError),

    #[error(transparent)]
    Conversation(#[from] a2a_conversation::ConversationError),
}

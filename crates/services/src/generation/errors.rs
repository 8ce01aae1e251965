use crate::conversations::ConversationError;

#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("Conversation not found")]
    ConversationNotFound,

    #[error("Conversation belongs to a different owner")]
    OwnerMismatch,

    #[error("Invalid retry target: {0}")]
    InvalidRetryTarget(String),

    #[error("Invalid parameters: {0}")]
    InvalidParams(String),

    #[error("History unavailable: {0}")]
    HistoryUnavailable(String),

    /// The completion backend failed before producing any content
    #[error("Completion transport failed: {0}")]
    TransportFailure(String),

    /// Content was already streamed but could not be saved
    #[error("Failed to persist assistant message: {0}")]
    PersistenceFailure(String),
}

impl From<ConversationError> for GenerationError {
    fn from(err: ConversationError) -> Self {
        match err {
            ConversationError::NotFound => GenerationError::ConversationNotFound,
            ConversationError::InvalidParams(msg) => GenerationError::InvalidParams(msg),
            ConversationError::InternalError(msg) => GenerationError::HistoryUnavailable(msg),
        }
    }
}

use async_trait::async_trait;
use chrono::{DateTime, Utc};

#[cfg(any(test, feature = "test-mocks"))]
use mockall::automock;

pub use super::errors::ConversationError;
pub use super::models::*;

/// Conversation (thread) metadata storage
#[cfg_attr(any(test, feature = "test-mocks"), automock)]
#[async_trait]
pub trait ConversationRepository: Send + Sync {
    async fn create(&self, owner: Owner, params: NewConversation) -> anyhow::Result<Conversation>;

    async fn get_by_id(&self, id: ConversationId) -> anyhow::Result<Option<Conversation>>;

    /// Most recently updated first
    async fn list_by_owner(
        &self,
        owner: &Owner,
        limit: i64,
        offset: i64,
    ) -> anyhow::Result<Vec<Conversation>>;

    async fn update(
        &self,
        id: ConversationId,
        update: ConversationUpdate,
    ) -> anyhow::Result<Option<Conversation>>;

    /// Assign `share_id` unless one is already set; returns the stored conversation
    async fn assign_share_id(
        &self,
        id: ConversationId,
        share_id: String,
    ) -> anyhow::Result<Option<Conversation>>;

    async fn get_by_share_id(&self, share_id: &str) -> anyhow::Result<Option<Conversation>>;

    /// Move every conversation and message of a guest session to a user
    async fn transfer_guest_ownership(
        &self,
        guest: &GuestSessionId,
        user: &UserId,
    ) -> anyhow::Result<SyncSummary>;

    /// Guest conversations not updated since `cutoff`
    async fn list_stale_guest_conversations(
        &self,
        cutoff: DateTime<Utc>,
    ) -> anyhow::Result<Vec<ConversationId>>;
}

/// Ordered message history per conversation
#[cfg_attr(any(test, feature = "test-mocks"), automock)]
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Insert a message. Its creation time is strictly greater than every
    /// existing message of the same conversation, and its owner is the
    /// conversation's owner at the moment of the write.
    async fn append(&self, message: NewMessage) -> anyhow::Result<Message>;

    async fn list_ordered(&self, conversation_id: ConversationId) -> anyhow::Result<Vec<Message>>;

    /// Messages created strictly before `before`; empty if `before` is unknown
    async fn list_before(
        &self,
        conversation_id: ConversationId,
        before: MessageId,
    ) -> anyhow::Result<Vec<Message>>;

    /// Replace content and model in place; position in the ordering is unchanged
    async fn overwrite(
        &self,
        message_id: MessageId,
        content: String,
        model: String,
    ) -> anyhow::Result<Option<Message>>;

    async fn find_by_id(&self, message_id: MessageId) -> anyhow::Result<Option<Message>>;

    async fn find_latest(&self, conversation_id: ConversationId) -> anyhow::Result<Option<Message>>;

    /// Delete the conversation and all of its messages. Returns the number of
    /// messages removed, or `None` when the conversation did not exist.
    async fn delete_conversation_cascade(
        &self,
        conversation_id: ConversationId,
    ) -> anyhow::Result<Option<u64>>;
}

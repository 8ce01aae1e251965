use std::sync::Arc;

use chrono::{Duration, Utc};
use uuid::Uuid;

use super::ports::*;
use crate::id_prefixes::PREFIX_SHARE;

const MAX_TITLE_LEN: usize = 200;

pub struct ConversationServiceImpl {
    conv_repo: Arc<dyn ConversationRepository>,
    history: Arc<dyn HistoryStore>,
}

impl ConversationServiceImpl {
    pub fn new(
        conv_repo: Arc<dyn ConversationRepository>,
        history: Arc<dyn HistoryStore>,
    ) -> Self {
        Self { conv_repo, history }
    }

    /// Load a conversation visible to `owner`. Conversations of other owners are reported
    /// as not found.
    async fn owned_conversation(
        &self,
        id: ConversationId,
        owner: &Owner,
    ) -> Result<Conversation, ConversationError> {
        let conversation = self
            .conv_repo
            .get_by_id(id)
            .await
            .map_err(|e| {
                ConversationError::InternalError(format!("Failed to get conversation: {e}"))
            })?
            .ok_or(ConversationError::NotFound)?;

        if &conversation.owner != owner {
            tracing::debug!("Conversation {} requested by non-owner {}", id, owner);
            return Err(ConversationError::NotFound);
        }
        Ok(conversation)
    }

    fn validate_title(title: &str) -> Result<(), ConversationError> {
        if title.trim().is_empty() {
            return Err(ConversationError::InvalidParams(
                "title must not be empty".to_string(),
            ));
        }
        if title.chars().count() > MAX_TITLE_LEN {
            return Err(ConversationError::InvalidParams(format!(
                "title must be at most {MAX_TITLE_LEN} characters"
            )));
        }
        Ok(())
    }

    /// Create a new conversation
    pub async fn create_conversation(
        &self,
        owner: Owner,
        params: NewConversation,
    ) -> Result<Conversation, ConversationError> {
        if params.model.trim().is_empty() {
            return Err(ConversationError::InvalidParams(
                "model must not be empty".to_string(),
            ));
        }
        if let Some(title) = &params.title {
            Self::validate_title(title)?;
        }
        params.settings.validate()?;

        tracing::info!("Creating conversation for {}", owner);

        let conversation = self.conv_repo.create(owner, params).await.map_err(|e| {
            ConversationError::InternalError(format!("Failed to create conversation: {e}"))
        })?;

        tracing::info!("Created conversation: {}", conversation.id);
        Ok(conversation)
    }

    /// Get a conversation by ID
    pub async fn get_conversation(
        &self,
        id: ConversationId,
        owner: &Owner,
    ) -> Result<Conversation, ConversationError> {
        self.owned_conversation(id, owner).await
    }

    /// List conversations for an owner
    pub async fn list_conversations(
        &self,
        owner: &Owner,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> Result<Vec<Conversation>, ConversationError> {
        let limit = limit.unwrap_or(20).clamp(1, 100);
        let offset = offset.unwrap_or(0).max(0);

        let conversations = self
            .conv_repo
            .list_by_owner(owner, limit, offset)
            .await
            .map_err(|e| {
                ConversationError::InternalError(format!("Failed to list conversations: {e}"))
            })?;

        tracing::debug!("Found {} conversations for {}", conversations.len(), owner);
        Ok(conversations)
    }

    /// Update title, model, settings, active flag or metadata
    pub async fn update_conversation(
        &self,
        id: ConversationId,
        owner: &Owner,
        update: ConversationUpdate,
    ) -> Result<Conversation, ConversationError> {
        if let Some(title) = &update.title {
            Self::validate_title(title)?;
        }
        if let Some(settings) = &update.settings {
            settings.validate()?;
        }
        let current = self.owned_conversation(id, owner).await?;
        if update.is_empty() {
            return Ok(current);
        }

        self.conv_repo
            .update(id, update)
            .await
            .map_err(|e| {
                ConversationError::InternalError(format!("Failed to update conversation: {e}"))
            })?
            .ok_or(ConversationError::NotFound)
    }

    /// Hard delete a conversation together with all of its messages
    pub async fn delete_conversation(
        &self,
        id: ConversationId,
        owner: &Owner,
    ) -> Result<u64, ConversationError> {
        self.owned_conversation(id, owner).await?;

        let removed = self
            .history
            .delete_conversation_cascade(id)
            .await
            .map_err(|e| {
                ConversationError::InternalError(format!("Failed to delete conversation: {e}"))
            })?
            .ok_or(ConversationError::NotFound)?;

        tracing::info!("Deleted conversation {} with {} messages", id, removed);
        Ok(removed)
    }

    /// Ordered message history of an owned conversation
    pub async fn list_messages(
        &self,
        id: ConversationId,
        owner: &Owner,
    ) -> Result<Vec<Message>, ConversationError> {
        self.owned_conversation(id, owner).await?;
        self.history.list_ordered(id).await.map_err(|e| {
            ConversationError::InternalError(format!("Failed to list messages: {e}"))
        })
    }

    /// Make a conversation readable by link. Sharing again returns the same share ID.
    pub async fn share_conversation(
        &self,
        id: ConversationId,
        owner: &Owner,
    ) -> Result<String, ConversationError> {
        let conversation = self.owned_conversation(id, owner).await?;
        if let Some(share_id) = conversation.share_id {
            return Ok(share_id);
        }

        let candidate = format!("{PREFIX_SHARE}{}", Uuid::new_v4().simple());
        let stored = self
            .conv_repo
            .assign_share_id(id, candidate)
            .await
            .map_err(|e| {
                ConversationError::InternalError(format!("Failed to share conversation: {e}"))
            })?
            .ok_or(ConversationError::NotFound)?;

        // A concurrent share may have won; the stored value is authoritative
        let share_id = stored.share_id.ok_or_else(|| {
            ConversationError::InternalError("Share ID was not persisted".to_string())
        })?;
        tracing::info!("Shared conversation {} as {}", id, share_id);
        Ok(share_id)
    }

    /// Public read of a shared conversation
    pub async fn get_shared_conversation(
        &self,
        share_id: &str,
    ) -> Result<(Conversation, Vec<Message>), ConversationError> {
        let conversation = self
            .conv_repo
            .get_by_share_id(share_id)
            .await
            .map_err(|e| {
                ConversationError::InternalError(format!("Failed to get shared conversation: {e}"))
            })?
            .ok_or(ConversationError::NotFound)?;

        let messages = self
            .history
            .list_ordered(conversation.id)
            .await
            .map_err(|e| {
                ConversationError::InternalError(format!("Failed to list messages: {e}"))
            })?;

        Ok((conversation, messages))
    }

    /// Copy a shared conversation, with its full history, into a new conversation for `owner`
    pub async fn fork_shared_conversation(
        &self,
        share_id: &str,
        owner: Owner,
        title: Option<String>,
    ) -> Result<Conversation, ConversationError> {
        if let Some(title) = &title {
            Self::validate_title(title)?;
        }
        let (source, messages) = self.get_shared_conversation(share_id).await?;

        let fork = self
            .conv_repo
            .create(
                owner.clone(),
                NewConversation {
                    title: Some(title.unwrap_or_else(|| source.title.clone())),
                    model: source.model.clone(),
                    settings: source.settings.clone(),
                    metadata: Some(serde_json::json!({ "forked_from": source.id.to_string() })),
                },
            )
            .await
            .map_err(|e| {
                ConversationError::InternalError(format!("Failed to create fork: {e}"))
            })?;

        for message in messages {
            let copied = self
                .history
                .append(NewMessage {
                    id: MessageId::new(),
                    conversation_id: fork.id,
                    role: message.role,
                    content: message.content,
                    model: message.model,
                    attachments: message.attachments,
                })
                .await;
            if let Err(e) = copied {
                tracing::error!("Failed to copy history into fork {}: {}", fork.id, e);
                // A partial fork must not stay visible to its new owner
                if let Err(cleanup) = self.history.delete_conversation_cascade(fork.id).await {
                    tracing::error!("Failed to remove partial fork {}: {}", fork.id, cleanup);
                }
                return Err(ConversationError::InternalError(format!(
                    "Failed to copy message: {e}"
                )));
            }
        }

        tracing::info!("Forked conversation {} into {} for {}", source.id, fork.id, owner);
        Ok(fork)
    }

    /// Migrate everything owned by a guest session to a signed-in user
    pub async fn sync_guest_to_user(
        &self,
        guest: &GuestSessionId,
        user: &UserId,
    ) -> Result<SyncSummary, ConversationError> {
        tracing::info!("Starting sync: guest session {} to user {}", guest, user);

        let summary = self
            .conv_repo
            .transfer_guest_ownership(guest, user)
            .await
            .map_err(|e| {
                ConversationError::InternalError(format!("Failed to sync guest session: {e}"))
            })?;

        tracing::info!(
            "Synced {} conversations and {} messages to user {}",
            summary.conversations,
            summary.messages,
            user
        );
        Ok(summary)
    }

    /// Delete guest conversations idle for longer than `retention`, including their messages
    pub async fn cleanup_expired_guest_conversations(
        &self,
        retention: Duration,
    ) -> Result<CleanupSummary, ConversationError> {
        let cutoff = Utc::now() - retention;
        let stale = self
            .conv_repo
            .list_stale_guest_conversations(cutoff)
            .await
            .map_err(|e| {
                ConversationError::InternalError(format!(
                    "Failed to list expired guest conversations: {e}"
                ))
            })?;

        let mut summary = CleanupSummary::default();
        for id in stale {
            match self.history.delete_conversation_cascade(id).await {
                Ok(Some(messages)) => {
                    summary.conversations += 1;
                    summary.messages += messages;
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::error!("Failed to delete expired guest conversation {}: {}", id, e);
                }
            }
        }

        tracing::info!(
            "Cleanup completed: {} conversations and {} messages deleted",
            summary.conversations,
            summary.messages
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::InMemoryStore;
    use std::str::FromStr;

    fn guest(id: &str) -> Owner {
        Owner::Guest(GuestSessionId::parse(id).unwrap())
    }

    fn user() -> Owner {
        Owner::User(UserId(Uuid::new_v4()))
    }

    fn service(store: &Arc<InMemoryStore>) -> ConversationServiceImpl {
        ConversationServiceImpl::new(store.clone(), store.clone())
    }

    fn new_conversation() -> NewConversation {
        NewConversation {
            model: "llama-3.3-70b-versatile".to_string(),
            ..Default::default()
        }
    }

    async fn seed_message(store: &InMemoryStore, conv: &Conversation, role: MessageRole, text: &str) {
        store
            .append(NewMessage {
                id: MessageId::new(),
                conversation_id: conv.id,
                role,
                content: text.to_string(),
                model: None,
                attachments: vec![],
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_create_uses_default_title_and_rejects_empty_model() {
        let store = Arc::new(InMemoryStore::new());
        let service = service(&store);

        let conv = service
            .create_conversation(guest("g1"), new_conversation())
            .await
            .unwrap();
        assert_eq!(conv.title, DEFAULT_TITLE);
        assert!(conv.is_active);
        assert!(conv.share_id.is_none());

        let err = service
            .create_conversation(guest("g1"), NewConversation::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ConversationError::InvalidParams(_)));
    }

    #[tokio::test]
    async fn test_other_owner_sees_not_found() {
        let store = Arc::new(InMemoryStore::new());
        let service = service(&store);
        let conv = service
            .create_conversation(guest("owner"), new_conversation())
            .await
            .unwrap();

        let err = service
            .get_conversation(conv.id, &guest("intruder"))
            .await
            .unwrap_err();
        assert!(matches!(err, ConversationError::NotFound));

        let err = service
            .delete_conversation(conv.id, &guest("intruder"))
            .await
            .unwrap_err();
        assert!(matches!(err, ConversationError::NotFound));
        assert!(store.get_by_id(conv.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_delete_cascades_to_messages() {
        let store = Arc::new(InMemoryStore::new());
        let service = service(&store);
        let owner = guest("g1");
        let conv = service
            .create_conversation(owner.clone(), new_conversation())
            .await
            .unwrap();
        seed_message(&store, &conv, MessageRole::User, "Hello").await;
        seed_message(&store, &conv, MessageRole::Assistant, "Hi").await;

        let removed = service.delete_conversation(conv.id, &owner).await.unwrap();

        assert_eq!(removed, 2);
        assert!(store.list_ordered(conv.id).await.unwrap().is_empty());
        assert_eq!(store.message_count(), 0);
        assert!(store.get_by_id(conv.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_soft_deactivates_and_keeps_owner() {
        let store = Arc::new(InMemoryStore::new());
        let service = service(&store);
        let owner = guest("g1");
        let conv = service
            .create_conversation(owner.clone(), new_conversation())
            .await
            .unwrap();

        let updated = service
            .update_conversation(
                conv.id,
                &owner,
                ConversationUpdate {
                    title: Some("Trip planning".to_string()),
                    is_active: Some(false),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.title, "Trip planning");
        assert!(!updated.is_active);
        assert_eq!(updated.owner, owner);
        assert!(updated.updated_at >= conv.updated_at);
    }

    #[tokio::test]
    async fn test_share_is_idempotent() {
        let store = Arc::new(InMemoryStore::new());
        let service = service(&store);
        let owner = user();
        let conv = service
            .create_conversation(owner.clone(), new_conversation())
            .await
            .unwrap();

        let first = service.share_conversation(conv.id, &owner).await.unwrap();
        let second = service.share_conversation(conv.id, &owner).await.unwrap();

        assert_eq!(first, second);
        assert!(first.starts_with("share_"));
        let (shared, _) = service.get_shared_conversation(&first).await.unwrap();
        assert_eq!(shared.id, conv.id);
    }

    #[tokio::test]
    async fn test_fork_copies_history_for_new_owner() {
        let store = Arc::new(InMemoryStore::new());
        let service = service(&store);
        let author = user();
        let conv = service
            .create_conversation(author.clone(), new_conversation())
            .await
            .unwrap();
        seed_message(&store, &conv, MessageRole::User, "Question").await;
        seed_message(&store, &conv, MessageRole::Assistant, "Answer").await;
        let share_id = service.share_conversation(conv.id, &author).await.unwrap();

        let reader = guest("reader");
        let fork = service
            .fork_shared_conversation(&share_id, reader.clone(), None)
            .await
            .unwrap();

        assert_ne!(fork.id, conv.id);
        assert_eq!(fork.owner, reader);
        assert_eq!(fork.title, conv.title);
        assert!(fork.share_id.is_none());

        let copied = service.list_messages(fork.id, &reader).await.unwrap();
        let contents: Vec<_> = copied.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["Question", "Answer"]);
        assert!(copied.iter().all(|m| m.owner == reader));
        // The source is untouched
        assert_eq!(store.list_ordered(conv.id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_failed_fork_leaves_no_partial_thread() {
        let store = Arc::new(InMemoryStore::new());
        let service = service(&store);
        let author = user();
        let conv = service
            .create_conversation(author.clone(), new_conversation())
            .await
            .unwrap();
        seed_message(&store, &conv, MessageRole::User, "Question").await;
        seed_message(&store, &conv, MessageRole::Assistant, "Answer").await;
        let share_id = service.share_conversation(conv.id, &author).await.unwrap();

        store.fail_assistant_writes(true);
        let reader = guest("reader");
        let err = service
            .fork_shared_conversation(&share_id, reader.clone(), None)
            .await
            .unwrap_err();

        assert!(matches!(err, ConversationError::InternalError(_)));
        let visible = service
            .list_conversations(&reader, None, None)
            .await
            .unwrap();
        assert!(visible.is_empty());
        // Only the source's two messages remain
        assert_eq!(store.message_count(), 2);
    }

    #[tokio::test]
    async fn test_fork_of_unknown_share_is_not_found() {
        let store = Arc::new(InMemoryStore::new());
        let err = service(&store)
            .fork_shared_conversation("share_missing", guest("g"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, ConversationError::NotFound));
    }

    #[tokio::test]
    async fn test_sync_guest_moves_conversations_and_messages() {
        let store = Arc::new(InMemoryStore::new());
        let service = service(&store);
        let guest_owner = guest("visitor");
        let conv = service
            .create_conversation(guest_owner.clone(), new_conversation())
            .await
            .unwrap();
        seed_message(&store, &conv, MessageRole::User, "Hi").await;
        let other = service
            .create_conversation(guest("someone-else"), new_conversation())
            .await
            .unwrap();

        let user_id = UserId::from_str(&Uuid::new_v4().to_string()).unwrap();
        let summary = service
            .sync_guest_to_user(guest_owner.guest_session_id().unwrap(), &user_id)
            .await
            .unwrap();

        assert_eq!(summary, SyncSummary { conversations: 1, messages: 1 });
        let moved = service
            .get_conversation(conv.id, &Owner::User(user_id))
            .await
            .unwrap();
        assert_eq!(moved.owner, Owner::User(user_id));
        let messages = store.list_ordered(conv.id).await.unwrap();
        assert!(messages.iter().all(|m| m.owner == Owner::User(user_id)));
        assert_eq!(
            store.get_by_id(other.id).await.unwrap().unwrap().owner,
            guest("someone-else")
        );
    }

    #[tokio::test]
    async fn test_cleanup_removes_only_stale_guest_conversations() {
        let store = Arc::new(InMemoryStore::new());
        let service = service(&store);
        let stale = service
            .create_conversation(guest("old"), new_conversation())
            .await
            .unwrap();
        seed_message(&store, &stale, MessageRole::User, "old message").await;
        let fresh = service
            .create_conversation(guest("new"), new_conversation())
            .await
            .unwrap();
        let member = service
            .create_conversation(user(), new_conversation())
            .await
            .unwrap();
        store.backdate(stale.id, Duration::days(31));
        store.backdate(member.id, Duration::days(90));

        let summary = service
            .cleanup_expired_guest_conversations(Duration::days(30))
            .await
            .unwrap();

        assert_eq!(summary, CleanupSummary { conversations: 1, messages: 1 });
        assert!(store.get_by_id(stale.id).await.unwrap().is_none());
        assert!(store.get_by_id(fresh.id).await.unwrap().is_some());
        assert!(store.get_by_id(member.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_repository_failure_maps_to_internal_error() {
        let mut repo = MockConversationRepository::new();
        repo.expect_get_by_id()
            .returning(|_| Err(anyhow::anyhow!("connection refused")));
        let service = ConversationServiceImpl::new(
            Arc::new(repo),
            Arc::new(MockHistoryStore::new()),
        );

        let err = service
            .get_conversation(ConversationId::new(), &guest("g"))
            .await
            .unwrap_err();
        assert!(matches!(err, ConversationError::InternalError(msg) if msg.contains("connection refused")));
    }
}

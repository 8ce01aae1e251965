//! In-memory doubles for the storage and search ports
//!
//! `InMemoryStore` implements both `ConversationRepository` and `HistoryStore` with the
//! same ordering guarantees as the PostgreSQL repositories, so service and HTTP tests can
//! run without a database.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use crate::conversations::ports::*;
use crate::rag::ports::{DocumentChunkMatch, DocumentSearch, DocumentSearchQuery, RagError};
use crate::tools::ports::{
    WebSearchError, WebSearchParams, WebSearchProviderTrait, WebSearchResponse, WebSearchResult,
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Default)]
struct StoreState {
    conversations: HashMap<ConversationId, Conversation>,
    /// Kept in insertion order, which is also creation-time order
    messages: Vec<Message>,
    last_timestamp: Option<DateTime<Utc>>,
}

impl StoreState {
    /// Strictly increasing across the whole store
    fn next_timestamp(&mut self) -> DateTime<Utc> {
        let now = Utc::now();
        let ts = match self.last_timestamp {
            Some(last) if now <= last => last + Duration::microseconds(1),
            _ => now,
        };
        self.last_timestamp = Some(ts);
        ts
    }

    fn touch(&mut self, id: ConversationId, at: DateTime<Utc>) {
        if let Some(conversation) = self.conversations.get_mut(&id) {
            conversation.updated_at = at;
        }
    }
}

#[derive(Default)]
pub struct InMemoryStore {
    state: Mutex<StoreState>,
    fail_assistant_writes: AtomicBool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn message_count(&self) -> usize {
        lock(&self.state).messages.len()
    }

    /// Pretend a conversation was last updated `age` ago
    pub fn backdate(&self, id: ConversationId, age: Duration) {
        let mut state = lock(&self.state);
        if let Some(conversation) = state.conversations.get_mut(&id) {
            conversation.updated_at = Utc::now() - age;
        }
    }

    /// Make assistant inserts and overwrites fail, as a lost database connection would
    pub fn fail_assistant_writes(&self, fail: bool) {
        self.fail_assistant_writes.store(fail, Ordering::SeqCst);
    }

    fn assistant_writes_fail(&self) -> bool {
        self.fail_assistant_writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ConversationRepository for InMemoryStore {
    async fn create(&self, owner: Owner, params: NewConversation) -> anyhow::Result<Conversation> {
        let mut state = lock(&self.state);
        let now = state.next_timestamp();
        let conversation = Conversation {
            id: ConversationId::new(),
            owner,
            title: params.title.unwrap_or_else(|| DEFAULT_TITLE.to_string()),
            model: params.model,
            settings: params.settings,
            is_active: true,
            share_id: None,
            metadata: params.metadata.unwrap_or_else(|| serde_json::json!({})),
            created_at: now,
            updated_at: now,
        };
        state
            .conversations
            .insert(conversation.id, conversation.clone());
        Ok(conversation)
    }

    async fn get_by_id(&self, id: ConversationId) -> anyhow::Result<Option<Conversation>> {
        Ok(lock(&self.state).conversations.get(&id).cloned())
    }

    async fn list_by_owner(
        &self,
        owner: &Owner,
        limit: i64,
        offset: i64,
    ) -> anyhow::Result<Vec<Conversation>> {
        let state = lock(&self.state);
        let mut owned: Vec<Conversation> = state
            .conversations
            .values()
            .filter(|c| &c.owner == owner)
            .cloned()
            .collect();
        owned.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(owned
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn update(
        &self,
        id: ConversationId,
        update: ConversationUpdate,
    ) -> anyhow::Result<Option<Conversation>> {
        let mut state = lock(&self.state);
        let now = state.next_timestamp();
        let Some(conversation) = state.conversations.get_mut(&id) else {
            return Ok(None);
        };
        if let Some(title) = update.title {
            conversation.title = title;
        }
        if let Some(model) = update.model {
            conversation.model = model;
        }
        if let Some(settings) = update.settings {
            conversation.settings = settings;
        }
        if let Some(is_active) = update.is_active {
            conversation.is_active = is_active;
        }
        if let Some(metadata) = update.metadata {
            conversation.metadata = metadata;
        }
        conversation.updated_at = now;
        Ok(Some(conversation.clone()))
    }

    async fn assign_share_id(
        &self,
        id: ConversationId,
        share_id: String,
    ) -> anyhow::Result<Option<Conversation>> {
        let mut state = lock(&self.state);
        Ok(state.conversations.get_mut(&id).map(|conversation| {
            conversation.share_id.get_or_insert(share_id);
            conversation.clone()
        }))
    }

    async fn get_by_share_id(&self, share_id: &str) -> anyhow::Result<Option<Conversation>> {
        Ok(lock(&self.state)
            .conversations
            .values()
            .find(|c| c.share_id.as_deref() == Some(share_id))
            .cloned())
    }

    async fn transfer_guest_ownership(
        &self,
        guest: &GuestSessionId,
        user: &UserId,
    ) -> anyhow::Result<SyncSummary> {
        let mut state = lock(&self.state);
        let from = Owner::Guest(guest.clone());
        let to = Owner::User(*user);
        let mut summary = SyncSummary::default();

        for conversation in state.conversations.values_mut() {
            if conversation.owner == from {
                conversation.owner = to.clone();
                summary.conversations += 1;
            }
        }
        for message in state.messages.iter_mut() {
            if message.owner == from {
                message.owner = to.clone();
                summary.messages += 1;
            }
        }
        Ok(summary)
    }

    async fn list_stale_guest_conversations(
        &self,
        cutoff: DateTime<Utc>,
    ) -> anyhow::Result<Vec<ConversationId>> {
        Ok(lock(&self.state)
            .conversations
            .values()
            .filter(|c| matches!(c.owner, Owner::Guest(_)) && c.updated_at < cutoff)
            .map(|c| c.id)
            .collect())
    }
}

#[async_trait]
impl HistoryStore for InMemoryStore {
    async fn append(&self, message: NewMessage) -> anyhow::Result<Message> {
        if message.role == MessageRole::Assistant && self.assistant_writes_fail() {
            anyhow::bail!("connection to history store lost");
        }
        let mut state = lock(&self.state);
        let Some(owner) = state
            .conversations
            .get(&message.conversation_id)
            .map(|c| c.owner.clone())
        else {
            anyhow::bail!("conversation {} does not exist", message.conversation_id);
        };
        let now = state.next_timestamp();
        let stored = Message {
            id: message.id,
            conversation_id: message.conversation_id,
            role: message.role,
            content: message.content,
            model: message.model,
            owner,
            attachments: message.attachments,
            created_at: now,
            updated_at: now,
        };
        state.messages.push(stored.clone());
        state.touch(stored.conversation_id, now);
        Ok(stored)
    }

    async fn list_ordered(&self, conversation_id: ConversationId) -> anyhow::Result<Vec<Message>> {
        Ok(lock(&self.state)
            .messages
            .iter()
            .filter(|m| m.conversation_id == conversation_id)
            .cloned()
            .collect())
    }

    async fn list_before(
        &self,
        conversation_id: ConversationId,
        before: MessageId,
    ) -> anyhow::Result<Vec<Message>> {
        let state = lock(&self.state);
        let Some(pivot) = state
            .messages
            .iter()
            .find(|m| m.id == before && m.conversation_id == conversation_id)
        else {
            return Ok(Vec::new());
        };
        Ok(state
            .messages
            .iter()
            .filter(|m| m.conversation_id == conversation_id && m.created_at < pivot.created_at)
            .cloned()
            .collect())
    }

    async fn overwrite(
        &self,
        message_id: MessageId,
        content: String,
        model: String,
    ) -> anyhow::Result<Option<Message>> {
        if self.assistant_writes_fail() {
            anyhow::bail!("connection to history store lost");
        }
        let mut state = lock(&self.state);
        let now = state.next_timestamp();
        let Some(message) = state.messages.iter_mut().find(|m| m.id == message_id) else {
            return Ok(None);
        };
        message.content = content;
        message.model = Some(model);
        message.updated_at = now;
        let updated = message.clone();
        state.touch(updated.conversation_id, now);
        Ok(Some(updated))
    }

    async fn find_by_id(&self, message_id: MessageId) -> anyhow::Result<Option<Message>> {
        Ok(lock(&self.state)
            .messages
            .iter()
            .find(|m| m.id == message_id)
            .cloned())
    }

    async fn find_latest(&self, conversation_id: ConversationId) -> anyhow::Result<Option<Message>> {
        Ok(lock(&self.state)
            .messages
            .iter()
            .filter(|m| m.conversation_id == conversation_id)
            .max_by_key(|m| m.created_at)
            .cloned())
    }

    async fn delete_conversation_cascade(
        &self,
        conversation_id: ConversationId,
    ) -> anyhow::Result<Option<u64>> {
        let mut state = lock(&self.state);
        if state.conversations.remove(&conversation_id).is_none() {
            return Ok(None);
        }
        let before = state.messages.len();
        state.messages.retain(|m| m.conversation_id != conversation_id);
        Ok(Some((before - state.messages.len()) as u64))
    }
}

/// Web search double: replays queued responses, then a default single-result response
#[derive(Default)]
pub struct ScriptedWebSearch {
    responses: Mutex<VecDeque<Result<WebSearchResponse, String>>>,
    queries: Mutex<Vec<WebSearchParams>>,
}

impl ScriptedWebSearch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_response(&self, response: WebSearchResponse) -> &Self {
        lock(&self.responses).push_back(Ok(response));
        self
    }

    pub fn push_failure(&self, error: impl Into<String>) -> &Self {
        lock(&self.responses).push_back(Err(error.into()));
        self
    }

    /// Every search performed, in order
    pub fn queries(&self) -> Vec<WebSearchParams> {
        lock(&self.queries).clone()
    }

    pub fn default_response() -> WebSearchResponse {
        WebSearchResponse {
            answer: Some("Stub answer".to_string()),
            results: vec![WebSearchResult {
                title: "Example Source".to_string(),
                url: "https://example.com/article".to_string(),
                content: "Stub search content".to_string(),
                score: 0.9,
                published_date: None,
            }],
        }
    }
}

#[async_trait]
impl WebSearchProviderTrait for ScriptedWebSearch {
    async fn search(&self, params: WebSearchParams) -> Result<WebSearchResponse, WebSearchError> {
        lock(&self.queries).push(params);
        match lock(&self.responses).pop_front() {
            Some(Ok(response)) => Ok(response),
            Some(Err(error)) => Err(WebSearchError::RequestFailed(error)),
            None => Ok(Self::default_response()),
        }
    }
}

/// Document search double returning fixed matches for every query
#[derive(Default)]
pub struct StaticDocumentSearch {
    matches: Vec<DocumentChunkMatch>,
    fail: bool,
    queries: Mutex<Vec<DocumentSearchQuery>>,
}

impl StaticDocumentSearch {
    pub fn with_matches(matches: Vec<DocumentChunkMatch>) -> Self {
        Self {
            matches,
            ..Default::default()
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub fn queries(&self) -> Vec<DocumentSearchQuery> {
        lock(&self.queries).clone()
    }
}

#[async_trait]
impl DocumentSearch for StaticDocumentSearch {
    async fn search(&self, query: DocumentSearchQuery) -> Result<Vec<DocumentChunkMatch>, RagError> {
        lock(&self.queries).push(query);
        if self.fail {
            return Err(RagError::RequestFailed("vector search unavailable".to_string()));
        }
        Ok(self.matches.clone())
    }
}

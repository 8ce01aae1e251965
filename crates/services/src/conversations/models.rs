use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    conversations::errors::ConversationError,
    id_prefixes::{PREFIX_MSG, PREFIX_THREAD},
};

fn parse_prefixed(value: &str, prefix: &str, kind: &str) -> Result<Uuid, ConversationError> {
    let raw = value.strip_prefix(prefix).unwrap_or(value);
    Uuid::parse_str(raw)
        .map_err(|e| ConversationError::InvalidParams(format!("Invalid {kind} ID: {value}, error: {e}")))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConversationId(pub Uuid);

impl ConversationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConversationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::str::FromStr for ConversationId {
    type Err = ConversationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        parse_prefixed(value, PREFIX_THREAD, "conversation").map(ConversationId)
    }
}

impl From<Uuid> for ConversationId {
    fn from(uuid: Uuid) -> Self {
        ConversationId(uuid)
    }
}

impl std::fmt::Display for ConversationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{PREFIX_THREAD}{}", self.0.simple())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(pub Uuid);

impl MessageId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::str::FromStr for MessageId {
    type Err = ConversationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        parse_prefixed(value, PREFIX_MSG, "message").map(MessageId)
    }
}

impl From<Uuid> for MessageId {
    fn from(uuid: Uuid) -> Self {
        MessageId(uuid)
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{PREFIX_MSG}{}", self.0.simple())
    }
}

/// Authenticated user, as resolved by the auth layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub Uuid);

impl std::str::FromStr for UserId {
    type Err = ConversationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(value)
            .map(UserId)
            .map_err(|_| ConversationError::InvalidParams(format!("Invalid user ID: {value}")))
    }
}

impl From<Uuid> for UserId {
    fn from(uuid: Uuid) -> Self {
        UserId(uuid)
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque anonymous session identifier carried in the guest cookie
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GuestSessionId(String);

impl GuestSessionId {
    pub const MAX_LEN: usize = 128;

    pub fn parse(value: &str) -> Result<Self, ConversationError> {
        let value = value.trim();
        if value.is_empty() || value.len() > Self::MAX_LEN {
            return Err(ConversationError::InvalidParams(
                "Guest session ID must be 1-128 characters".to_string(),
            ));
        }
        if !value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(ConversationError::InvalidParams(
                "Guest session ID contains invalid characters".to_string(),
            ));
        }
        Ok(Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for GuestSessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Exactly one owner per conversation and per message
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum Owner {
    User(UserId),
    Guest(GuestSessionId),
}

impl Owner {
    pub fn user_id(&self) -> Option<&UserId> {
        match self {
            Owner::User(id) => Some(id),
            Owner::Guest(_) => None,
        }
    }

    pub fn guest_session_id(&self) -> Option<&GuestSessionId> {
        match self {
            Owner::User(_) => None,
            Owner::Guest(id) => Some(id),
        }
    }
}

impl std::fmt::Display for Owner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Owner::User(id) => write!(f, "user:{id}"),
            Owner::Guest(id) => write!(f, "guest:{id}"),
        }
    }
}

/// Per-conversation generation settings. Unset fields fall back to transport defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
}

impl GenerationSettings {
    /// Field-wise override: values set in `other` win
    pub fn merged_with(&self, other: &GenerationSettings) -> GenerationSettings {
        GenerationSettings {
            temperature: other.temperature.or(self.temperature),
            max_tokens: other.max_tokens.or(self.max_tokens),
            system_prompt: other
                .system_prompt
                .clone()
                .or_else(|| self.system_prompt.clone()),
        }
    }

    pub fn validate(&self) -> Result<(), ConversationError> {
        if let Some(temperature) = self.temperature {
            if !(0.0..=2.0).contains(&temperature) {
                return Err(ConversationError::InvalidParams(
                    "temperature must be between 0 and 2".to_string(),
                ));
            }
        }
        if self.max_tokens == Some(0) {
            return Err(ConversationError::InvalidParams(
                "max_tokens must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: ConversationId,
    pub owner: Owner,
    pub title: String,
    pub model: String,
    pub settings: GenerationSettings,
    pub is_active: bool,
    pub share_id: Option<String>,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub const DEFAULT_TITLE: &str = "New Chat";

#[derive(Debug, Clone, Default)]
pub struct NewConversation {
    pub title: Option<String>,
    pub model: String,
    pub settings: GenerationSettings,
    pub metadata: Option<serde_json::Value>,
}

/// Mutable conversation fields. Ownership is deliberately absent.
#[derive(Debug, Clone, Default)]
pub struct ConversationUpdate {
    pub title: Option<String>,
    pub model: Option<String>,
    pub settings: Option<GenerationSettings>,
    pub is_active: Option<bool>,
    pub metadata: Option<serde_json::Value>,
}

impl ConversationUpdate {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.model.is_none()
            && self.settings.is_none()
            && self.is_active.is_none()
            && self.metadata.is_none()
    }
}

/// Roles that are persisted. System turns are ephemeral and never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
        }
    }
}

impl std::str::FromStr for MessageRole {
    type Err = ConversationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "user" => Ok(MessageRole::User),
            "assistant" => Ok(MessageRole::Assistant),
            other => Err(ConversationError::InvalidParams(format!(
                "Unsupported message role: {other}"
            ))),
        }
    }
}

/// Reference to an uploaded file attached to a message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentRef {
    pub file_id: String,
    pub filename: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub conversation_id: ConversationId,
    pub role: MessageRole,
    pub content: String,
    /// Model that produced an assistant message
    pub model: Option<String>,
    pub owner: Owner,
    pub attachments: Vec<AttachmentRef>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Insert payload for the History Store. The id is chosen by the caller; the
/// owner is copied from the conversation at write time.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub id: MessageId,
    pub conversation_id: ConversationId,
    pub role: MessageRole,
    pub content: String,
    pub model: Option<String>,
    pub attachments: Vec<AttachmentRef>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncSummary {
    pub conversations: u64,
    pub messages: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupSummary {
    pub conversations: u64,
    pub messages: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_conversation_id_round_trips_through_display() {
        let id = ConversationId::new();
        let shown = id.to_string();

        assert!(shown.starts_with("thread_"));
        assert_eq!(ConversationId::from_str(&shown).unwrap(), id);
        assert_eq!(ConversationId::from_str(&id.0.to_string()).unwrap(), id);
    }

    #[test]
    fn test_message_id_rejects_garbage() {
        assert!(MessageId::from_str("msg_not-a-uuid").is_err());
    }

    #[test]
    fn test_guest_session_id_validation() {
        assert!(GuestSessionId::parse("abc-123_DEF").is_ok());
        assert!(GuestSessionId::parse("   ").is_err());
        assert!(GuestSessionId::parse("has space").is_err());
        assert!(GuestSessionId::parse(&"x".repeat(129)).is_err());
    }

    #[test]
    fn test_owner_serializes_tagged() {
        let owner = Owner::Guest(GuestSessionId::parse("g1").unwrap());
        let json = serde_json::to_value(&owner).unwrap();
        assert_eq!(json, serde_json::json!({"kind": "guest", "id": "g1"}));
    }

    #[test]
    fn test_settings_merge_prefers_override() {
        let base = GenerationSettings {
            temperature: Some(0.5),
            max_tokens: Some(1000),
            system_prompt: Some("Be brief.".to_string()),
        };
        let request = GenerationSettings {
            temperature: Some(1.2),
            ..Default::default()
        };

        let merged = base.merged_with(&request);
        assert_eq!(merged.temperature, Some(1.2));
        assert_eq!(merged.max_tokens, Some(1000));
        assert_eq!(merged.system_prompt.as_deref(), Some("Be brief."));
    }

    #[test]
    fn test_settings_validation() {
        let bad = GenerationSettings {
            temperature: Some(3.0),
            ..Default::default()
        };
        assert!(bad.validate().is_err());
        assert!(GenerationSettings::default().validate().is_ok());
    }
}

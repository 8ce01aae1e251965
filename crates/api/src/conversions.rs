use crate::models::*;
use services::conversations::models::{
    AttachmentRef, Conversation, ConversationUpdate, GenerationSettings, Message, NewConversation,
};

// ============================================================================
// HTTP to Domain Conversions
// ============================================================================

impl From<SettingsPayload> for GenerationSettings {
    fn from(settings: SettingsPayload) -> Self {
        Self {
            temperature: settings.temperature,
            max_tokens: settings.max_tokens,
            system_prompt: settings.system_prompt,
        }
    }
}

impl From<AttachmentPayload> for AttachmentRef {
    fn from(attachment: AttachmentPayload) -> Self {
        Self {
            file_id: attachment.file_id,
            filename: attachment.filename,
        }
    }
}

impl From<CreateThreadRequest> for NewConversation {
    fn from(req: CreateThreadRequest) -> Self {
        Self {
            title: req.title,
            model: req.model,
            settings: req.settings.map(Into::into).unwrap_or_default(),
            metadata: req.metadata,
        }
    }
}

impl From<UpdateThreadRequest> for ConversationUpdate {
    fn from(req: UpdateThreadRequest) -> Self {
        Self {
            title: req.title,
            model: req.model,
            settings: req.settings.map(Into::into),
            is_active: req.is_active,
            metadata: req.metadata,
        }
    }
}

// ============================================================================
// Domain to HTTP Conversions
// ============================================================================

impl From<GenerationSettings> for SettingsPayload {
    fn from(settings: GenerationSettings) -> Self {
        Self {
            temperature: settings.temperature,
            max_tokens: settings.max_tokens,
            system_prompt: settings.system_prompt,
        }
    }
}

impl From<AttachmentRef> for AttachmentPayload {
    fn from(attachment: AttachmentRef) -> Self {
        Self {
            file_id: attachment.file_id,
            filename: attachment.filename,
        }
    }
}

impl From<Conversation> for ThreadObject {
    fn from(conversation: Conversation) -> Self {
        Self {
            id: conversation.id.to_string(),
            title: conversation.title,
            model: conversation.model,
            settings: conversation.settings.into(),
            is_active: conversation.is_active,
            share_id: conversation.share_id,
            metadata: conversation.metadata,
            created_at: conversation.created_at.timestamp(),
            updated_at: conversation.updated_at.timestamp(),
        }
    }
}

impl From<Message> for MessageObject {
    fn from(message: Message) -> Self {
        Self {
            id: message.id.to_string(),
            thread_id: message.conversation_id.to_string(),
            role: message.role.as_str().to_string(),
            content: message.content,
            model: message.model,
            attachments: message.attachments.into_iter().map(Into::into).collect(),
            created_at: message.created_at.timestamp(),
            updated_at: message.updated_at.timestamp(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use services::conversations::models::{ConversationId, GuestSessionId, Owner};

    #[test]
    fn test_thread_object_uses_prefixed_id() {
        let id = ConversationId::new();
        let now = Utc::now();
        let thread: ThreadObject = Conversation {
            id,
            owner: Owner::Guest(GuestSessionId::parse("g1").unwrap()),
            title: "New Chat".to_string(),
            model: "llama-3.3-70b-versatile".to_string(),
            settings: GenerationSettings::default(),
            is_active: true,
            share_id: None,
            metadata: serde_json::json!({}),
            created_at: now,
            updated_at: now,
        }
        .into();

        assert!(thread.id.starts_with("thread_"));
        assert_eq!(thread.id, id.to_string());
        assert_eq!(thread.created_at, now.timestamp());
    }

    #[test]
    fn test_update_request_keeps_unset_fields_empty() {
        let update: ConversationUpdate = UpdateThreadRequest {
            title: Some("Renamed".to_string()),
            ..Default::default()
        }
        .into();

        assert_eq!(update.title.as_deref(), Some("Renamed"));
        assert!(update.settings.is_none());
        assert!(update.is_active.is_none());
    }
}

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

// ============================================
// Errors
// ============================================

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorDetail {
    pub message: String,
    pub r#type: String,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>, error_type: impl Into<String>) -> Self {
        Self {
            error: ErrorDetail {
                message: message.into(),
                r#type: error_type.into(),
            },
        }
    }
}

// ============================================
// Chat streaming
// ============================================

/// Per-request generation overrides
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SettingsPayload {
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub system_prompt: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentPayload {
    pub file_id: String,
    pub filename: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChatStreamRequest {
    pub thread_id: String,
    /// User text. Ignored when `assistantMsgId` is set.
    #[serde(default)]
    pub content: String,
    /// Empty uses the thread's model
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub settings: Option<SettingsPayload>,
    /// Regenerate this assistant message instead of answering new text
    #[serde(default)]
    pub assistant_msg_id: Option<String>,
    #[serde(default)]
    pub attachments: Vec<AttachmentPayload>,
    #[serde(default)]
    pub enable_web_search: bool,
    #[serde(default, rename = "enableRAG")]
    pub enable_rag: bool,
}

impl ChatStreamRequest {
    pub fn validate(&self) -> Result<(), String> {
        if self.thread_id.trim().is_empty() {
            return Err("threadId is required".to_string());
        }
        if self.assistant_msg_id.is_none() && self.content.trim().is_empty() {
            return Err("content must not be empty".to_string());
        }
        Ok(())
    }
}

// ============================================
// Threads
// ============================================

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateThreadRequest {
    pub title: Option<String>,
    pub model: String,
    #[serde(default)]
    pub settings: Option<SettingsPayload>,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

impl CreateThreadRequest {
    pub fn validate(&self) -> Result<(), String> {
        if self.model.trim().is_empty() {
            return Err("model is required".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateThreadRequest {
    pub title: Option<String>,
    pub model: Option<String>,
    pub settings: Option<SettingsPayload>,
    pub is_active: Option<bool>,
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ListThreadsQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ThreadObject {
    pub id: String,
    pub title: String,
    pub model: String,
    pub settings: SettingsPayload,
    pub is_active: bool,
    pub share_id: Option<String>,
    pub metadata: serde_json::Value,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ThreadList {
    pub object: String,
    pub data: Vec<ThreadObject>,
    pub has_more: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ThreadDeleteResult {
    pub id: String,
    pub deleted: bool,
    pub messages_deleted: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MessageObject {
    pub id: String,
    pub thread_id: String,
    pub role: String,
    pub content: String,
    pub model: Option<String>,
    pub attachments: Vec<AttachmentPayload>,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MessageList {
    pub object: String,
    pub data: Vec<MessageObject>,
}

// ============================================
// Sharing
// ============================================

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ShareResponse {
    pub share_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SharedThreadResponse {
    pub title: String,
    pub model: String,
    pub messages: Vec<MessageObject>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ForkRequest {
    pub title: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ForkResponse {
    pub thread_id: String,
}

// ============================================
// Guest sessions
// ============================================

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct GuestSyncRequest {
    pub guest_session_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct GuestSyncResponse {
    pub threads_synced: u64,
    pub messages_synced: u64,
}

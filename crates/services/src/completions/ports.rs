use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};

#[cfg(any(test, feature = "test-mocks"))]
use mockall::automock;

#[derive(Debug, thiserror::Error)]
pub enum CompletionError {
    #[error("Provider error: {0}")]
    ProviderError(String),

    #[error("Invalid provider response: {0}")]
    InvalidResponse(String),
}

/// A tool call the model made, as replayed in the transcript
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInvocation {
    pub id: String,
    pub name: String,
    /// JSON-encoded arguments exactly as the model produced them
    pub arguments: String,
}

/// One turn of the in-memory transcript sent to the completion backend.
/// System and tool turns only ever live in memory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum TranscriptTurn {
    System {
        content: String,
    },
    User {
        content: String,
    },
    Assistant {
        content: Option<String>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        tool_calls: Vec<ToolInvocation>,
    },
    Tool {
        call_id: String,
        content: String,
    },
}

impl TranscriptTurn {
    pub fn system(content: impl Into<String>) -> Self {
        TranscriptTurn::System {
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        TranscriptTurn::User {
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        TranscriptTurn::Assistant {
            content: Some(content.into()),
            tool_calls: Vec::new(),
        }
    }
}

/// Function tool advertised to the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    /// JSON schema of the arguments object
    pub parameters: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub model: String,
    pub turns: Vec<TranscriptTurn>,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Empty means no tools are offered for this pass
    pub tools: Vec<ToolSchema>,
}

/// Fragment of a streamed tool call. Fields arrive piecemeal and are keyed by `index`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ToolCallDelta {
    pub index: usize,
    pub id: Option<String>,
    pub name: Option<String>,
    pub arguments: Option<String>,
}

/// One streamed fragment: either model text or part of a tool call
#[derive(Debug, Clone, PartialEq)]
pub enum CompletionDelta {
    Content(String),
    ToolCall(ToolCallDelta),
}

pub type CompletionDeltaStream =
    Pin<Box<dyn Stream<Item = Result<CompletionDelta, CompletionError>> + Send>>;

/// Streaming chat-completion backend used by the generation orchestrator
#[cfg_attr(any(test, feature = "test-mocks"), automock)]
#[async_trait]
pub trait CompletionTransport: Send + Sync {
    /// Start one completion pass. Errors returned here happen before any fragment;
    /// later failures arrive as stream items.
    async fn stream(&self, request: CompletionRequest)
        -> Result<CompletionDeltaStream, CompletionError>;
}

//! Inference providers crate for streaming chat completions
//!
//! This crate provides a streaming-first trait interface over chat-completion backends,
//! so the generation layer can switch between a real OpenAI-compatible API and a
//! scripted mock without code changes.
//!
//! # Streaming-First Design
//!
//! Completion requests return streams of chunks rather than complete responses.
//! Chunks are delivered as they are parsed off the wire, with no batching, so
//! callers can forward content to end users with minimal latency.
//!
//! # Usage
//!
//! ```rust,ignore
//! use inference_providers::{ChatCompletionParams, ChatMessage, InferenceProvider};
//! use futures_util::StreamExt;
//!
//! async fn example<P: InferenceProvider>(provider: P) {
//!     let params = ChatCompletionParams {
//!         model: "llama-3.3-70b-versatile".to_string(),
//!         messages: vec![ChatMessage::user("Hello")],
//!         ..Default::default()
//!     };
//!
//!     let mut stream = provider.chat_completion_stream(params).await?;
//!     while let Some(event) = stream.next().await {
//!         let chunk = event?.chunk;
//!         if let Some(delta) = chunk.choices.first().and_then(|c| c.delta.as_ref()) {
//!             println!("Delta content: {:?}", delta.content);
//!         }
//!     }
//! }
//! ```

pub mod mock;
pub mod models;
pub mod openai_compatible;
pub mod sse_parser;

use std::pin::Pin;

use async_trait::async_trait;
use futures_core::Stream;

// Re-export commonly used types for convenience
pub use mock::MockProvider;
pub use models::{
    extract_error_message, ChatChoice, ChatCompletionChunk, ChatCompletionParams, ChatDelta,
    ChatMessage, CompletionError, FinishReason, FunctionCall, FunctionChoice,
    FunctionDefinition, MessageRole, TokenUsage, ToolCall, ToolChoice, ToolDefinition,
};
pub use openai_compatible::{OpenAiCompatibleConfig, OpenAiCompatibleProvider};
pub use sse_parser::{SSEEvent, SSEParser};

/// Type alias for streaming completion results
///
/// Each event carries the raw bytes received from the backend and the parsed chunk.
pub type StreamingResult = Pin<Box<dyn Stream<Item = Result<SSEEvent, CompletionError>> + Send>>;

#[async_trait]
pub trait InferenceProvider: Send + Sync {
    /// Performs a streaming chat completion request
    ///
    /// Returns an error when the request itself cannot be started (connection failure,
    /// non-success status). Failures after the first chunk are yielded as stream items.
    async fn chat_completion_stream(
        &self,
        params: ChatCompletionParams,
    ) -> Result<StreamingResult, CompletionError>;
}

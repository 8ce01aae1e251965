//! Mock implementation of InferenceProvider for testing
//!
//! Each call to `chat_completion_stream` consumes the next queued `ResponseTemplate`
//! (falling back to a default) and streams it as OpenAI-style chunks. Every request
//! is recorded so tests can assert on the exact transcript that was sent.

use crate::{
    sse_parser::SSEEvent, ChatChoice, ChatCompletionChunk, ChatCompletionParams, ChatDelta,
    CompletionError, FinishReason, FunctionCall, InferenceProvider, MessageRole,
    StreamingResult, TokenUsage, ToolCall,
};
use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream;
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

/// Template for one streamed completion pass
#[derive(Clone, Debug)]
pub struct ResponseTemplate {
    content: String,
    tool_call: Option<(String, String)>,
    failure: Option<String>,
    disconnect_after_chunks: Option<usize>,
}

impl ResponseTemplate {
    /// A pass that streams `content` word by word
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            tool_call: None,
            failure: None,
            disconnect_after_chunks: None,
        }
    }

    /// A pass that requests a single tool call and produces no content
    pub fn tool_call(name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self::new("").with_tool_call(name, arguments)
    }

    /// A pass whose request fails before any chunk is produced
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            failure: Some(message.into()),
            ..Self::new("")
        }
    }

    /// Append a tool call after the content of this pass
    pub fn with_tool_call(mut self, name: impl Into<String>, arguments: impl Into<String>) -> Self {
        self.tool_call = Some((name.into(), arguments.into()));
        self
    }

    /// Simulate a dropped connection after N chunks
    pub fn with_disconnect_after(mut self, chunks: usize) -> Self {
        self.disconnect_after_chunks = Some(chunks);
        self
    }

    fn chunk(id: &str, model: &str, delta: ChatDelta, finish: Option<FinishReason>) -> ChatCompletionChunk {
        ChatCompletionChunk {
            id: id.to_string(),
            object: "chat.completion.chunk".to_string(),
            created: 0,
            model: model.to_string(),
            choices: vec![ChatChoice {
                index: 0,
                delta: Some(delta),
                finish_reason: finish,
            }],
            usage: None,
        }
    }

    /// Generate streaming chunks from this template.
    /// Content streams word by word; tool-call arguments arrive split over two chunks.
    fn generate_chunks(&self, id: &str, model: &str) -> Vec<ChatCompletionChunk> {
        let mut chunks = Vec::new();

        for (i, word) in self.content.split(' ').filter(|w| !w.is_empty()).enumerate() {
            let text = if i == 0 { word.to_string() } else { format!(" {word}") };
            chunks.push(Self::chunk(
                id,
                model,
                ChatDelta {
                    role: (i == 0).then_some(MessageRole::Assistant),
                    content: Some(text),
                    tool_calls: None,
                },
                None,
            ));
        }

        if let Some((name, arguments)) = &self.tool_call {
            let split = arguments
                .char_indices()
                .nth(arguments.chars().count() / 2)
                .map_or(arguments.len(), |(idx, _)| idx);
            let (head, tail) = arguments.split_at(split);

            chunks.push(Self::chunk(
                id,
                model,
                ChatDelta {
                    tool_calls: Some(vec![ToolCall {
                        id: Some(format!("call_{id}")),
                        type_: Some("function".to_string()),
                        function: FunctionCall {
                            name: Some(name.clone()),
                            arguments: Some(head.to_string()),
                        },
                        index: Some(0),
                    }]),
                    ..Default::default()
                },
                None,
            ));
            chunks.push(Self::chunk(
                id,
                model,
                ChatDelta {
                    tool_calls: Some(vec![ToolCall {
                        id: None,
                        type_: None,
                        function: FunctionCall {
                            name: None,
                            arguments: Some(tail.to_string()),
                        },
                        index: Some(0),
                    }]),
                    ..Default::default()
                },
                None,
            ));
        }

        let finish = if self.tool_call.is_some() {
            FinishReason::ToolCalls
        } else {
            FinishReason::Stop
        };
        let mut last = Self::chunk(id, model, ChatDelta::default(), Some(finish));
        last.usage = Some(TokenUsage::new(0, self.content.split_whitespace().count() as i32));
        chunks.push(last);

        chunks
    }
}

pub struct MockProvider {
    queue: Mutex<VecDeque<ResponseTemplate>>,
    default: ResponseTemplate,
    requests: Mutex<Vec<ChatCompletionParams>>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self::with_default(ResponseTemplate::new("This is a mock response."))
    }

    /// Mock whose unscripted passes stream `template`
    pub fn with_default(template: ResponseTemplate) -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            default: template,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Queue a template for the next unconsumed pass
    pub fn enqueue(&self, template: ResponseTemplate) -> &Self {
        lock(&self.queue).push_back(template);
        self
    }

    /// All requests received so far, in order
    pub fn requests(&self) -> Vec<ChatCompletionParams> {
        lock(&self.requests).clone()
    }

    pub fn request_count(&self) -> usize {
        lock(&self.requests).len()
    }
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl InferenceProvider for MockProvider {
    async fn chat_completion_stream(
        &self,
        params: ChatCompletionParams,
    ) -> Result<StreamingResult, CompletionError> {
        let call_index = {
            let mut requests = lock(&self.requests);
            requests.push(params.clone());
            requests.len()
        };
        let template = lock(&self.queue)
            .pop_front()
            .unwrap_or_else(|| self.default.clone());

        if let Some(message) = template.failure {
            return Err(CompletionError::CompletionError(message));
        }

        let id = format!("mock-{call_index}");
        let chunks = template.generate_chunks(&id, &params.model);

        let mut events: Vec<Result<SSEEvent, CompletionError>> = chunks
            .into_iter()
            .map(|chunk| {
                let raw = serde_json::to_string(&chunk)
                    .map(|json| Bytes::from(format!("data: {json}\n\n")))
                    .unwrap_or_default();
                Ok(SSEEvent {
                    raw_bytes: raw,
                    chunk,
                })
            })
            .collect();

        if let Some(limit) = template.disconnect_after_chunks {
            events.truncate(limit);
            events.push(Err(CompletionError::CompletionError(
                "connection reset by peer".to_string(),
            )));
        }

        Ok(Box::pin(stream::iter(events)))
    }
}

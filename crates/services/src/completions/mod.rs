pub mod ports;

use std::sync::Arc;

use async_trait::async_trait;
use futures::{stream, StreamExt};
use inference_providers::{
    ChatCompletionParams, ChatMessage, FunctionCall, FunctionDefinition, InferenceProvider,
    MessageRole, SSEEvent, ToolCall, ToolChoice, ToolDefinition,
};

pub use ports::*;

/// Completion transport backed by an `InferenceProvider`
pub struct ProviderCompletionTransport {
    provider: Arc<dyn InferenceProvider>,
}

impl ProviderCompletionTransport {
    pub fn new(provider: Arc<dyn InferenceProvider>) -> Self {
        Self { provider }
    }

    /// Convert transcript turns to chat messages for inference providers
    fn prepare_chat_messages(turns: &[TranscriptTurn]) -> Vec<ChatMessage> {
        turns
            .iter()
            .map(|turn| match turn {
                TranscriptTurn::System { content } => ChatMessage::system(content.clone()),
                TranscriptTurn::User { content } => ChatMessage::user(content.clone()),
                TranscriptTurn::Assistant {
                    content,
                    tool_calls,
                } => ChatMessage {
                    role: MessageRole::Assistant,
                    content: content.clone(),
                    name: None,
                    tool_call_id: None,
                    tool_calls: (!tool_calls.is_empty()).then(|| {
                        tool_calls
                            .iter()
                            .map(|call| ToolCall {
                                id: Some(call.id.clone()),
                                type_: Some("function".to_string()),
                                function: FunctionCall {
                                    name: Some(call.name.clone()),
                                    arguments: Some(call.arguments.clone()),
                                },
                                index: None,
                            })
                            .collect()
                    }),
                },
                TranscriptTurn::Tool { call_id, content } => ChatMessage {
                    role: MessageRole::Tool,
                    content: Some(content.clone()),
                    name: None,
                    tool_call_id: Some(call_id.clone()),
                    tool_calls: None,
                },
            })
            .collect()
    }

    fn prepare_params(request: CompletionRequest) -> ChatCompletionParams {
        let messages = Self::prepare_chat_messages(&request.turns);
        let (tools, tool_choice) = if request.tools.is_empty() {
            (None, None)
        } else {
            let definitions = request
                .tools
                .into_iter()
                .map(|tool| ToolDefinition {
                    type_: "function".to_string(),
                    function: FunctionDefinition {
                        name: tool.name,
                        description: Some(tool.description),
                        parameters: tool.parameters,
                    },
                })
                .collect();
            (
                Some(definitions),
                Some(ToolChoice::String("auto".to_string())),
            )
        };

        ChatCompletionParams {
            model: request.model,
            messages,
            temperature: Some(request.temperature),
            max_tokens: Some(request.max_tokens),
            stream: Some(true),
            tools,
            tool_choice,
            ..Default::default()
        }
    }

    /// Split one SSE event into content and tool-call deltas, in wire order
    fn event_to_deltas(event: SSEEvent) -> Vec<CompletionDelta> {
        let mut deltas = Vec::new();
        let Some(delta) = event
            .chunk
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.delta)
        else {
            return deltas;
        };

        if let Some(content) = delta.content.filter(|c| !c.is_empty()) {
            deltas.push(CompletionDelta::Content(content));
        }
        for (position, call) in delta.tool_calls.unwrap_or_default().into_iter().enumerate() {
            deltas.push(CompletionDelta::ToolCall(ToolCallDelta {
                index: call
                    .index
                    .and_then(|i| usize::try_from(i).ok())
                    .unwrap_or(position),
                id: call.id,
                name: call.function.name,
                arguments: call.function.arguments,
            }));
        }
        deltas
    }
}

#[async_trait]
impl CompletionTransport for ProviderCompletionTransport {
    async fn stream(
        &self,
        request: CompletionRequest,
    ) -> Result<CompletionDeltaStream, CompletionError> {
        let params = Self::prepare_params(request);
        tracing::debug!(
            "Starting completion pass: model={}, messages={}, tools={}",
            params.model,
            params.messages.len(),
            params.tools.as_ref().map_or(0, Vec::len)
        );

        let llm_stream = self
            .provider
            .chat_completion_stream(params)
            .await
            .map_err(|e| {
                CompletionError::ProviderError(format!("Failed to create LLM stream: {e}"))
            })?;

        let deltas = llm_stream.flat_map(|event| {
            let items: Vec<Result<CompletionDelta, CompletionError>> = match event {
                Ok(event) => Self::event_to_deltas(event).into_iter().map(Ok).collect(),
                Err(inference_providers::CompletionError::InvalidResponse(msg)) => {
                    vec![Err(CompletionError::InvalidResponse(msg))]
                }
                Err(e) => vec![Err(CompletionError::ProviderError(e.to_string()))],
            };
            stream::iter(items)
        });

        Ok(Box::pin(deltas))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use inference_providers::mock::{MockProvider, ResponseTemplate};

    fn request(tools: Vec<ToolSchema>) -> CompletionRequest {
        CompletionRequest {
            model: "test-model".to_string(),
            turns: vec![
                TranscriptTurn::system("Be helpful."),
                TranscriptTurn::user("What's new in Rust?"),
            ],
            temperature: 0.7,
            max_tokens: 1024,
            tools,
        }
    }

    fn search_tool() -> ToolSchema {
        ToolSchema {
            name: "web_search".to_string(),
            description: "Search the web".to_string(),
            parameters: serde_json::json!({"type": "object"}),
        }
    }

    #[tokio::test]
    async fn test_content_deltas_pass_through() {
        let provider = Arc::new(MockProvider::with_default(ResponseTemplate::new(
            "Rust 2024 shipped",
        )));
        let transport = ProviderCompletionTransport::new(provider.clone());

        let deltas: Vec<_> = transport
            .stream(request(vec![]))
            .await
            .unwrap()
            .collect()
            .await;

        let text: String = deltas
            .into_iter()
            .map(|d| match d.unwrap() {
                CompletionDelta::Content(text) => text,
                CompletionDelta::ToolCall(_) => panic!("unexpected tool call"),
            })
            .collect();
        assert_eq!(text, "Rust 2024 shipped");

        let sent = &provider.requests()[0];
        assert_eq!(sent.messages.len(), 2);
        assert_eq!(sent.messages[0].role, MessageRole::System);
        assert!(sent.tools.is_none());
        assert!(sent.tool_choice.is_none());
        assert_eq!(sent.max_tokens, Some(1024));
        assert_eq!(sent.stream, Some(true));
    }

    #[tokio::test]
    async fn test_tools_are_offered_with_auto_choice() {
        let provider = Arc::new(MockProvider::new());
        provider.enqueue(ResponseTemplate::tool_call(
            "web_search",
            r#"{"query":"rust"}"#,
        ));
        let transport = ProviderCompletionTransport::new(provider.clone());

        let deltas: Vec<_> = transport
            .stream(request(vec![search_tool()]))
            .await
            .unwrap()
            .collect()
            .await;

        let calls: Vec<ToolCallDelta> = deltas
            .into_iter()
            .filter_map(|d| match d.unwrap() {
                CompletionDelta::ToolCall(call) => Some(call),
                CompletionDelta::Content(_) => None,
            })
            .collect();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].name.as_deref(), Some("web_search"));
        assert!(calls.iter().all(|c| c.index == 0));

        let sent = &provider.requests()[0];
        assert_eq!(sent.tools.as_ref().map(Vec::len), Some(1));
        assert_eq!(
            sent.tool_choice,
            Some(ToolChoice::String("auto".to_string()))
        );
    }

    #[test]
    fn test_tool_turns_convert_exhaustively() {
        let turns = vec![
            TranscriptTurn::Assistant {
                content: None,
                tool_calls: vec![ToolInvocation {
                    id: "call_1".to_string(),
                    name: "web_search".to_string(),
                    arguments: r#"{"query":"q"}"#.to_string(),
                }],
            },
            TranscriptTurn::Tool {
                call_id: "call_1".to_string(),
                content: "results".to_string(),
            },
        ];

        let messages = ProviderCompletionTransport::prepare_chat_messages(&turns);

        assert_eq!(messages[0].role, MessageRole::Assistant);
        assert!(messages[0].content.is_none());
        let calls = messages[0].tool_calls.as_ref().unwrap();
        assert_eq!(calls[0].id.as_deref(), Some("call_1"));
        assert_eq!(messages[1].role, MessageRole::Tool);
        assert_eq!(messages[1].tool_call_id.as_deref(), Some("call_1"));
    }

    #[tokio::test]
    async fn test_failure_before_first_chunk_is_an_error() {
        let provider = Arc::new(MockProvider::new());
        provider.enqueue(ResponseTemplate::failure("rate limited"));
        let transport = ProviderCompletionTransport::new(provider);

        let result = transport.stream(request(vec![])).await;
        assert!(matches!(result, Err(CompletionError::ProviderError(msg)) if msg.contains("rate limited")));
    }

    #[tokio::test]
    async fn test_disconnect_surfaces_as_stream_error() {
        let provider = Arc::new(MockProvider::new());
        provider.enqueue(ResponseTemplate::new("a b c").with_disconnect_after(1));
        let transport = ProviderCompletionTransport::new(provider);

        let deltas: Vec<_> = transport
            .stream(request(vec![]))
            .await
            .unwrap()
            .collect()
            .await;

        assert!(matches!(deltas[0], Ok(CompletionDelta::Content(_))));
        assert!(deltas.last().unwrap().is_err());
    }
}

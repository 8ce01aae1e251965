//! Integration tests for the OpenAI-compatible streaming provider
//!
//! A local httpmock server stands in for the completion API.
//! Run with: `cargo test --test integration_tests -- --nocapture`

use futures_util::StreamExt;
use httpmock::prelude::*;
use inference_providers::{
    ChatCompletionParams, ChatMessage, CompletionError, FunctionDefinition, InferenceProvider,
    OpenAiCompatibleConfig, OpenAiCompatibleProvider, ToolChoice, ToolDefinition,
};

fn provider_for(server: &MockServer) -> OpenAiCompatibleProvider {
    OpenAiCompatibleProvider::new(OpenAiCompatibleConfig {
        base_url: server.base_url(),
        api_key: "test-key".to_string(),
        timeout_seconds: 5,
    })
    .expect("client should build")
}

fn sse_body(deltas: &[&str]) -> String {
    let mut body = String::new();
    for delta in deltas {
        body.push_str(&format!(
            "data: {{\"id\":\"x\",\"object\":\"chat.completion.chunk\",\"created\":1,\"model\":\"m\",\"choices\":[{{\"index\":0,\"delta\":{delta}}}]}}\n\n"
        ));
    }
    body.push_str("data: [DONE]\n\n");
    body
}

fn params() -> ChatCompletionParams {
    ChatCompletionParams {
        model: "llama-3.3-70b-versatile".to_string(),
        messages: vec![ChatMessage::user("What is Rust?")],
        ..Default::default()
    }
}

#[tokio::test]
async fn test_streams_content_deltas() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/chat/completions")
                .header("authorization", "Bearer test-key")
                .json_body_partial(r#"{"stream": true, "model": "llama-3.3-70b-versatile"}"#);
            then.status(200)
                .header("content-type", "text/event-stream")
                .body(sse_body(&[
                    r#"{"role":"assistant","content":"Rust is"}"#,
                    r#"{"content":" a language."}"#,
                ]));
        })
        .await;

    let provider = provider_for(&server);
    let stream = provider.chat_completion_stream(params()).await.unwrap();
    let text: String = stream
        .map(|event| {
            event
                .unwrap()
                .chunk
                .choices
                .first()
                .and_then(|c| c.delta.as_ref())
                .and_then(|d| d.content.clone())
                .unwrap_or_default()
        })
        .collect::<Vec<_>>()
        .await
        .concat();

    mock.assert_async().await;
    assert_eq!(text, "Rust is a language.");
}

#[tokio::test]
async fn test_sends_tools_and_streams_tool_call_delta() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/chat/completions")
                .json_body_partial(r#"{"tool_choice": "auto"}"#);
            then.status(200).body(sse_body(&[
                r#"{"tool_calls":[{"index":0,"id":"call_1","type":"function","function":{"name":"web_search","arguments":"{\"query\":"}}]}"#,
                r#"{"tool_calls":[{"index":0,"function":{"arguments":"\"rust\"}"}}]}"#,
            ]));
        })
        .await;

    let mut request = params();
    request.tools = Some(vec![ToolDefinition {
        type_: "function".to_string(),
        function: FunctionDefinition {
            name: "web_search".to_string(),
            description: Some("Search the web".to_string()),
            parameters: serde_json::json!({"type": "object"}),
        },
    }]);
    request.tool_choice = Some(ToolChoice::String("auto".to_string()));

    let provider = provider_for(&server);
    let events: Vec<_> = provider
        .chat_completion_stream(request)
        .await
        .unwrap()
        .collect()
        .await;

    mock.assert_async().await;
    let arguments: String = events
        .into_iter()
        .filter_map(|e| e.ok())
        .filter_map(|e| e.chunk.choices.first()?.delta.clone()?.tool_calls)
        .flatten()
        .filter_map(|call| call.function.arguments)
        .collect();
    assert_eq!(arguments, r#"{"query":"rust"}"#);
}

#[tokio::test]
async fn test_error_status_fails_before_streaming() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/chat/completions");
            then.status(401)
                .body(r#"{"error":{"message":"Invalid API Key"}}"#);
        })
        .await;

    let provider = provider_for(&server);
    match provider.chat_completion_stream(params()).await {
        Err(CompletionError::HttpError {
            status_code,
            message,
        }) => {
            assert_eq!(status_code, 401);
            assert_eq!(message, "Invalid API Key");
        }
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("expected an HTTP error"),
    }
}

#[tokio::test]
async fn test_unreachable_backend_is_completion_error() {
    let provider = OpenAiCompatibleProvider::new(OpenAiCompatibleConfig {
        base_url: "http://127.0.0.1:9".to_string(),
        api_key: "k".to_string(),
        timeout_seconds: 1,
    })
    .unwrap();

    let result = provider.chat_completion_stream(params()).await;
    assert!(matches!(result, Err(CompletionError::CompletionError(_))));
}

#![allow(dead_code)]

use api::{build_app, AppState};
use inference_providers::mock::MockProvider;
use services::{
    testing::{InMemoryStore, ScriptedWebSearch},
    ConversationService, GenerationService, ProviderCompletionTransport, ToolExecutor,
};
use std::sync::Arc;

pub const MOCK_USER_ID: &str = "11111111-1111-1111-1111-111111111111";
pub const OTHER_USER_ID: &str = "22222222-2222-2222-2222-222222222222";
pub const GUEST_SESSION: &str = "guest-session-1";
pub const MODEL: &str = "llama-3.3-70b-versatile";
pub const DEFAULT_REPLY: &str = "This is a mock response.";

pub struct TestContext {
    pub server: axum_test::TestServer,
    pub state: AppState,
    pub store: Arc<InMemoryStore>,
    pub provider: Arc<MockProvider>,
    pub search: Arc<ScriptedWebSearch>,
}

/// Identity attached to a request
#[derive(Clone, Copy)]
pub enum As {
    User(&'static str),
    Guest(&'static str),
    Anonymous,
}

/// Full router over in-memory storage, a scripted completion backend and scripted web search
pub fn setup_test_server() -> TestContext {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::level_filters::LevelFilter::DEBUG)
        .try_init();

    let store = Arc::new(InMemoryStore::new());
    let provider = Arc::new(MockProvider::new());
    let search = Arc::new(ScriptedWebSearch::new());

    let generation_service = GenerationService::new(
        store.clone(),
        store.clone(),
        Arc::new(ProviderCompletionTransport::new(provider.clone())),
    )
    .with_tools(ToolExecutor::new(search.clone()));
    let conversation_service = ConversationService::new(store.clone(), store.clone());

    let state = AppState::new(
        Arc::new(conversation_service),
        Arc::new(generation_service),
    );
    let server = axum_test::TestServer::new(build_app(state.clone())).unwrap();

    TestContext {
        server,
        state,
        store,
        provider,
        search,
    }
}

pub fn with_identity(request: axum_test::TestRequest, who: As) -> axum_test::TestRequest {
    match who {
        As::User(id) => request.add_header("X-User-Id", id),
        As::Guest(session) => request.add_header("Cookie", format!("guestSessionId={session}")),
        As::Anonymous => request,
    }
}

pub async fn create_thread(server: &axum_test::TestServer, who: As) -> api::models::ThreadObject {
    let response = with_identity(server.post("/v1/threads"), who)
        .json(&serde_json::json!({ "model": MODEL }))
        .await;
    assert_eq!(response.status_code(), 201);
    response.json::<api::models::ThreadObject>()
}

pub async fn list_messages(
    server: &axum_test::TestServer,
    thread_id: &str,
    who: As,
) -> Vec<api::models::MessageObject> {
    let response = with_identity(
        server.get(format!("/v1/threads/{thread_id}/messages").as_str()),
        who,
    )
    .await;
    assert_eq!(response.status_code(), 200);
    response.json::<api::models::MessageList>().data
}

/// Send a chat turn and return (status, assistant message id header, body text)
pub async fn chat(
    server: &axum_test::TestServer,
    who: As,
    body: serde_json::Value,
) -> (u16, Option<String>, String) {
    let response = with_identity(server.post("/v1/chat/stream"), who)
        .json(&body)
        .await;
    let message_id = response
        .maybe_header("x-assistant-message-id")
        .and_then(|v| v.to_str().ok().map(str::to_string));
    (response.status_code().as_u16(), message_id, response.text())
}

/// The generation guard is released by a background task once persistence is done
pub async fn wait_until_idle(state: &AppState, thread_id: &str) {
    let id = thread_id.parse().unwrap();
    for _ in 0..100 {
        if !state.inflight.is_active(id) {
            return;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    panic!("generation for {thread_id} never finished");
}

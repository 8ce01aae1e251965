use crate::{
    middleware::RequestOwner,
    models::*,
    routes::common::{bad_request, map_generation_error, ApiError},
    AppState,
};
use axum::{
    body::Body,
    extract::{Extension, Json, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use futures::StreamExt;
use services::{
    conversations::models::{ConversationId, MessageId},
    generation::{GenerationEvent, GenerationInput, GenerationRequest},
};
use tracing::{debug, info, warn};

pub const ASSISTANT_MESSAGE_ID_HEADER: &str = "x-assistant-message-id";

fn to_generation_request(
    request: ChatStreamRequest,
    owner: RequestOwner,
) -> Result<GenerationRequest, ApiError> {
    let conversation_id: ConversationId = request
        .thread_id
        .parse()
        .map_err(|_| bad_request(format!("Invalid threadId: {}", request.thread_id)))?;

    let input = match request.assistant_msg_id {
        Some(target) => GenerationInput::Retry {
            target: target
                .parse::<MessageId>()
                .map_err(|_| bad_request(format!("Invalid assistantMsgId: {target}")))?,
        },
        None => GenerationInput::NewTurn {
            text: request.content,
            attachments: request.attachments.into_iter().map(Into::into).collect(),
        },
    };

    Ok(GenerationRequest {
        conversation_id,
        owner: owner.0,
        input,
        model: request.model,
        settings: request.settings.map(Into::into).unwrap_or_default(),
        enable_web_search: request.enable_web_search,
        enable_rag: request.enable_rag,
    })
}

/// Stream an assistant reply
///
/// Answers new user text, or regenerates an existing assistant message in place when
/// `assistantMsgId` is set. The body is a chunked `text/plain` stream of fragments;
/// the id the reply is stored under is sent up front in `X-Assistant-Message-Id`.
#[utoipa::path(
    post,
    path = "/v1/chat/stream",
    tag = "Chat",
    request_body = ChatStreamRequest,
    responses(
        (status = 200, description = "Streamed assistant reply", content_type = "text/plain"),
        (status = 400, description = "Invalid request or retry target", body = ErrorResponse),
        (status = 401, description = "No user or guest session", body = ErrorResponse),
        (status = 404, description = "Thread not found", body = ErrorResponse),
        (status = 409, description = "A reply is already being generated for this thread", body = ErrorResponse),
    )
)]
pub async fn chat_stream(
    State(app_state): State<AppState>,
    Extension(owner): Extension<RequestOwner>,
    Json(request): Json<ChatStreamRequest>,
) -> Result<Response, ApiError> {
    request.validate().map_err(bad_request)?;
    let generation_request = to_generation_request(request, owner)?;
    let conversation_id = generation_request.conversation_id;

    debug!(
        "Chat stream request for {} (web_search={}, rag={})",
        conversation_id, generation_request.enable_web_search, generation_request.enable_rag
    );

    let guard = app_state
        .inflight
        .try_acquire(conversation_id)
        .ok_or_else(|| {
            (
                StatusCode::CONFLICT,
                Json(ErrorResponse::new(
                    "A reply is already being generated for this thread",
                    "conflict_error",
                )),
            )
        })?;

    let mut stream = app_state
        .generation_service
        .generate(generation_request)
        .await
        .map_err(map_generation_error)?;

    let message_id = stream.message_id();
    info!(
        "Streaming assistant message {} for {}",
        message_id, conversation_id
    );

    // Hold the thread until the producer has persisted, even if the client disconnects
    if let Some(producer) = stream.take_producer_handle() {
        tokio::spawn(async move {
            if let Err(e) = producer.await {
                warn!("Generation task for {} ended abnormally: {}", conversation_id, e);
            }
            drop(guard);
        });
    }

    let body = stream.filter_map(|event| async move {
        match event {
            Ok(GenerationEvent::Fragment(text)) => Some(Ok(text)),
            Ok(GenerationEvent::Completed { .. }) => None,
            Err(e) => {
                warn!("Aborting chat stream: {}", e);
                Some(Err(e))
            }
        }
    });

    let header_value = HeaderValue::from_str(&message_id.to_string()).map_err(|e| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse::new(e.to_string(), "internal_error")),
        )
    })?;

    Ok((
        StatusCode::OK,
        [
            (
                header::CONTENT_TYPE,
                HeaderValue::from_static("text/plain; charset=utf-8"),
            ),
            (header::CACHE_CONTROL, HeaderValue::from_static("no-cache")),
            (
                header::HeaderName::from_static(ASSISTANT_MESSAGE_ID_HEADER),
                header_value,
            ),
        ],
        Body::from_stream(body),
    )
        .into_response())
}

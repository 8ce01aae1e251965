use crate::{
    middleware::RequestOwner,
    models::*,
    routes::common::{bad_request, map_conversation_error, ApiError},
    AppState,
};
use axum::{
    extract::{Extension, Json, Path, Query, State},
    http::StatusCode,
};
use services::conversations::models::ConversationId;
use tracing::{debug, info};

fn parse_thread_id(id: &str) -> Result<ConversationId, ApiError> {
    id.parse()
        .map_err(|_| bad_request(format!("Invalid thread id: {id}")))
}

/// Create a thread
#[utoipa::path(
    post,
    path = "/v1/threads",
    tag = "Threads",
    request_body = CreateThreadRequest,
    responses(
        (status = 201, description = "Thread created", body = ThreadObject),
        (status = 400, description = "Bad request", body = ErrorResponse),
        (status = 401, description = "Unauthorized", body = ErrorResponse),
    )
)]
pub async fn create_thread(
    State(app_state): State<AppState>,
    Extension(owner): Extension<RequestOwner>,
    Json(request): Json<CreateThreadRequest>,
) -> Result<(StatusCode, Json<ThreadObject>), ApiError> {
    request.validate().map_err(bad_request)?;

    let conversation = app_state
        .conversation_service
        .create_conversation(owner.0, request.into())
        .await
        .map_err(map_conversation_error)?;

    info!("Created thread {}", conversation.id);
    Ok((StatusCode::CREATED, Json(conversation.into())))
}

/// List the caller's threads, most recently updated first
#[utoipa::path(
    get,
    path = "/v1/threads",
    tag = "Threads",
    params(
        ("limit" = Option<i64>, Query, description = "Page size (1-100, default 20)"),
        ("offset" = Option<i64>, Query, description = "Number of threads to skip"),
    ),
    responses(
        (status = 200, description = "Threads", body = ThreadList),
        (status = 401, description = "Unauthorized", body = ErrorResponse),
    )
)]
pub async fn list_threads(
    State(app_state): State<AppState>,
    Extension(owner): Extension<RequestOwner>,
    Query(params): Query<ListThreadsQuery>,
) -> Result<Json<ThreadList>, ApiError> {
    debug!(
        "List threads for {} with limit={:?}, offset={:?}",
        owner.0, params.limit, params.offset
    );

    let conversations = app_state
        .conversation_service
        .list_conversations(&owner.0, params.limit, params.offset)
        .await
        .map_err(map_conversation_error)?;

    let has_more = params
        .limit
        .is_some_and(|limit| conversations.len() as i64 >= limit);

    Ok(Json(ThreadList {
        object: "list".to_string(),
        data: conversations.into_iter().map(Into::into).collect(),
        has_more,
    }))
}

/// Get a thread
#[utoipa::path(
    get,
    path = "/v1/threads/{thread_id}",
    tag = "Threads",
    params(("thread_id" = String, Path, description = "Thread ID")),
    responses(
        (status = 200, description = "Thread", body = ThreadObject),
        (status = 404, description = "Thread not found", body = ErrorResponse),
    )
)]
pub async fn get_thread(
    State(app_state): State<AppState>,
    Extension(owner): Extension<RequestOwner>,
    Path(thread_id): Path<String>,
) -> Result<Json<ThreadObject>, ApiError> {
    let id = parse_thread_id(&thread_id)?;
    let conversation = app_state
        .conversation_service
        .get_conversation(id, &owner.0)
        .await
        .map_err(map_conversation_error)?;

    Ok(Json(conversation.into()))
}

/// Update a thread's title, model, settings, active flag or metadata
#[utoipa::path(
    patch,
    path = "/v1/threads/{thread_id}",
    tag = "Threads",
    params(("thread_id" = String, Path, description = "Thread ID")),
    request_body = UpdateThreadRequest,
    responses(
        (status = 200, description = "Updated thread", body = ThreadObject),
        (status = 400, description = "Bad request", body = ErrorResponse),
        (status = 404, description = "Thread not found", body = ErrorResponse),
    )
)]
pub async fn update_thread(
    State(app_state): State<AppState>,
    Extension(owner): Extension<RequestOwner>,
    Path(thread_id): Path<String>,
    Json(request): Json<UpdateThreadRequest>,
) -> Result<Json<ThreadObject>, ApiError> {
    let id = parse_thread_id(&thread_id)?;
    let conversation = app_state
        .conversation_service
        .update_conversation(id, &owner.0, request.into())
        .await
        .map_err(map_conversation_error)?;

    info!("Updated thread {}", id);
    Ok(Json(conversation.into()))
}

/// Delete a thread and all of its messages
#[utoipa::path(
    delete,
    path = "/v1/threads/{thread_id}",
    tag = "Threads",
    params(("thread_id" = String, Path, description = "Thread ID")),
    responses(
        (status = 200, description = "Thread deleted", body = ThreadDeleteResult),
        (status = 404, description = "Thread not found", body = ErrorResponse),
        (status = 409, description = "A reply is being generated for this thread", body = ErrorResponse),
    )
)]
pub async fn delete_thread(
    State(app_state): State<AppState>,
    Extension(owner): Extension<RequestOwner>,
    Path(thread_id): Path<String>,
) -> Result<Json<ThreadDeleteResult>, ApiError> {
    let id = parse_thread_id(&thread_id)?;

    // The producer of a running generation still has to persist into this thread
    let _guard = app_state.inflight.try_acquire(id).ok_or_else(|| {
        (
            StatusCode::CONFLICT,
            Json(ErrorResponse::new(
                "A reply is being generated for this thread",
                "conflict_error",
            )),
        )
    })?;

    let messages_deleted = app_state
        .conversation_service
        .delete_conversation(id, &owner.0)
        .await
        .map_err(map_conversation_error)?;

    info!("Deleted thread {} with {} messages", id, messages_deleted);
    Ok(Json(ThreadDeleteResult {
        id: id.to_string(),
        deleted: true,
        messages_deleted,
    }))
}

/// List a thread's messages in order
#[utoipa::path(
    get,
    path = "/v1/threads/{thread_id}/messages",
    tag = "Threads",
    params(("thread_id" = String, Path, description = "Thread ID")),
    responses(
        (status = 200, description = "Messages", body = MessageList),
        (status = 404, description = "Thread not found", body = ErrorResponse),
    )
)]
pub async fn list_thread_messages(
    State(app_state): State<AppState>,
    Extension(owner): Extension<RequestOwner>,
    Path(thread_id): Path<String>,
) -> Result<Json<MessageList>, ApiError> {
    let id = parse_thread_id(&thread_id)?;
    let messages = app_state
        .conversation_service
        .list_messages(id, &owner.0)
        .await
        .map_err(map_conversation_error)?;

    Ok(Json(MessageList {
        object: "list".to_string(),
        data: messages.into_iter().map(Into::into).collect(),
    }))
}

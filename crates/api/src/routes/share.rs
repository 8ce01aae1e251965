use crate::{
    middleware::RequestOwner,
    models::*,
    routes::common::{bad_request, map_conversation_error, ApiError},
    AppState,
};
use axum::{
    extract::{Extension, Json, Path, State},
    http::StatusCode,
};
use services::conversations::models::ConversationId;
use tracing::info;

/// Publish a thread under a share id; sharing again returns the same id
#[utoipa::path(
    post,
    path = "/v1/threads/{thread_id}/share",
    tag = "Sharing",
    params(("thread_id" = String, Path, description = "Thread ID")),
    responses(
        (status = 200, description = "Share id", body = ShareResponse),
        (status = 404, description = "Thread not found", body = ErrorResponse),
    )
)]
pub async fn share_thread(
    State(app_state): State<AppState>,
    Extension(owner): Extension<RequestOwner>,
    Path(thread_id): Path<String>,
) -> Result<Json<ShareResponse>, ApiError> {
    let id: ConversationId = thread_id
        .parse()
        .map_err(|_| bad_request(format!("Invalid thread id: {thread_id}")))?;

    let share_id = app_state
        .conversation_service
        .share_conversation(id, &owner.0)
        .await
        .map_err(map_conversation_error)?;

    Ok(Json(ShareResponse { share_id }))
}

/// Read a shared thread. No owner is required.
#[utoipa::path(
    get,
    path = "/v1/share/{share_id}",
    tag = "Sharing",
    params(("share_id" = String, Path, description = "Share ID")),
    responses(
        (status = 200, description = "Shared thread", body = SharedThreadResponse),
        (status = 404, description = "Unknown share id", body = ErrorResponse),
    )
)]
pub async fn get_shared_thread(
    State(app_state): State<AppState>,
    Path(share_id): Path<String>,
) -> Result<Json<SharedThreadResponse>, ApiError> {
    let (conversation, messages) = app_state
        .conversation_service
        .get_shared_conversation(&share_id)
        .await
        .map_err(map_conversation_error)?;

    Ok(Json(SharedThreadResponse {
        title: conversation.title,
        model: conversation.model,
        messages: messages.into_iter().map(Into::into).collect(),
    }))
}

/// Copy a shared thread into a new thread owned by the caller
#[utoipa::path(
    post,
    path = "/v1/share/{share_id}/fork",
    tag = "Sharing",
    params(("share_id" = String, Path, description = "Share ID")),
    request_body = ForkRequest,
    responses(
        (status = 201, description = "Forked thread", body = ForkResponse),
        (status = 404, description = "Unknown share id", body = ErrorResponse),
    )
)]
pub async fn fork_shared_thread(
    State(app_state): State<AppState>,
    Extension(owner): Extension<RequestOwner>,
    Path(share_id): Path<String>,
    body: Option<Json<ForkRequest>>,
) -> Result<(StatusCode, Json<ForkResponse>), ApiError> {
    let title = body.and_then(|Json(request)| request.title);

    let fork = app_state
        .conversation_service
        .fork_shared_conversation(&share_id, owner.0, title)
        .await
        .map_err(map_conversation_error)?;

    info!("Forked shared thread {} into {}", share_id, fork.id);
    Ok((
        StatusCode::CREATED,
        Json(ForkResponse {
            thread_id: fork.id.to_string(),
        }),
    ))
}

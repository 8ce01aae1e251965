use crate::{
    middleware::RequestOwner,
    models::*,
    routes::common::{map_conversation_error, ApiError},
    AppState,
};
use axum::{
    extract::{Extension, Json, State},
    http::StatusCode,
};
use services::{GuestSessionId, Owner};

/// Move a guest session's threads to the signed-in user
#[utoipa::path(
    post,
    path = "/v1/guest/sync",
    tag = "Guest",
    request_body = GuestSyncRequest,
    responses(
        (status = 200, description = "Threads moved", body = GuestSyncResponse),
        (status = 400, description = "Invalid guest session id", body = ErrorResponse),
        (status = 401, description = "A signed-in user is required", body = ErrorResponse),
    )
)]
pub async fn sync_guest_session(
    State(app_state): State<AppState>,
    Extension(owner): Extension<RequestOwner>,
    Json(request): Json<GuestSyncRequest>,
) -> Result<Json<GuestSyncResponse>, ApiError> {
    let Owner::User(user) = owner.0 else {
        return Err((
            StatusCode::UNAUTHORIZED,
            Json(ErrorResponse::new(
                "Guest sync requires a signed-in user",
                "authentication_error",
            )),
        ));
    };

    let guest =
        GuestSessionId::parse(&request.guest_session_id).map_err(map_conversation_error)?;

    let summary = app_state
        .conversation_service
        .sync_guest_to_user(&guest, &user)
        .await
        .map_err(map_conversation_error)?;

    Ok(Json(GuestSyncResponse {
        threads_synced: summary.conversations,
        messages_synced: summary.messages,
    }))
}

use crate::models::ErrorResponse;
use axum::{http::StatusCode, Json};
use services::conversations::ConversationError;
use services::generation::GenerationError;

pub type ApiError = (StatusCode, Json<ErrorResponse>);

pub fn bad_request(message: impl Into<String>) -> ApiError {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse::new(message, "invalid_request_error")),
    )
}

/// Map conversation errors to HTTP status codes
pub fn map_conversation_error(error: ConversationError) -> ApiError {
    let (status, error_type) = match &error {
        ConversationError::NotFound => (StatusCode::NOT_FOUND, "not_found_error"),
        ConversationError::InvalidParams(_) => (StatusCode::BAD_REQUEST, "invalid_request_error"),
        ConversationError::InternalError(_) => {
            tracing::error!("Conversation operation failed: {}", error);
            (StatusCode::INTERNAL_SERVER_ERROR, "internal_error")
        }
    };
    (status, Json(ErrorResponse::new(error.to_string(), error_type)))
}

/// Map generation errors raised before streaming starts
pub fn map_generation_error(error: GenerationError) -> ApiError {
    let (status, error_type) = match &error {
        GenerationError::ConversationNotFound => (StatusCode::NOT_FOUND, "not_found_error"),
        GenerationError::OwnerMismatch => (StatusCode::FORBIDDEN, "permission_error"),
        GenerationError::InvalidRetryTarget(_) | GenerationError::InvalidParams(_) => {
            (StatusCode::BAD_REQUEST, "invalid_request_error")
        }
        GenerationError::TransportFailure(_) => (StatusCode::BAD_GATEWAY, "upstream_error"),
        GenerationError::HistoryUnavailable(_) | GenerationError::PersistenceFailure(_) => {
            tracing::error!("Generation failed before streaming: {}", error);
            (StatusCode::INTERNAL_SERVER_ERROR, "internal_error")
        }
    };
    (status, Json(ErrorResponse::new(error.to_string(), error_type)))
}

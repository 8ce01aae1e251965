use crate::models::*;
use crate::routes::health::HealthResponse;
use utoipa::openapi::security::{ApiKey, ApiKeyValue, SecurityScheme};
use utoipa::{Modify, OpenApi};

/// OpenAPI documentation configuration
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Chat API",
        description = "Threads, streamed assistant replies with optional web search and document retrieval, sharing and guest sessions.\n\n## Identity\n\nSigned-in users are identified by the `X-User-Id` header set by the auth gateway. Anonymous visitors use the `guestSessionId` cookie.",
        version = "1.0.0",
        license(name = "MIT")
    ),
    paths(
        crate::routes::chat::chat_stream,
        crate::routes::threads::create_thread,
        crate::routes::threads::list_threads,
        crate::routes::threads::get_thread,
        crate::routes::threads::update_thread,
        crate::routes::threads::delete_thread,
        crate::routes::threads::list_thread_messages,
        crate::routes::share::share_thread,
        crate::routes::share::get_shared_thread,
        crate::routes::share::fork_shared_thread,
        crate::routes::guest::sync_guest_session,
        crate::routes::health::health_check,
    ),
    components(
        schemas(
            ErrorResponse, ErrorDetail,
            ChatStreamRequest, SettingsPayload, AttachmentPayload,
            CreateThreadRequest, UpdateThreadRequest, ThreadObject, ThreadList,
            ThreadDeleteResult, MessageObject, MessageList,
            ShareResponse, SharedThreadResponse, ForkRequest, ForkResponse,
            GuestSyncRequest, GuestSyncResponse,
            HealthResponse,
        ),
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

pub struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "user_id",
                SecurityScheme::ApiKey(ApiKey::Header(ApiKeyValue::new("X-User-Id"))),
            );
            components.add_security_scheme(
                "guest_session",
                SecurityScheme::ApiKey(ApiKey::Cookie(ApiKeyValue::new("guestSessionId"))),
            );
        }

        openapi.security = Some(vec![
            utoipa::openapi::security::SecurityRequirement::new("user_id", Vec::<String>::new()),
            utoipa::openapi::security::SecurityRequirement::new(
                "guest_session",
                Vec::<String>::new(),
            ),
        ]);
    }
}

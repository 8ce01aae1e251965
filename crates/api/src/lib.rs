pub mod conversions;
pub mod middleware;
pub mod models;
pub mod openapi;
pub mod routes;

use crate::{
    middleware::{owner_middleware, InFlightGenerations},
    openapi::ApiDoc,
    routes::{
        chat::chat_stream,
        guest::sync_guest_session,
        health::health_check,
        share::{fork_shared_thread, get_shared_thread, share_thread},
        threads::{
            create_thread, delete_thread, get_thread, list_thread_messages, list_threads,
            update_thread,
        },
    },
};
use anyhow::Context;
use axum::{
    middleware::from_fn,
    response::Html,
    routing::{get, post},
    Router,
};
use config::ApiConfig;
use database::Database;
use inference_providers::{OpenAiCompatibleConfig, OpenAiCompatibleProvider};
use services::{
    conversations::ports::{ConversationRepository, HistoryStore},
    tools::TavilyProvider,
    ContextAugmentor, ConversationService, GenerationService, ProviderCompletionTransport,
    ToolExecutor,
};
use std::sync::Arc;
use tokio::task::JoinHandle;
use utoipa::OpenApi;

/// Application state shared across all route handlers
#[derive(Clone)]
pub struct AppState {
    pub conversation_service: Arc<ConversationService>,
    pub generation_service: Arc<GenerationService>,
    pub inflight: InFlightGenerations,
}

impl AppState {
    pub fn new(
        conversation_service: Arc<ConversationService>,
        generation_service: Arc<GenerationService>,
    ) -> Self {
        Self {
            conversation_service,
            generation_service,
            inflight: InFlightGenerations::new(),
        }
    }
}

/// Connect to Postgres and apply pending migrations
pub async fn init_database(db_config: &config::DatabaseConfig) -> anyhow::Result<Arc<Database>> {
    let database = Arc::new(
        Database::from_config(db_config)
            .await
            .context("Failed to connect to database")?,
    );

    tracing::info!("Starting database migrations...");
    database
        .run_migrations()
        .await
        .context("Failed to run database migrations")?;
    tracing::info!("Database migrations completed.");

    Ok(database)
}

/// Wire the conversation and generation services to their backends.
///
/// Web search is only offered when a search key is configured, and document
/// retrieval only when the `rag` section is present.
pub fn init_domain_services(
    conversations: Arc<dyn ConversationRepository>,
    history: Arc<dyn HistoryStore>,
    config: &ApiConfig,
) -> anyhow::Result<AppState> {
    let provider = OpenAiCompatibleProvider::new(OpenAiCompatibleConfig {
        base_url: config.completion.base_url.clone(),
        api_key: config.completion.api_key.clone(),
        timeout_seconds: config.completion.timeout_seconds,
    })
    .context("Failed to create completion provider")?;
    let transport = Arc::new(ProviderCompletionTransport::new(Arc::new(provider)));

    let mut generation_service =
        GenerationService::new(conversations.clone(), history.clone(), transport);

    match TavilyProvider::from_config(&config.web_search)
        .context("Failed to create web search provider")?
    {
        Some(tavily) => {
            tracing::info!("Web search enabled");
            generation_service = generation_service.with_tools(ToolExecutor::new(Arc::new(tavily)));
        }
        None => tracing::info!("Web search disabled: no search API key configured"),
    }

    let augmentor = ContextAugmentor::from_config(config.rag.as_ref())
        .context("Failed to create document retrieval client")?;
    if augmentor.is_enabled() {
        tracing::info!("Document retrieval enabled");
    } else {
        tracing::info!("Document retrieval disabled: no embedding API key configured");
    }
    generation_service = generation_service.with_augmentor(augmentor);

    let conversation_service = Arc::new(ConversationService::new(conversations, history));

    Ok(AppState::new(
        conversation_service,
        Arc::new(generation_service),
    ))
}

/// Periodically delete guest threads idle for longer than the retention window
pub fn spawn_guest_cleanup(
    conversation_service: Arc<ConversationService>,
    guest_config: &config::GuestSessionConfig,
) -> JoinHandle<()> {
    let retention = chrono::Duration::days(guest_config.retention_days);
    let period = std::time::Duration::from_secs(guest_config.cleanup_interval_seconds.max(1));

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        loop {
            interval.tick().await;
            tracing::debug!("Running guest thread cleanup");
            match conversation_service
                .cleanup_expired_guest_conversations(retention)
                .await
            {
                Ok(summary) if summary.conversations > 0 => tracing::info!(
                    "Removed {} expired guest threads ({} messages)",
                    summary.conversations,
                    summary.messages
                ),
                Ok(_) => {}
                Err(e) => tracing::error!("Guest thread cleanup failed: {}", e),
            }
        }
    })
}

/// Build the complete application router
pub fn build_app(app_state: AppState) -> Router {
    let owned_routes = Router::new()
        .route("/chat/stream", post(chat_stream))
        .route("/threads", get(list_threads).post(create_thread))
        .route(
            "/threads/{thread_id}",
            get(get_thread).patch(update_thread).delete(delete_thread),
        )
        .route("/threads/{thread_id}/messages", get(list_thread_messages))
        .route("/threads/{thread_id}/share", post(share_thread))
        .route("/share/{share_id}/fork", post(fork_shared_thread))
        .route("/guest/sync", post(sync_guest_session))
        .layer(from_fn(owner_middleware));

    let public_routes = Router::new()
        .route("/share/{share_id}", get(get_shared_thread))
        .route("/health", get(health_check));

    Router::new()
        .nest("/v1", owned_routes.merge(public_routes))
        .with_state(app_state)
        .merge(build_openapi_routes())
}

pub fn build_openapi_routes() -> Router {
    Router::new().route("/docs", get(swagger_ui_handler)).route(
        "/api-docs/openapi.json",
        get(|| async { axum::Json(ApiDoc::openapi()) }),
    )
}

async fn swagger_ui_handler() -> Html<&'static str> {
    Html(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <title>Chat API Documentation</title>
    <link rel="stylesheet" type="text/css" href="https://unpkg.com/swagger-ui-dist@5.10.5/swagger-ui.css" />
</head>
<body>
    <div id="swagger-ui"></div>
    <script src="https://unpkg.com/swagger-ui-dist@5.10.5/swagger-ui-bundle.js"></script>
    <script>
    window.onload = function() {
        SwaggerUIBundle({
            url: '/api-docs/openapi.json',
            dom_id: '#swagger-ui',
            deepLinking: true,
            persistAuthorization: true,
        });
    };
    </script>
</body>
</html>"#,
    )
}

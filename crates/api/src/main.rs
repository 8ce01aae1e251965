use api::{build_app, init_database, init_domain_services, spawn_guest_cleanup};
use config::{ApiConfig, LoggingConfig};

#[tokio::main]
async fn main() {
    // Load .env if present
    let _ = dotenvy::dotenv();

    let config = ApiConfig::load().unwrap_or_else(|e| {
        eprintln!("Failed to load configuration: {e}");
        eprintln!("Application cannot start without a valid configuration.");
        std::process::exit(1);
    });

    init_tracing(&config.logging);

    let database = init_database(&config.database)
        .await
        .unwrap_or_else(|e| {
            tracing::error!(error = ?e, "Failed to initialize database");
            std::process::exit(1);
        });

    let app_state = init_domain_services(
        database.conversations.clone(),
        database.messages.clone(),
        &config,
    )
    .unwrap_or_else(|e| {
        tracing::error!(error = ?e, "Failed to initialize services");
        std::process::exit(1);
    });

    let _cleanup = spawn_guest_cleanup(app_state.conversation_service.clone(), &config.guest);

    let app = build_app(app_state);

    let bind_address = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&bind_address)
        .await
        .unwrap_or_else(|e| {
            tracing::error!(address = %bind_address, error = %e, "Failed to bind");
            std::process::exit(1);
        });

    tracing::info!(address = %bind_address, "Server started successfully");
    tracing::info!("API Endpoints:");
    tracing::info!("  - POST /v1/chat/stream (Streamed assistant reply)");
    tracing::info!("  - GET/POST /v1/threads");
    tracing::info!("  - GET/PATCH/DELETE /v1/threads/{{id}}");
    tracing::info!("  - GET /v1/threads/{{id}}/messages");
    tracing::info!("  - POST /v1/threads/{{id}}/share, GET /v1/share/{{id}}, POST /v1/share/{{id}}/fork");
    tracing::info!("  - POST /v1/guest/sync");
    tracing::info!("  - GET /docs (OpenAPI documentation)");

    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!(error = %e, "Server error");
        std::process::exit(1);
    }
}

fn init_tracing(logging_config: &LoggingConfig) {
    let filter = logging_config.filter_directive();

    match logging_config.format.as_str() {
        "json" => {
            tracing_subscriber::fmt()
                .json()
                .with_env_filter(filter)
                .init();
        }
        "compact" => {
            tracing_subscriber::fmt()
                .compact()
                .with_env_filter(filter)
                .init();
        }
        _ => {
            tracing_subscriber::fmt()
                .pretty()
                .with_env_filter(filter)
                .init();
        }
    }
}

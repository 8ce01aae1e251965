use crate::AppState;
use axum::extract::{Json, State};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Liveness plus the optional capabilities this instance was started with
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    /// A search provider key is configured
    pub web_search: bool,
    /// An embedding provider key is configured
    pub document_retrieval: bool,
    /// Threads with a reply currently being generated
    pub active_generations: usize,
}

#[utoipa::path(
    get,
    path = "/v1/health",
    tag = "Health",
    responses(
        (status = 200, description = "Service is up", body = HealthResponse),
    )
)]
pub async fn health_check(State(app_state): State<AppState>) -> Json<HealthResponse> {
    let generation = &app_state.generation_service;
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        web_search: generation.web_search_available(),
        document_retrieval: generation.document_retrieval_available(),
        active_generations: app_state.inflight.active_count(),
    })
}

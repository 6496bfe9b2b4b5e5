use crate::{
    types::{HealthResponse, Result, StatusResponse},
    AppState,
};
use axum::{extract::State, Json};
use chrono::Utc;

/// Liveness check. Touches no dependency.
#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "Service is running", body = HealthResponse)),
    tag = "health"
)]
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: env!("CARGO_PKG_NAME").to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now(),
    })
}

/// Providers and models in use, plus the current fact count.
#[utoipa::path(
    get,
    path = "/status",
    responses(
        (status = 200, description = "Service status", body = StatusResponse),
        (status = 503, description = "Fact store unavailable")
    ),
    tag = "health"
)]
pub async fn status(State(state): State<AppState>) -> Result<Json<StatusResponse>> {
    let total_facts = state.facts.count().await?;

    Ok(Json(StatusResponse {
        status: "ok".to_string(),
        embedding_model: state.embedder.model_name().to_string(),
        generation_provider: state.llm.provider_name().to_string(),
        generation_model: state.generator.model().to_string(),
        store_provider: state.facts.store().provider_name().to_string(),
        total_facts,
        timestamp: Utc::now(),
    }))
}

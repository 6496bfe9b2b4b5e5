//! Fact management handlers.

use crate::{
    types::{
        AddFactsRequest, AddFactsResponse, ClearFactsResponse, DeleteFactResponse, Fact, Result,
        StatsResponse,
    },
    AppState,
};
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    Json,
};
use chrono::Utc;

/// Add facts, replacing any stored fact with the same id.
#[utoipa::path(
    post,
    path = "/facts/add",
    request_body = AddFactsRequest,
    responses(
        (status = 200, description = "Facts stored", body = AddFactsResponse),
        (status = 400, description = "Invalid fact"),
        (status = 503, description = "Embedding or fact store unavailable")
    ),
    tag = "facts"
)]
pub async fn add_facts(
    State(state): State<AppState>,
    payload: std::result::Result<Json<AddFactsRequest>, JsonRejection>,
) -> Result<Json<AddFactsResponse>> {
    let Json(payload) = payload?;
    let added = state.facts.add(payload.facts).await?;

    Ok(Json(AddFactsResponse {
        status: "success".to_string(),
        added,
        timestamp: Utc::now(),
    }))
}

/// Fetch one stored fact.
#[utoipa::path(
    get,
    path = "/facts/{id}",
    params(("id" = String, Path, description = "Fact id")),
    responses(
        (status = 200, description = "The stored fact", body = Fact),
        (status = 404, description = "Unknown fact id")
    ),
    tag = "facts"
)]
pub async fn get_fact(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<Fact>> {
    Ok(Json(state.facts.get(&id).await?))
}

/// Delete one fact. Deleting an unknown id is not an error.
#[utoipa::path(
    delete,
    path = "/facts/{id}",
    params(("id" = String, Path, description = "Fact id")),
    responses(
        (status = 200, description = "Fact deleted", body = DeleteFactResponse)
    ),
    tag = "facts"
)]
pub async fn delete_fact(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<DeleteFactResponse>> {
    let removed = state.facts.delete(std::slice::from_ref(&id)).await?;

    Ok(Json(DeleteFactResponse {
        status: "success".to_string(),
        id,
        removed,
        timestamp: Utc::now(),
    }))
}

/// Remove every fact from the store.
#[utoipa::path(
    delete,
    path = "/facts/clear",
    responses(
        (status = 200, description = "Store cleared", body = ClearFactsResponse),
        (status = 503, description = "Fact store unavailable")
    ),
    tag = "facts"
)]
pub async fn clear_facts(State(state): State<AppState>) -> Result<Json<ClearFactsResponse>> {
    let removed = state.facts.clear().await?;

    Ok(Json(ClearFactsResponse {
        status: "success".to_string(),
        message: format!("Removed {} facts", removed),
        removed,
        timestamp: Utc::now(),
    }))
}

/// Aggregate counts over the stored facts.
#[utoipa::path(
    get,
    path = "/stats",
    responses(
        (status = 200, description = "Store statistics", body = StatsResponse),
        (status = 503, description = "Fact store unavailable")
    ),
    tag = "facts"
)]
pub async fn stats(State(state): State<AppState>) -> Result<Json<StatsResponse>> {
    let stats = state.facts.stats().await?;

    Ok(Json(StatsResponse {
        status: "success".to_string(),
        total_facts: stats.total_facts,
        unique_coins: stats.unique_coins,
        fact_types: stats.fact_types,
        timestamp: Utc::now(),
    }))
}

//! Retrieval and answer generation handlers.
//!
//! Provides endpoints for:
//! - Ranked fact retrieval without generation
//! - Grounded answer generation with consistency flags
//! - Side-by-side grounded and ungrounded answers

use crate::{
    types::{
        AppError, CompareRequest, CompareResponse, GenerateRequest, GenerateResponse, Result,
        RetrieveRequest, RetrieveResponse,
    },
    AppState,
};
use axum::{extract::rejection::JsonRejection, extract::State, Json};
use chrono::Utc;
use std::time::Instant;

/// Validate a client-supplied `top_k`.
///
/// Unlike library callers, HTTP callers asking for more than `max_top_k`
/// are rejected rather than clamped.
pub(crate) fn resolve_top_k(top_k: Option<i64>, max_top_k: usize) -> Result<Option<usize>> {
    match top_k {
        None => Ok(None),
        Some(k) if k <= 0 => Err(AppError::InvalidArgument(format!(
            "top_k must be a positive integer, got {}",
            k
        ))),
        Some(k) if k as u64 > max_top_k as u64 => Err(AppError::InvalidArgument(format!(
            "top_k must not exceed {}, got {}",
            max_top_k, k
        ))),
        Some(k) => Ok(Some(k as usize)),
    }
}

/// Retrieve the facts most similar to a query.
///
/// Facts are ordered by descending `score` (cosine similarity); equal
/// scores keep the order in which the facts were first added. With `coin`
/// set, only facts whose coin metadata matches are considered.
#[utoipa::path(
    post,
    path = "/retrieve",
    request_body = RetrieveRequest,
    responses(
        (status = 200, description = "Ranked facts", body = RetrieveResponse),
        (status = 400, description = "Invalid query, top_k or coin"),
        (status = 503, description = "Embedding or fact store unavailable"),
        (status = 504, description = "Dependency timed out")
    ),
    tag = "rag"
)]
pub async fn retrieve(
    State(state): State<AppState>,
    payload: std::result::Result<Json<RetrieveRequest>, JsonRejection>,
) -> Result<Json<RetrieveResponse>> {
    let Json(payload) = payload?;
    let top_k = resolve_top_k(payload.top_k, state.config.rag.max_top_k)?
        .unwrap_or(state.config.rag.default_top_k);

    let started = Instant::now();
    let facts = state
        .retriever()
        .retrieve_filtered(&payload.query, top_k, payload.coin.as_deref())
        .await?;
    let retrieval_time = started.elapsed().as_secs_f64();

    Ok(Json(RetrieveResponse {
        status: "success".to_string(),
        count: facts.len(),
        facts,
        retrieval_time,
        timestamp: Utc::now(),
    }))
}

/// Generate an answer, optionally grounded in retrieved facts.
///
/// `consistency_flags` are advisory and best effort: an empty set does not
/// prove the answer is grounded.
#[utoipa::path(
    post,
    path = "/generate",
    request_body = GenerateRequest,
    responses(
        (status = 200, description = "Generated answer", body = GenerateResponse),
        (status = 400, description = "Invalid query or top_k"),
        (status = 503, description = "Embedding, fact store or generation backend unavailable"),
        (status = 504, description = "Dependency timed out")
    ),
    tag = "rag"
)]
pub async fn generate(
    State(state): State<AppState>,
    payload: std::result::Result<Json<GenerateRequest>, JsonRejection>,
) -> Result<Json<GenerateResponse>> {
    let Json(payload) = payload?;
    let top_k = resolve_top_k(payload.top_k, state.config.rag.max_top_k)?;

    let result = state
        .generator
        .generate_filtered(
            &payload.query,
            payload.use_rag,
            top_k,
            payload.coin.as_deref(),
        )
        .await?;

    Ok(Json(GenerateResponse {
        status: "success".to_string(),
        result,
        timestamp: Utc::now(),
    }))
}

/// Answer a query both with and without retrieved context.
#[utoipa::path(
    post,
    path = "/compare",
    request_body = CompareRequest,
    responses(
        (status = 200, description = "Grounded and ungrounded answers", body = CompareResponse),
        (status = 400, description = "Invalid query, top_k or coin"),
        (status = 503, description = "Embedding, fact store or generation backend unavailable"),
        (status = 504, description = "Dependency timed out")
    ),
    tag = "rag"
)]
pub async fn compare(
    State(state): State<AppState>,
    payload: std::result::Result<Json<CompareRequest>, JsonRejection>,
) -> Result<Json<CompareResponse>> {
    let Json(payload) = payload?;
    let top_k = resolve_top_k(payload.top_k, state.config.rag.max_top_k)?;

    let comparison = state
        .generator
        .compare(&payload.query, top_k, payload.coin.as_deref())
        .await?;

    Ok(Json(CompareResponse {
        status: "success".to_string(),
        query: payload.query,
        comparison,
        timestamp: Utc::now(),
    }))
}

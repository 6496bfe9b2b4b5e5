use crate::api::handlers::{facts, health, rag};
use crate::types::{
    AddFactsRequest, AddFactsResponse, AnswerComparison, AnswerResult, ClearFactsResponse,
    CompareRequest, CompareResponse, ConsistencyFlag, DeleteFactResponse, Fact, GenerateRequest, GenerateResponse, HealthResponse, RetrieveRequest,
    RetrieveResponse, RetrievedFact, StatsResponse, StatusResponse,
};
use crate::AppState;
use axum::{
    extract::DefaultBodyLimit,
    http::HeaderValue,
    routing::{delete, get, post},
    Router,
};
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    limit::RequestBodyLimitLayer,
    trace::TraceLayer,
};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "coinrag",
        description = "Crypto knowledge RAG service: fact store, retrieval and grounded answers"
    ),
    paths(
        rag::retrieve,
        rag::generate,
        rag::compare,
        facts::add_facts,
        facts::get_fact,
        facts::delete_fact,
        facts::clear_facts,
        facts::stats,
        health::health,
        health::status,
    ),
    components(schemas(
        Fact,
        RetrievedFact,
        ConsistencyFlag,
        AnswerResult,
        RetrieveRequest,
        RetrieveResponse,
        GenerateRequest,
        GenerateResponse,
        AnswerComparison,
        CompareRequest,
        CompareResponse,
        AddFactsRequest,
        AddFactsResponse,
        DeleteFactResponse,
        ClearFactsResponse,
        StatsResponse,
        HealthResponse,
        StatusResponse,
    )),
    tags(
        (name = "rag", description = "Retrieval and answer generation"),
        (name = "facts", description = "Fact management"),
        (name = "health", description = "Liveness and status")
    )
)]
pub struct ApiDoc;

/// All service routes, without middleware.
pub fn create_router() -> Router<AppState> {
    let router = Router::new()
        .route("/retrieve", post(rag::retrieve))
        .route("/generate", post(rag::generate))
        .route("/generate_answer", post(rag::generate))
        .route("/compare", post(rag::compare))
        .route("/facts/add", post(facts::add_facts))
        .route("/facts/clear", delete(facts::clear_facts))
        .route(
            "/facts/{id}",
            get(facts::get_fact).delete(facts::delete_fact),
        )
        .route("/stats", get(facts::stats))
        .route("/health", get(health::health))
        .route("/status", get(health::status));

    #[cfg(feature = "swagger-ui")]
    let router = router.merge(
        utoipa_swagger_ui::SwaggerUi::new("/swagger-ui")
            .url("/api-docs/openapi.json", ApiDoc::openapi()),
    );

    #[cfg(not(feature = "swagger-ui"))]
    let router = router.route(
        "/api-docs/openapi.json",
        get(|| async { axum::Json(ApiDoc::openapi()) }),
    );

    router
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.is_empty() {
        return CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
    }

    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(Any)
        .allow_headers(Any)
}

/// The complete application: routes, middleware and state.
pub fn build_app(state: AppState) -> Router {
    let body_limit = state.config.server.request_body_limit_bytes;

    create_router()
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(RequestBodyLimitLayer::new(body_limit))
        .layer(cors_layer(&state.config.server.cors_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

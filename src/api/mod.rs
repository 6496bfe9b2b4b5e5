//! HTTP API Handlers and Routes
//!
//! This module provides the REST API layer for coinrag, built on the Axum web framework.
//!
//! # Module Structure
//!
//! - [`api::handlers`](crate::api::handlers) - Request handlers for each endpoint
//! - [`api::routes`](crate::api::routes) - Route definitions and router configuration
//!
//! # API Endpoints
//!
//! ## RAG
//! - `POST /retrieve` - Ranked facts for a query, no generation
//! - `POST /generate` (alias `POST /generate_answer`) - Answer with retrieved facts and consistency flags
//! - `POST /compare` - The same query answered with and without retrieved facts
//!
//! ## Facts
//! - `POST /facts/add` - Add or replace facts by id
//! - `GET /facts/{id}` - Fetch one fact
//! - `DELETE /facts/{id}` - Delete one fact
//! - `DELETE /facts/clear` - Remove every fact
//! - `GET /stats` - Fact counts
//!
//! ## Health
//! - `GET /health` - Liveness only
//! - `GET /status` - Providers, models and fact count
//!
//! # Errors
//!
//! Failures return `{"error": "<message>", "kind": "<kind>"}`. Bad input is
//! 400, unknown fact ids 404, unavailable dependencies 503 and timeouts 504;
//! the last two carry a `Retry-After` header.
//!
//! # OpenAPI Documentation
//!
//! The OpenAPI document is served at `/api-docs/openapi.json`. When the
//! `swagger-ui` feature is enabled, interactive documentation is available
//! at `/swagger-ui/`.

/// Request and response handlers for all API endpoints.
pub mod handlers;
/// Router configuration and route definitions.
pub mod routes;

pub use routes::{build_app, create_router, ApiDoc};

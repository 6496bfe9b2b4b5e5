//! API request handlers.
//!
//! This module contains all HTTP request handlers organized by functionality.

/// Fact ingestion, lookup and maintenance handlers.
pub mod facts;
/// Liveness and status handlers.
pub mod health;
/// Retrieval and answer generation handlers.
pub mod rag;

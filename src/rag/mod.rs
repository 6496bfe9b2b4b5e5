//! Retrieval Augmented Generation (RAG) Pipeline
//!
//! This module turns a question into a grounded, checked answer.
//!
//! # Module Structure
//!
//! - [`rag::embeddings`](crate::rag::embeddings) - Embedding backends (OpenAI-compatible, Ollama, hash, fastembed)
//! - [`rag::cache`](crate::rag::cache) - LRU cache in front of any embedder
//! - [`rag::retriever`](crate::rag::retriever) - Query embedding plus top-k similarity search
//! - [`rag::prompt`](crate::rag::prompt) - Fact context rendering and prompt templates
//! - [`rag::generator`](crate::rag::generator) - Retrieval, generation and checks in one call
//! - [`rag::consistency`](crate::rag::consistency) - Advisory answer checks
//! - [`rag::facts`](crate::rag::facts) - Fact ingestion and maintenance
//!
//! # RAG Pipeline
//!
//! 1. **Ingestion** - Facts are validated, embedded and upserted by id
//! 2. **Retrieval** - The query is embedded and the closest facts returned,
//!    highest cosine similarity first
//! 3. **Generation** - The facts are rendered into the prompt and the LLM answers
//! 4. **Checking** - Numbers and coin names in the answer are compared with
//!    the facts; mismatches become consistency flags
//!
//! Every call to an embedder, fact store or LLM runs under the timeout
//! configured for that dependency.
//!
//! # Example
//!
//! ```ignore
//! use coinrag::rag::{generator::AnswerGenerator, retriever::Retriever};
//!
//! let retriever = Retriever::new(config.clone(), embedder, store);
//! let generator = AnswerGenerator::new(config, retriever, llm)?;
//!
//! let result = generator.generate("What is the price of Bitcoin?", true, Some(5)).await?;
//! println!("{} ({:?})", result.answer, result.consistency_flags);
//! ```

pub mod cache;
pub mod consistency;
pub mod embeddings;
pub mod facts;
pub mod generator;
pub mod prompt;
pub mod retriever;

//! LLM Provider Clients and Abstractions
//!
//! The generation backend sits behind the [`LLMClient`] trait: a prompt and
//! a set of decoding options go in, text comes out. Providers:
//! - `openai` - any OpenAI-compatible chat completions API (OpenAI, Groq, OpenRouter)
//! - `ollama` - local Ollama server
//!
//! # Example
//!
//! ```ignore
//! use coinrag::llm::{GenerationOptions, Prompt, Provider};
//! use std::time::Duration;
//!
//! let provider = Provider::Ollama { base_url: "http://localhost:11434".into() };
//! let client = provider.create_client(Duration::from_secs(30))?;
//!
//! let options = GenerationOptions { model: "llama3.2:3b".into(), temperature: 0.1, max_tokens: 256 };
//! let answer = client.complete(&Prompt::new("What is a blockchain?"), &options).await?;
//! ```

/// Core LLM client trait, prompts and decoding options.
pub mod client;
/// Ollama `/api/chat` client.
pub mod ollama;
/// OpenAI-compatible chat completions client.
pub mod openai;

pub use client::{create_client, GenerationOptions, LLMClient, Prompt, Provider};

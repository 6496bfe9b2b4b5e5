//! Configuration loading and small shared helpers.

/// TOML configuration file (`coinrag.toml`).
pub mod toml_config;
/// Time bounds for calls to external collaborators.
pub mod timeout;

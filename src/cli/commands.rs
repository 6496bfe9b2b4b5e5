//! Implementations of the `config` and `ask` subcommands.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::cli::output::Output;
use crate::types::Fact;
use crate::utils::toml_config::{
    CoinragConfig, EmbeddingProviderConfig, GenerationProviderConfig, StoreProviderConfig,
};
use crate::AppState;

/// A facts file holds either a bare array or `{"facts": [...]}`.
#[derive(Deserialize)]
#[serde(untagged)]
enum FactsFile {
    List(Vec<Fact>),
    Wrapped { facts: Vec<Fact> },
}

/// Read facts from a JSON file.
pub fn load_facts(path: &Path) -> Result<Vec<Fact>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read facts file {}", path.display()))?;
    let parsed: FactsFile = serde_json::from_str(&content)
        .with_context(|| format!("Invalid facts file {}", path.display()))?;

    Ok(match parsed {
        FactsFile::List(facts) | FactsFile::Wrapped { facts } => facts,
    })
}

fn describe_embedding(provider: &EmbeddingProviderConfig) -> String {
    match provider {
        EmbeddingProviderConfig::OpenAI {
            api_base, model, ..
        } => format!("openai ({} at {})", model, api_base),
        EmbeddingProviderConfig::Ollama { base_url, model } => {
            format!("ollama ({} at {})", model, base_url)
        }
        EmbeddingProviderConfig::Hash { dimensions } => format!("hash ({} dimensions)", dimensions),
        EmbeddingProviderConfig::Fastembed { model } => format!("fastembed ({})", model),
    }
}

fn describe_generation(provider: &GenerationProviderConfig) -> String {
    match provider {
        GenerationProviderConfig::OpenAI {
            api_base,
            api_key_env,
        } => format!("openai-compatible at {} (key from ${})", api_base, api_key_env),
        GenerationProviderConfig::Ollama { base_url } => format!("ollama at {}", base_url),
    }
}

fn describe_store(provider: &StoreProviderConfig) -> String {
    match provider {
        StoreProviderConfig::Memory => "memory".to_string(),
        StoreProviderConfig::Qdrant { url, .. } => format!("qdrant at {}", url),
    }
}

/// `config [--validate]`
pub fn config(path: &Path, validate: bool, output: &Output) -> Result<()> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let config = CoinragConfig::from_toml_str(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))?;

    output.header(&format!("Configuration ({})", path.display()));
    output.kv("listen", &config.bind_address());
    output.kv("embedding", &describe_embedding(&config.embedding.provider));
    output.kv(
        "generation",
        &format!(
            "{} / {}",
            config.generation.model,
            describe_generation(&config.generation.provider)
        ),
    );
    output.kv(
        "store",
        &format!(
            "{} (collection {})",
            describe_store(&config.store.provider),
            config.store.collection
        ),
    );
    output.kv(
        "timeouts",
        &format!(
            "embedding {}s, store {}s, generation {}s",
            config.embedding.timeout_secs, config.store.timeout_secs, config.generation.timeout_secs
        ),
    );
    output.kv(
        "top_k",
        &format!(
            "default {}, max {}",
            config.rag.default_top_k, config.rag.max_top_k
        ),
    );
    output.kv(
        "consistency",
        if config.consistency.enabled {
            "enabled"
        } else {
            "disabled"
        },
    );

    if !validate {
        output.hint("Run with --validate to check values and environment variables");
        return Ok(());
    }

    output.header("Validation");
    let warnings = config
        .validate_with_warnings()
        .context("Configuration is invalid")?;
    output.success("Configuration is valid");
    for warning in &warnings {
        output.warning(&warning.message);
    }
    Ok(())
}

/// `ask QUESTION [--no-rag] [--top-k N] [--coin COIN] [--facts FILE]`
pub async fn ask(
    config: CoinragConfig,
    query: &str,
    use_rag: bool,
    top_k: Option<usize>,
    coin: Option<&str>,
    facts_file: Option<&Path>,
    output: &Output,
) -> Result<()> {
    let state = AppState::from_config(config)
        .await
        .context("Failed to build the pipeline")?;

    if let Some(path) = facts_file {
        let facts = load_facts(path)?;
        let added = state.facts.add(facts).await.context("Failed to add facts")?;
        output.info(&format!("Loaded {} facts from {}", added, path.display()));
    }

    let result = state
        .generator
        .generate_filtered(query, use_rag, top_k, coin)
        .await
        .context("Failed to generate an answer")?;

    output.header("Answer");
    output.answer(&result.answer);

    if use_rag {
        output.header("Facts");
        if result.retrieved_facts.is_empty() {
            output.info("No facts retrieved");
        }
        for (i, fact) in result.retrieved_facts.iter().enumerate() {
            output.fact(i + 1, fact);
        }
    }

    if !result.consistency_flags.is_empty() {
        output.header("Flags");
        for flag in &result.consistency_flags {
            output.flag(*flag);
        }
    }

    output.header("Details");
    output.kv("model", &result.model);
    if use_rag {
        output.kv("retrieval_time", &format!("{:.2}s", result.retrieval_time));
    }
    output.kv("generation_time", &format!("{:.2}s", result.generation_time));
    output.kv("confidence", &format!("{:.2}", result.confidence));
    if result.context_truncated {
        output.warning("Not every retrieved fact fit in the prompt");
    }
    Ok(())
}

//! Answer generation: retrieve, prompt, complete, check.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;

use crate::llm::{GenerationOptions, LLMClient};
use crate::rag::consistency::ConsistencyChecker;
use crate::rag::prompt::{build_context, plain_prompt, rag_prompt};
use crate::rag::retriever::Retriever;
use crate::types::{
    AnswerComparison, AnswerResult, AppError, ConsistencyFlag, Dependency, Result, RetrievedFact,
};
use crate::utils::timeout::bounded;
use crate::utils::toml_config::CoinragConfig;

/// Confidence reported when any content flag is raised.
const FLAGGED_CONFIDENCE: f32 = 0.2;
/// Extra confidence per supporting fact, capped at `MAX_SUPPORT_BONUS`.
const SUPPORT_BONUS_PER_FACT: f32 = 0.1;
const MAX_SUPPORT_BONUS: f32 = 0.3;
/// Bonus for an answer that passed every check.
const CLEAN_BONUS: f32 = 0.1;

/// Produces [`AnswerResult`]s from a retriever and a generation backend.
#[derive(Clone)]
pub struct AnswerGenerator {
    config: Arc<CoinragConfig>,
    retriever: Retriever,
    llm: Arc<dyn LLMClient>,
    checker: Arc<ConsistencyChecker>,
    options: GenerationOptions,
}

impl AnswerGenerator {
    pub fn new(
        config: Arc<CoinragConfig>,
        retriever: Retriever,
        llm: Arc<dyn LLMClient>,
    ) -> Result<Self> {
        let checker = Arc::new(ConsistencyChecker::new(&config.consistency)?);
        let options = GenerationOptions::from(&config.generation);
        Ok(Self {
            config,
            retriever,
            llm,
            checker,
            options,
        })
    }

    pub fn retriever(&self) -> &Retriever {
        &self.retriever
    }

    pub fn model(&self) -> &str {
        &self.options.model
    }

    /// Answer `query`, grounded in retrieved facts when `use_rag` is set.
    ///
    /// `top_k` defaults to `rag.default_top_k`. With `use_rag = false` no
    /// retrieval happens and no checks run. Consistency flags are advisory:
    /// a flagged answer is still returned.
    pub async fn generate(
        &self,
        query: &str,
        use_rag: bool,
        top_k: Option<usize>,
    ) -> Result<AnswerResult> {
        self.generate_filtered(query, use_rag, top_k, None).await
    }

    /// Like [`AnswerGenerator::generate`], with retrieval restricted to facts
    /// about `coin`. The filter is ignored when `use_rag` is false.
    pub async fn generate_filtered(
        &self,
        query: &str,
        use_rag: bool,
        top_k: Option<usize>,
        coin: Option<&str>,
    ) -> Result<AnswerResult> {
        if query.trim().is_empty() {
            return Err(AppError::InvalidArgument("query cannot be empty".to_string()));
        }
        let top_k = top_k.unwrap_or_else(|| self.retriever.default_top_k());

        let mut degraded = false;
        let mut retrieval_time = 0.0;
        let retrieved = if use_rag {
            let started = Instant::now();
            let outcome = self.retriever.retrieve_filtered(query, top_k, coin).await;
            retrieval_time = started.elapsed().as_secs_f64();
            match outcome {
                Ok(facts) => facts,
                Err(e)
                    if e.is_dependency_failure()
                        && self.config.rag.fallback_on_retrieval_failure =>
                {
                    tracing::warn!(error = %e, "Retrieval failed, answering without context");
                    degraded = true;
                    Vec::new()
                }
                Err(e) => return Err(e),
            }
        } else {
            Vec::new()
        };

        let grounded = use_rag && !degraded;
        let (prompt, context_truncated) = if grounded {
            let context = build_context(
                &retrieved,
                &self.config.rag.coin_metadata_key,
                self.config.rag.max_context_chars,
            );
            (rag_prompt(query, &context), context.truncated)
        } else {
            (plain_prompt(query), false)
        };

        let started = Instant::now();
        let answer = bounded(
            Dependency::Generation,
            self.config.generation.timeout(),
            self.llm.complete(&prompt, &self.options),
        )
        .await?;
        let generation_time = started.elapsed().as_secs_f64();

        let mut consistency_flags = BTreeSet::new();
        if degraded {
            consistency_flags.insert(ConsistencyFlag::RetrievalDegraded);
        }
        if grounded && self.config.consistency.enabled {
            let report = self.checker.check(&answer, &retrieved);
            if !report.flags.is_empty() {
                tracing::info!(
                    flags = ?report.flags,
                    numbers = ?report.unsupported_numbers,
                    entities = ?report.ungrounded_entities,
                    phrases = ?report.speculative_phrases,
                    "Answer flagged"
                );
            }
            consistency_flags.extend(report.flags);
        }

        let confidence = if grounded {
            self.confidence(&retrieved, &consistency_flags)
        } else {
            0.0
        };

        tracing::info!(
            use_rag,
            facts_used = retrieved.len(),
            retrieval_ms = (retrieval_time * 1000.0) as u64,
            generation_ms = (generation_time * 1000.0) as u64,
            provider = self.llm.provider_name(),
            "Answer generated"
        );

        Ok(AnswerResult {
            answer,
            facts_used: retrieved.len(),
            generation_time,
            retrieval_time,
            retrieved_facts: retrieved,
            consistency_flags,
            model: self.options.model.clone(),
            confidence,
            context_truncated,
            degraded,
        })
    }

    /// Answer `query` twice, once grounded and once from the model alone.
    ///
    /// Both answers are generated concurrently. Any failure in either fails
    /// the comparison.
    pub async fn compare(
        &self,
        query: &str,
        top_k: Option<usize>,
        coin: Option<&str>,
    ) -> Result<AnswerComparison> {
        let (rag, no_rag) = tokio::try_join!(
            self.generate_filtered(query, true, top_k, coin),
            self.generate_filtered(query, false, None, None),
        )?;
        Ok(AnswerComparison { rag, no_rag })
    }

    /// Heuristic in `[0, 1]` from fact confidence, fact count and flags.
    fn confidence(&self, facts: &[RetrievedFact], flags: &BTreeSet<ConsistencyFlag>) -> f32 {
        if facts.is_empty() {
            return 0.0;
        }
        let content_flagged = flags.iter().any(|f| {
            matches!(
                f,
                ConsistencyFlag::UnsupportedNumber
                    | ConsistencyFlag::UngroundedEntity
                    | ConsistencyFlag::SpeculativeClaim
            )
        });
        if content_flagged {
            return FLAGGED_CONFIDENCE;
        }

        let default = self.config.rag.default_fact_confidence;
        let mean = facts
            .iter()
            .map(|f| {
                f.fact
                    .metadata
                    .get("confidence")
                    .and_then(|v| v.as_f64())
                    .map(|c| (c as f32).clamp(0.0, 1.0))
                    .unwrap_or(default)
            })
            .sum::<f32>()
            / facts.len() as f32;
        let support = (SUPPORT_BONUS_PER_FACT * facts.len() as f32).min(MAX_SUPPORT_BONUS);

        (mean + support + CLEAN_BONUS).clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{EmbeddedFact, FactStore, InMemoryFactStore};
    use crate::llm::Prompt;
    use crate::rag::embeddings::HashEmbedder;
    use crate::types::Fact;
    use async_trait::async_trait;
    use parking_lot::Mutex;

    struct EchoLLM {
        answer: String,
        prompts: Mutex<Vec<Prompt>>,
    }

    #[async_trait]
    impl LLMClient for EchoLLM {
        async fn complete(&self, prompt: &Prompt, _options: &GenerationOptions) -> Result<String> {
            self.prompts.lock().push(prompt.clone());
            Ok(self.answer.clone())
        }

        fn provider_name(&self) -> &'static str {
            "echo"
        }
    }

    async fn generator(answer: &str, facts: Vec<Fact>) -> (AnswerGenerator, Arc<EchoLLM>) {
        let config = Arc::new(CoinragConfig::default());
        let embedder = Arc::new(HashEmbedder::new(128));
        let store = Arc::new(InMemoryFactStore::new());
        let embedded = facts
            .into_iter()
            .map(|fact| EmbeddedFact {
                embedding: embedder.embed_text(&fact.content),
                fact,
            })
            .collect();
        store.add(embedded).await.unwrap();

        let llm = Arc::new(EchoLLM {
            answer: answer.to_string(),
            prompts: Mutex::new(Vec::new()),
        });
        let retriever = Retriever::new(config.clone(), embedder, store);
        let generator = AnswerGenerator::new(config, retriever, llm.clone()).unwrap();
        (generator, llm)
    }

    #[tokio::test]
    async fn test_grounded_answer() {
        let (generator, llm) = generator(
            "Bitcoin is priced at $98,000.",
            vec![Fact::new("btc1", "Bitcoin is priced at $98,000").with_metadata("confidence", 0.9)],
        )
        .await;

        let result = generator
            .generate("What is the price of Bitcoin?", true, Some(5))
            .await
            .unwrap();

        assert_eq!(result.facts_used, 1);
        assert_eq!(result.facts_used, result.retrieved_facts.len());
        assert!(result.consistency_flags.is_empty());
        assert!((result.confidence - 1.0).abs() < 1e-6);
        assert!(!result.degraded);
        assert!(result.generation_time >= 0.0);
        assert!(result.retrieval_time >= 0.0);

        let prompts = llm.prompts.lock();
        assert!(prompts[0].user.contains("1. Bitcoin is priced at $98,000"));
    }

    #[tokio::test]
    async fn test_without_rag_skips_retrieval_and_checks() {
        let (generator, llm) = generator(
            "Ethereum trades at $1,000,000.",
            vec![Fact::new("btc1", "Bitcoin is priced at $98,000")],
        )
        .await;

        let result = generator
            .generate("What is Ethereum?", false, None)
            .await
            .unwrap();

        assert_eq!(result.facts_used, 0);
        assert!(result.retrieved_facts.is_empty());
        assert!(result.consistency_flags.is_empty());
        assert_eq!(result.confidence, 0.0);
        assert_eq!(result.retrieval_time, 0.0);
        assert!(!llm.prompts.lock()[0].user.contains("Facts:"));
    }

    #[tokio::test]
    async fn test_coin_filter_limits_context() {
        let (generator, llm) = generator(
            "Ethereum uses proof of stake.",
            vec![
                Fact::new("btc1", "Bitcoin is priced at $98,000").with_metadata("coin", "bitcoin"),
                Fact::new("eth1", "Ethereum uses proof of stake").with_metadata("coin", "ethereum"),
            ],
        )
        .await;

        let result = generator
            .generate_filtered("Tell me about Bitcoin", true, Some(5), Some("Ethereum"))
            .await
            .unwrap();

        assert_eq!(result.facts_used, 1);
        assert_eq!(result.retrieved_facts[0].fact.id, "eth1");
        assert!(!llm.prompts.lock()[0].user.contains("Bitcoin is priced"));
    }

    #[tokio::test]
    async fn test_compare_answers_both_ways() {
        let (generator, llm) = generator(
            "Bitcoin is priced at $98,000.",
            vec![Fact::new("btc1", "Bitcoin is priced at $98,000")],
        )
        .await;

        let comparison = generator
            .compare("What is the price of Bitcoin?", Some(2), None)
            .await
            .unwrap();

        assert_eq!(comparison.rag.facts_used, 1);
        assert_eq!(comparison.no_rag.facts_used, 0);
        assert_eq!(comparison.no_rag.retrieval_time, 0.0);
        assert!(comparison.no_rag.consistency_flags.is_empty());

        let prompts = llm.prompts.lock();
        assert_eq!(prompts.len(), 2);
        assert_eq!(prompts.iter().filter(|p| p.user.contains("Facts:")).count(), 1);
    }

    #[tokio::test]
    async fn test_flagged_answer_has_low_confidence() {
        let (generator, _) = generator(
            "Bitcoin is priced at $120,000.",
            vec![Fact::new("btc1", "Bitcoin is priced at $98,000")],
        )
        .await;

        let result = generator
            .generate("What is the price of Bitcoin?", true, Some(3))
            .await
            .unwrap();
        assert!(result
            .consistency_flags
            .contains(&ConsistencyFlag::UnsupportedNumber));
        assert_eq!(result.confidence, FLAGGED_CONFIDENCE);
    }

    #[tokio::test]
    async fn test_empty_query_rejected() {
        let (generator, llm) = generator("unused", vec![]).await;
        assert!(matches!(
            generator.generate("  ", true, None).await,
            Err(AppError::InvalidArgument(_))
        ));
        assert!(llm.prompts.lock().is_empty());
    }
}

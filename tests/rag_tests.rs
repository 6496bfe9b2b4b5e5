//! End-to-end tests of the retrieval and answer pipeline.
//!
//! The pipeline runs in-process with a hash embedder, the in-memory fact
//! store and a mock generation backend.

mod common;

use common::mocks::{MockEmbedder, MockLLMClient, UnavailableFactStore};
use common::{btc_fact, sample_facts, state_with, state_with_parts, test_config};
use coinrag::db::InMemoryFactStore;
use coinrag::types::{AppError, ConsistencyFlag, Dependency, Fact};
use coinrag::Embedder;
use rstest::rstest;
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn scenario_a_grounded_answer_uses_the_retrieved_fact() {
    let llm = MockLLMClient::new("Bitcoin is priced at $98,000.");
    let state = state_with(test_config(), llm.clone());
    state.facts.add(vec![btc_fact()]).await.unwrap();

    let result = state
        .generator
        .generate("What is the price of Bitcoin?", true, Some(1))
        .await
        .unwrap();

    assert_eq!(result.retrieved_facts.len(), 1);
    assert_eq!(result.retrieved_facts[0].fact.id, "btc1");
    assert_eq!(result.facts_used, 1);
    assert!(result.consistency_flags.is_empty());

    let prompt = llm.last_prompt().unwrap();
    assert!(prompt.user.contains("Bitcoin is priced at $98,000 (Crypto: bitcoin"));
    assert!(prompt.user.contains("Question: What is the price of Bitcoin?"));
}

#[tokio::test]
async fn scenario_b_without_rag_retrieves_nothing() {
    let llm = MockLLMClient::new("Bitcoin is a decentralized digital currency.");
    let state = state_with(test_config(), llm.clone());
    state.facts.add(vec![btc_fact()]).await.unwrap();

    let result = state
        .generator
        .generate("What is the price of Bitcoin?", false, None)
        .await
        .unwrap();

    assert!(result.retrieved_facts.is_empty());
    assert_eq!(result.facts_used, 0);
    assert!(result.consistency_flags.is_empty());
    assert!(!llm.last_prompt().unwrap().user.contains("Facts:"));
}

#[tokio::test]
async fn scenario_c_generation_timeout_is_an_error() {
    let llm = MockLLMClient::new("too late").with_delay(Duration::from_secs(5));
    let state = state_with(test_config(), llm);
    state.facts.add(vec![btc_fact()]).await.unwrap();

    let err = state
        .generator
        .generate("What is the price of Bitcoin?", true, Some(1))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        AppError::Timeout {
            dependency: Dependency::Generation,
            ..
        }
    ));
}

#[tokio::test]
async fn scenario_d_unsupported_price_is_flagged() {
    let llm = MockLLMClient::new("Bitcoin is currently priced at $112,500.");
    let state = state_with(test_config(), llm);
    state.facts.add(vec![btc_fact()]).await.unwrap();

    let result = state
        .generator
        .generate("What is the price of Bitcoin?", true, Some(1))
        .await
        .unwrap();

    assert!(result
        .consistency_flags
        .contains(&ConsistencyFlag::UnsupportedNumber));
    assert!(!result.answer.is_empty());
}

#[tokio::test]
async fn empty_store_retrieves_nothing_and_still_answers() {
    let state = state_with(test_config(), MockLLMClient::new("I do not have enough information."));

    assert!(state.retriever().retrieve("bitcoin", 5).await.unwrap().is_empty());

    let result = state
        .generator
        .generate("What is the price of Bitcoin?", true, None)
        .await
        .unwrap();
    assert_eq!(result.facts_used, 0);
    assert_eq!(result.confidence, 0.0);
}

#[rstest]
#[case(0)]
#[tokio::test]
async fn zero_top_k_is_rejected(#[case] top_k: usize) {
    let llm = MockLLMClient::new("unused");
    let state = state_with(test_config(), llm.clone());

    assert!(matches!(
        state.retriever().retrieve("bitcoin", top_k).await,
        Err(AppError::InvalidArgument(_))
    ));
    assert!(matches!(
        state.generator.generate("bitcoin", true, Some(top_k)).await,
        Err(AppError::InvalidArgument(_))
    ));
    assert_eq!(llm.call_count(), 0);
}

#[tokio::test]
async fn adding_twice_is_idempotent() {
    let state = state_with(test_config(), MockLLMClient::new("unused"));

    state.facts.add(sample_facts()).await.unwrap();
    let first = state.retriever().retrieve("bitcoin price", 3).await.unwrap();

    state.facts.add(sample_facts()).await.unwrap();
    let second = state.retriever().retrieve("bitcoin price", 3).await.unwrap();

    assert_eq!(state.facts.count().await.unwrap(), 3);
    assert_eq!(first, second);
}

#[tokio::test]
async fn added_fact_round_trips() {
    let embedder = Arc::new(MockEmbedder::new());
    let store = Arc::new(InMemoryFactStore::new());
    let state = state_with_parts(
        test_config(),
        embedder.clone(),
        store.clone(),
        MockLLMClient::new("unused"),
    );
    state.facts.add(sample_facts()).await.unwrap();

    let fact = btc_fact();
    assert_eq!(state.facts.get("btc1").await.unwrap(), fact);

    let own_embedding = embedder.embed(&fact.content).await.unwrap();
    let hits = coinrag::FactStore::search(store.as_ref(), &own_embedding, 1, None)
        .await
        .unwrap();
    assert_eq!(hits[0].fact, fact);
    assert!((hits[0].score - 1.0).abs() < 1e-5);
}

#[tokio::test]
async fn equal_scores_keep_insertion_order() {
    let state = state_with(test_config(), MockLLMClient::new("unused"));
    let facts: Vec<Fact> = ["x1", "x2", "x3"]
        .into_iter()
        .map(|id| Fact::new(id, "Bitcoin halving news"))
        .collect();
    state.facts.add(facts).await.unwrap();

    // Replacing a fact keeps its original position
    state
        .facts
        .add(vec![Fact::new("x1", "Bitcoin halving news")])
        .await
        .unwrap();

    let ids: Vec<String> = state
        .retriever()
        .retrieve("Bitcoin halving news", 3)
        .await
        .unwrap()
        .into_iter()
        .map(|f| f.fact.id)
        .collect();
    assert_eq!(ids, vec!["x1", "x2", "x3"]);
}

#[tokio::test]
async fn results_are_sorted_by_descending_score() {
    let state = state_with(test_config(), MockLLMClient::new("unused"));
    state.facts.add(sample_facts()).await.unwrap();

    let facts = state.retriever().retrieve("Solana transactions", 3).await.unwrap();
    assert_eq!(facts[0].fact.id, "sol1");
    assert!(facts.windows(2).all(|w| w[0].score >= w[1].score));
}

#[tokio::test]
async fn store_failure_propagates() {
    let llm = MockLLMClient::new("unused");
    let state = state_with_parts(
        test_config(),
        Arc::new(MockEmbedder::new()),
        Arc::new(UnavailableFactStore),
        llm.clone(),
    );

    let err = state
        .generator
        .generate("What is the price of Bitcoin?", true, None)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::StoreUnavailable(_)));
    assert_eq!(llm.call_count(), 0);
}

#[tokio::test]
async fn embedding_timeout_is_reported() {
    let state = state_with_parts(
        test_config(),
        Arc::new(MockEmbedder::new().with_delay(Duration::from_secs(5))),
        Arc::new(InMemoryFactStore::new()),
        MockLLMClient::new("unused"),
    );

    let err = state.retriever().retrieve("bitcoin", 1).await.unwrap_err();
    assert!(matches!(
        err,
        AppError::Timeout {
            dependency: Dependency::Embedding,
            ..
        }
    ));
}

#[tokio::test]
async fn retrieval_failure_can_degrade_to_a_context_free_answer() {
    let mut config = test_config();
    config.rag.fallback_on_retrieval_failure = true;
    let llm = MockLLMClient::new("Bitcoin is a cryptocurrency.");
    let state = state_with_parts(
        config,
        Arc::new(MockEmbedder::failing()),
        Arc::new(InMemoryFactStore::new()),
        llm.clone(),
    );

    let result = state
        .generator
        .generate("What is Bitcoin?", true, None)
        .await
        .unwrap();

    assert!(result.degraded);
    assert_eq!(result.facts_used, 0);
    assert_eq!(
        result.consistency_flags.into_iter().collect::<Vec<_>>(),
        vec![ConsistencyFlag::RetrievalDegraded]
    );
    assert!(!llm.last_prompt().unwrap().user.contains("Facts:"));
}

#[tokio::test]
async fn generation_failure_is_not_hidden() {
    let state = state_with(test_config(), MockLLMClient::failing());
    state.facts.add(vec![btc_fact()]).await.unwrap();

    let err = state
        .generator
        .generate("What is the price of Bitcoin?", true, None)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::GenerationUnavailable(_)));
}

#[tokio::test]
async fn ungrounded_coin_is_flagged() {
    let state = state_with(
        test_config(),
        MockLLMClient::new("Bitcoin is priced at $98,000 while Cardano lags behind."),
    );
    state.facts.add(vec![btc_fact()]).await.unwrap();

    let result = state
        .generator
        .generate("What is the price of Bitcoin?", true, Some(1))
        .await
        .unwrap();
    assert!(result
        .consistency_flags
        .contains(&ConsistencyFlag::UngroundedEntity));
    assert!(!result
        .consistency_flags
        .contains(&ConsistencyFlag::UnsupportedNumber));
}

#[tokio::test]
async fn facts_used_counts_every_retrieved_fact_even_when_context_is_truncated() {
    let mut config = test_config();
    config.rag.max_context_chars = 60;
    let state = state_with(config, MockLLMClient::new("Bitcoin is priced at $98,000."));
    state.facts.add(sample_facts()).await.unwrap();

    let result = state
        .generator
        .generate("bitcoin ethereum solana", true, Some(3))
        .await
        .unwrap();

    assert_eq!(result.facts_used, 3);
    assert_eq!(result.retrieved_facts.len(), 3);
    assert!(result.context_truncated);
}

#[tokio::test]
async fn coin_filter_applies_before_ranking() {
    let llm = MockLLMClient::new("Solana is fast.");
    let state = state_with(test_config(), llm.clone());
    state.facts.add(sample_facts()).await.unwrap();

    let result = state
        .generator
        .generate_filtered("What is the price of Bitcoin?", true, Some(1), Some(" Solana "))
        .await
        .unwrap();

    assert_eq!(result.facts_used, 1);
    assert_eq!(result.retrieved_facts[0].fact.id, "sol1");
    assert!(result.retrieval_time >= 0.0);
    assert!(!llm.last_prompt().unwrap().user.contains("$98,000"));
}

#[tokio::test]
async fn compare_runs_both_pipelines() {
    let llm = MockLLMClient::new("Bitcoin is priced at $98,000.");
    let state = state_with(test_config(), llm.clone());
    state.facts.add(vec![btc_fact()]).await.unwrap();

    let comparison = state
        .generator
        .compare("What is the price of Bitcoin?", None, None)
        .await
        .unwrap();

    assert_eq!(comparison.rag.facts_used, 1);
    assert!(comparison.no_rag.retrieved_facts.is_empty());
    assert_eq!(comparison.no_rag.retrieval_time, 0.0);
    assert_eq!(llm.call_count(), 2);
}

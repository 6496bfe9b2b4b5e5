use crate::llm::Prompt;
use crate::types::{MetadataValue, RetrievedFact};

const RAG_SYSTEM_PROMPT: &str = "You are a cryptocurrency expert assistant. \
Answer the question using ONLY the provided facts. \
If the facts do not contain the answer, say that you do not have enough information. \
Quote prices, percentages and dates exactly as they appear in the facts. \
Do not speculate about future prices.";

const PLAIN_SYSTEM_PROMPT: &str = "You are a cryptocurrency expert assistant. \
Answer the question concisely from general knowledge. \
Your knowledge may be out of date, so say so when the question concerns current prices or recent events. \
Do not speculate about future prices.";

const NO_FACTS: &str = "(no relevant facts found)";

/// Retrieved facts rendered as a numbered list for the prompt.
#[derive(Debug, Clone, PartialEq)]
pub struct Context {
    pub text: String,
    /// Facts rendered in full
    pub included: usize,
    /// Some retrieved facts did not fit
    pub truncated: bool,
}

fn metadata_text(fact: &RetrievedFact, key: &str) -> Option<String> {
    fact.fact.metadata.get(key).map(MetadataValue::to_string)
}

/// One numbered fact line, with the coin and timestamp when the fact has them.
pub fn format_fact_line(index: usize, fact: &RetrievedFact, coin_key: &str) -> String {
    let mut details = Vec::with_capacity(3);
    if let Some(coin) = metadata_text(fact, coin_key) {
        details.push(format!("Crypto: {}", coin));
    }
    if let Some(timestamp) = metadata_text(fact, "timestamp") {
        details.push(format!("Time: {}", timestamp));
    }
    details.push(format!("Relevance: {:.2}", fact.score));

    format!("{}. {} ({})", index, fact.fact.content, details.join(", "))
}

/// Render facts in retrieval order until `max_chars` would be exceeded.
///
/// Whole lines only, except that an oversized first fact is cut at a
/// character boundary so the model always sees the best match.
pub fn build_context(facts: &[RetrievedFact], coin_key: &str, max_chars: usize) -> Context {
    if facts.is_empty() {
        return Context {
            text: NO_FACTS.to_string(),
            included: 0,
            truncated: false,
        };
    }

    let mut text = String::new();
    let mut included = 0;

    for (i, fact) in facts.iter().enumerate() {
        let line = format_fact_line(i + 1, fact, coin_key);
        let separator = if text.is_empty() { 0 } else { 1 };
        let needed = text.chars().count() + separator + line.chars().count();

        if needed > max_chars {
            if included == 0 {
                text = line.chars().take(max_chars).collect();
                included = 1;
            }
            break;
        }

        if separator == 1 {
            text.push('\n');
        }
        text.push_str(&line);
        included += 1;
    }

    let truncated = included < facts.len()
        || (included == 1 && format_fact_line(1, &facts[0], coin_key).chars().count() > max_chars);

    Context {
        text,
        included,
        truncated,
    }
}

/// Grounded prompt: facts first, then the question.
pub fn rag_prompt(question: &str, context: &Context) -> Prompt {
    Prompt::new(format!(
        "Facts:\n{}\n\nQuestion: {}\n\nAnswer:",
        context.text, question
    ))
    .with_system(RAG_SYSTEM_PROMPT)
}

/// Ungrounded prompt for `use_rag = false` and degraded fallbacks.
pub fn plain_prompt(question: &str) -> Prompt {
    Prompt::new(format!("Question: {}\n\nAnswer:", question)).with_system(PLAIN_SYSTEM_PROMPT)
}

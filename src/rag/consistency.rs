//! Best-effort consistency checks for generated answers.
//!
//! A rule-based pass compares the answer text with the retrieved facts and
//! annotates it with [`ConsistencyFlag`]s. It never blocks an answer. The
//! rules are heuristics: a clean report is not a proof that the answer is
//! grounded, and a flag is not a proof that it is wrong.
//!
//! - **Numbers**: every figure in the answer that carries a currency sign,
//!   a percent sign or a magnitude word (`k`, `million`, `B`, ...) is
//!   checked, as is any bare number at or above `min_checked_value`. A
//!   figure is supported when some number in a retrieved fact (content or
//!   numeric metadata) lies within the relative tolerance. Four-digit
//!   years are ignored.
//! - **Entities**: coin names (case-insensitive) and tickers (upper-case
//!   only) mentioned in the answer must appear in some retrieved fact. Names
//!   that double as ordinary English words (`near`, `maker`, `stellar`, ...)
//!   are only recognised through their tickers in answers.
//! - **Speculation**: forward-looking price talk and vague attributions.

use std::collections::{BTreeSet, HashMap};
use std::sync::LazyLock;

use regex::Regex;

use crate::types::{AppError, ConsistencyFlag, MetadataValue, Result, RetrievedFact};
use crate::utils::toml_config::ConsistencyConfig;

// =============================================================================
// Number extraction
// =============================================================================

static RE_NUMBER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?x)
        (?P<cur>[$€£])?\s?
        (?P<num>
            \d{1,3}(?:,\d{3})+(?:\.\d+)?
          | \d{1,3}(?:[\ \x{A0}\x{202F}]\d{3})+(?:\.\d+)?
          | \d+(?:\.\d+)?
        )
        (?:
            \s?(?P<pct>%|(?i:percent)\b)
          | \s(?P<word>(?i:thousand|million|billion|trillion))\b
          | (?P<abbr>bn|mn|[kKmMbBtT])\b
        )?",
    )
    .unwrap()
});

/// Thousands separators: comma, space, no-break space, narrow no-break space.
const GROUP_SEPARATORS: [char; 4] = [',', ' ', '\u{A0}', '\u{202F}'];

/// How a figure was written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumberKind {
    Currency,
    Percent,
    Scaled,
    Plain,
}

/// A figure found in text, with magnitude words applied.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedNumber {
    pub raw: String,
    pub value: f64,
    pub kind: NumberKind,
}

impl ExtractedNumber {
    fn is_year(&self) -> bool {
        self.kind == NumberKind::Plain
            && self.raw.len() == 4
            && (1900.0..=2100.0).contains(&self.value)
    }
}

fn magnitude(word: &str) -> f64 {
    match word.to_lowercase().as_str() {
        "k" | "thousand" => 1e3,
        "m" | "mn" | "million" => 1e6,
        "b" | "bn" | "billion" => 1e9,
        "t" | "trillion" => 1e12,
        _ => 1.0,
    }
}

/// Extract every figure from `text`.
///
/// Digits glued to letters (`ERC20`, `Web3`, `0x1f`) are skipped. Thousands
/// may be grouped with commas or spaces (`98,000`, `98 000`), so two bare
/// numbers separated by a single space, the second exactly three digits
/// long, read as one figure.
pub fn extract_numbers(text: &str) -> Vec<ExtractedNumber> {
    let mut numbers = Vec::new();

    for caps in RE_NUMBER.captures_iter(text) {
        let Some(num) = caps.name("num") else {
            continue;
        };

        let preceding = text[..num.start()].chars().next_back();
        if preceding.is_some_and(|c| c.is_alphanumeric() || c == '.' || c == '_') {
            continue;
        }
        if text[num.end()..]
            .chars()
            .next()
            .is_some_and(|c| c.is_alphabetic())
            && caps.name("abbr").is_none()
        {
            continue;
        }

        let Ok(base) = num.as_str().replace(GROUP_SEPARATORS, "").parse::<f64>() else {
            continue;
        };

        let (value, kind) = if caps.name("pct").is_some() {
            (base, NumberKind::Percent)
        } else if let Some(word) = caps.name("word").or_else(|| caps.name("abbr")) {
            (base * magnitude(word.as_str()), NumberKind::Scaled)
        } else if caps.name("cur").is_some() {
            (base, NumberKind::Currency)
        } else {
            (base, NumberKind::Plain)
        };

        numbers.push(ExtractedNumber {
            raw: caps[0].trim().to_string(),
            value,
            kind,
        });
    }

    numbers
}

/// Relative closeness test; two zeros are equal.
fn within_tolerance(a: f64, b: f64, tolerance: f64) -> bool {
    let scale = a.abs().max(b.abs());
    if scale == 0.0 {
        return true;
    }
    (a - b).abs() / scale <= tolerance
}

// =============================================================================
// Entity lexicon
// =============================================================================

/// (name, ticker, name is also an ordinary English word)
const BUILTIN_ENTITIES: &[(&str, &str, bool)] = &[
    ("bitcoin", "BTC", false),
    ("ethereum", "ETH", false),
    ("ether", "ETH", true),
    ("cardano", "ADA", false),
    ("solana", "SOL", false),
    ("polkadot", "DOT", false),
    ("chainlink", "LINK", false),
    ("polygon", "MATIC", true),
    ("avalanche", "AVAX", true),
    ("binance coin", "BNB", false),
    ("binance", "BNB", false),
    ("ripple", "XRP", false),
    ("dogecoin", "DOGE", false),
    ("shiba inu", "SHIB", false),
    ("litecoin", "LTC", false),
    ("cosmos", "ATOM", true),
    ("near", "NEAR", true),
    ("algorand", "ALGO", false),
    ("fantom", "FTM", false),
    ("terra", "LUNA", true),
    ("uniswap", "UNI", false),
    ("aave", "AAVE", false),
    ("compound", "COMP", true),
    ("maker", "MKR", true),
    ("sushiswap", "SUSHI", false),
    ("pancakeswap", "CAKE", false),
    ("tron", "TRX", false),
    ("stellar", "XLM", true),
    ("monero", "XMR", false),
    ("eos", "EOS", false),
    ("iota", "MIOTA", true),
    ("vechain", "VET", false),
    ("theta", "THETA", true),
    ("filecoin", "FIL", false),
    ("decentraland", "MANA", false),
    ("sandbox", "SAND", true),
    ("axie infinity", "AXS", false),
    ("tether", "USDT", false),
];

/// Coin names and tickers, compiled to regexes once per checker.
#[derive(Debug)]
pub struct EntityLexicon {
    name_to_symbol: HashMap<String, String>,
    symbols: BTreeSet<String>,
    /// Unambiguous names, case-insensitive
    strict_names: Regex,
    /// All names, case-insensitive
    all_names: Regex,
    /// Tickers, upper-case only
    strict_symbols: Regex,
    /// Tickers, any case
    loose_symbols: Regex,
}

fn alternation<'a>(items: impl Iterator<Item = &'a str>) -> String {
    let mut items: Vec<&str> = items.collect();
    items.sort_by_key(|s| std::cmp::Reverse(s.len()));
    items.dedup();
    items
        .iter()
        .map(|s| regex::escape(s).replace(' ', r"\s+"))
        .collect::<Vec<_>>()
        .join("|")
}

fn compile(pattern: String) -> Result<Regex> {
    Regex::new(&pattern)
        .map_err(|e| AppError::Configuration(format!("Invalid entity pattern: {}", e)))
}

impl EntityLexicon {
    /// Built-in coins plus `extra` (name -> ticker).
    pub fn new<'a>(extra: impl IntoIterator<Item = (&'a String, &'a String)>) -> Result<Self> {
        let mut entries: Vec<(String, String, bool)> = BUILTIN_ENTITIES
            .iter()
            .map(|(n, s, a)| (n.to_string(), s.to_string(), *a))
            .collect();
        for (name, symbol) in extra {
            let name = name.trim().to_lowercase();
            let symbol = symbol.trim().to_uppercase();
            if !name.is_empty() && !symbol.is_empty() {
                entries.push((name, symbol, false));
            }
        }

        let name_to_symbol: HashMap<String, String> = entries
            .iter()
            .map(|(n, s, _)| (n.clone(), s.clone()))
            .collect();
        let symbols: BTreeSet<String> = entries.iter().map(|(_, s, _)| s.clone()).collect();

        let strict = alternation(entries.iter().filter(|e| !e.2).map(|e| e.0.as_str()));
        let all = alternation(entries.iter().map(|e| e.0.as_str()));
        let tickers = alternation(symbols.iter().map(String::as_str));

        Ok(Self {
            strict_names: compile(format!(r"(?i)\b(?:{})\b", strict))?,
            all_names: compile(format!(r"(?i)\b(?:{})\b", all))?,
            strict_symbols: compile(format!(r"\b(?:{})\b", tickers))?,
            loose_symbols: compile(format!(r"(?i)\b(?:{})\b", tickers))?,
            name_to_symbol,
            symbols,
        })
    }

    fn symbol_for_name(&self, matched: &str) -> Option<String> {
        let key = matched.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase();
        self.name_to_symbol.get(&key).cloned()
    }

    fn collect(&self, text: &str, names: &Regex, tickers: &Regex) -> BTreeSet<String> {
        let mut found: BTreeSet<String> = names
            .find_iter(text)
            .filter_map(|m| self.symbol_for_name(m.as_str()))
            .collect();
        found.extend(tickers.find_iter(text).map(|m| m.as_str().to_uppercase()));
        found
    }

    /// Tickers of the coins an answer mentions (strict matching).
    pub fn mentioned_in_answer(&self, text: &str) -> BTreeSet<String> {
        self.collect(text, &self.strict_names, &self.strict_symbols)
    }

    /// Tickers of the coins a fact mentions (lenient matching).
    pub fn mentioned_in_fact(&self, text: &str) -> BTreeSet<String> {
        self.collect(text, &self.all_names, &self.loose_symbols)
    }

    /// Ticker for a metadata value naming a coin exactly.
    pub fn resolve_exact(&self, value: &str) -> Option<String> {
        let value = value.trim();
        self.symbol_for_name(value).or_else(|| {
            let upper = value.to_uppercase();
            self.symbols.contains(&upper).then_some(upper)
        })
    }
}

// =============================================================================
// Speculative language
// =============================================================================

static RE_SPECULATIVE: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)\bwill (?:likely |probably |soon |definitely )?(?:reach|hit|surge|soar|crash|rise|fall|drop|climb|double|triple|moon)\b",
        r"(?i)\b(?:is|are) (?:expected|predicted|projected|forecast|poised) to\b",
        r"(?i)\bprice predictions?\b",
        r"(?i)\baccording to (?:some |many |several |unnamed )?(?:sources|reports|analysts|experts|insiders)\b",
        r"(?i)\bsources (?:say|said|claim|suggest)\b",
        r"(?i)\breports (?:indicate|suggest|say)\b",
        r"(?i)\bbreaking news\b",
        r"(?i)\bjust announced\b",
        r"(?i)\brecently revealed\b",
        r"(?i)\brumou?rs? (?:say|suggest|indicate)\b",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

/// Phrases in `text` that read as speculation or unsourced attribution.
pub fn speculative_phrases(text: &str) -> Vec<String> {
    RE_SPECULATIVE
        .iter()
        .flat_map(|re| re.find_iter(text).map(|m| m.as_str().to_string()))
        .collect()
}

// =============================================================================
// Checker
// =============================================================================

/// Flags plus the evidence that raised them.
#[derive(Debug, Clone, Default)]
pub struct ConsistencyReport {
    pub flags: BTreeSet<ConsistencyFlag>,
    pub unsupported_numbers: Vec<String>,
    pub ungrounded_entities: Vec<String>,
    pub speculative_phrases: Vec<String>,
}

/// Rule-based answer checker built once from configuration.
#[derive(Debug)]
pub struct ConsistencyChecker {
    tolerance: f64,
    min_checked_value: f64,
    flag_speculative: bool,
    lexicon: EntityLexicon,
}

impl ConsistencyChecker {
    pub fn new(config: &ConsistencyConfig) -> Result<Self> {
        Ok(Self {
            tolerance: config.numeric_tolerance,
            min_checked_value: config.min_checked_value,
            flag_speculative: config.flag_speculative_language,
            lexicon: EntityLexicon::new(&config.extra_entities)?,
        })
    }

    pub fn lexicon(&self) -> &EntityLexicon {
        &self.lexicon
    }

    fn is_checked(&self, number: &ExtractedNumber) -> bool {
        match number.kind {
            NumberKind::Plain => !number.is_year() && number.value.abs() >= self.min_checked_value,
            _ => true,
        }
    }

    /// Every figure the facts offer as support: scaled values and bare numerals.
    fn fact_numbers(facts: &[RetrievedFact]) -> Vec<f64> {
        let mut values = Vec::new();
        for retrieved in facts {
            let fact = &retrieved.fact;
            for number in extract_numbers(&fact.content) {
                values.push(number.value);
                if let Ok(bare) = number
                    .raw
                    .trim_start_matches(['$', '€', '£'])
                    .trim()
                    .split(|c: char| !(c.is_ascii_digit() || c == '.' || GROUP_SEPARATORS.contains(&c)))
                    .next()
                    .unwrap_or_default()
                    .replace(GROUP_SEPARATORS, "")
                    .parse::<f64>()
                {
                    values.push(bare);
                }
            }
            for value in fact.metadata.values() {
                match value {
                    MetadataValue::Text(text) => {
                        values.extend(extract_numbers(text).into_iter().map(|n| n.value))
                    }
                    other => values.extend(other.as_f64()),
                }
            }
        }
        values
    }

    fn fact_entities(&self, facts: &[RetrievedFact]) -> BTreeSet<String> {
        let mut grounded = BTreeSet::new();
        for retrieved in facts {
            let fact = &retrieved.fact;
            grounded.extend(self.lexicon.mentioned_in_fact(&fact.content));
            for value in fact.metadata.values() {
                if let MetadataValue::Text(text) = value {
                    grounded.extend(self.lexicon.resolve_exact(text));
                    grounded.extend(self.lexicon.mentioned_in_fact(text));
                }
            }
        }
        grounded
    }

    /// Check `answer` against `facts`.
    pub fn check(&self, answer: &str, facts: &[RetrievedFact]) -> ConsistencyReport {
        let mut report = ConsistencyReport::default();

        let supported = Self::fact_numbers(facts);
        for number in extract_numbers(answer)
            .into_iter()
            .filter(|n| self.is_checked(n))
        {
            let ok = supported
                .iter()
                .any(|v| within_tolerance(number.value, *v, self.tolerance));
            if !ok {
                report.unsupported_numbers.push(number.raw);
            }
        }
        if !report.unsupported_numbers.is_empty() {
            report.flags.insert(ConsistencyFlag::UnsupportedNumber);
        }

        let grounded = self.fact_entities(facts);
        report.ungrounded_entities = self
            .lexicon
            .mentioned_in_answer(answer)
            .into_iter()
            .filter(|symbol| !grounded.contains(symbol))
            .collect();
        if !report.ungrounded_entities.is_empty() {
            report.flags.insert(ConsistencyFlag::UngroundedEntity);
        }

        if self.flag_speculative {
            report.speculative_phrases = speculative_phrases(answer);
            if !report.speculative_phrases.is_empty() {
                report.flags.insert(ConsistencyFlag::SpeculativeClaim);
            }
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Fact;
    use rstest::rstest;

    fn retrieved(id: &str, content: &str) -> RetrievedFact {
        RetrievedFact {
            fact: Fact::new(id, content),
            score: 1.0,
        }
    }

    fn checker() -> ConsistencyChecker {
        ConsistencyChecker::new(&ConsistencyConfig::default()).unwrap()
    }

    #[rstest]
    #[case("Bitcoin is at $98,000 today", 98_000.0, NumberKind::Currency)]
    #[case("up 5.2% this week", 5.2, NumberKind::Percent)]
    #[case("market cap of $1.2B", 1.2e9, NumberKind::Scaled)]
    #[case("supply capped at 21 million", 21e6, NumberKind::Scaled)]
    #[case("volume was $50k", 50_000.0, NumberKind::Scaled)]
    #[case("about 1,234.5 coins", 1234.5, NumberKind::Plain)]
    #[case("Bitcoin is at $98 000 today", 98_000.0, NumberKind::Currency)]
    #[case("a supply of 21\u{202F}000\u{202F}000 coins", 21e6, NumberKind::Plain)]
    #[case("fees of 1 250.50 EUR", 1250.5, NumberKind::Plain)]
    fn test_extract_numbers(#[case] text: &str, #[case] value: f64, #[case] kind: NumberKind) {
        let numbers = extract_numbers(text);
        assert_eq!(numbers.len(), 1, "{:?}", numbers);
        assert!((numbers[0].value - value).abs() < 1e-6);
        assert_eq!(numbers[0].kind, kind);
    }

    #[test]
    fn test_extract_skips_identifiers() {
        assert!(extract_numbers("an ERC20 token on Web3").is_empty());
    }

    #[test]
    fn test_within_tolerance() {
        assert!(within_tolerance(98_000.0, 98_500.0, 0.01));
        assert!(!within_tolerance(98_000.0, 99_500.0, 0.01));
        assert!(within_tolerance(0.0, 0.0, 0.01));
    }

    #[test]
    fn test_supported_price_not_flagged() {
        let facts = vec![retrieved("btc1", "Bitcoin is priced at $98,000")];
        let report = checker().check("Bitcoin currently trades at about $98,000.", &facts);
        assert!(report.flags.is_empty(), "{:?}", report);
    }

    #[test]
    fn test_near_match_within_tolerance() {
        let facts = vec![retrieved("btc1", "Bitcoin is priced at $98,000")];
        let report = checker().check("Bitcoin is around $98.5k.", &facts);
        assert!(!report.flags.contains(&ConsistencyFlag::UnsupportedNumber));
    }

    #[test]
    fn test_unsupported_price_flagged() {
        let facts = vec![retrieved("btc1", "Bitcoin is priced at $98,000")];
        let report = checker().check("Bitcoin is priced at $105,000.", &facts);
        assert!(report.flags.contains(&ConsistencyFlag::UnsupportedNumber));
        assert_eq!(report.unsupported_numbers, vec!["$105,000".to_string()]);
    }

    #[test]
    fn test_small_plain_numbers_and_years_ignored() {
        let facts = vec![retrieved("btc1", "Bitcoin is priced at $98,000")];
        let report = checker().check(
            "In 2024 there were 3 reasons Bitcoin held $98,000.",
            &facts,
        );
        assert!(report.flags.is_empty(), "{:?}", report);
    }

    #[test]
    fn test_numeric_metadata_supports_answer() {
        let fact = Fact::new("eth1", "Ethereum price update").with_metadata("price_usd", 3_400.0);
        let facts = vec![RetrievedFact { fact, score: 0.9 }];
        let report = checker().check("Ethereum is at $3,400.", &facts);
        assert!(report.flags.is_empty(), "{:?}", report);
    }

    #[test]
    fn test_ungrounded_entity_flagged() {
        let facts = vec![retrieved("btc1", "Bitcoin is priced at $98,000")];
        let report = checker().check("Bitcoin and Solana both rallied.", &facts);
        assert!(report.flags.contains(&ConsistencyFlag::UngroundedEntity));
        assert_eq!(report.ungrounded_entities, vec!["SOL".to_string()]);
    }

    #[test]
    fn test_entity_grounded_by_metadata_and_ticker() {
        let fact = Fact::new("n1", "Price rose 4% overnight").with_metadata("coin", "near");
        let facts = vec![RetrievedFact { fact, score: 0.9 }];
        let report = checker().check("NEAR rose 4% overnight.", &facts);
        assert!(report.flags.is_empty(), "{:?}", report);
    }

    #[test]
    fn test_ambiguous_words_not_entities_in_answers() {
        let facts = vec![retrieved("btc1", "Bitcoin is priced at $98,000")];
        let report = checker().check(
            "Bitcoin is near its high and had a stellar month.",
            &facts,
        );
        assert!(!report.flags.contains(&ConsistencyFlag::UngroundedEntity));
    }

    #[rstest]
    #[case("Bitcoin is priced at $98,000 after an avalanche of buying.")]
    #[case("Bitcoin is priced at $98,000 with ether-like volatility.")]
    #[case("The polygon of support around Bitcoin held at $98,000.")]
    #[case("Bitcoin at $98,000 sits at the center of the crypto cosmos.")]
    #[case("Bitcoin held $98,000 on terra firma.")]
    #[case("Not one iota of Bitcoin's $98,000 price moved.")]
    #[case("Options theta decayed while Bitcoin stayed at $98,000.")]
    fn test_dictionary_word_coin_names_not_entities(#[case] answer: &str) {
        let facts = vec![retrieved("btc1", "Bitcoin is priced at $98,000")];
        let report = checker().check(answer, &facts);
        assert!(report.flags.is_empty(), "{:?}", report);
    }

    #[test]
    fn test_dictionary_word_coins_still_caught_by_ticker() {
        let facts = vec![retrieved("btc1", "Bitcoin is priced at $98,000")];
        let report = checker().check("AVAX and ATOM lagged Bitcoin.", &facts);
        assert_eq!(
            report.ungrounded_entities,
            vec!["ATOM".to_string(), "AVAX".to_string()]
        );
    }

    #[test]
    fn test_space_grouped_price_supported() {
        let facts = vec![retrieved("btc1", "Bitcoin is priced at $98,000")];
        let report = checker().check("Bitcoin trades at $98 000.", &facts);
        assert!(report.flags.is_empty(), "{:?}", report);

        let facts = vec![retrieved("btc1", "Bitcoin is priced at $98 000")];
        let report = checker().check("Bitcoin trades at $98,000.", &facts);
        assert!(report.flags.is_empty(), "{:?}", report);
    }

    #[test]
    fn test_lowercase_ticker_lookalikes_ignored() {
        let facts = vec![retrieved("btc1", "Bitcoin is priced at $98,000")];
        let report = checker().check("Bitcoin's link to the dot-com era", &facts);
        assert!(!report.flags.contains(&ConsistencyFlag::UngroundedEntity));
    }

    #[test]
    fn test_speculative_language() {
        let facts = vec![retrieved("btc1", "Bitcoin is priced at $98,000")];
        let report = checker().check(
            "Sources say Bitcoin will surge past its high at $98,000.",
            &facts,
        );
        assert!(report.flags.contains(&ConsistencyFlag::SpeculativeClaim));
        assert_eq!(report.speculative_phrases.len(), 2);

        let config = ConsistencyConfig {
            flag_speculative_language: false,
            ..ConsistencyConfig::default()
        };
        let quiet = ConsistencyChecker::new(&config).unwrap();
        assert!(quiet
            .check("Sources say Bitcoin will surge at $98,000.", &facts)
            .flags
            .is_empty());
    }

    #[test]
    fn test_extra_entities() {
        let mut config = ConsistencyConfig::default();
        config
            .extra_entities
            .insert("pepe".to_string(), "pepe".to_string());
        let checker = ConsistencyChecker::new(&config).unwrap();

        let report = checker.check("PEPE doubled.", &[retrieved("x", "Bitcoin news")]);
        assert_eq!(report.ungrounded_entities, vec!["PEPE".to_string()]);
    }

    #[test]
    fn test_no_facts_flags_everything_checkable() {
        let report = checker().check("Ethereum trades at $3,000.", &[]);
        assert!(report.flags.contains(&ConsistencyFlag::UnsupportedNumber));
        assert!(report.flags.contains(&ConsistencyFlag::UngroundedEntity));
    }
}

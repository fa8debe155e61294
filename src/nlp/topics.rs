// src/nlp/topics.rs
//! Topic matching against a fixed taxonomy and frequency-ranked keywords.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{HashMap, HashSet};

/// Topic emitted when nothing in the taxonomy matches.
pub const GENERAL_TOPIC: &str = "General";

pub const DEFAULT_KEYWORD_TOP_N: usize = 10;

/// Declaration order is the output order.
const TOPIC_TABLE: &[(&str, &[&str])] = &[
    (
        "AI/ML",
        &[
            "ai", "artificial intelligence", "machine learning", "ml", "gpt", "chatgpt", "llm",
            "neural", "deep learning", "openai", "anthropic",
        ],
    ),
    (
        "Crypto",
        &[
            "bitcoin", "btc", "ethereum", "eth", "crypto", "blockchain", "nft", "defi", "web3",
            "token", "coin",
        ],
    ),
    (
        "Finance",
        &[
            "stock", "market", "invest", "trading", "fed", "inflation", "recession", "economy",
            "bank", "interest rate",
        ],
    ),
    (
        "Tech Industry",
        &[
            "google", "apple", "microsoft", "amazon", "meta", "facebook", "twitter", "startup",
            "layoff", "hiring", "ipo",
        ],
    ),
    (
        "Programming",
        &[
            "python", "javascript", "rust", "golang", "react", "api", "framework", "database",
            "cloud", "aws", "developer",
        ],
    ),
    (
        "Politics",
        &[
            "election", "congress", "senate", "president", "democrat", "republican", "vote",
            "policy", "government", "law",
        ],
    ),
    (
        "Science",
        &[
            "research", "study", "scientist", "discovery", "nasa", "space", "climate", "physics",
            "biology", "medical",
        ],
    ),
    (
        "Gaming",
        &[
            "game", "gaming", "playstation", "xbox", "nintendo", "steam", "esports", "gamer",
            "console", "pc gaming",
        ],
    ),
];

static STOPWORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "the", "a", "an", "is", "are", "was", "were", "be", "been", "being", "have", "has",
        "had", "do", "does", "did", "will", "would", "could", "should", "may", "might", "must",
        "shall", "can", "to", "of", "in", "for", "on", "with", "at", "by", "from", "as", "into",
        "through", "during", "before", "after", "above", "below", "between", "under", "again",
        "further", "then", "once", "here", "there", "when", "where", "why", "how", "all",
        "each", "few", "more", "most", "other", "some", "such", "no", "nor", "not", "only",
        "own", "same", "so", "than", "too", "very", "just", "and", "but", "if", "or",
        "because", "until", "while", "this", "that", "these", "those", "i", "you", "he", "she",
        "it", "we", "they", "what", "which", "who", "whom", "its", "his", "her", "their", "my",
        "your", "our", "about", "get", "got", "like", "know", "think", "make", "see", "look",
        "want", "give", "use", "find", "tell", "ask", "work", "seem", "feel", "try", "leave",
        "call", "http", "https", "www", "com", "org", "reddit", "deleted", "removed",
    ]
    .into_iter()
    .collect()
});

static RE_URL: Lazy<Regex> = Lazy::new(|| Regex::new(r"http\S+").expect("static url regex"));
static RE_NON_WORD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^\w\s]").expect("static non-word regex"));

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topic {
    pub name: String,
    pub triggers: Vec<String>,
}

/// Read-only taxonomy + stopword configuration.
#[derive(Debug, Clone)]
pub struct TopicExtractor {
    topics: Vec<Topic>,
    keyword_top_n: usize,
}

impl Default for TopicExtractor {
    fn default() -> Self {
        Self::new(DEFAULT_KEYWORD_TOP_N)
    }
}

impl TopicExtractor {
    pub fn new(keyword_top_n: usize) -> Self {
        let topics = TOPIC_TABLE
            .iter()
            .map(|(name, triggers)| Topic {
                name: (*name).to_string(),
                triggers: triggers.iter().map(|t| (*t).to_string()).collect(),
            })
            .collect();
        Self {
            topics,
            keyword_top_n: keyword_top_n.max(1),
        }
    }

    pub fn topics(&self) -> &[Topic] {
        &self.topics
    }

    pub fn keyword_top_n(&self) -> usize {
        self.keyword_top_n
    }

    /// Every topic with at least one trigger contained in the lowercased
    /// text, in table order. Never empty.
    pub fn extract_topics(&self, text: &str) -> Vec<String> {
        let lower = text.to_lowercase();
        let found: Vec<String> = self
            .topics
            .iter()
            .filter(|t| t.triggers.iter().any(|kw| lower.contains(kw.as_str())))
            .map(|t| t.name.clone())
            .collect();
        if found.is_empty() {
            vec![GENERAL_TOPIC.to_string()]
        } else {
            found
        }
    }

    /// Top keywords with the configured N.
    pub fn extract_keywords(&self, text: &str) -> Vec<String> {
        extract_keywords(text, self.keyword_top_n)
    }
}

/// Frequency-ranked keywords. Ties keep first-occurrence order.
pub fn extract_keywords(text: &str, top_n: usize) -> Vec<String> {
    let no_urls = RE_URL.replace_all(text, "");
    let lower = no_urls.to_lowercase();
    let cleaned = RE_NON_WORD.replace_all(&lower, " ");

    let mut order: Vec<(&str, usize)> = Vec::new();
    let mut index: HashMap<&str, usize> = HashMap::new();
    for word in cleaned.split_whitespace() {
        if word.chars().count() <= 2 || STOPWORDS.contains(word) {
            continue;
        }
        match index.get(word) {
            Some(&i) => order[i].1 += 1,
            None => {
                index.insert(word, order.len());
                order.push((word, 1));
            }
        }
    }

    // sort_by is stable: equal counts stay in insertion order
    order.sort_by(|a, b| b.1.cmp(&a.1));
    order
        .into_iter()
        .take(top_n)
        .map(|(w, _)| w.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topics_follow_table_order_and_fallback() {
        let ex = TopicExtractor::default();
        assert_eq!(
            ex.extract_topics("Playing a new game while Bitcoin moons"),
            vec!["Crypto".to_string(), "Gaming".to_string()]
        );
        assert_eq!(ex.extract_topics("zzz"), vec![GENERAL_TOPIC.to_string()]);
        assert_eq!(ex.extract_topics(""), vec![GENERAL_TOPIC.to_string()]);
    }

    #[test]
    fn topic_triggers_are_plain_substrings() {
        // "ai" hides inside "said"; multi-word triggers match too
        let ex = TopicExtractor::default();
        assert_eq!(ex.extract_topics("He said so"), vec!["AI/ML".to_string()]);
        assert!(ex
            .extract_topics("The Interest Rate decision")
            .contains(&"Finance".to_string()));
    }

    #[test]
    fn keyword_ties_break_by_first_occurrence() {
        // tokens of length <= 2 are dropped, so use three-letter words
        assert_eq!(extract_keywords("aix aix mlx mlx aix", 2), vec!["aix", "mlx"]);
        assert_eq!(extract_keywords("beta alpha beta alpha gamma", 3), vec!["beta", "alpha", "gamma"]);
    }

    #[test]
    fn keywords_strip_urls_punctuation_and_stopwords() {
        let kws = extract_keywords(
            "Check https://example.com/rust-lang NOW: Rust, rust & more Rust! The compiler.",
            10,
        );
        assert_eq!(kws, vec!["rust", "check", "now", "compiler"]);
    }

    #[test]
    fn keywords_respect_top_n_and_are_idempotent_on_clean_input() {
        let text = "tokio tokio serde serde serde axum";
        let first = extract_keywords(text, 2);
        assert_eq!(first, vec!["serde", "tokio"]);
        assert_eq!(extract_keywords(&first.join(" "), 2), first);
        assert!(extract_keywords("a an the of", 5).is_empty());
    }
}

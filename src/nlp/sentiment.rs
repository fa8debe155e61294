// src/nlp/sentiment.rs
//! Polarity scoring on a continuous [-1, 1] scale.
//!
//! Two backends share one label policy:
//! - [`ValenceScorer`]: lexicon + rules (negation window, boosters, caps
//!   emphasis, "but" contrast, `!`/`?` amplification, emoji valences).
//! - [`WordListScorer`]: plain positive/negative word counting, used when the
//!   valence lexicon cannot be loaded or when configured explicitly.

use once_cell::sync::Lazy;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};

use crate::record::SentimentLabel;

static VALENCE_LEXICON: Lazy<Option<HashMap<String, f64>>> = Lazy::new(|| {
    let raw = include_str!("../../data/valence_lexicon.json");
    match serde_json::from_str::<HashMap<String, f64>>(raw) {
        Ok(map) => Some(map),
        Err(e) => {
            tracing::warn!(target: "nlp", error = %e, "valence lexicon unreadable");
            None
        }
    }
});

// Empirical constants of the valence-aware scoring rules.
const BOOST_INCR: f64 = 0.293;
const BOOST_DECR: f64 = -0.293;
const CAPS_INCR: f64 = 0.733;
const NEGATION_SCALAR: f64 = -0.74;
const NORMALIZE_ALPHA: f64 = 15.0;

const NEGATORS: &[&str] = &[
    "not", "no", "never", "neither", "nobody", "nothing", "none", "nor", "nowhere", "cannot",
    "without", "aint", "isnt", "wasnt", "arent", "dont", "doesnt", "didnt", "wont", "cant",
    "couldnt", "shouldnt", "wouldnt", "hasnt", "havent", "hadnt", "rarely", "seldom", "despite",
];

static BOOSTERS: Lazy<HashMap<&'static str, f64>> = Lazy::new(|| {
    let incr = [
        "absolutely", "amazingly", "completely", "considerably", "deeply", "enormously",
        "entirely", "especially", "exceptionally", "extremely", "fully", "greatly", "highly",
        "hugely", "incredibly", "insanely", "intensely", "majorly", "more", "most",
        "particularly", "purely", "quite", "really", "remarkably", "so", "substantially",
        "thoroughly", "totally", "tremendously", "uber", "unbelievably", "unusually",
        "utterly", "very",
    ];
    let decr = [
        "almost", "barely", "hardly", "kinda", "less", "little", "marginally", "occasionally",
        "partly", "scarcely", "slightly", "somewhat", "sorta",
    ];
    incr.iter()
        .map(|w| (*w, BOOST_INCR))
        .chain(decr.iter().map(|w| (*w, BOOST_DECR)))
        .collect()
});

/// Scores a text to a compound polarity in [-1, 1].
pub trait SentimentScorer: Send + Sync {
    fn compound(&self, text: &str) -> f64;
    fn name(&self) -> &'static str;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SentimentBackendKind {
    #[default]
    Valence,
    #[serde(alias = "fallback")]
    WordList,
}

pub struct SentimentAnalyzer {
    scorer: Box<dyn SentimentScorer>,
}

impl std::fmt::Debug for SentimentAnalyzer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SentimentAnalyzer")
            .field("backend", &self.scorer.name())
            .finish()
    }
}

impl Default for SentimentAnalyzer {
    fn default() -> Self {
        Self::new(SentimentBackendKind::Valence)
    }
}

impl SentimentAnalyzer {
    /// Select the backend once. A valence request degrades to the word-list
    /// scorer when the lexicon is unavailable.
    pub fn new(kind: SentimentBackendKind) -> Self {
        let scorer: Box<dyn SentimentScorer> = match kind {
            SentimentBackendKind::Valence => match ValenceScorer::load() {
                Some(v) => Box::new(v),
                None => {
                    tracing::warn!(target: "nlp", "valence scorer unavailable, using word lists");
                    Box::new(WordListScorer)
                }
            },
            SentimentBackendKind::WordList => Box::new(WordListScorer),
        };
        Self { scorer }
    }

    pub fn with_scorer(scorer: Box<dyn SentimentScorer>) -> Self {
        Self { scorer }
    }

    pub fn backend(&self) -> &'static str {
        self.scorer.name()
    }

    /// Returns the raw compound score and its label. Blank text is neutral.
    pub fn analyze(&self, text: &str) -> (f64, SentimentLabel) {
        if text.trim().is_empty() {
            return (0.0, SentimentLabel::Neutral);
        }
        let compound = self.scorer.compound(text).clamp(-1.0, 1.0);
        (compound, SentimentLabel::from_score(compound))
    }
}

// ------------------------------------------------------------
// Word-list fallback
// ------------------------------------------------------------

static POSITIVE_WORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "good", "great", "awesome", "amazing", "excellent", "love", "best", "happy",
        "wonderful", "fantastic", "beautiful", "perfect", "nice", "brilliant", "outstanding",
        "superb", "incredible", "exciting", "breakthrough", "innovative", "revolutionary",
        "success", "win",
    ]
    .into_iter()
    .collect()
});

static NEGATIVE_WORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "bad", "terrible", "awful", "horrible", "hate", "worst", "poor", "sad",
        "disappointing", "failure", "crash", "crisis", "disaster", "scam", "fraud", "broke",
        "dead", "dying", "killed", "threat", "dangerous", "toxic", "evil", "corrupt",
        "lawsuit", "fired",
    ]
    .into_iter()
    .collect()
});

#[derive(Debug, Clone, Copy, Default)]
pub struct WordListScorer;

impl SentimentScorer for WordListScorer {
    fn compound(&self, text: &str) -> f64 {
        let lower = text.to_lowercase();
        let (mut pos, mut neg) = (0u32, 0u32);
        for w in lower.split_whitespace() {
            if POSITIVE_WORDS.contains(w) {
                pos += 1;
            } else if NEGATIVE_WORDS.contains(w) {
                neg += 1;
            }
        }
        let total = pos + neg;
        if total == 0 {
            return 0.0;
        }
        (pos as f64 - neg as f64) / total as f64
    }

    fn name(&self) -> &'static str {
        "wordlist"
    }
}

// ------------------------------------------------------------
// Valence-aware scorer
// ------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
pub struct ValenceScorer {
    lexicon: &'static HashMap<String, f64>,
}

impl ValenceScorer {
    pub fn load() -> Option<Self> {
        VALENCE_LEXICON.as_ref().map(|lexicon| Self { lexicon })
    }

    fn valence_of(&self, lower: &str) -> Option<f64> {
        self.lexicon.get(lower).copied()
    }

    /// Booster/dampener contribution of `word` towards a neighbour of `valence`.
    fn booster(&self, word: &str, valence: f64, caps_differ: bool) -> f64 {
        let lower = word.to_lowercase();
        let Some(&base) = BOOSTERS.get(lower.as_str()) else {
            return 0.0;
        };
        let mut scalar = if valence < 0.0 { -base } else { base };
        if caps_differ && is_all_caps(word) {
            scalar += if valence > 0.0 { CAPS_INCR } else { -CAPS_INCR };
        }
        scalar
    }

    fn token_valence(&self, tokens: &[String], i: usize, caps_differ: bool) -> f64 {
        let word = tokens[i].as_str();
        let lower = word.to_lowercase();
        if BOOSTERS.contains_key(lower.as_str()) {
            return 0.0;
        }
        let Some(mut valence) = self.valence_of(&lower) else {
            return 0.0;
        };

        if caps_differ && is_all_caps(word) {
            valence += if valence > 0.0 { CAPS_INCR } else { -CAPS_INCR };
        }

        // Look back up to three tokens for boosters and negators.
        for back in 0..3usize {
            if i <= back {
                break;
            }
            let prev = tokens[i - back - 1].as_str();
            if self.valence_of(&prev.to_lowercase()).is_some() {
                continue;
            }
            let mut s = self.booster(prev, valence, caps_differ);
            match back {
                1 => s *= 0.95,
                2 => s *= 0.9,
                _ => {}
            }
            valence += s;
            if is_negator(prev) {
                valence *= NEGATION_SCALAR;
            }
        }
        valence
    }
}

impl SentimentScorer for ValenceScorer {
    fn compound(&self, text: &str) -> f64 {
        let tokens = tokenize(text);
        if tokens.is_empty() {
            return 0.0;
        }
        let caps_differ = caps_differential(&tokens);

        let mut sentiments: Vec<f64> = (0..tokens.len())
            .map(|i| self.token_valence(&tokens, i, caps_differ))
            .collect();

        // "but" shifts weight onto the clause that follows it.
        if let Some(pos) = tokens.iter().position(|t| t.eq_ignore_ascii_case("but")) {
            for (i, s) in sentiments.iter_mut().enumerate() {
                if i < pos {
                    *s *= 0.5;
                } else if i > pos {
                    *s *= 1.5;
                }
            }
        }

        let mut sum: f64 = sentiments.iter().sum();
        if sum != 0.0 {
            let amp = punctuation_emphasis(text);
            if sum > 0.0 {
                sum += amp;
            } else {
                sum -= amp;
            }
        }
        normalize(sum)
    }

    fn name(&self) -> &'static str {
        "valence"
    }
}

/// Split on whitespace and trim surrounding punctuation, keeping short
/// punctuation-only tokens intact so emoticons survive.
fn tokenize(text: &str) -> Vec<String> {
    text.split_whitespace()
        .map(|raw| {
            let stripped = raw.trim_matches(|c: char| c.is_ascii_punctuation());
            let tok = if stripped.chars().count() <= 2 { raw } else { stripped };
            tok.replace('\'', "")
        })
        .filter(|t| !t.is_empty())
        .collect()
}

fn is_negator(word: &str) -> bool {
    NEGATORS.contains(&word.to_lowercase().as_str())
}

fn is_all_caps(word: &str) -> bool {
    word.chars().any(char::is_alphabetic)
        && word.chars().filter(|c| c.is_alphabetic()).all(char::is_uppercase)
}

/// True when some, but not all, words are written in capitals.
fn caps_differential(tokens: &[String]) -> bool {
    let caps = tokens.iter().filter(|t| is_all_caps(t)).count();
    caps > 0 && caps < tokens.len()
}

fn punctuation_emphasis(text: &str) -> f64 {
    let bangs = text.matches('!').count().min(4) as f64 * 0.292;
    let qmarks = text.matches('?').count();
    let q = match qmarks {
        0 | 1 => 0.0,
        2 | 3 => qmarks as f64 * 0.18,
        _ => 0.96,
    };
    bangs + q
}

fn normalize(score: f64) -> f64 {
    let n = score / (score * score + NORMALIZE_ALPHA).sqrt();
    n.clamp(-1.0, 1.0)
}

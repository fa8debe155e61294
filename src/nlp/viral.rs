// src/nlp/viral.rs
//! Viral-potential heuristic.
//!
//! Six independent features, each in [0, 1], averaged with equal weight:
//!
//! | # | feature            | normalization                                    |
//! |---|--------------------|--------------------------------------------------|
//! | 1 | title patterns     | hits / 3, capped at 1                            |
//! | 2 | engagement words   | count / 5, capped at 1                           |
//! | 3 | title length       | 1.0 in [60,100], 0.7 in [40,120], else 0.3       |
//! | 4 | early velocity     | score / age_h / 50, capped; 0.5 when age_h <= 0  |
//! | 5 | comment ratio      | comments / score * 2, capped; 0.5 when score <= 0|
//! | 6 | absolute traction  | 1.0 >1000, 0.7 >100, 0.4 >10, else 0.2           |
//!
//! The constants are a versioned contract. A learned model would be a second
//! [`ViralModel`] implementation, not a change to this one.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::collections::HashSet;

use crate::record::EngagementLevel;

pub const HEURISTIC_VERSION: &str = "heuristic-v1";

static VIRAL_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"\?$",
        r"^(how|why|what|when|where)",
        r"(breaking|just in|update)",
        r"(first|new|latest|launch)",
        r"(secret|hidden|revealed)",
        r"(you won't believe|amazing)",
        r"\d+\s*(tips|ways|reasons)",
        r"(ask me anything|ama)",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("static viral pattern"))
    .collect()
});

static ENGAGEMENT_WORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "you", "your", "free", "new", "now", "how", "why", "best", "top", "first", "exclusive",
        "limited", "easy", "simple",
    ]
    .into_iter()
    .collect()
});

/// Inputs of one prediction.
#[derive(Debug, Clone, Copy)]
pub struct ViralInput<'a> {
    pub title: &'a str,
    pub body: &'a str,
    pub score: i64,
    pub num_comments: i64,
    pub age_hours: f64,
}

/// The six normalized features, in contract order.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ViralFeatures {
    pub pattern: f64,
    pub engagement_words: f64,
    pub title_length: f64,
    pub velocity: f64,
    pub comment_ratio: f64,
    pub traction: f64,
}

impl ViralFeatures {
    pub fn as_array(&self) -> [f64; 6] {
        [
            self.pattern,
            self.engagement_words,
            self.title_length,
            self.velocity,
            self.comment_ratio,
            self.traction,
        ]
    }

    pub fn mean(&self) -> f64 {
        self.as_array().iter().sum::<f64>() / 6.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ViralPrediction {
    /// Rounded to three decimals.
    pub score: f64,
    pub engagement: EngagementLevel,
}

pub trait ViralModel: Send + Sync {
    fn predict(&self, input: &ViralInput<'_>) -> ViralPrediction;
    fn version(&self) -> &'static str;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicViralPredictor;

impl HeuristicViralPredictor {
    pub fn features(&self, input: &ViralInput<'_>) -> ViralFeatures {
        let title_lower = input.title.to_lowercase();

        let hits = VIRAL_PATTERNS
            .iter()
            .filter(|re| re.is_match(&title_lower))
            .count();

        let combined = format!("{} {}", input.title, input.body).to_lowercase();
        let eng = combined
            .split_whitespace()
            .filter(|w| ENGAGEMENT_WORDS.contains(w))
            .count();

        let title_len = input.title.chars().count();
        let title_length = if (60..=100).contains(&title_len) {
            1.0
        } else if (40..=120).contains(&title_len) {
            0.7
        } else {
            0.3
        };

        let velocity = if input.age_hours > 0.0 {
            (input.score as f64 / input.age_hours / 50.0).min(1.0)
        } else {
            0.5
        };

        let comment_ratio = if input.score > 0 {
            (input.num_comments as f64 / input.score as f64 * 2.0).min(1.0)
        } else {
            0.5
        };

        let traction = match input.score {
            s if s > 1000 => 1.0,
            s if s > 100 => 0.7,
            s if s > 10 => 0.4,
            _ => 0.2,
        };

        ViralFeatures {
            pattern: (hits as f64 / 3.0).min(1.0),
            engagement_words: (eng as f64 / 5.0).min(1.0),
            title_length,
            // negative scores would otherwise push the mean below zero
            velocity: velocity.max(0.0),
            comment_ratio: comment_ratio.max(0.0),
            traction,
        }
    }
}

impl ViralModel for HeuristicViralPredictor {
    fn predict(&self, input: &ViralInput<'_>) -> ViralPrediction {
        let score = round3(self.features(input).mean());
        ViralPrediction {
            score,
            engagement: EngagementLevel::from_score(score),
        }
    }

    fn version(&self) -> &'static str {
        HEURISTIC_VERSION
    }
}

/// Rounds the exact binary value to three decimals, so a mean stored as
/// 0.52749999… stays 0.527 instead of being nudged up by the scaling.
pub(crate) fn round3(x: f64) -> f64 {
    format!("{x:.3}")
        .parse::<f64>()
        .map(|r| r + 0.0)
        .unwrap_or(x)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input<'a>(title: &'a str, body: &'a str, score: i64, comments: i64, age: f64) -> ViralInput<'a> {
        ViralInput {
            title,
            body,
            score,
            num_comments: comments,
            age_hours: age,
        }
    }

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn golden_how_to_python() {
        let p = HeuristicViralPredictor;
        let i = input("How to learn Python in 30 days", "", 150, 45, 12.0);
        let f = p.features(&i);
        assert!(approx(f.pattern, 1.0 / 3.0));
        assert!(approx(f.engagement_words, 0.2));
        assert!(approx(f.title_length, 0.3));
        assert!(approx(f.velocity, 0.25));
        assert!(approx(f.comment_ratio, 0.6));
        assert!(approx(f.traction, 0.7));

        let out = p.predict(&i);
        assert_eq!(out.score, 0.397);
        assert_eq!(out.engagement, EngagementLevel::Low);
    }

    #[test]
    fn rounding_follows_the_binary_value() {
        let p = HeuristicViralPredictor;
        let i = input(
            "Notes from a long weekend spent tuning the compiler",
            "you your",
            219,
            264,
            12.0,
        );
        // the nearest double to 0.5275 lies just below the half-way point
        assert_eq!(p.features(&i).mean(), 0.5275);
        assert_eq!(p.predict(&i).score, 0.527);
        assert_eq!(round3(0.7995), 0.799);
        assert!(round3(-0.0004).is_sign_positive());
    }

    #[test]
    fn engagement_label_follows_the_rounded_score() {
        let p = HeuristicViralPredictor;
        let i = input(
            "Why the new breaking update is amazing: free tips you can use right now",
            "",
            40,
            10,
            2.6845,
        );
        assert!(p.features(&i).mean() < 0.7);
        let out = p.predict(&i);
        assert_eq!(out.score, 0.7);
        assert_eq!(out.engagement, EngagementLevel::High);
    }

    #[test]
    fn patterns_only_look_at_the_title() {
        let p = HeuristicViralPredictor;
        let quiet = p.features(&input("Quarterly report", "breaking secret amazing?", 0, 0, 1.0));
        assert_eq!(quiet.pattern, 0.0);
        let loud = p.features(&input(
            "BREAKING: the secret launch you won't believe?",
            "",
            0,
            0,
            1.0,
        ));
        // question, urgency, novelty, mystery, clickbait → capped
        assert_eq!(loud.pattern, 1.0);
        let listicle = p.features(&input("7 ways to write faster", "", 0, 0, 1.0));
        assert!(approx(listicle.pattern, 1.0 / 3.0));
    }

    #[test]
    fn neutral_values_for_degenerate_inputs() {
        let p = HeuristicViralPredictor;
        let f = p.features(&input("t", "", 0, 10, 0.0));
        assert_eq!(f.velocity, 0.5);
        assert_eq!(f.comment_ratio, 0.5);
        assert_eq!(f.traction, 0.2);
    }

    #[test]
    fn title_length_bands() {
        let p = HeuristicViralPredictor;
        let len = |n: usize| p.features(&input(&"x".repeat(n), "", 0, 0, 1.0)).title_length;
        assert_eq!(len(60), 1.0);
        assert_eq!(len(100), 1.0);
        assert_eq!(len(40), 0.7);
        assert_eq!(len(120), 0.7);
        assert_eq!(len(39), 0.3);
        assert_eq!(len(121), 0.3);
    }

    #[test]
    fn traction_tiers_and_caps() {
        let p = HeuristicViralPredictor;
        let t = |s: i64| p.features(&input("t", "", s, 0, 1.0));
        assert_eq!(t(1001).traction, 1.0);
        assert_eq!(t(1000).traction, 0.7);
        assert_eq!(t(101).traction, 0.7);
        assert_eq!(t(100).traction, 0.4);
        assert_eq!(t(11).traction, 0.4);
        assert_eq!(t(10).traction, 0.2);
        assert_eq!(t(5000).velocity, 1.0);
        assert_eq!(p.features(&input("t", "", 10, 500, 1.0)).comment_ratio, 1.0);
    }

    #[test]
    fn score_always_in_unit_range() {
        let p = HeuristicViralPredictor;
        for (s, c, a) in [(-50, 3, 1.0), (0, 0, -2.0), (1_000_000, 1_000_000, 0.1), (3, 0, 1e9)] {
            let out = p.predict(&input("What is new? 5 tips", "you you you you you you", s, c, a));
            assert!((0.0..=1.0).contains(&out.score), "{s} {c} {a} -> {}", out.score);
        }
    }
}

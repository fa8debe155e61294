// tests/pipeline_golden.rs
//
// Golden checks of the enrichment pipeline through the public API.
//
// Covered:
// - viral heuristic reference example (features, score, label)
// - keyword ranking and tie-break
// - topic fallback
// - label invariants on stored (rounded) scores
// - batch mode matches single calls

use social_pulse::nlp::topics::extract_keywords;
use social_pulse::nlp::viral::{HeuristicViralPredictor, ViralInput, ViralModel};
use social_pulse::nlp::{BatchItem, EnrichmentPipeline, SentimentAnalyzer, SentimentBackendKind};
use social_pulse::record::{EngagementLevel, SentimentLabel};

#[test]
fn viral_reference_example() {
    let input = ViralInput {
        title: "How to learn Python in 30 days",
        body: "",
        score: 150,
        num_comments: 45,
        age_hours: 12.0,
    };
    let p = HeuristicViralPredictor;
    let f = p.features(&input).as_array();
    let expected = [1.0 / 3.0, 0.2, 0.3, 0.25, 0.6, 0.7];
    for (got, want) in f.iter().zip(expected) {
        assert!((got - want).abs() < 1e-9, "{f:?}");
    }
    let out = p.predict(&input);
    assert_eq!(out.score, 0.397);
    assert_eq!(out.engagement, EngagementLevel::Low);

    let via_pipeline = EnrichmentPipeline::default()
        .analyze("How to learn Python in 30 days", "", 150, 45, 12.0)
        .unwrap();
    assert_eq!(via_pipeline.viral_score, 0.397);
    assert!(via_pipeline.topics.contains(&"Programming".to_string()));
}

#[test]
fn keywords_rank_by_count_then_first_seen() {
    assert_eq!(
        extract_keywords("rust tokio rust serde tokio rust axum", 3),
        vec!["rust", "tokio", "serde"]
    );
    assert_eq!(extract_keywords("zeta beta zeta beta", 10), vec!["zeta", "beta"]);
}

#[test]
fn unmatched_text_is_general() {
    let r = EnrichmentPipeline::default()
        .analyze("A quiet afternoon", "nothing much happened", 1, 0, 2.0)
        .unwrap();
    assert_eq!(r.topics, vec!["General".to_string()]);
}

#[test]
fn labels_agree_with_stored_scores() {
    let texts = [
        "I love this, it is wonderful and amazing!",
        "This is terrible, the worst release ever.",
        "The meeting is on Tuesday.",
        "not bad at all",
        "good but slow",
        "",
        ":( sad day",
    ];
    for backend in [SentimentBackendKind::Valence, SentimentBackendKind::WordList] {
        let pipeline = EnrichmentPipeline::new(
            SentimentAnalyzer::new(backend),
            Default::default(),
            Default::default(),
        );
        for t in texts {
            let r = pipeline.analyze(t, "", 5, 1, 1.0).unwrap();
            assert!((-1.0..=1.0).contains(&r.sentiment_score));
            assert_eq!(r.sentiment_label, SentimentLabel::from_score(r.sentiment_score), "{t}");
            assert_eq!(
                r.engagement_prediction,
                EngagementLevel::from_score(r.viral_score)
            );
            assert!(!r.topics.is_empty());
        }
    }
}

#[test]
fn wordlist_backend_counts_fixed_sets() {
    let a = SentimentAnalyzer::new(SentimentBackendKind::WordList);
    let (s, label) = a.analyze("great launch but a scam and a disaster");
    assert!((s - (-1.0 / 3.0)).abs() < 1e-9);
    assert_eq!(label, SentimentLabel::Negative);
    assert_eq!(a.analyze("hello world"), (0.0, SentimentLabel::Neutral));
}

#[test]
fn batch_and_single_agree() {
    let pipeline = EnrichmentPipeline::default();
    let items: Vec<BatchItem> = serde_json::from_str(
        r#"[
            {"title": "Bitcoin hits new high", "score": 900, "num_comments": 120, "age_hours": 2.0},
            {"title": "Why is my Rust build slow?", "text": "cargo takes forever", "score": 12},
            {"title": "Senate passes climate policy", "score": 3000, "num_comments": 2500, "age_hours": 0.5}
        ]"#,
    )
    .unwrap();
    let batch = pipeline.analyze_batch(&items);
    for (it, res) in items.iter().zip(batch) {
        let single = pipeline
            .analyze(&it.title, &it.body, it.score, it.num_comments, it.age_hours)
            .unwrap();
        assert_eq!(res.unwrap(), single);
    }
}

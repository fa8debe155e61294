// tests/jsonl_pipeline.rs
//
// The binary's wiring in miniature: JSON lines in, enriched JSON lines out,
// with the gazetteer entity backend from `config/entities.json`.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::io::BufReader;

use social_pulse::config::NlpConfig;
use social_pulse::store::{MemoryStore, PostStore};
use social_pulse::stream::processor::ProcessorConfig;
use social_pulse::stream::{JsonLinesInbound, JsonLinesPublisher, StreamProcessor};

#[tokio::test]
async fn fixture_file_round_trip() {
    let input = tokio::fs::File::open("tests/fixtures/posts.jsonl").await.unwrap();
    let tmp = tempfile::tempdir().unwrap();
    let out_path = tmp.path().join("out.jsonl");
    let output = tokio::fs::File::create(&out_path).await.unwrap();

    let nlp = NlpConfig {
        entity_gazetteer: Some(Path::new("config/entities.json").to_path_buf()),
        ..NlpConfig::default()
    };
    let store = Arc::new(MemoryStore::new());

    let mut processor = StreamProcessor::new(
        Arc::new(nlp.build_pipeline().unwrap()),
        Box::new(JsonLinesInbound::new(BufReader::new(input), true)),
        Arc::new(JsonLinesPublisher::new(output)),
        store.clone(),
        ProcessorConfig {
            poll_timeout: Duration::from_millis(200),
            ..ProcessorConfig::default()
        },
    );
    processor
        .run(tokio_util::sync::CancellationToken::new())
        .await
        .unwrap();

    let m = processor.metrics().snapshot();
    assert_eq!(m.processed, 3);
    assert_eq!(m.errors, 2);
    assert_eq!(store.count().await.unwrap(), 3);

    let text = tokio::fs::read_to_string(&out_path).await.unwrap();
    let lines: Vec<Value> = text
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    let records: Vec<&Value> = lines
        .iter()
        .filter(|v| v["_topic"] == "social.processed.posts")
        .collect();
    assert_eq!(records.len(), 3);

    let gpt = records[0];
    assert_eq!(gpt["external_id"], "reddit_1a2b3c");
    assert_eq!(gpt["sentiment_label"], "positive");
    assert!(gpt["topics"].as_array().unwrap().contains(&Value::from("AI/ML")));
    let entity_texts: Vec<&str> = gpt["entities"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|e| e["text"].as_str())
        .collect();
    assert!(entity_texts.contains(&"OpenAI"), "{entity_texts:?}");
    assert!(entity_texts.contains(&"GPT-5"), "{entity_texts:?}");

    let hn = records[1];
    assert_eq!(hn["external_id"], "hackernews_41234567");
    assert_eq!(hn["story_type"], "show");
    assert!(hn["topics"].as_array().unwrap().contains(&Value::from("Programming")));

    let crash = records[2];
    assert_eq!(crash["sentiment_label"], "negative");
    assert!(crash["topics"].as_array().unwrap().contains(&Value::from("Crypto")));

    // every alert line is typed and enveloped
    for alert in lines.iter().filter(|v| v["_topic"] == "social.alerts") {
        let kind = alert["type"].as_str().unwrap();
        assert!(kind == "viral" || kind == "sentiment_spike");
        assert!(alert["_published_at"].is_string());
    }
}

#[tokio::test]
async fn undecodable_line_is_a_malformed_record() {
    let input: &'static [u8] =
        b"{\"id\":\"x1\",\"title\":\"caf\xff\"}\n{\"id\":\"x2\",\"title\":\"fine\"}\n";
    let (publisher, _rx) = social_pulse::stream::ChannelPublisher::channel();
    let poll_timeout = Duration::from_secs(2);

    let mut processor = StreamProcessor::new(
        Arc::new(social_pulse::nlp::EnrichmentPipeline::default()),
        Box::new(JsonLinesInbound::new(BufReader::new(input), true)),
        Arc::new(publisher),
        Arc::new(MemoryStore::new()),
        ProcessorConfig {
            poll_timeout,
            ..ProcessorConfig::default()
        },
    );
    let started = std::time::Instant::now();
    processor
        .run(tokio_util::sync::CancellationToken::new())
        .await
        .unwrap();

    let m = processor.metrics().snapshot();
    assert_eq!(m.processed, 1);
    assert_eq!(m.errors, 1);
    assert_eq!(m.transport_errors, 0);
    // no transient back-off was taken
    assert!(started.elapsed() < poll_timeout);
}

// tests/processor_stream.rs
//
// End-to-end runs of the stream processor over in-process channels.
//
// Covered:
// - malformed payloads are counted and skipped
// - duplicate delivery stores one entity
// - enriched records and alerts land on their topics with envelope fields
// - closing the inbound ends the loop cleanly in `Stopped`
// - cooperative stop while idle

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use social_pulse::nlp::EnrichmentPipeline;
use social_pulse::store::{MemoryStore, PostStore};
use social_pulse::stream::processor::ProcessorConfig;
use social_pulse::stream::transport::Published;
use social_pulse::stream::{
    ChannelInbound, ChannelPublisher, ProcessorState, StreamProcessor, ALERTS_TOPIC,
    PROCESSED_POSTS_TOPIC,
};

fn cfg() -> ProcessorConfig {
    ProcessorConfig {
        poll_timeout: Duration::from_millis(20),
        progress_every: 2,
        ..ProcessorConfig::default()
    }
}

fn viral_post() -> Value {
    json!({
        "source": "reddit",
        "id": "v1",
        "title": "BREAKING: How the new secret AI launch you won't believe changed everything?",
        "body": "free now best top",
        "score": 5000,
        "num_comments": 3000,
        "url": "https://example.com/v1"
    })
}

fn quiet_post(id: &str) -> Value {
    json!({
        "source": "hackernews",
        "id": id,
        "title": "Notes on compiler internals",
        "score": 3,
        "num_comments": 0,
        "created_utc": "2020-01-01T00:00:00Z"
    })
}

fn drain(rx: &mut tokio::sync::mpsc::UnboundedReceiver<Published>) -> Vec<Published> {
    let mut out = Vec::new();
    while let Ok(p) = rx.try_recv() {
        out.push(p);
    }
    out
}

#[tokio::test]
async fn full_run_over_channels() {
    let (tx, inbound) = ChannelInbound::channel(16);
    let (publisher, mut out_rx) = ChannelPublisher::channel();
    let store = Arc::new(MemoryStore::new());

    let handle = StreamProcessor::new(
        Arc::new(EnrichmentPipeline::default()),
        Box::new(inbound),
        Arc::new(publisher),
        store.clone(),
        cfg(),
    )
    .start();

    let payloads: Vec<Vec<u8>> = vec![
        b"not json at all".to_vec(),
        serde_json::to_vec(&json!({"title": "no id here"})).unwrap(),
        serde_json::to_vec(&quiet_post("q1")).unwrap(),
        serde_json::to_vec(&quiet_post("q1")).unwrap(),
        serde_json::to_vec(&viral_post()).unwrap(),
    ];
    for p in payloads {
        tx.send(p).await.unwrap();
    }
    drop(tx);

    let metrics = handle.metrics();
    let mut state = handle.watch_state();
    handle.join().await.unwrap();
    assert_eq!(*state.borrow_and_update(), ProcessorState::Stopped);

    let m = metrics.snapshot();
    assert_eq!(m.errors, 2);
    assert_eq!(m.processed, 3);
    assert_eq!(m.duplicates_skipped, 1);
    assert_eq!(m.storage_errors, 0);
    assert_eq!(m.publish_errors, 0);
    assert!(m.avg_processing_secs >= 0.0);
    assert!(m.last_processed.is_some());
    assert_eq!(store.count().await.unwrap(), 2);

    let published = drain(&mut out_rx);
    let processed: Vec<&Published> = published
        .iter()
        .filter(|p| p.topic == PROCESSED_POSTS_TOPIC)
        .collect();
    let alerts: Vec<&Published> = published.iter().filter(|p| p.topic == ALERTS_TOPIC).collect();

    assert_eq!(processed.len(), 3);
    assert_eq!(processed[0].value["external_id"], "hackernews_q1");
    assert_eq!(processed[0].value["_topic"], PROCESSED_POSTS_TOPIC);
    assert!(processed[0].value["_published_at"].is_string());

    let viral = processed[2];
    assert_eq!(viral.key.as_deref(), Some("reddit_v1"));
    assert_eq!(viral.value["viral_score"], 1.0);
    assert_eq!(viral.value["engagement_prediction"], "high");

    assert!(!alerts.is_empty());
    assert_eq!(alerts.len() as u64, m.alerts_emitted);
    assert_eq!(alerts[0].value["type"], "viral");
    assert_eq!(alerts[0].value["url"], "https://example.com/v1");
    assert_eq!(alerts[0].value["_topic"], ALERTS_TOPIC);

    // quiet posts raise nothing
    assert!(alerts.iter().all(|a| a.key.as_deref() == Some("reddit_v1")));
}

#[tokio::test]
async fn stop_while_idle_is_prompt() {
    let (_tx, inbound) = ChannelInbound::channel(1);
    let (publisher, _rx) = ChannelPublisher::channel();
    let handle = StreamProcessor::new(
        Arc::new(EnrichmentPipeline::default()),
        Box::new(inbound),
        Arc::new(publisher),
        Arc::new(MemoryStore::new()),
        ProcessorConfig {
            poll_timeout: Duration::from_secs(30),
            ..ProcessorConfig::default()
        },
    )
    .start();

    handle
        .watch_state()
        .wait_for(|s| *s == ProcessorState::Running)
        .await
        .unwrap();
    handle.stop();

    tokio::time::timeout(Duration::from_secs(5), handle.join())
        .await
        .expect("processor should stop well before the poll timeout")
        .unwrap();
}

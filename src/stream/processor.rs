// src/stream/processor.rs
//! The long-running consume → enrich → store → publish → alert loop.
//!
//! One record is fully handled before the next poll. Scale out by running
//! more processors on partitioned input, not by parallelizing this loop.

use chrono::{DateTime, Utc};
use metrics::{counter, gauge, histogram};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::transport::{InboundMessage, InboundStream, Publisher};
use super::{
    ensure_metrics_described, MetricsRecorder, PipelineMetrics, ProcessorState, ALERTS_TOPIC,
    PROCESSED_POSTS_TOPIC, RAW_POSTS_TOPIC,
};
use crate::alerts::{AlertEvent, AlertPolicy};
use crate::error::{PipelineError, TransportError};
use crate::nlp::EnrichmentPipeline;
use crate::record::{EnrichedRecord, RawContentRecord};
use crate::store::PostStore;

pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_secs(1);
pub const DEFAULT_PROGRESS_EVERY: u64 = 100;

#[derive(Debug, Clone)]
pub struct ProcessorConfig {
    pub poll_timeout: Duration,
    pub inbound_topic: String,
    pub processed_topic: String,
    pub alerts_topic: String,
    /// Log a progress line every N processed records (0 disables).
    pub progress_every: u64,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            poll_timeout: DEFAULT_POLL_TIMEOUT,
            inbound_topic: RAW_POSTS_TOPIC.to_string(),
            processed_topic: PROCESSED_POSTS_TOPIC.to_string(),
            alerts_topic: ALERTS_TOPIC.to_string(),
            progress_every: DEFAULT_PROGRESS_EVERY,
        }
    }
}

/// What became of one inbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Processed,
    Malformed,
    EnrichmentFailed,
}

/// Everything the per-record path needs. Kept apart from the inbound stream
/// so the loop can borrow both at once.
struct RecordHandler {
    pipeline: Arc<EnrichmentPipeline>,
    store: Arc<dyn PostStore>,
    publisher: Arc<dyn Publisher>,
    alert_sinks: Vec<Arc<dyn Publisher>>,
    policy: AlertPolicy,
    cfg: ProcessorConfig,
    metrics: MetricsRecorder,
}

pub struct StreamProcessor {
    inbound: Box<dyn InboundStream>,
    handler: RecordHandler,
    state: watch::Sender<ProcessorState>,
}

impl StreamProcessor {
    pub fn new(
        pipeline: Arc<EnrichmentPipeline>,
        inbound: Box<dyn InboundStream>,
        publisher: Arc<dyn Publisher>,
        store: Arc<dyn PostStore>,
        cfg: ProcessorConfig,
    ) -> Self {
        let (state, _) = watch::channel(ProcessorState::Disconnected);
        Self {
            inbound,
            handler: RecordHandler {
                pipeline,
                store,
                publisher,
                alert_sinks: Vec::new(),
                policy: AlertPolicy,
                cfg,
                metrics: MetricsRecorder::new(),
            },
            state,
        }
    }

    /// Extra destination for alerts (e.g. a chat webhook), besides the alert topic.
    pub fn with_alert_sink(mut self, sink: Arc<dyn Publisher>) -> Self {
        self.handler.alert_sinks.push(sink);
        self
    }

    pub fn metrics(&self) -> MetricsRecorder {
        self.handler.metrics.clone()
    }

    pub fn state(&self) -> ProcessorState {
        *self.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<ProcessorState> {
        self.state.subscribe()
    }

    /// `Disconnected → Connected`: subscribe to the inbound topic.
    pub async fn connect(&mut self) -> Result<(), PipelineError> {
        let current = *self.state.borrow();
        if current != ProcessorState::Disconnected {
            return Err(PipelineError::InvalidState(current, "disconnected"));
        }
        self.inbound.subscribe(&self.handler.cfg.inbound_topic).await?;
        self.state.send_replace(ProcessorState::Connected);
        info!(
            target: "stream",
            transport = self.inbound.name(),
            topic = %self.handler.cfg.inbound_topic,
            "stream processor connected"
        );
        Ok(())
    }

    /// Consume until `cancel` fires, the inbound closes, or a fatal transport
    /// error. Connects first when still disconnected. The inbound connection is
    /// always closed before returning and the processor ends `Stopped`.
    pub async fn run(&mut self, cancel: CancellationToken) -> Result<(), PipelineError> {
        ensure_metrics_described();

        match *self.state.borrow() {
            ProcessorState::Disconnected | ProcessorState::Connected => {}
            other => return Err(PipelineError::InvalidState(other, "disconnected or connected")),
        }
        if *self.state.borrow() == ProcessorState::Disconnected {
            if let Err(e) = self.connect().await {
                self.state.send_replace(ProcessorState::Stopped);
                return Err(e);
            }
        }
        self.state.send_replace(ProcessorState::Running);

        let timeout = self.handler.cfg.poll_timeout;
        let result = loop {
            let polled = tokio::select! {
                biased;
                _ = cancel.cancelled() => break Ok(()),
                polled = self.inbound.poll(timeout) => polled,
            };

            match polled {
                Ok(None) => continue,
                Ok(Some(msg)) => {
                    self.handler.handle_message(&msg).await;
                    if let Err(e) = self.inbound.commit(msg.offset).await {
                        warn!(target: "stream", offset = msg.offset, error = %e, "offset commit failed");
                    }
                }
                Err(TransportError::Transient(reason)) => {
                    self.handler.metrics.update(|m| m.transport_errors += 1);
                    counter!("pulse_transport_errors_total").increment(1);
                    warn!(target: "stream", %reason, "transient transport error; backing off");
                    tokio::select! {
                        _ = cancel.cancelled() => break Ok(()),
                        _ = tokio::time::sleep(timeout) => {}
                    }
                }
                Err(TransportError::Closed) => {
                    info!(target: "stream", "inbound stream closed");
                    break Ok(());
                }
                Err(e @ TransportError::Fatal(_)) => {
                    error!(target: "stream", error = %e, "fatal transport error; stopping");
                    break Err(PipelineError::from(e));
                }
            }
        };

        if let Err(e) = self.inbound.close().await {
            warn!(target: "stream", error = %e, "closing inbound failed");
        }
        self.state.send_replace(ProcessorState::Stopped);

        let m = self.handler.metrics.snapshot();
        info!(
            target: "stream",
            processed = m.processed,
            errors = m.errors,
            storage_errors = m.storage_errors,
            publish_errors = m.publish_errors,
            transport_errors = m.transport_errors,
            duplicates = m.duplicates_skipped,
            alerts = m.alerts_emitted,
            avg_ms = m.avg_processing_secs * 1000.0,
            "stream processor stopped"
        );
        result
    }

    /// Spawn [`run`](Self::run) on the runtime and hand back its controls.
    pub fn start(mut self) -> ProcessorHandle {
        let cancel = CancellationToken::new();
        let metrics = self.metrics();
        let state = self.watch_state();
        let token = cancel.clone();
        let task = tokio::spawn(async move { self.run(token).await });
        ProcessorHandle {
            cancel,
            metrics,
            state,
            task,
        }
    }
}

impl RecordHandler {
    async fn handle_message(&self, msg: &InboundMessage) -> Outcome {
        let started = Instant::now();

        let raw = match RawContentRecord::from_slice(&msg.payload) {
            Ok(raw) => raw,
            Err(e) => {
                self.count_error();
                warn!(target: "stream", offset = msg.offset, error = %e, "skipping malformed record");
                return Outcome::Malformed;
            }
        };

        let now = Utc::now();
        let enriched = match self.enrich(&raw, now) {
            Ok(r) => r,
            Err(e) => {
                self.count_error();
                warn!(
                    target: "stream",
                    external_id = %raw.external_id(),
                    error = %e,
                    "enrichment failed; record dropped"
                );
                return Outcome::EnrichmentFailed;
            }
        };

        self.store(&enriched).await;
        self.publish(&enriched).await;
        let alerts = self.policy.evaluate(&enriched, Utc::now());
        for alert in &alerts {
            self.emit_alert(&enriched.external_id, alert).await;
        }

        let elapsed = started.elapsed();
        let done_at = Utc::now();
        self.metrics
            .update(|m| m.record_processed(elapsed.as_secs_f64(), done_at));
        counter!("pulse_processed_total").increment(1);
        histogram!("pulse_processing_ms").record(elapsed.as_secs_f64() * 1000.0);
        gauge!("pulse_last_processed_ts").set(done_at.timestamp() as f64);

        debug!(
            target: "stream",
            external_id = %enriched.external_id,
            sentiment = enriched.sentiment_score,
            viral = enriched.viral_score,
            alerts = alerts.len(),
            "record processed"
        );
        self.log_progress();
        Outcome::Processed
    }

    fn enrich(&self, raw: &RawContentRecord, now: DateTime<Utc>) -> Result<EnrichedRecord, PipelineError> {
        let nlp = self.pipeline.analyze(
            &raw.title,
            &raw.body,
            raw.score,
            raw.num_comments,
            raw.age_hours(now),
        )?;

        Ok(EnrichedRecord {
            external_id: raw.external_id(),
            source: raw.source.clone(),
            title: raw.title.clone(),
            body: raw.body.clone(),
            url: raw.url.clone().unwrap_or_default(),
            author: raw.author.clone(),
            score: raw.score,
            num_comments: raw.num_comments,
            upvote_ratio: raw.upvote_ratio,
            subreddit: raw.subreddit.clone(),
            story_type: raw.story_type.clone(),
            created_at: raw.created_at(now),
            scraped_at: now,
            sentiment_score: nlp.sentiment_score,
            sentiment_label: nlp.sentiment_label,
            topics: nlp.topics,
            keywords: nlp.keywords,
            entities: nlp.entities,
            viral_score: nlp.viral_score,
            engagement_prediction: nlp.engagement_prediction,
        })
    }

    async fn store(&self, record: &EnrichedRecord) {
        match self.store.upsert(record).await {
            Ok(true) => {}
            Ok(false) => {
                self.metrics.update(|m| m.duplicates_skipped += 1);
                counter!("pulse_duplicates_total").increment(1);
                debug!(target: "stream", external_id = %record.external_id, "already stored");
            }
            Err(e) => {
                self.metrics.update(|m| m.storage_errors += 1);
                counter!("pulse_storage_errors_total").increment(1);
                warn!(
                    target: "stream",
                    external_id = %record.external_id,
                    store = self.store.name(),
                    error = %e,
                    "storage write failed; continuing with publish"
                );
            }
        }
    }

    async fn publish(&self, record: &EnrichedRecord) {
        let value = match serde_json::to_value(record) {
            Ok(v) => v,
            Err(e) => {
                self.count_publish_error(&record.external_id, &e.to_string());
                return;
            }
        };
        if let Err(e) = self
            .publisher
            .publish(&self.cfg.processed_topic, Some(&record.external_id), &value)
            .await
        {
            self.count_publish_error(&record.external_id, &e.to_string());
        }
    }

    async fn emit_alert(&self, external_id: &str, alert: &AlertEvent) {
        let value = match serde_json::to_value(alert) {
            Ok(v) => v,
            Err(e) => {
                self.count_publish_error(external_id, &e.to_string());
                return;
            }
        };

        self.metrics.update(|m| m.alerts_emitted += 1);
        counter!("pulse_alerts_total", "type" => alert.kind()).increment(1);
        info!(target: "stream", external_id, kind = alert.kind(), "alert triggered");

        if let Err(e) = self
            .publisher
            .publish(&self.cfg.alerts_topic, Some(external_id), &value)
            .await
        {
            self.count_publish_error(external_id, &e.to_string());
        }
        for sink in &self.alert_sinks {
            if let Err(e) = sink.publish(&self.cfg.alerts_topic, Some(external_id), &value).await {
                warn!(target: "stream", sink = sink.name(), error = %e, "alert sink failed");
                self.count_publish_error(external_id, &e.to_string());
            }
        }
    }

    fn count_error(&self) {
        self.metrics.update(|m| m.errors += 1);
        counter!("pulse_errors_total").increment(1);
    }

    fn count_publish_error(&self, external_id: &str, reason: &str) {
        self.metrics.update(|m| m.publish_errors += 1);
        counter!("pulse_publish_errors_total").increment(1);
        warn!(target: "stream", external_id, %reason, "publish failed");
    }

    fn log_progress(&self) {
        let every = self.cfg.progress_every;
        if every == 0 {
            return;
        }
        let m = self.metrics.snapshot();
        if m.processed % every == 0 {
            info!(
                target: "stream",
                processed = m.processed,
                errors = m.errors,
                avg_ms = m.avg_processing_secs * 1000.0,
                "processing progress"
            );
        }
    }
}

/// Controls of a spawned processor.
pub struct ProcessorHandle {
    cancel: CancellationToken,
    metrics: MetricsRecorder,
    state: watch::Receiver<ProcessorState>,
    task: JoinHandle<Result<(), PipelineError>>,
}

impl ProcessorHandle {
    /// Request a cooperative stop; observed at the next poll boundary.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn metrics_snapshot(&self) -> PipelineMetrics {
        self.metrics.snapshot()
    }

    pub fn metrics(&self) -> MetricsRecorder {
        self.metrics.clone()
    }

    pub fn state(&self) -> ProcessorState {
        *self.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<ProcessorState> {
        self.state.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the loop to return.
    pub async fn join(self) -> Result<(), PipelineError> {
        self.task
            .await
            .map_err(|e| PipelineError::Task(e.to_string()))?
    }
}

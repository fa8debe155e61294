// src/stream/mod.rs
//! Stream consumption: transports, the consume loop and its owned metrics.

pub mod processor;
pub mod transport;

use chrono::{DateTime, Utc};
use metrics::{describe_counter, describe_gauge, describe_histogram};
use once_cell::sync::OnceCell;
use serde::Serialize;
use std::sync::{Arc, Mutex};

pub use processor::{ProcessorHandle, StreamProcessor};
pub use transport::{
    ChannelInbound, ChannelPublisher, InboundMessage, InboundStream, JsonLinesInbound,
    JsonLinesPublisher, Publisher,
};

pub const RAW_POSTS_TOPIC: &str = "social.raw.posts";
pub const PROCESSED_POSTS_TOPIC: &str = "social.processed.posts";
pub const ALERTS_TOPIC: &str = "social.alerts";

/// Lifecycle of one processor instance. `Stopped` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessorState {
    Disconnected,
    Connected,
    Running,
    Stopped,
}

/// Counters owned by one processor instance. Reset only by a restart.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineMetrics {
    pub processed: u64,
    pub errors: u64,
    /// Running mean of per-record handling time, in seconds.
    pub avg_processing_secs: f64,
    pub last_processed: Option<DateTime<Utc>>,
    pub storage_errors: u64,
    pub publish_errors: u64,
    pub transport_errors: u64,
    pub duplicates_skipped: u64,
    pub alerts_emitted: u64,
    pub started_at: DateTime<Utc>,
}

impl PipelineMetrics {
    pub fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            processed: 0,
            errors: 0,
            avg_processing_secs: 0.0,
            last_processed: None,
            storage_errors: 0,
            publish_errors: 0,
            transport_errors: 0,
            duplicates_skipped: 0,
            alerts_emitted: 0,
            started_at,
        }
    }

    /// Count one successfully handled record and fold its latency into the mean.
    pub fn record_processed(&mut self, elapsed_secs: f64, at: DateTime<Utc>) {
        self.processed += 1;
        let n = self.processed as f64;
        self.avg_processing_secs = (self.avg_processing_secs * (n - 1.0) + elapsed_secs) / n;
        self.last_processed = Some(at);
    }
}

impl Default for PipelineMetrics {
    fn default() -> Self {
        Self::new(Utc::now())
    }
}

/// Shared handle on a processor's metrics, readable while the loop runs.
#[derive(Debug, Clone, Default)]
pub struct MetricsRecorder {
    inner: Arc<Mutex<PipelineMetrics>>,
}

impl MetricsRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> PipelineMetrics {
        match self.inner.lock() {
            Ok(m) => m.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn update<F: FnOnce(&mut PipelineMetrics)>(&self, f: F) {
        let mut guard = match self.inner.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut guard);
    }
}

/// One-time registration of the processor series (so they show up on /metrics).
pub(crate) fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("pulse_processed_total", "Records enriched and handed downstream.");
        describe_counter!(
            "pulse_errors_total",
            "Records dropped as malformed or failing enrichment."
        );
        describe_counter!(
            "pulse_storage_errors_total",
            "Failed store writes (record still published)."
        );
        describe_counter!(
            "pulse_publish_errors_total",
            "Failed publishes of enriched records or alerts."
        );
        describe_counter!(
            "pulse_transport_errors_total",
            "Transient errors reported by the inbound transport."
        );
        describe_counter!("pulse_alerts_total", "Alerts emitted, by type.");
        describe_counter!(
            "pulse_duplicates_total",
            "Records whose external id was already stored."
        );
        describe_histogram!("pulse_processing_ms", "Per-record handling time in milliseconds.");
        describe_gauge!(
            "pulse_last_processed_ts",
            "Unix ts of the last successfully processed record."
        );
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn running_mean_matches_arithmetic_mean() {
        let mut m = PipelineMetrics::default();
        let now = Utc::now();
        for secs in [0.1, 0.3, 0.2, 0.4] {
            m.record_processed(secs, now);
        }
        assert_eq!(m.processed, 4);
        assert!((m.avg_processing_secs - 0.25).abs() < 1e-12);
        assert_eq!(m.last_processed, Some(now));
    }

    #[test]
    fn recorder_shares_state_across_clones() {
        let r = MetricsRecorder::new();
        let r2 = r.clone();
        r.update(|m| m.errors += 2);
        assert_eq!(r2.snapshot().errors, 2);
    }
}

// src/alerts.rs
//! Stateless alert predicate over enriched records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::record::{EnrichedRecord, SentimentLabel};

pub const VIRAL_ALERT_THRESHOLD: f64 = 0.8;
pub const SENTIMENT_SPIKE_THRESHOLD: f64 = 0.8;
pub const ALERT_TITLE_MAX_CHARS: usize = 100;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AlertEvent {
    Viral {
        title: String,
        viral_score: f64,
        score: i64,
        source: String,
        url: String,
        timestamp: DateTime<Utc>,
    },
    SentimentSpike {
        title: String,
        sentiment: f64,
        label: SentimentLabel,
        source: String,
        timestamp: DateTime<Utc>,
    },
}

impl AlertEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            AlertEvent::Viral { .. } => "viral",
            AlertEvent::SentimentSpike { .. } => "sentiment_spike",
        }
    }

    pub fn title(&self) -> &str {
        match self {
            AlertEvent::Viral { title, .. } | AlertEvent::SentimentSpike { title, .. } => title,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AlertPolicy;

impl AlertPolicy {
    /// Zero, one or two alerts. The two conditions are independent.
    pub fn evaluate(&self, record: &EnrichedRecord, now: DateTime<Utc>) -> Vec<AlertEvent> {
        let mut out = Vec::with_capacity(2);
        if record.viral_score >= VIRAL_ALERT_THRESHOLD {
            out.push(AlertEvent::Viral {
                title: truncate_title(&record.title),
                viral_score: record.viral_score,
                score: record.score,
                source: record.source.clone(),
                url: record.url.clone(),
                timestamp: now,
            });
        }
        if record.sentiment_score.abs() >= SENTIMENT_SPIKE_THRESHOLD {
            out.push(AlertEvent::SentimentSpike {
                title: truncate_title(&record.title),
                sentiment: record.sentiment_score,
                label: record.sentiment_label,
                source: record.source.clone(),
                timestamp: now,
            });
        }
        out
    }
}

fn truncate_title(title: &str) -> String {
    title.chars().take(ALERT_TITLE_MAX_CHARS).collect()
}

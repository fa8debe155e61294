//! Data model shared by the pipeline: raw posts as they arrive on the inbound
//! stream and the enriched records that leave it.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::MalformedRecordError;

/// Floor applied to the age of a post before it reaches the viral predictor.
pub const MIN_AGE_HOURS: f64 = 0.1;

/// Label thresholds for the compound sentiment score.
pub const POSITIVE_THRESHOLD: f64 = 0.05;
pub const NEGATIVE_THRESHOLD: f64 = -0.05;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SentimentLabel {
    Negative,
    Neutral,
    Positive,
}

impl SentimentLabel {
    /// Bucket a compound score. Same thresholds for every scoring backend.
    pub fn from_score(score: f64) -> Self {
        if score >= POSITIVE_THRESHOLD {
            SentimentLabel::Positive
        } else if score <= NEGATIVE_THRESHOLD {
            SentimentLabel::Negative
        } else {
            SentimentLabel::Neutral
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SentimentLabel::Negative => "negative",
            SentimentLabel::Neutral => "neutral",
            SentimentLabel::Positive => "positive",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngagementLevel {
    Low,
    Medium,
    High,
}

impl EngagementLevel {
    pub fn from_score(viral_score: f64) -> Self {
        if viral_score >= 0.7 {
            EngagementLevel::High
        } else if viral_score >= 0.4 {
            EngagementLevel::Medium
        } else {
            EngagementLevel::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EngagementLevel::Low => "low",
            EngagementLevel::Medium => "medium",
            EngagementLevel::High => "high",
        }
    }
}

/// Accepted named-entity categories. Serialized with the conventional
/// OntoNotes labels so stored rows stay compatible with other consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    #[serde(rename = "ORG")]
    Organization,
    #[serde(rename = "PERSON")]
    Person,
    #[serde(rename = "GPE")]
    Place,
    #[serde(rename = "PRODUCT")]
    Product,
}

impl EntityKind {
    /// Map a backend label onto an accepted kind; anything else is rejected.
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_uppercase().as_str() {
            "ORG" | "ORGANIZATION" => Some(EntityKind::Organization),
            "PERSON" | "PER" => Some(EntityKind::Person),
            "GPE" | "PLACE" | "LOC" | "LOCATION" => Some(EntityKind::Place),
            "PRODUCT" => Some(EntityKind::Product),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    pub text: String,
    #[serde(rename = "type")]
    pub kind: EntityKind,
}

/// One unprocessed post/story as produced by the upstream scrapers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawContentRecord {
    #[serde(default = "default_source")]
    pub source: String,
    #[serde(alias = "external_id", deserialize_with = "string_or_number")]
    pub id: String,
    pub title: String,
    #[serde(default, alias = "text")]
    pub body: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub score: i64,
    #[serde(default)]
    pub num_comments: i64,
    #[serde(default)]
    pub upvote_ratio: Option<f64>,
    #[serde(default)]
    pub created_utc: Option<Value>,
    #[serde(default)]
    pub subreddit: Option<String>,
    #[serde(default)]
    pub story_type: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

fn default_source() -> String {
    "unknown".to_string()
}

fn string_or_number<'de, D>(de: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(de)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "id must be a string or number, got {other}"
        ))),
    }
}

impl RawContentRecord {
    /// Decode an inbound payload. Anything that is not a JSON object with an
    /// id and a title is rejected as malformed.
    pub fn from_slice(payload: &[u8]) -> Result<Self, MalformedRecordError> {
        let value: Value = serde_json::from_slice(payload)
            .map_err(|e| MalformedRecordError::Undecodable(e.to_string()))?;
        Self::from_value(value)
    }

    pub fn from_value(value: Value) -> Result<Self, MalformedRecordError> {
        if !value.is_object() {
            return Err(MalformedRecordError::NotAnObject);
        }
        let rec: RawContentRecord = serde_json::from_value(value)
            .map_err(|e| MalformedRecordError::MissingField(e.to_string()))?;
        if rec.id.trim().is_empty() {
            return Err(MalformedRecordError::MissingField("id is empty".into()));
        }
        Ok(rec)
    }

    /// Stable storage key: `"{source}_{id}"`.
    pub fn external_id(&self) -> String {
        format!("{}_{}", self.source, self.id)
    }

    /// Creation time. Unparsable or absent timestamps fall back to `now`.
    pub fn created_at(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        self.created_utc
            .as_ref()
            .and_then(parse_timestamp)
            .unwrap_or(now)
    }

    /// Age in hours, floored at [`MIN_AGE_HOURS`].
    pub fn age_hours(&self, now: DateTime<Utc>) -> f64 {
        let created = self.created_at(now);
        let secs = (now - created).num_milliseconds() as f64 / 1000.0;
        (secs / 3600.0).max(MIN_AGE_HOURS)
    }
}

fn parse_timestamp(v: &Value) -> Option<DateTime<Utc>> {
    match v {
        Value::Number(n) => {
            let secs = n.as_f64()?;
            if !secs.is_finite() {
                return None;
            }
            let whole = secs.trunc() as i64;
            let nanos = ((secs - secs.trunc()) * 1e9) as u32;
            Utc.timestamp_opt(whole, nanos).single()
        }
        Value::String(s) => {
            let s = s.trim();
            if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
                return Some(dt.with_timezone(&Utc));
            }
            // Naive ISO 8601 (producer writes `datetime.isoformat()` without offset).
            ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
                .map(|naive| Utc.from_utc_datetime(&naive))
        }
        _ => None,
    }
}

/// A raw record augmented with every enrichment signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedRecord {
    pub external_id: String,
    pub source: String,
    pub title: String,
    pub body: String,
    pub url: String,
    pub author: String,
    pub score: i64,
    pub num_comments: i64,
    pub upvote_ratio: Option<f64>,
    pub subreddit: Option<String>,
    pub story_type: Option<String>,
    pub created_at: DateTime<Utc>,
    pub scraped_at: DateTime<Utc>,
    pub sentiment_score: f64,
    pub sentiment_label: SentimentLabel,
    pub topics: Vec<String>,
    pub keywords: Vec<String>,
    pub entities: Vec<Entity>,
    pub viral_score: f64,
    pub engagement_prediction: EngagementLevel,
}

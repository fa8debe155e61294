// src/nlp/mod.rs
//! Enrichment pipeline entry: sentiment, topics, keywords, entities and viral
//! potential for one post.
//!
//! The pipeline holds only read-only tables and is `Send + Sync`; share it
//! behind an `Arc` and call it from as many tasks as needed.

pub mod entities;
pub mod sentiment;
pub mod topics;
pub mod viral;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::panic::{catch_unwind, AssertUnwindSafe};

use crate::error::EnrichmentError;
use crate::record::{EngagementLevel, Entity, SentimentLabel};

pub use entities::{EntityBackend, EntityExtractor, GazetteerBackend, NoopBackend};
pub use sentiment::{SentimentAnalyzer, SentimentBackendKind};
pub use topics::{TopicExtractor, GENERAL_TOPIC};
pub use viral::{HeuristicViralPredictor, ViralFeatures, ViralInput, ViralModel};

/// Output of one analysis call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NlpResult {
    pub sentiment_score: f64,
    pub sentiment_label: SentimentLabel,
    pub topics: Vec<String>,
    pub entities: Vec<Entity>,
    pub keywords: Vec<String>,
    pub viral_score: f64,
    pub engagement_prediction: EngagementLevel,
}

/// One item of a batch call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchItem {
    #[serde(default)]
    pub title: String,
    #[serde(default, alias = "text")]
    pub body: String,
    #[serde(default)]
    pub score: i64,
    #[serde(default)]
    pub num_comments: i64,
    #[serde(default = "default_age_hours")]
    pub age_hours: f64,
}

fn default_age_hours() -> f64 {
    1.0
}

pub struct EnrichmentPipeline {
    sentiment: SentimentAnalyzer,
    topics: TopicExtractor,
    entities: EntityExtractor,
    viral: Box<dyn ViralModel>,
}

impl std::fmt::Debug for EnrichmentPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnrichmentPipeline")
            .field("sentiment", &self.sentiment)
            .field("topics", &self.topics.topics().len())
            .field("entities", &self.entities)
            .field("viral", &self.viral.version())
            .finish()
    }
}

impl Default for EnrichmentPipeline {
    fn default() -> Self {
        Self::new(
            SentimentAnalyzer::default(),
            TopicExtractor::default(),
            EntityExtractor::disabled(),
        )
    }
}

impl EnrichmentPipeline {
    pub fn new(
        sentiment: SentimentAnalyzer,
        topics: TopicExtractor,
        entities: EntityExtractor,
    ) -> Self {
        Self {
            sentiment,
            topics,
            entities,
            viral: Box::new(HeuristicViralPredictor),
        }
    }

    /// Swap the viral model (e.g. a learned one) behind the same interface.
    pub fn with_viral_model(mut self, model: Box<dyn ViralModel>) -> Self {
        self.viral = model;
        self
    }

    pub fn viral_model_version(&self) -> &'static str {
        self.viral.version()
    }

    /// Full analysis of one post. Sentiment, topics, keywords and entities
    /// run on `"{title} {body}"`; the viral model sees title and body apart.
    ///
    /// Panics inside an analyzer are caught and reported as
    /// [`EnrichmentError::Panicked`] so a single bad post cannot take down a
    /// consumer loop.
    pub fn analyze(
        &self,
        title: &str,
        body: &str,
        score: i64,
        num_comments: i64,
        age_hours: f64,
    ) -> Result<NlpResult, EnrichmentError> {
        if !age_hours.is_finite() {
            return Err(EnrichmentError::InvalidInput(format!(
                "age_hours must be finite, got {age_hours}"
            )));
        }

        catch_unwind(AssertUnwindSafe(|| {
            self.analyze_inner(title, body, score, num_comments, age_hours)
        }))
        .map_err(|payload| EnrichmentError::Panicked(panic_message(payload.as_ref())))?
    }

    fn analyze_inner(
        &self,
        title: &str,
        body: &str,
        score: i64,
        num_comments: i64,
        age_hours: f64,
    ) -> Result<NlpResult, EnrichmentError> {
        let text = format!("{title} {body}");

        let (raw_sentiment, _) = self.sentiment.analyze(&text);
        let sentiment_score = viral::round3(raw_sentiment);
        // label from the stored value so the two can never disagree
        let sentiment_label = SentimentLabel::from_score(sentiment_score);

        let topics = self.topics.extract_topics(&text);
        let keywords = self.topics.extract_keywords(&text);
        let entities = self.entities.extract(&text)?;

        let prediction = self.viral.predict(&ViralInput {
            title,
            body,
            score,
            num_comments,
            age_hours,
        });

        Ok(NlpResult {
            sentiment_score,
            sentiment_label,
            topics,
            entities,
            keywords,
            viral_score: prediction.score.clamp(0.0, 1.0),
            engagement_prediction: prediction.engagement,
        })
    }

    /// Analyze many items on the rayon pool. Output order matches input
    /// order; a panicking item yields its own `Panicked` entry.
    pub fn analyze_batch(&self, items: &[BatchItem]) -> Vec<Result<NlpResult, EnrichmentError>> {
        items.par_iter().map(|it| self.analyze_item(it)).collect()
    }

    fn analyze_item(&self, it: &BatchItem) -> Result<NlpResult, EnrichmentError> {
        self.analyze(&it.title, &it.body, it.score, it.num_comments, it.age_hours)
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

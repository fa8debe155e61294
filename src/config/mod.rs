// src/config/mod.rs
//! Runtime configuration: `config/pulse.toml` plus environment overrides.
//!
//! Lookup order:
//! 1) `$PULSE_CONFIG_PATH` (must exist)
//! 2) `config/pulse.toml`
//! 3) built-in defaults
//!
//! Every key has a default, so a partial file is fine.

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::nlp::topics::DEFAULT_KEYWORD_TOP_N;
use crate::nlp::{
    EnrichmentPipeline, EntityExtractor, GazetteerBackend, SentimentAnalyzer,
    SentimentBackendKind, TopicExtractor,
};
use crate::stream::processor::{ProcessorConfig, DEFAULT_POLL_TIMEOUT, DEFAULT_PROGRESS_EVERY};
use crate::stream::{ALERTS_TOPIC, PROCESSED_POSTS_TOPIC, RAW_POSTS_TOPIC};

pub const ENV_CONFIG_PATH: &str = "PULSE_CONFIG_PATH";
pub const DEFAULT_CONFIG_PATH: &str = "config/pulse.toml";

pub const ENV_POLL_TIMEOUT_MS: &str = "PULSE_POLL_TIMEOUT_MS";
pub const ENV_DATABASE_URL: &str = "DATABASE_URL";
pub const ENV_API_BIND: &str = "PULSE_API_BIND";
pub const ENV_WEBHOOK_URL: &str = "ALERT_WEBHOOK_URL";

fn default_poll_timeout_ms() -> u64 {
    DEFAULT_POLL_TIMEOUT.as_millis() as u64
}
fn default_progress_every() -> u64 {
    DEFAULT_PROGRESS_EVERY
}
fn default_inbound_topic() -> String {
    RAW_POSTS_TOPIC.to_string()
}
fn default_processed_topic() -> String {
    PROCESSED_POSTS_TOPIC.to_string()
}
fn default_alerts_topic() -> String {
    ALERTS_TOPIC.to_string()
}
fn default_input() -> String {
    "-".to_string()
}
fn default_keyword_top_n() -> usize {
    DEFAULT_KEYWORD_TOP_N
}
fn default_webhook_timeout_secs() -> u64 {
    5
}
fn default_webhook_retries() -> u8 {
    3
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PulseConfig {
    #[serde(default)]
    pub stream: StreamConfig,
    #[serde(default)]
    pub nlp: NlpConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub alerts: AlertsConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StreamConfig {
    #[serde(default = "default_poll_timeout_ms")]
    pub poll_timeout_ms: u64,
    #[serde(default = "default_inbound_topic")]
    pub inbound_topic: String,
    #[serde(default = "default_processed_topic")]
    pub processed_topic: String,
    #[serde(default = "default_alerts_topic")]
    pub alerts_topic: String,
    #[serde(default = "default_progress_every")]
    pub progress_every: u64,
    /// JSON-lines input: `-` for stdin or a file path.
    #[serde(default = "default_input")]
    pub input: String,
    /// Stop when the input is exhausted instead of idling.
    #[serde(default)]
    pub stop_at_eof: bool,
    /// JSON-lines output for enriched records and alerts: `-` for stdout or a
    /// file path (appended).
    #[serde(default = "default_input")]
    pub output: String,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            poll_timeout_ms: default_poll_timeout_ms(),
            inbound_topic: default_inbound_topic(),
            processed_topic: default_processed_topic(),
            alerts_topic: default_alerts_topic(),
            progress_every: default_progress_every(),
            input: default_input(),
            stop_at_eof: false,
            output: default_input(),
        }
    }
}

impl StreamConfig {
    pub fn processor_config(&self) -> ProcessorConfig {
        ProcessorConfig {
            poll_timeout: Duration::from_millis(self.poll_timeout_ms),
            inbound_topic: self.inbound_topic.clone(),
            processed_topic: self.processed_topic.clone(),
            alerts_topic: self.alerts_topic.clone(),
            progress_every: self.progress_every,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NlpConfig {
    #[serde(default)]
    pub sentiment_backend: SentimentBackendKind,
    #[serde(default = "default_keyword_top_n")]
    pub keyword_top_n: usize,
    /// JSON gazetteer for entity extraction; absent disables entities.
    #[serde(default)]
    pub entity_gazetteer: Option<PathBuf>,
}

impl Default for NlpConfig {
    fn default() -> Self {
        Self {
            sentiment_backend: SentimentBackendKind::default(),
            keyword_top_n: default_keyword_top_n(),
            entity_gazetteer: None,
        }
    }
}

impl NlpConfig {
    /// Build the shared pipeline. Backends are chosen here, once.
    pub fn build_pipeline(&self) -> Result<EnrichmentPipeline> {
        let entities = match &self.entity_gazetteer {
            Some(path) => {
                let g = GazetteerBackend::from_path(path)?;
                tracing::info!(target: "nlp", path = %path.display(), entries = g.len(), "entity gazetteer loaded");
                EntityExtractor::new(Box::new(g))
            }
            None => EntityExtractor::disabled(),
        };
        let sentiment = SentimentAnalyzer::new(self.sentiment_backend);
        tracing::info!(
            target: "nlp",
            sentiment = sentiment.backend(),
            entities = entities.backend(),
            keyword_top_n = self.keyword_top_n,
            "enrichment pipeline ready"
        );
        Ok(EnrichmentPipeline::new(
            sentiment,
            TopicExtractor::new(self.keyword_top_n),
            entities,
        ))
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StoreConfig {
    /// `sqlite://…` URL; absent keeps records in memory only.
    #[serde(default)]
    pub database_url: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiConfig {
    /// Address for `/health`, `/stats`, `/metrics`; absent disables the API.
    #[serde(default)]
    pub bind: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AlertsConfig {
    #[serde(default)]
    pub webhook_url: Option<String>,
    #[serde(default = "default_webhook_timeout_secs")]
    pub webhook_timeout_secs: u64,
    #[serde(default = "default_webhook_retries")]
    pub webhook_retries: u8,
}

impl Default for AlertsConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            webhook_timeout_secs: default_webhook_timeout_secs(),
            webhook_retries: default_webhook_retries(),
        }
    }
}

impl PulseConfig {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let mut cfg: PulseConfig = toml::from_str(s)?;
        cfg.sanitize();
        Ok(cfg)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        Self::from_toml_str(&content).with_context(|| format!("parsing config {}", path.display()))
    }

    /// File lookup (see module docs) followed by environment overrides.
    pub fn load() -> Result<Self> {
        let mut cfg = if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if !pb.exists() {
                return Err(anyhow!("{ENV_CONFIG_PATH} points to non-existent path"));
            }
            Self::load_from(&pb)?
        } else {
            let default = PathBuf::from(DEFAULT_CONFIG_PATH);
            if default.exists() {
                Self::load_from(&default)?
            } else {
                Self::default()
            }
        };
        cfg.apply_overrides(|k| std::env::var(k).ok());
        Ok(cfg)
    }

    /// Apply `PULSE_POLL_TIMEOUT_MS`, `DATABASE_URL`, `PULSE_API_BIND` and
    /// `ALERT_WEBHOOK_URL`. Empty or unparsable values are ignored.
    pub fn apply_overrides<F>(&mut self, get: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |k: &str| get(k).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(ms) = get(ENV_POLL_TIMEOUT_MS).and_then(|v| v.parse::<u64>().ok()) {
            self.stream.poll_timeout_ms = ms;
        }
        if let Some(url) = get(ENV_DATABASE_URL) {
            self.store.database_url = Some(url);
        }
        if let Some(bind) = get(ENV_API_BIND) {
            self.api.bind = Some(bind);
        }
        if let Some(hook) = get(ENV_WEBHOOK_URL) {
            self.alerts.webhook_url = Some(hook);
        }
        self.sanitize();
    }

    fn sanitize(&mut self) {
        if self.stream.poll_timeout_ms == 0 {
            self.stream.poll_timeout_ms = default_poll_timeout_ms();
        }
        if self.nlp.keyword_top_n == 0 {
            self.nlp.keyword_top_n = 1;
        }
        if self.alerts.webhook_retries == 0 {
            self.alerts.webhook_retries = 1;
        }
        for topic in [
            &mut self.stream.inbound_topic,
            &mut self.stream.processed_topic,
            &mut self.stream.alerts_topic,
        ] {
            *topic = topic.trim().to_string();
        }
        if self.stream.inbound_topic.is_empty() {
            self.stream.inbound_topic = default_inbound_topic();
        }
        if self.stream.processed_topic.is_empty() {
            self.stream.processed_topic = default_processed_topic();
        }
        if self.stream.alerts_topic.is_empty() {
            self.stream.alerts_topic = default_alerts_topic();
        }
    }
}

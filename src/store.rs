// src/store.rs
//! Idempotent storage of enriched records, keyed on `external_id`.
//!
//! `upsert` returns `true` when the record was inserted and `false` when a
//! record with the same key already existed. The first write wins; a replay
//! never updates the stored row.

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Mutex;

use crate::error::StorageError;
use crate::record::EnrichedRecord;

#[async_trait]
pub trait PostStore: Send + Sync {
    async fn upsert(&self, record: &EnrichedRecord) -> Result<bool, StorageError>;
    async fn count(&self) -> Result<u64, StorageError>;
    fn name(&self) -> &'static str;
}

// ------------------------------------------------------------
// In-memory
// ------------------------------------------------------------

#[derive(Debug, Default)]
pub struct MemoryStore {
    rows: Mutex<HashMap<String, EnrichedRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, external_id: &str) -> Option<EnrichedRecord> {
        self.rows.lock().ok()?.get(external_id).cloned()
    }
}

#[async_trait]
impl PostStore for MemoryStore {
    async fn upsert(&self, record: &EnrichedRecord) -> Result<bool, StorageError> {
        let mut rows = self
            .rows
            .lock()
            .map_err(|_| StorageError::Unavailable("memory store lock poisoned".into()))?;
        if rows.contains_key(&record.external_id) {
            return Ok(false);
        }
        rows.insert(record.external_id.clone(), record.clone());
        Ok(true)
    }

    async fn count(&self) -> Result<u64, StorageError> {
        let rows = self
            .rows
            .lock()
            .map_err(|_| StorageError::Unavailable("memory store lock poisoned".into()))?;
        Ok(rows.len() as u64)
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

// ------------------------------------------------------------
// SQLite
// ------------------------------------------------------------

const CREATE_POSTS: &str = r#"
CREATE TABLE IF NOT EXISTS posts (
    id                    INTEGER PRIMARY KEY AUTOINCREMENT,
    external_id           TEXT NOT NULL UNIQUE,
    source                TEXT NOT NULL,
    title                 TEXT NOT NULL,
    body                  TEXT NOT NULL DEFAULT '',
    url                   TEXT NOT NULL DEFAULT '',
    author                TEXT NOT NULL DEFAULT '',
    score                 INTEGER NOT NULL DEFAULT 0,
    num_comments          INTEGER NOT NULL DEFAULT 0,
    upvote_ratio          REAL,
    subreddit             TEXT,
    story_type            TEXT,
    created_at            TEXT NOT NULL,
    scraped_at            TEXT NOT NULL,
    sentiment_score       REAL NOT NULL,
    sentiment_label       TEXT NOT NULL,
    topics                TEXT NOT NULL,
    keywords              TEXT NOT NULL,
    entities              TEXT NOT NULL,
    viral_score           REAL NOT NULL,
    engagement_prediction TEXT NOT NULL
)
"#;

const CREATE_INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_posts_source_created ON posts (source, created_at)",
    "CREATE INDEX IF NOT EXISTS idx_posts_sentiment_created ON posts (sentiment_label, created_at)",
];

#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if needed) the database at `url` and ensure the schema.
    /// In-memory URLs are pinned to a single connection so every query sees
    /// the same database.
    pub async fn connect(url: &str) -> Result<Self, StorageError> {
        let opts = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        let max = if url.contains(":memory:") { 1 } else { 5 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max)
            .connect_with(opts)
            .await?;
        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    pub async fn migrate(&self) -> Result<(), StorageError> {
        sqlx::query(CREATE_POSTS).execute(&self.pool).await?;
        for ddl in CREATE_INDEXES {
            sqlx::query(ddl).execute(&self.pool).await?;
        }
        Ok(())
    }

    /// Stored title and sentiment for a key; used by tests and diagnostics.
    pub async fn fetch_summary(
        &self,
        external_id: &str,
    ) -> Result<Option<(String, f64)>, StorageError> {
        let row = sqlx::query("SELECT title, sentiment_score FROM posts WHERE external_id = ?1")
            .bind(external_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| (r.get::<String, _>("title"), r.get::<f64, _>("sentiment_score"))))
    }
}

#[async_trait]
impl PostStore for SqliteStore {
    async fn upsert(&self, r: &EnrichedRecord) -> Result<bool, StorageError> {
        let topics = serde_json::to_string(&r.topics)?;
        let keywords = serde_json::to_string(&r.keywords)?;
        let entities = serde_json::to_string(&r.entities)?;

        let result = sqlx::query(
            r#"
            INSERT INTO posts (
                external_id, source, title, body, url, author, score, num_comments,
                upvote_ratio, subreddit, story_type, created_at, scraped_at,
                sentiment_score, sentiment_label, topics, keywords, entities,
                viral_score, engagement_prediction
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20)
            ON CONFLICT (external_id) DO NOTHING
            "#,
        )
        .bind(&r.external_id)
        .bind(&r.source)
        .bind(&r.title)
        .bind(&r.body)
        .bind(&r.url)
        .bind(&r.author)
        .bind(r.score)
        .bind(r.num_comments)
        .bind(r.upvote_ratio)
        .bind(r.subreddit.as_deref())
        .bind(r.story_type.as_deref())
        .bind(r.created_at)
        .bind(r.scraped_at)
        .bind(r.sentiment_score)
        .bind(r.sentiment_label.as_str())
        .bind(topics)
        .bind(keywords)
        .bind(entities)
        .bind(r.viral_score)
        .bind(r.engagement_prediction.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn count(&self) -> Result<u64, StorageError> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM posts")
            .fetch_one(&self.pool)
            .await?;
        Ok(n.max(0) as u64)
    }

    fn name(&self) -> &'static str {
        "sqlite"
    }
}

// src/nlp/entities.rs
//! Named-entity extraction as a pluggable capability.
//!
//! The pipeline owns an [`EntityExtractor`] built once at startup around an
//! [`EntityBackend`]. Without a backend ([`NoopBackend`]) extraction yields an
//! empty list; it is never an error.
//!
//! The bundled backend is a regex gazetteer read from a JSON file:
//!
//! ```json
//! { "entities": [ { "pattern": "(?i)\\bopenai\\b", "type": "ORG" } ] }
//! ```
//!
//! Patterns must be compatible with the `regex` crate (no lookarounds).

use anyhow::{Context, Result};
use regex::Regex;
use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::path::Path;

use crate::error::EnrichmentError;
use crate::record::{Entity, EntityKind};

/// Only this many leading characters are handed to the backend.
pub const MAX_ENTITY_INPUT_CHARS: usize = 10_000;
pub const MAX_ENTITIES: usize = 20;

/// A span recognized by a backend, before type filtering and dedup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecognizedSpan {
    pub text: String,
    pub label: String,
}

pub trait EntityBackend: Send + Sync {
    fn recognize(&self, text: &str) -> Result<Vec<RecognizedSpan>>;
    fn name(&self) -> &'static str;
}

/// Used when no named-entity backend is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopBackend;

impl EntityBackend for NoopBackend {
    fn recognize(&self, _text: &str) -> Result<Vec<RecognizedSpan>> {
        Ok(Vec::new())
    }
    fn name(&self) -> &'static str {
        "none"
    }
}

pub struct EntityExtractor {
    backend: Box<dyn EntityBackend>,
}

impl std::fmt::Debug for EntityExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityExtractor")
            .field("backend", &self.backend.name())
            .finish()
    }
}

impl Default for EntityExtractor {
    fn default() -> Self {
        Self::disabled()
    }
}

impl EntityExtractor {
    pub fn new(backend: Box<dyn EntityBackend>) -> Self {
        Self { backend }
    }

    pub fn disabled() -> Self {
        Self::new(Box::new(NoopBackend))
    }

    pub fn backend(&self) -> &'static str {
        self.backend.name()
    }

    /// Accepted kinds only, case-insensitive dedup (first spelling wins),
    /// at most [`MAX_ENTITIES`].
    pub fn extract(&self, text: &str) -> Result<Vec<Entity>, EnrichmentError> {
        let head = truncate_chars(text, MAX_ENTITY_INPUT_CHARS);
        let spans = self
            .backend
            .recognize(head)
            .map_err(|e| EnrichmentError::EntityBackend(format!("{e:#}")))?;

        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for span in spans {
            let Some(kind) = EntityKind::from_label(&span.label) else {
                continue;
            };
            if !seen.insert(span.text.to_lowercase()) {
                continue;
            }
            out.push(Entity {
                text: span.text,
                kind,
            });
            if out.len() == MAX_ENTITIES {
                break;
            }
        }
        Ok(out)
    }
}

fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

// ------------------------------------------------------------
// Gazetteer backend
// ------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct GazetteerEntry {
    pattern: String,
    #[serde(rename = "type")]
    label: String,
}

#[derive(Debug, Deserialize)]
struct GazetteerFile {
    #[serde(default)]
    entities: Vec<GazetteerEntry>,
}

/// Regex gazetteer. Matches are reported in text order.
#[derive(Debug)]
pub struct GazetteerBackend {
    entries: Vec<(Regex, String)>,
}

impl GazetteerBackend {
    pub fn from_path(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading entity gazetteer from {}", path.display()))?;
        Self::from_json(&content)
            .with_context(|| format!("parsing entity gazetteer {}", path.display()))
    }

    pub fn from_json(s: &str) -> Result<Self> {
        let file: GazetteerFile = serde_json::from_str(s)?;
        let mut entries = Vec::with_capacity(file.entities.len());
        for e in file.entities {
            let re = Regex::new(&e.pattern)
                .with_context(|| format!("invalid gazetteer pattern {:?}", e.pattern))?;
            entries.push((re, e.label));
        }
        Ok(Self { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl EntityBackend for GazetteerBackend {
    fn recognize(&self, text: &str) -> Result<Vec<RecognizedSpan>> {
        let mut hits: Vec<(usize, RecognizedSpan)> = Vec::new();
        for (re, label) in &self.entries {
            for m in re.find_iter(text) {
                hits.push((
                    m.start(),
                    RecognizedSpan {
                        text: m.as_str().to_string(),
                        label: label.clone(),
                    },
                ));
            }
        }
        hits.sort_by_key(|(start, _)| *start);
        Ok(hits.into_iter().map(|(_, span)| span).collect())
    }

    fn name(&self) -> &'static str {
        "gazetteer"
    }
}

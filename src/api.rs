// src/api.rs
//! Operational HTTP surface: liveness, processor stats, Prometheus metrics,
//! and on-demand enrichment of ad-hoc posts.

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;
use tower_http::cors::CorsLayer;

use crate::nlp::{BatchItem, EnrichmentPipeline, NlpResult};
use crate::stream::{MetricsRecorder, PipelineMetrics, ProcessorState};
use crate::telemetry::Metrics;

/// Upper bound on items per `/batch` call.
pub const MAX_BATCH_ITEMS: usize = 500;

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<EnrichmentPipeline>,
    pub metrics: MetricsRecorder,
    pub state: watch::Receiver<ProcessorState>,
}

/// Build the router. `/metrics` is mounted only when a Prometheus recorder
/// is installed.
pub fn router(state: AppState, prometheus: Option<&Metrics>) -> Router {
    let app = Router::new()
        .route("/health", get(health))
        .route("/stats", get(stats))
        .route("/analyze", post(analyze))
        .route("/batch", post(analyze_batch))
        .with_state(state);

    let app = match prometheus {
        Some(m) => app.merge(m.router()),
        None => app,
    };
    app.layer(CorsLayer::very_permissive())
}

#[derive(Serialize)]
struct HealthResp {
    status: &'static str,
    timestamp: DateTime<Utc>,
}

async fn health() -> Json<HealthResp> {
    Json(HealthResp {
        status: "healthy",
        timestamp: Utc::now(),
    })
}

#[derive(Serialize)]
struct StatsResp {
    state: ProcessorState,
    #[serde(flatten)]
    metrics: PipelineMetrics,
}

async fn stats(State(state): State<AppState>) -> Json<StatsResp> {
    Json(StatsResp {
        state: *state.state.borrow(),
        metrics: state.metrics.snapshot(),
    })
}

#[derive(Serialize)]
struct ErrorResp {
    error: String,
}

fn error_response(status: StatusCode, msg: impl Into<String>) -> Response {
    (status, Json(ErrorResp { error: msg.into() })).into_response()
}

async fn analyze(State(state): State<AppState>, Json(item): Json<BatchItem>) -> Response {
    match state.pipeline.analyze(
        &item.title,
        &item.body,
        item.score,
        item.num_comments,
        item.age_hours,
    ) {
        Ok(r) => Json(r).into_response(),
        Err(e) => error_response(StatusCode::UNPROCESSABLE_ENTITY, e.to_string()),
    }
}

#[derive(Serialize)]
#[serde(untagged)]
enum BatchEntry {
    Ok(NlpResult),
    Err(ErrorResp),
}

async fn analyze_batch(
    State(state): State<AppState>,
    Json(items): Json<Vec<BatchItem>>,
) -> Response {
    if items.len() > MAX_BATCH_ITEMS {
        return error_response(
            StatusCode::PAYLOAD_TOO_LARGE,
            format!("at most {MAX_BATCH_ITEMS} items per batch"),
        );
    }

    let pipeline = state.pipeline.clone();
    let results = tokio::task::spawn_blocking(move || pipeline.analyze_batch(&items)).await;
    match results {
        Ok(results) => {
            let out: Vec<BatchEntry> = results
                .into_iter()
                .map(|r| match r {
                    Ok(v) => BatchEntry::Ok(v),
                    Err(e) => BatchEntry::Err(ErrorResp {
                        error: e.to_string(),
                    }),
                })
                .collect();
            Json(out).into_response()
        }
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

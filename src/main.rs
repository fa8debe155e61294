//! social-pulse — binary entrypoint.
//! Reads raw posts as JSON lines (stdin or a file), enriches them, stores them
//! idempotently and writes enriched records and alerts as JSON lines.
//!
//! Configuration: `config/pulse.toml` (see `PULSE_CONFIG_PATH`), `.env`, env overrides.

use std::io::BufRead;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::fs::{File, OpenOptions};
use tokio::io::BufReader;
use tokio::net::TcpListener;
use tracing::{info, warn};

use social_pulse::api::{self, AppState};
use social_pulse::config::PulseConfig;
use social_pulse::notify::WebhookPublisher;
use social_pulse::store::{MemoryStore, PostStore, SqliteStore};
use social_pulse::stream::{
    ChannelInbound, InboundStream, JsonLinesInbound, JsonLinesPublisher, Publisher,
    StreamProcessor,
};
use social_pulse::telemetry::{self, Metrics};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();
    telemetry::init_tracing();

    let cfg = PulseConfig::load().context("loading configuration")?;
    let pipeline = Arc::new(cfg.nlp.build_pipeline()?);

    // --- Inbound ---
    let stop_at_eof = cfg.stream.stop_at_eof;
    let inbound: Box<dyn InboundStream> = match cfg.stream.input.as_str() {
        "-" => Box::new(stdin_inbound(stop_at_eof)?),
        path => {
            let f = File::open(path)
                .await
                .with_context(|| format!("opening input {path}"))?;
            Box::new(JsonLinesInbound::new(BufReader::new(f), stop_at_eof))
        }
    };

    // --- Outbound ---
    let publisher: Arc<dyn Publisher> = match cfg.stream.output.as_str() {
        "-" => Arc::new(JsonLinesPublisher::new(tokio::io::stdout())),
        path => {
            let f = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .await
                .with_context(|| format!("opening output {path}"))?;
            Arc::new(JsonLinesPublisher::new(f))
        }
    };

    // --- Store ---
    let store: Arc<dyn PostStore> = match &cfg.store.database_url {
        Some(url) => Arc::new(
            SqliteStore::connect(url)
                .await
                .context("connecting to database")?,
        ),
        None => {
            warn!("no database configured; enriched posts are kept in memory only");
            Arc::new(MemoryStore::new())
        }
    };
    info!(store = store.name(), "store ready");

    let mut processor = StreamProcessor::new(
        pipeline.clone(),
        inbound,
        publisher,
        store,
        cfg.stream.processor_config(),
    );
    if let Some(hook) = &cfg.alerts.webhook_url {
        let webhook = WebhookPublisher::new(hook.clone())
            .with_timeout(cfg.alerts.webhook_timeout_secs)
            .with_retries(cfg.alerts.webhook_retries);
        processor = processor.with_alert_sink(Arc::new(webhook));
        info!("alert webhook enabled");
    }

    // installed before the loop starts so its first series are recorded
    let prometheus = match cfg.api.bind {
        Some(_) => Some(Metrics::init()?),
        None => None,
    };

    let app_state = AppState {
        pipeline,
        metrics: processor.metrics(),
        state: processor.watch_state(),
    };
    let handle = processor.start();

    // --- Operational API (optional) ---
    let api_task = match &cfg.api.bind {
        Some(bind) => {
            let app = api::router(app_state, prometheus.as_ref());
            let listener = TcpListener::bind(bind)
                .await
                .with_context(|| format!("binding API to {bind}"))?;
            info!(%bind, "operational API listening");
            Some(tokio::spawn(async move { axum::serve(listener, app).await }))
        }
        None => None,
    };

    // --- Shutdown on Ctrl-C ---
    let token = handle.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown requested");
            token.cancel();
        }
    });

    let result = handle.join().await;
    if let Some(task) = api_task {
        task.abort();
    }
    result.context("stream processor failed")
}

const STDIN_BUFFER: usize = 256;

/// Feeds stdin into a channel from a detached OS thread, so a pending read
/// never holds the runtime open after Ctrl-C.
fn stdin_inbound(stop_at_eof: bool) -> Result<ChannelInbound> {
    let (tx, inbound) = ChannelInbound::channel(STDIN_BUFFER);
    std::thread::Builder::new()
        .name("stdin-reader".into())
        .spawn(move || {
            let mut reader = std::io::stdin().lock();
            let mut line = Vec::new();
            loop {
                line.clear();
                match reader.read_until(b'\n', &mut line) {
                    Ok(0) => break,
                    Ok(_) => {
                        let payload = line.trim_ascii();
                        if payload.is_empty() {
                            continue;
                        }
                        if tx.blocking_send(payload.to_vec()).is_err() {
                            return;
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "reading stdin failed");
                        break;
                    }
                }
            }
            if !stop_at_eof {
                // holding the sender keeps the inbound idle instead of closed
                loop {
                    std::thread::park();
                }
            }
        })
        .context("spawning stdin reader")?;
    Ok(inbound)
}

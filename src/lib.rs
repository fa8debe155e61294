// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod alerts;
pub mod api;
pub mod config;
pub mod error;
pub mod nlp;
pub mod notify;
pub mod record;
pub mod store;
pub mod stream;
pub mod telemetry;

// ---- Re-exports for stable public API ----
pub use crate::alerts::{AlertEvent, AlertPolicy};
pub use crate::config::PulseConfig;
pub use crate::error::{
    EnrichmentError, MalformedRecordError, PipelineError, StorageError, TransportError,
};
pub use crate::nlp::{EnrichmentPipeline, NlpResult};
pub use crate::record::{EnrichedRecord, RawContentRecord};
pub use crate::stream::{PipelineMetrics, ProcessorHandle, ProcessorState, StreamProcessor};

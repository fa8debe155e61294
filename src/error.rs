//! Error taxonomy of the stream processor.
//!
//! Only a fatal transport error ([`TransportError::Fatal`], or
//! [`TransportError::Closed`] for a clean end of input) ends the consume loop.
//! Everything else is counted, logged and recovered locally.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TransportError {
    /// Poll/publish failed but the connection is still usable.
    #[error("transient transport error: {0}")]
    Transient(String),

    /// The transport reported an unrecoverable state.
    #[error("fatal transport error: {0}")]
    Fatal(String),

    /// The peer went away (channel dropped, writer closed).
    #[error("transport closed")]
    Closed,
}

#[derive(Error, Debug)]
pub enum MalformedRecordError {
    #[error("payload is not valid JSON: {0}")]
    Undecodable(String),

    #[error("payload is not a JSON object")]
    NotAnObject,

    #[error("missing or invalid field: {0}")]
    MissingField(String),
}

#[derive(Error, Debug)]
pub enum EnrichmentError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("entity backend failed: {0}")]
    EntityBackend(String),

    #[error("analyzer panicked: {0}")]
    Panicked(String),
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Malformed(#[from] MalformedRecordError),

    #[error(transparent)]
    Enrichment(#[from] EnrichmentError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("processor is {0:?}; expected {1}")]
    InvalidState(crate::stream::ProcessorState, &'static str),

    #[error("processor task failed: {0}")]
    Task(String),
}

//! Error types for the stream processor
//!
//! This module provides error handling for all processor operations including
//! payload parsing, windowing, aggregation, checkpoint storage, sources and sinks.
//!
//! Each pipeline maps failures onto the same taxonomy:
//!
//! - [`ParseFailure`]: malformed payload, dropped and counted, never fatal
//! - [`SinkError`]: transient, the tick is retried on the next interval
//! - [`StateError`]: checkpoint store unavailable, fatal for that pipeline only
//! - [`SourceError`]: source unreachable, retried with backoff
//!
//! Late events are not errors; they are reported through
//! [`IngestOutcome`](crate::pipeline::IngestOutcome).

use std::fmt;
use thiserror::Error;

/// Main processor error type
#[derive(Error, Debug)]
pub enum ProcessorError {
    /// Window-related errors
    #[error("window error: {0}")]
    Window(#[from] WindowError),

    /// Aggregation-related errors
    #[error("aggregation error: {0}")]
    Aggregation(#[from] AggregationError),

    /// Checkpoint store errors
    #[error("state error: {0}")]
    State(#[from] StateError),

    /// Sink write errors
    #[error("sink error: {0}")]
    Sink(#[from] SinkError),

    /// Message source errors
    #[error("source error: {0}")]
    Source(#[from] SourceError),

    /// Unparseable payloads
    #[error("parse error: {0}")]
    Parse(#[from] ParseFailure),

    /// Configuration errors
    #[error("configuration error: {0}")]
    Configuration(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("serialization error: {0}")]
    Serialization(String),

    /// A pipeline task stopped unexpectedly
    #[error("pipeline '{pipeline}' failed: {reason}")]
    Pipeline { pipeline: String, reason: String },
}

/// Window assignment errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WindowError {
    /// Event timestamp is out of the representable range
    #[error("invalid event timestamp: {timestamp}, reason: {reason}")]
    InvalidTimestamp { timestamp: i64, reason: String },

    /// Window size is invalid
    #[error("invalid window size: {size}ms, must be greater than 0")]
    InvalidWindowSize { size: i64 },
}

/// Aggregation computation errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AggregationError {
    /// Division by zero in average or similar calculations
    #[error("division by zero in {operation}")]
    DivisionByZero { operation: String },

    /// Invalid metric value (NaN, Inf, etc.)
    #[error("invalid metric value: {value}, reason: {reason}")]
    InvalidValue { value: f64, reason: String },

    /// Accumulators of different kinds cannot be merged
    #[error("type mismatch: expected {expected}, got {actual}")]
    TypeMismatch { expected: String, actual: String },
}

/// Checkpoint store errors
#[derive(Error, Debug)]
pub enum StateError {
    /// State serialization failed
    #[error("state serialization failed for key '{key}': {reason}")]
    SerializationFailed { key: String, reason: String },

    /// State deserialization failed
    #[error("state deserialization failed for key '{key}': {reason}")]
    DeserializationFailed { key: String, reason: String },

    /// Storage backend error
    #[error("storage error in {backend_type}: {details}")]
    StorageError {
        backend_type: String,
        details: String,
    },

    /// Checkpoint creation failed
    #[error("checkpoint failed for pipeline '{pipeline}': {reason}")]
    CheckpointFailed { pipeline: String, reason: String },

    /// Checkpoint restoration failed
    #[error("restore failed for pipeline '{pipeline}': {reason}")]
    RestoreFailed { pipeline: String, reason: String },

    /// A commit would move the checkpoint backwards
    #[error("checkpoint regression for pipeline '{pipeline}': {reason}")]
    Regression { pipeline: String, reason: String },
}

/// Sink write errors
#[derive(Error, Debug)]
pub enum SinkError {
    /// The underlying transport failed
    #[error("sink '{sink}' write failed for batch {batch_id}: {reason}")]
    WriteFailed {
        sink: String,
        batch_id: u64,
        reason: String,
    },

    /// I/O errors from file-backed sinks
    #[error("sink '{sink}' I/O error: {source}")]
    Io {
        sink: String,
        #[source]
        source: std::io::Error,
    },

    /// Rows could not be encoded
    #[error("sink '{sink}' encoding error: {reason}")]
    Encoding { sink: String, reason: String },
}

/// Message source errors
#[derive(Error, Debug)]
pub enum SourceError {
    /// The source cannot be reached; retried with backoff
    #[error("source '{source_id}' unavailable: {reason}")]
    Unavailable { source_id: String, reason: String },

    /// Seeking to a resume position failed
    #[error("seek failed on '{source_id}': {reason}")]
    SeekFailed { source_id: String, reason: String },

    /// Source configuration is unusable
    #[error("invalid source configuration: {reason}")]
    InvalidConfig { reason: String },
}

impl SourceError {
    /// Whether the ingestion loop should retry after this error
    pub fn is_retryable(&self) -> bool {
        matches!(self, SourceError::Unavailable { .. })
    }
}

/// Why a payload could not be parsed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParseFailureReason {
    /// Not valid JSON or not UTF-8
    Malformed,
    /// Required field missing or unknown enum value
    SchemaMismatch,
    /// Field present with an unusable type or value
    TypeCoercion,
}

impl ParseFailureReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParseFailureReason::Malformed => "malformed",
            ParseFailureReason::SchemaMismatch => "schema_mismatch",
            ParseFailureReason::TypeCoercion => "type_coercion",
        }
    }
}

impl fmt::Display for ParseFailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A payload that could not be turned into an event
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{reason} payload ({} bytes): {detail}", .payload.len())]
pub struct ParseFailure {
    /// The raw payload as received
    pub payload: Vec<u8>,
    /// Failure category
    pub reason: ParseFailureReason,
    /// Parser message
    pub detail: String,
}

/// Result type alias for processor operations
pub type Result<T> = std::result::Result<T, ProcessorError>;

/// Result type alias for window operations
pub type WindowResult<T> = std::result::Result<T, WindowError>;

/// Result type alias for aggregation operations
pub type AggregationResult<T> = std::result::Result<T, AggregationError>;

/// Result type alias for checkpoint store operations
pub type StateResult<T> = std::result::Result<T, StateError>;

/// Result type alias for sink operations
pub type SinkResult<T> = std::result::Result<T, SinkError>;

/// Result type alias for source operations
pub type SourceResult<T> = std::result::Result<T, SourceError>;

impl From<serde_json::Error> for ProcessorError {
    fn from(err: serde_json::Error) -> Self {
        ProcessorError::Serialization(err.to_string())
    }
}

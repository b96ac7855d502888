//! Error types for moex-collector

use std::path::PathBuf;

use moex_middleware::TransportError;
use thiserror::Error;

use crate::trade::TradeId;

/// Top-level error for startup and wiring
#[derive(Error, Debug)]
pub enum Error {
    /// Broker transport error
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// HTTP client construction error
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Why one field of a row could not be read
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FieldError {
    #[error("column {0} not present in response")]
    MissingColumn(&'static str),
    #[error("{column}: row has no value at index {index}")]
    OutOfRange { column: &'static str, index: usize },
    #[error("{column}: expected {expected}, got {found}")]
    Type {
        column: &'static str,
        expected: &'static str,
        found: String,
    },
}

/// Whole-response decode failure
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("response has no {0} column")]
    MissingIdColumn(&'static str),
    #[error("malformed response body: {0}")]
    Body(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("cancelled while waiting for a rate limiter permit")]
    CancelledWaiting,
    #[error("cancelled during request")]
    Cancelled,
    #[error("request timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
    #[error("request failed: {0}")]
    Request(#[source] reqwest::Error),
    #[error("provider returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error(transparent)]
    Decode(#[from] DecodeError),
}

impl FetchError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, FetchError::CancelledWaiting | FetchError::Cancelled)
    }
}

#[derive(Error, Debug)]
pub enum WatermarkError {
    #[error("watermark io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Error, Debug)]
pub enum PublishError {
    #[error("failed to serialize trade: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Failure of one collection cycle. Every variant leaves the watermark
/// untouched.
#[derive(Error, Debug)]
pub enum CycleError {
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("publish of trade {trade_id} failed after {published} of {total} trades: {source}")]
    Publish {
        trade_id: TradeId,
        published: usize,
        total: usize,
        #[source]
        source: PublishError,
    },
}

impl CycleError {
    /// Label used for the cycle outcome metric
    pub fn kind(&self) -> &'static str {
        match self {
            CycleError::Fetch(e) if e.is_cancelled() => "cancelled",
            CycleError::Fetch(_) => "fetch_error",
            CycleError::Publish { .. } => "publish_error",
        }
    }
}

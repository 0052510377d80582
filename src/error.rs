//! Error types for the monitor, its registry and its reporting sinks.

use thiserror::Error;

use crate::metrics::MetricKind;

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, MonitorError>;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum MonitorError {
    /// A name was requested under a different instrument kind than the one
    /// it was first registered with. The stored instrument is left as is.
    #[error("metric {name:?} is registered as a {registered}, not a {requested}")]
    KindMismatch {
        name: String,
        registered: MetricKind,
        requested: MetricKind,
    },

    #[error("invalid bloom filter parameters: {0}")]
    InvalidFilterParams(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("http sink request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("redis sink failed: {0}")]
    Redis(#[from] redis::RedisError),

    /// The sink answered, but refused the payload.
    #[error("{sink} rejected snapshot with status {status}: {body}")]
    SinkRejected {
        sink: &'static str,
        status: u16,
        body: String,
    },
}

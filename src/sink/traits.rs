//! Core sink trait and error type.

use thiserror::Error;

use crate::measurement::Measurement;

/// Errors returned by sink implementations.
#[derive(Debug, Error)]
pub enum SinkError {
    /// Export was called with an empty batch.
    #[error("at least one measurement must be specified")]
    NoMeasurements,

    /// HTTP transport error.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Receiver answered with a non-success status.
    #[error("unexpected status {status} from {url}")]
    Status { status: u16, url: String },

    /// Database error.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// JSON serialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Local I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid sink settings.
    #[error("config error: {0}")]
    Config(String),
}

impl SinkError {
    pub(crate) fn check_status(response: &reqwest::Response) -> Result<(), Self> {
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(Self::Status {
                status: status.as_u16(),
                url: response.url().to_string(),
            })
        }
    }
}

/// Export destination for scan batches.
///
/// # Contract
///
/// - `export` receives the whole batch of one window in one call. An empty
///   batch is an error ([`SinkError::NoMeasurements`]); sinks wanting
///   per-record delivery split internally.
/// - Retries, if any, are the sink's own business.
/// - `close` is called exactly once by the scanner, after the last export.
#[async_trait::async_trait]
pub trait Sink: Send + Sync + 'static {
    /// Display name used in logs.
    fn name(&self) -> &str;

    /// Deliver a batch.
    async fn export(&self, batch: &[Measurement]) -> Result<(), SinkError>;

    /// Release resources held by the sink.
    async fn close(&self) -> Result<(), SinkError>;
}

//! Sequential export of one batch to every configured sink.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio_util::sync::CancellationToken;

use super::{Sink, SinkError};
use crate::measurement::Measurement;

/// Default ceiling for one export cycle (30 seconds).
pub const DEFAULT_EXPORT_TIMEOUT: Duration = Duration::from_secs(30);

/// Cycle-level export failure.
#[derive(Debug, Error)]
pub enum ExportError {
    /// A sink failed; sinks after it were skipped for this cycle.
    #[error("sink '{sink}' failed: {source}")]
    Sink {
        sink: String,
        #[source]
        source: SinkError,
    },

    /// The cycle exceeded its timeout.
    #[error("export timed out after {0:?}")]
    Timeout(Duration),

    /// The scanner's parent token was cancelled before or during the export.
    #[error("export cancelled")]
    Cancelled,
}

/// Ordered, read-only list of sinks plus the per-cycle export ceiling.
pub struct ExportFanout {
    sinks: Arc<[Arc<dyn Sink>]>,
    timeout: Duration,
}

impl ExportFanout {
    pub fn new(sinks: Vec<Arc<dyn Sink>>, timeout: Duration) -> Self {
        Self {
            sinks: sinks.into(),
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Deliver `batch` to every sink in order.
    ///
    /// The first failing sink aborts the remaining ones. Returns the number of
    /// sinks that accepted the batch. An empty batch contacts no sink.
    pub async fn export(
        &self,
        batch: &[Measurement],
        cancel: &CancellationToken,
    ) -> Result<usize, ExportError> {
        if batch.is_empty() {
            tracing::debug!("Empty batch, no sink contacted");
            return Ok(0);
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ExportError::Cancelled),
            result = tokio::time::timeout(self.timeout, self.export_in_order(batch)) => {
                result.unwrap_or(Err(ExportError::Timeout(self.timeout)))
            }
        }
    }

    async fn export_in_order(&self, batch: &[Measurement]) -> Result<usize, ExportError> {
        for sink in self.sinks.iter() {
            sink.export(batch).await.map_err(|source| ExportError::Sink {
                sink: sink.name().to_string(),
                source,
            })?;
            tracing::debug!(sink = sink.name(), count = batch.len(), "Batch exported");
        }
        Ok(self.sinks.len())
    }

    /// Close every sink once, continuing past failures.
    ///
    /// Returns the number of sinks whose close failed.
    pub async fn close_all(&self) -> usize {
        let mut failures = 0;
        for sink in self.sinks.iter() {
            match sink.close().await {
                Ok(()) => tracing::debug!(sink = sink.name(), "Sink closed"),
                Err(e) => {
                    tracing::error!(sink = sink.name(), error = %e, "Failed to close sink");
                    failures += 1;
                }
            }
        }
        failures
    }
}

impl std::fmt::Debug for ExportFanout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExportFanout")
            .field(
                "sinks",
                &self.sinks.iter().map(|s| s.name()).collect::<Vec<_>>(),
            )
            .field("timeout", &self.timeout)
            .finish()
    }
}

//! One bounded scan: collect a window, then export the batch.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::collect::{CollectOutcome, CollectSummary, collect};
use crate::measurement::Measurement;
use crate::registry::PeripheralRegistry;
use crate::sink::{ExportError, ExportFanout};
use crate::source::MeasurementSource;

/// What a session did, for logging and tests.
#[derive(Debug)]
pub struct SessionReport {
    pub collect: CollectSummary,
    /// Records handed to the sinks.
    pub collected: usize,
    /// `None` when the window was empty and no sink was contacted.
    pub export: Option<Result<usize, ExportError>>,
}

impl SessionReport {
    pub fn exported(&self) -> bool {
        matches!(self.export, Some(Ok(_)))
    }
}

/// Borrowed view of the scanner resources one session needs.
pub struct ScanSession<'a> {
    source: &'a dyn MeasurementSource,
    registry: &'a Arc<PeripheralRegistry>,
    fanout: &'a ExportFanout,
    buffer_capacity: usize,
}

impl<'a> ScanSession<'a> {
    pub fn new(
        source: &'a dyn MeasurementSource,
        registry: &'a Arc<PeripheralRegistry>,
        fanout: &'a ExportFanout,
        buffer_capacity: usize,
    ) -> Self {
        Self {
            source,
            registry,
            fanout,
            buffer_capacity,
        }
    }

    /// Run one window of length `window`.
    ///
    /// The window token is a child of `parent`, so external cancellation ends
    /// collection and aborts an in-flight export. `stop` only ends collection;
    /// whatever was collected before it fired is still exported.
    pub async fn run(
        &self,
        window: Duration,
        parent: &CancellationToken,
        stop: &CancellationToken,
    ) -> SessionReport {
        let deadline = Instant::now() + window;
        let window_token = parent.child_token();
        let stream = self.source.open(window_token.clone());
        let (tx, mut rx) = mpsc::channel(self.buffer_capacity.max(1));

        let mut collector = tokio::spawn(collect(
            stream,
            tx,
            Arc::clone(self.registry),
            deadline,
            window_token.clone(),
        ));

        let joined = tokio::select! {
            biased;
            joined = &mut collector => joined,
            _ = stop.cancelled() => {
                window_token.cancel();
                collector.await
            }
        };
        // The collector has returned, so the producer side is gone.
        window_token.cancel();

        let summary = joined.unwrap_or_else(|e| {
            tracing::error!(error = %e, "Collector task failed");
            CollectSummary {
                outcome: CollectOutcome::Cancelled,
                forwarded: 0,
                dropped: 0,
                seen: 0,
            }
        });

        let mut batch: Vec<Measurement> = Vec::with_capacity(summary.forwarded);
        while let Ok(measurement) = rx.try_recv() {
            batch.push(measurement);
        }

        tracing::debug!(
            outcome = %summary.outcome,
            collected = batch.len(),
            dropped = summary.dropped,
            "Scan window finished"
        );

        if batch.is_empty() {
            tracing::info!("No measurements collected in this window");
            return SessionReport {
                collect: summary,
                collected: 0,
                export: None,
            };
        }

        tracing::info!(count = batch.len(), "Exporting measurements");
        let export = self.fanout.export(&batch, parent).await;
        match &export {
            Ok(sinks) => tracing::debug!(sinks, count = batch.len(), "Export complete"),
            Err(e) => tracing::error!(error = %e, "Failed to export measurements"),
        }

        SessionReport {
            collect: summary,
            collected: batch.len(),
            export: Some(export),
        }
    }
}

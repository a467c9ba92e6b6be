//! Per-window fan-in from a measurement stream into the session buffer.

use std::collections::HashSet;
use std::sync::Arc;

use futures::StreamExt;
use futures::stream::BoxStream;
use strum_macros::Display;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::measurement::{Measurement, normalize_address};
use crate::registry::PeripheralRegistry;

/// Default capacity of the per-window record buffer.
pub const DEFAULT_BUFFER_CAPACITY: usize = 128;

/// Why a collection window ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum CollectOutcome {
    /// Every registered peripheral reported at least once.
    AllPeripheralsSeen,
    /// The window deadline passed.
    DeadlineReached,
    /// The window token fired (stop or external cancellation).
    Cancelled,
    /// The source stream ended.
    SourceClosed,
}

/// Result of one collection window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectSummary {
    pub outcome: CollectOutcome,
    /// Records placed in the buffer.
    pub forwarded: usize,
    /// Records discarded because the buffer was full.
    pub dropped: usize,
    /// Distinct addresses forwarded.
    pub seen: usize,
}

/// Forward records from `stream` into `buffer` until the window completes.
///
/// Records are forwarded unchanged. A full buffer drops the record instead of
/// waiting, so the collector never outlives `deadline`. Dropped records do not
/// count towards completeness.
pub(crate) async fn collect(
    mut stream: BoxStream<'static, Measurement>,
    buffer: mpsc::Sender<Measurement>,
    registry: Arc<PeripheralRegistry>,
    deadline: Instant,
    window: CancellationToken,
) -> CollectSummary {
    let expiry = tokio::time::sleep_until(deadline);
    tokio::pin!(expiry);

    let mut seen = HashSet::new();
    let mut forwarded = 0;
    let mut dropped = 0;

    let outcome = loop {
        tokio::select! {
            biased;
            _ = window.cancelled() => break CollectOutcome::Cancelled,
            _ = &mut expiry => break CollectOutcome::DeadlineReached,
            next = stream.next() => {
                let Some(measurement) = next else {
                    break CollectOutcome::SourceClosed;
                };
                let addr = normalize_address(&measurement.addr);
                match buffer.try_send(measurement) {
                    Ok(()) => {
                        forwarded += 1;
                        tracing::trace!(addr = %addr, "Measurement collected");
                        seen.insert(addr);
                    }
                    Err(TrySendError::Full(_)) => {
                        dropped += 1;
                        tracing::trace!(addr = %addr, "Buffer full, measurement dropped");
                        continue;
                    }
                    Err(TrySendError::Closed(_)) => break CollectOutcome::Cancelled,
                }
                if registry.all_seen(&seen) {
                    break CollectOutcome::AllPeripheralsSeen;
                }
            }
        }
    };

    if dropped > 0 {
        tracing::warn!(
            dropped,
            capacity = buffer.max_capacity(),
            "Collection buffer overflowed"
        );
    }

    CollectSummary {
        outcome,
        forwarded,
        dropped,
        seen: seen.len(),
    }
}

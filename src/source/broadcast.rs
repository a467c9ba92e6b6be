//! Broadcast hub source.

use std::sync::Arc;

use futures::StreamExt;
use futures::stream::BoxStream;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_util::sync::CancellationToken;

use super::MeasurementSource;
use crate::measurement::Measurement;
use crate::registry::PeripheralRegistry;

/// Default number of records buffered per subscriber.
pub const DEFAULT_HUB_CAPACITY: usize = 1024;

/// In-process measurement hub.
///
/// Decoders publish records with [`BroadcastSource::publish`]; every open
/// window subscribes and sees only the records published while it is open.
/// Records published while no window is open are discarded.
#[derive(Clone)]
pub struct BroadcastSource {
    tx: broadcast::Sender<Measurement>,
    registry: Arc<PeripheralRegistry>,
}

impl BroadcastSource {
    /// Create a hub filtering by `registry`.
    pub fn new(registry: Arc<PeripheralRegistry>, capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx, registry }
    }

    /// Publish a record to every open window.
    ///
    /// Returns the number of windows that received it.
    pub fn publish(&self, measurement: Measurement) -> usize {
        self.tx.send(measurement).unwrap_or(0)
    }

    /// Number of currently open windows.
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl std::fmt::Debug for BroadcastSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BroadcastSource")
            .field("subscribers", &self.tx.receiver_count())
            .field("peripherals", &self.registry.len())
            .finish()
    }
}

impl MeasurementSource for BroadcastSource {
    fn open(&self, cancel: CancellationToken) -> BoxStream<'static, Measurement> {
        let registry = Arc::clone(&self.registry);
        BroadcastStream::new(self.tx.subscribe())
            .filter_map(move |item| {
                let admitted = match item {
                    Ok(measurement) => registry.admit(measurement),
                    Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "Measurement window lagged behind source");
                        None
                    }
                };
                futures::future::ready(admitted)
            })
            .take_until(cancel.cancelled_owned())
            .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[tokio::test]
    async fn test_filters_and_labels_records() {
        let registry = Arc::new(PeripheralRegistry::new([("AA:BB", "Kitchen")]));
        let hub = BroadcastSource::new(registry, 16);
        let cancel = CancellationToken::new();
        let mut stream = hub.open(cancel.clone());

        assert_eq!(hub.publish(Measurement::new("CC:DD", Utc::now())), 1);
        hub.publish(Measurement::new("aa:bb", Utc::now()).with_climate(20.0, 40.0, 1000.0));

        let m = stream.next().await.unwrap();
        assert_eq!(m.addr, "AA:BB");
        assert_eq!(m.name.as_deref(), Some("Kitchen"));
        assert_eq!(m.temperature, 20.0);
    }

    #[tokio::test]
    async fn test_stream_ends_on_cancel() {
        let hub = BroadcastSource::new(Arc::new(PeripheralRegistry::any()), 16);
        let cancel = CancellationToken::new();
        let mut stream = hub.open(cancel.clone());
        assert_eq!(hub.subscriber_count(), 1);

        cancel.cancel();
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn test_publish_without_windows() {
        let hub = BroadcastSource::new(Arc::new(PeripheralRegistry::any()), 16);
        assert_eq!(hub.publish(Measurement::new("AA:BB", Utc::now())), 0);
    }
}

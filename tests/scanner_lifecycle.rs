//! Scanner lifecycle integration tests.
//!
//! Drives the public `Scanner` API end to end with an in-process broadcast
//! source, recording sinks and a mock radio device.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use sensorscan::device::{Device, DeviceError, DeviceProvider};
use sensorscan::source::BroadcastSource;
use sensorscan::{
    Measurement, PeripheralRegistry, Scanner, ScannerError, ScannerState, Sink, SinkError,
};
use tokio_util::sync::CancellationToken;

// =============================================================================
// Test Helpers
// =============================================================================

#[derive(Default)]
struct DeviceCounters {
    acquired: AtomicUsize,
    released: AtomicUsize,
}

struct MockDevice {
    counters: Arc<DeviceCounters>,
}

#[async_trait::async_trait]
impl Device for MockDevice {
    fn id(&self) -> &str {
        "mock0"
    }

    async fn release(&self) -> Result<(), DeviceError> {
        self.counters.released.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Provider whose first acquisition can be made to fail.
struct MockProvider {
    fail_next: AtomicBool,
    counters: Arc<DeviceCounters>,
}

#[async_trait::async_trait]
impl DeviceProvider for MockProvider {
    async fn acquire(&self, identifier: &str) -> Result<Box<dyn Device>, DeviceError> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(DeviceError::NotFound(identifier.to_string()));
        }
        self.counters.acquired.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockDevice {
            counters: Arc::clone(&self.counters),
        }))
    }
}

#[derive(Default)]
struct RecordingSink {
    name: String,
    fail_export: bool,
    fail_close: bool,
    batches: Mutex<Vec<Vec<Measurement>>>,
    exports: AtomicUsize,
    closes: AtomicUsize,
}

impl RecordingSink {
    fn new(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            ..Default::default()
        })
    }

    fn failing_export(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            fail_export: true,
            ..Default::default()
        })
    }

    fn failing_close(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            fail_close: true,
            ..Default::default()
        })
    }

    fn batch_count(&self) -> usize {
        self.batches.lock().unwrap().len()
    }
}

#[async_trait::async_trait]
impl Sink for RecordingSink {
    fn name(&self) -> &str {
        &self.name
    }

    async fn export(&self, batch: &[Measurement]) -> Result<(), SinkError> {
        self.exports.fetch_add(1, Ordering::SeqCst);
        if batch.is_empty() {
            return Err(SinkError::NoMeasurements);
        }
        if self.fail_export {
            return Err(SinkError::Config("receiver unavailable".into()));
        }
        self.batches.lock().unwrap().push(batch.to_vec());
        Ok(())
    }

    async fn close(&self) -> Result<(), SinkError> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        if self.fail_close {
            return Err(SinkError::Config("close failed".into()));
        }
        Ok(())
    }
}

struct Harness {
    scanner: Scanner,
    hub: BroadcastSource,
    device: Arc<DeviceCounters>,
}

fn harness(
    registry: PeripheralRegistry,
    sinks: &[&Arc<RecordingSink>],
    fail_init: bool,
) -> Harness {
    let registry = Arc::new(registry);
    let hub = BroadcastSource::new(Arc::clone(&registry), 64);
    let device = Arc::new(DeviceCounters::default());

    let scanner = Scanner::builder()
        .registry(registry)
        .source(Arc::new(hub.clone()))
        .device_provider(Box::new(MockProvider {
            fail_next: AtomicBool::new(fail_init),
            counters: Arc::clone(&device),
        }))
        .sinks(sinks.iter().map(|s| Arc::clone(*s) as Arc<dyn Sink>))
        .export_timeout(Duration::from_secs(5))
        .build()
        .expect("Failed to build scanner");

    Harness {
        scanner,
        hub,
        device,
    }
}

/// Publish a reading from `addr` every second, until `cancel` fires.
fn spawn_publisher(hub: BroadcastSource, addr: &'static str, cancel: CancellationToken) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(1));
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    hub.publish(
                        Measurement::new(addr, Utc::now()).with_climate(21.5, 40.0, 1001.0),
                    );
                }
            }
        }
    });
}

// =============================================================================
// Scheduling
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_scan_exports_labelled_batches() {
    let sink = RecordingSink::new("recording");
    let h = harness(
        PeripheralRegistry::new([("AA:BB", "Kitchen")]),
        &[&sink],
        false,
    );
    assert_eq!(h.scanner.registry().label("AA:BB"), Some("Kitchen"));
    assert!(!h.scanner.registry().accepts("EE:FF"));

    let shutdown = CancellationToken::new();
    spawn_publisher(h.hub.clone(), "aa-bb", shutdown.clone());
    spawn_publisher(h.hub.clone(), "EE:FF", shutdown.clone());

    h.scanner.init("mock0").await.unwrap();
    h.scanner
        .scan(shutdown.clone(), Duration::from_secs(10))
        .unwrap();
    assert_eq!(h.scanner.state(), ScannerState::Scanning);

    tokio::time::sleep(Duration::from_secs(35)).await;

    assert!(sink.batch_count() >= 2);
    for batch in sink.batches.lock().unwrap().iter() {
        assert!(!batch.is_empty());
        assert!(batch.iter().all(|m| m.addr == "AA:BB"));
        assert!(batch.iter().all(|m| m.name.as_deref() == Some("Kitchen")));
    }

    shutdown.cancel();
    h.scanner.close().await;
    assert_eq!(h.scanner.state(), ScannerState::Closed);
}

#[tokio::test(start_paused = true)]
async fn test_failing_sink_aborts_rest_but_not_scheduler() {
    let first = RecordingSink::new("first");
    let second = RecordingSink::failing_export("second");
    let third = RecordingSink::new("third");
    let h = harness(
        PeripheralRegistry::new([("AA:BB", "Kitchen")]),
        &[&first, &second, &third],
        false,
    );

    let shutdown = CancellationToken::new();
    spawn_publisher(h.hub.clone(), "AA:BB", shutdown.clone());

    h.scanner.init("mock0").await.unwrap();
    h.scanner
        .scan(shutdown.clone(), Duration::from_secs(5))
        .unwrap();

    tokio::time::sleep(Duration::from_secs(30)).await;

    let cycles = first.exports.load(Ordering::SeqCst);
    assert!(
        cycles >= 2,
        "scheduler should keep running, got {cycles} cycles"
    );
    assert_eq!(second.exports.load(Ordering::SeqCst), cycles);
    assert_eq!(third.exports.load(Ordering::SeqCst), 0);

    h.scanner.close().await;
}

#[tokio::test(start_paused = true)]
async fn test_parent_cancellation_stops_scheduler() {
    let h = harness(PeripheralRegistry::any(), &[], false);
    let parent = CancellationToken::new();

    h.scanner.init("mock0").await.unwrap();
    h.scanner
        .scan(parent.clone(), Duration::from_secs(60))
        .unwrap();

    parent.cancel();
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(h.scanner.state(), ScannerState::Stopped);

    h.scanner.close().await;
    assert_eq!(h.device.released.load(Ordering::SeqCst), 1);
}

// =============================================================================
// Lifecycle
// =============================================================================

#[tokio::test]
async fn test_zero_interval_is_rejected() {
    let h = harness(PeripheralRegistry::any(), &[], false);
    h.scanner.init("mock0").await.unwrap();

    let err = h
        .scanner
        .scan(CancellationToken::new(), Duration::ZERO)
        .unwrap_err();
    assert!(matches!(err, ScannerError::Config(_)));
    assert_eq!(h.scanner.state(), ScannerState::Initialized);

    h.scanner.close().await;
}

#[tokio::test]
async fn test_second_scan_is_rejected() {
    let h = harness(PeripheralRegistry::any(), &[], false);
    h.scanner.init("mock0").await.unwrap();

    h.scanner
        .scan(CancellationToken::new(), Duration::from_secs(60))
        .unwrap();
    let err = h
        .scanner
        .scan(CancellationToken::new(), Duration::from_secs(60))
        .unwrap_err();
    assert!(matches!(err, ScannerError::AlreadyScanning));

    h.scanner.close().await;
}

#[tokio::test]
async fn test_stop_twice_equals_once() {
    let sink = RecordingSink::new("recording");
    let h = harness(PeripheralRegistry::any(), &[&sink], false);
    h.scanner.init("mock0").await.unwrap();
    h.scanner
        .scan(CancellationToken::new(), Duration::from_secs(60))
        .unwrap();

    h.scanner.stop();
    h.scanner.stop();
    assert_eq!(h.scanner.state(), ScannerState::Stopped);

    h.scanner.close().await;
    assert_eq!(sink.closes.load(Ordering::SeqCst), 1);
    assert_eq!(sink.exports.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_close_without_stop_releases_everything_once() {
    let a = RecordingSink::new("a");
    let b = RecordingSink::failing_close("b");
    let c = RecordingSink::new("c");
    let h = harness(PeripheralRegistry::any(), &[&a, &b, &c], false);

    h.scanner.init("mock0").await.unwrap();
    h.scanner.close().await;
    h.scanner.close().await;

    assert_eq!(h.scanner.state(), ScannerState::Closed);
    assert_eq!(h.device.acquired.load(Ordering::SeqCst), 1);
    assert_eq!(h.device.released.load(Ordering::SeqCst), 1);
    for sink in [&a, &b, &c] {
        assert_eq!(sink.closes.load(Ordering::SeqCst), 1);
    }
}

#[tokio::test]
async fn test_failed_init_can_be_retried() {
    let h = harness(PeripheralRegistry::any(), &[], true);

    let err = h.scanner.init("hci9").await.unwrap_err();
    assert!(matches!(
        err,
        ScannerError::Device(DeviceError::NotFound(_))
    ));
    assert_eq!(h.scanner.state(), ScannerState::Created);

    h.scanner.init("hci9").await.unwrap();
    assert_eq!(h.scanner.state(), ScannerState::Initialized);

    let err = h.scanner.init("hci9").await.unwrap_err();
    assert!(matches!(err, ScannerError::InvalidState { .. }));

    h.scanner.close().await;
    assert_eq!(h.device.released.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_empty_identifier_is_rejected() {
    let h = harness(PeripheralRegistry::any(), &[], false);
    let err = h.scanner.init("  ").await.unwrap_err();
    assert!(matches!(err, ScannerError::Config(_)));
    assert_eq!(h.device.acquired.load(Ordering::SeqCst), 0);
}

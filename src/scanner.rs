//! Scan-cycle orchestration.
//!
//! A [`Scanner`] owns the radio device, the measurement source and the sinks.
//! Once started it waits for the next wall-clock boundary that is a multiple
//! of the scan interval, then runs one [`ScanSession`] per interval tick until
//! it is stopped or its parent token is cancelled.
//!
//! # Lifecycle
//!
//! ```text
//! Created --init--> Initialized --scan--> Scanning --stop--> Stopped --close--> Closed
//! ```
//!
//! `stop` and `close` are idempotent and valid from any state. `close`
//! releases the device before closing the sinks, and always attempts both.

mod collect;
mod error;
mod session;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::Utc;
use strum_macros::Display;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::clock;
use crate::device::{Device, DeviceProvider, HciDeviceProvider};
use crate::registry::PeripheralRegistry;
use crate::sink::{DEFAULT_EXPORT_TIMEOUT, ExportFanout, Sink};
use crate::source::MeasurementSource;

pub use collect::{CollectOutcome, CollectSummary, DEFAULT_BUFFER_CAPACITY};
pub use error::ScannerError;
pub use session::{ScanSession, SessionReport};

/// Extra time `close` grants the scheduler beyond the export timeout.
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Scanner lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum ScannerState {
    Created,
    Initialized,
    Scanning,
    Stopped,
    Closed,
}

// =============================================================================
// Builder
// =============================================================================

/// Builder for [`Scanner`].
pub struct ScannerBuilder {
    registry: Arc<PeripheralRegistry>,
    source: Option<Arc<dyn MeasurementSource>>,
    provider: Option<Box<dyn DeviceProvider>>,
    sinks: Vec<Arc<dyn Sink>>,
    export_timeout: Duration,
    buffer_capacity: usize,
}

impl Default for ScannerBuilder {
    fn default() -> Self {
        Self {
            registry: Arc::new(PeripheralRegistry::any()),
            source: None,
            provider: None,
            sinks: Vec::new(),
            export_timeout: DEFAULT_EXPORT_TIMEOUT,
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
        }
    }
}

impl ScannerBuilder {
    /// Peripherals to wait for (default: accept any).
    pub fn registry(mut self, registry: impl Into<Arc<PeripheralRegistry>>) -> Self {
        self.registry = registry.into();
        self
    }

    /// Measurement source opened once per window. Required.
    pub fn source(mut self, source: Arc<dyn MeasurementSource>) -> Self {
        self.source = Some(source);
        self
    }

    /// Device provider used by [`Scanner::init`] (default: sysfs HCI adapters).
    pub fn device_provider(mut self, provider: Box<dyn DeviceProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Append a sink; sinks are exported to in insertion order.
    pub fn sink(mut self, sink: Arc<dyn Sink>) -> Self {
        self.sinks.push(sink);
        self
    }

    /// Append several sinks.
    pub fn sinks(mut self, sinks: impl IntoIterator<Item = Arc<dyn Sink>>) -> Self {
        self.sinks.extend(sinks);
        self
    }

    pub fn export_timeout(mut self, timeout: Duration) -> Self {
        self.export_timeout = timeout;
        self
    }

    pub fn buffer_capacity(mut self, capacity: usize) -> Self {
        self.buffer_capacity = capacity;
        self
    }

    pub fn build(self) -> Result<Scanner, ScannerError> {
        let source = self
            .source
            .ok_or_else(|| ScannerError::Config("a measurement source is required".into()))?;
        if self.buffer_capacity == 0 {
            return Err(ScannerError::Config(
                "buffer capacity must be positive".into(),
            ));
        }
        if self.export_timeout.is_zero() {
            return Err(ScannerError::Config(
                "export timeout must be positive".into(),
            ));
        }

        Ok(Scanner {
            inner: Arc::new(Inner {
                registry: self.registry,
                source,
                provider: self
                    .provider
                    .unwrap_or_else(|| Box::new(HciDeviceProvider::default())),
                fanout: ExportFanout::new(self.sinks, self.export_timeout),
                buffer_capacity: self.buffer_capacity,
                stop: CancellationToken::new(),
                stopped: AtomicBool::new(false),
                closed: AtomicBool::new(false),
                state: Mutex::new(ScannerState::Created),
                device: tokio::sync::Mutex::new(None),
                scheduler: Mutex::new(None),
            }),
        })
    }
}

// =============================================================================
// Scanner
// =============================================================================

struct Inner {
    registry: Arc<PeripheralRegistry>,
    source: Arc<dyn MeasurementSource>,
    provider: Box<dyn DeviceProvider>,
    fanout: ExportFanout,
    buffer_capacity: usize,
    stop: CancellationToken,
    stopped: AtomicBool,
    closed: AtomicBool,
    state: Mutex<ScannerState>,
    device: tokio::sync::Mutex<Option<Box<dyn Device>>>,
    scheduler: Mutex<Option<JoinHandle<()>>>,
}

impl Inner {
    fn state(&self) -> MutexGuard<'_, ScannerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn stop(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        self.stop.cancel();
        {
            let mut state = self.state();
            if *state != ScannerState::Closed {
                *state = ScannerState::Stopped;
            }
        }
        tracing::info!("Scanner stopped");
    }

    fn session(&self) -> ScanSession<'_> {
        ScanSession::new(
            self.source.as_ref(),
            &self.registry,
            &self.fanout,
            self.buffer_capacity,
        )
    }

    fn log_peripherals(&self) {
        if self.registry.is_empty() {
            tracing::info!("Scanning all nearby sensors");
            return;
        }
        for (addr, label) in self.registry.iter() {
            tracing::info!(addr, label, "Registered peripheral");
        }
    }
}

/// Clock-aligned, periodic scan scheduler.
pub struct Scanner {
    inner: Arc<Inner>,
}

impl Scanner {
    pub fn builder() -> ScannerBuilder {
        ScannerBuilder::default()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ScannerState {
        *self.inner.state()
    }

    pub fn registry(&self) -> &PeripheralRegistry {
        &self.inner.registry
    }

    /// Acquire the radio device named by `identifier`.
    ///
    /// A failed acquisition leaves the scanner in `Created` so it can be
    /// retried.
    pub async fn init(&self, identifier: &str) -> Result<(), ScannerError> {
        let identifier = identifier.trim();
        if identifier.is_empty() {
            tracing::error!("Device identifier must not be empty");
            return Err(ScannerError::Config(
                "device identifier must not be empty".into(),
            ));
        }

        let mut device = self.inner.device.lock().await;
        let state = self.state();
        if state != ScannerState::Created {
            return Err(ScannerError::InvalidState {
                operation: "init",
                state,
            });
        }

        let acquired = self
            .inner
            .provider
            .acquire(identifier)
            .await
            .inspect_err(|e| {
                tracing::error!(device = identifier, error = %e, "Failed to acquire device");
            })?;
        tracing::info!(device = acquired.id(), "Device acquired");
        *device = Some(acquired);
        {
            let mut state = self.inner.state();
            if *state == ScannerState::Created {
                *state = ScannerState::Initialized;
            }
        }

        self.inner.log_peripherals();
        Ok(())
    }

    /// Start the scheduler in the background and return immediately.
    ///
    /// Cancelling `parent` stops scanning and aborts an in-flight export.
    pub fn scan(&self, parent: CancellationToken, interval: Duration) -> Result<(), ScannerError> {
        if interval.is_zero() {
            tracing::error!("Scan interval must be positive");
            return Err(ScannerError::Config(
                "scan interval must be positive".into(),
            ));
        }

        {
            let mut state = self.inner.state();
            match *state {
                ScannerState::Initialized => *state = ScannerState::Scanning,
                ScannerState::Scanning => return Err(ScannerError::AlreadyScanning),
                other => {
                    return Err(ScannerError::InvalidState {
                        operation: "scan",
                        state: other,
                    });
                }
            }
        }

        let handle = tokio::spawn(run_scheduler(Arc::clone(&self.inner), parent, interval));
        *self
            .inner
            .scheduler
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(handle);
        Ok(())
    }

    /// Signal the scheduler to stop. Repeated calls are no-ops.
    pub fn stop(&self) {
        self.inner.stop();
    }

    /// Stop scanning, release the device and close every sink once.
    ///
    /// Failures are logged and never interrupt the remaining steps. A second
    /// call does nothing.
    pub async fn close(&self) {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            tracing::debug!("Scanner already closed");
            return;
        }

        self.inner.stop();

        let scheduler = self
            .inner
            .scheduler
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(mut handle) = scheduler {
            let grace = self.inner.fanout.timeout() + DEFAULT_SHUTDOWN_GRACE;
            match tokio::time::timeout(grace, &mut handle).await {
                Ok(Ok(())) => tracing::debug!("Scheduler finished"),
                Ok(Err(e)) => tracing::error!(error = %e, "Scheduler task failed"),
                Err(_) => {
                    tracing::warn!(?grace, "Scheduler did not finish in time, aborting");
                    handle.abort();
                }
            }
        }

        let device = self.inner.device.lock().await.take();
        if let Some(device) = device {
            match device.release().await {
                Ok(()) => tracing::info!(device = device.id(), "Device released"),
                Err(e) => {
                    tracing::error!(device = device.id(), error = %e, "Failed to release device");
                }
            }
        }

        let failures = self.inner.fanout.close_all().await;
        *self.inner.state() = ScannerState::Closed;
        tracing::info!(sink_close_failures = failures, "Scanner closed");
    }
}

impl Drop for Scanner {
    fn drop(&mut self) {
        self.inner.stop.cancel();
    }
}

impl std::fmt::Debug for Scanner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scanner")
            .field("state", &self.state())
            .field("peripherals", &self.inner.registry.len())
            .field("fanout", &self.inner.fanout)
            .finish_non_exhaustive()
    }
}

/// Wait for the first aligned boundary, then run one session per tick.
async fn run_scheduler(inner: Arc<Inner>, parent: CancellationToken, interval: Duration) {
    let now = Utc::now();
    let first_run = Instant::now() + clock::until_next_boundary(now, interval);
    tracing::info!(
        interval = %humantime::format_duration(interval),
        first_scan = %clock::next_boundary(now, interval),
        "Scan scheduled"
    );

    tokio::select! {
        biased;
        _ = parent.cancelled() => {
            tracing::debug!("Cancelled before the first scan");
            inner.stop();
            return;
        }
        _ = inner.stop.cancelled() => {
            inner.stop();
            return;
        }
        _ = tokio::time::sleep_until(first_run) => {}
    }

    let mut ticker = tokio::time::interval_at(first_run, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Burst);

    loop {
        tokio::select! {
            biased;
            _ = parent.cancelled() => break,
            _ = inner.stop.cancelled() => break,
            _ = ticker.tick() => {
                let report = inner.session().run(interval, &parent, &inner.stop).await;
                tracing::trace!(
                    outcome = %report.collect.outcome,
                    collected = report.collected,
                    exported = report.exported(),
                    "Scan session finished"
                );
            }
        }
    }

    inner.stop();
}

//! sensorscan - Clock-Aligned BLE Sensor Scanner
//!
//! This crate collects measurements broadcast by RuuviTag-style beacon
//! sensors in time-boxed windows aligned to the wall clock, and relays each
//! window's batch to a list of sinks. It can be used as a library, or run as
//! a standalone binary with the `sensorscan` executable.
//!
//! # Architecture
//!
//! - **Scanner**: lifecycle, clock-aligned scheduling and per-window sessions
//! - **Source**: cancellable measurement streams, fed by a JSON lines decoder feed
//! - **Registry**: expected peripherals; windows end early once all reported
//! - **Sinks**: console, HTTP, Graphite, InfluxDB, SQLite and PostgreSQL exporters
//! - **Device**: radio adapter acquisition and release
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use sensorscan::device::DetachedDeviceProvider;
//! use sensorscan::sink::console::ConsoleSink;
//! use sensorscan::source::BroadcastSource;
//! use sensorscan::{PeripheralRegistry, Scanner};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let registry = Arc::new(PeripheralRegistry::new([("CC:CA:7E:52:CC:34", "Backyard")]));
//!     let hub = BroadcastSource::new(Arc::clone(&registry), 1024);
//!
//!     let scanner = Scanner::builder()
//!         .registry(registry)
//!         .source(Arc::new(hub.clone()))
//!         .device_provider(Box::new(DetachedDeviceProvider))
//!         .sink(Arc::new(ConsoleSink::stdout()))
//!         .build()?;
//!
//!     let shutdown = CancellationToken::new();
//!     scanner.init("none").await?;
//!     scanner.scan(shutdown.clone(), Duration::from_secs(60))?;
//!
//!     // ... publish decoded measurements into `hub` ...
//!
//!     shutdown.cancel();
//!     scanner.close().await;
//!     Ok(())
//! }
//! ```

pub mod clock;
pub mod config;
pub mod device;
pub mod measurement;
pub mod registry;
pub mod scanner;
pub mod sink;
pub mod source;

pub use measurement::Measurement;
pub use registry::PeripheralRegistry;
pub use scanner::{Scanner, ScannerBuilder, ScannerError, ScannerState};
pub use sink::{Sink, SinkError};
pub use source::MeasurementSource;

//! Sink Layer
//!
//! Every sink implements the same batched contract: it receives the complete,
//! non-empty batch of one scan window in a single call and is closed exactly
//! once when the scanner shuts down.
//!
//! # Architecture
//!
//! - [`Sink`]: Core trait for export destinations
//! - [`ExportFanout`]: Sequential delivery of one batch to every sink
//! - [`console`], [`http`], [`graphite`], [`influxdb`], [`sqlite`], [`postgres`]: Implementations
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use sensorscan::sink::{ExportFanout, Sink, console::ConsoleSink};
//!
//! let sinks: Vec<Arc<dyn Sink>> = vec![Arc::new(ConsoleSink::stdout())];
//! let fanout = ExportFanout::new(sinks, Duration::from_secs(30));
//! ```

pub mod console;
mod fanout;
pub mod graphite;
pub mod http;
pub mod influxdb;
pub mod postgres;
mod sql;
pub mod sqlite;
mod traits;

pub use fanout::{DEFAULT_EXPORT_TIMEOUT, ExportError, ExportFanout};
pub use sql::is_valid_table_name;
pub use traits::{Sink, SinkError};

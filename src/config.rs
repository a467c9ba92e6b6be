//! Configuration module for sensorscan.
//!
//! Provides YAML-based configuration loading and validation for:
//! - Scanner settings (device, interval, export timeout, buffer capacity)
//! - Peripheral registry (address to friendly label)
//! - Measurement feed input
//! - Sink definitions (console, HTTP, Graphite, InfluxDB, SQLite, PostgreSQL)

mod app;
mod sinks;
mod validation;

pub use app::{AppConfig, ScannerConfig, SourceConfig};
pub use sinks::SinksConfig;
pub use validation::{ConfigError, expand_env_vars, parse_duration};

// Re-export constants
pub use app::{DEFAULT_CONFIG_FILE, DEFAULT_INTERVAL};

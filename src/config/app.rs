//! Application configuration structures.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::sinks::SinksConfig;
use super::validation::{ConfigError, require_non_empty, require_positive};
use crate::device::DEFAULT_DEVICE;
use crate::measurement::normalize_address;
use crate::registry::PeripheralRegistry;
use crate::scanner::DEFAULT_BUFFER_CAPACITY;
use crate::sink::DEFAULT_EXPORT_TIMEOUT;
use crate::source::{DEFAULT_HUB_CAPACITY, STDIN_INPUT};

// =============================================================================
// Constants
// =============================================================================

/// Default scan interval (60 seconds).
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(60);

/// Configuration file looked up in the working directory when none is given.
pub const DEFAULT_CONFIG_FILE: &str = "sensorscan.yaml";

fn default_device() -> String {
    DEFAULT_DEVICE.to_string()
}

fn default_interval() -> Duration {
    DEFAULT_INTERVAL
}

fn default_export_timeout() -> Duration {
    DEFAULT_EXPORT_TIMEOUT
}

fn default_buffer_capacity() -> usize {
    DEFAULT_BUFFER_CAPACITY
}

fn default_input() -> String {
    STDIN_INPUT.to_string()
}

fn default_hub_capacity() -> usize {
    DEFAULT_HUB_CAPACITY
}

// =============================================================================
// Scanner Configuration
// =============================================================================

/// Scheduler and collection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScannerConfig {
    /// Radio adapter identifier (default: "default"; "none" runs without one).
    #[serde(default = "default_device")]
    pub device: String,

    /// Scan interval; windows align to multiples of it (default: 60s).
    #[serde(default = "default_interval", with = "humantime_serde")]
    pub interval: Duration,

    /// Ceiling for exporting one batch to every sink (default: 30s).
    #[serde(default = "default_export_timeout", with = "humantime_serde")]
    pub export_timeout: Duration,

    /// Per-window record buffer; overflow is dropped (default: 128).
    #[serde(default = "default_buffer_capacity")]
    pub buffer_capacity: usize,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            device: default_device(),
            interval: DEFAULT_INTERVAL,
            export_timeout: DEFAULT_EXPORT_TIMEOUT,
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
        }
    }
}

// =============================================================================
// Source Configuration
// =============================================================================

/// Measurement feed settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Newline-delimited JSON input, a file path or "-" for stdin.
    #[serde(default = "default_input")]
    pub input: String,

    /// Capacity of the in-process broadcast hub (default: 1024).
    #[serde(default = "default_hub_capacity")]
    pub hub_capacity: usize,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            input: default_input(),
            hub_capacity: DEFAULT_HUB_CAPACITY,
        }
    }
}

// =============================================================================
// Application Configuration
// =============================================================================

/// Top-level application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub scanner: ScannerConfig,

    /// Peripheral address to friendly label. Empty accepts every sensor.
    #[serde(default)]
    pub peripherals: BTreeMap<String, String>,

    #[serde(default)]
    pub source: SourceConfig,

    #[serde(default)]
    pub sinks: SinksConfig,
}

impl AppConfig {
    /// Load configuration from a YAML file.
    ///
    /// # Errors
    /// Returns `ConfigError` if the file cannot be read, parsed, or validated.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&content)
    }

    /// Parse and validate configuration from YAML text.
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values.
    ///
    /// # Errors
    /// Returns `ConfigError::ValidationError` if any field is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        require_non_empty("scanner.device", &self.scanner.device)?;
        require_positive("scanner.interval", self.scanner.interval)?;
        require_positive("scanner.export_timeout", self.scanner.export_timeout)?;

        if self.scanner.buffer_capacity == 0 {
            return Err(ConfigError::invalid(
                "scanner.buffer_capacity must be positive",
            ));
        }

        require_non_empty("source.input", &self.source.input)?;
        if self.source.hub_capacity == 0 {
            return Err(ConfigError::invalid("source.hub_capacity must be positive"));
        }

        for addr in self.peripherals.keys() {
            if normalize_address(addr).is_empty() {
                return Err(ConfigError::invalid(
                    "peripherals: address must not be empty",
                ));
            }
        }

        self.sinks.validate()
    }

    /// Build the peripheral registry from the `peripherals` section.
    pub fn registry(&self) -> PeripheralRegistry {
        PeripheralRegistry::from(&self.peripherals)
    }
}

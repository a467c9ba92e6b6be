//! Measurement records produced by beacon sensors.
//!
//! A [`Measurement`] is one timestamped reading from one source address. It is
//! created once by a measurement source and never mutated afterwards; ownership
//! moves from the source into the collector buffer and then into the scan batch
//! that sinks borrow.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Number of numeric fields enumerated by [`Measurement::fields`].
pub const FIELD_COUNT: usize = 8;

/// One sensor observation.
///
/// The serialized shape is the wire format shared by every JSON-speaking sink
/// and by the JSON-lines input feed:
///
/// ```json
/// {"mac":"CC:CA:7E:52:CC:34","name":"Backyard","temperature":21.5,"humidity":60.0,
///  "pressure":1002.0,"battery":2950,"acceleration_x":0,"acceleration_y":0,
///  "acceleration_z":1000,"movement_counter":1,"ts":"2020-01-01T00:00:00Z"}
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    /// Source (MAC) address, normalized with [`normalize_address`].
    #[serde(rename = "mac")]
    pub addr: String,
    /// Friendly label from the peripheral registry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Temperature in degrees Celsius.
    #[serde(default)]
    pub temperature: f64,
    /// Relative humidity in percent.
    #[serde(default)]
    pub humidity: f64,
    /// Air pressure in hPa.
    #[serde(default)]
    pub pressure: f64,
    /// Battery voltage in millivolts.
    #[serde(default, rename = "battery")]
    pub battery_voltage: u16,
    /// Acceleration along the X axis in milli-g.
    #[serde(default)]
    pub acceleration_x: i32,
    /// Acceleration along the Y axis in milli-g.
    #[serde(default)]
    pub acceleration_y: i32,
    /// Acceleration along the Z axis in milli-g.
    #[serde(default)]
    pub acceleration_z: i32,
    /// Monotonic movement counter reported by the tag.
    #[serde(default)]
    pub movement_counter: u32,
    /// Capture timestamp (UTC).
    #[serde(default = "Utc::now")]
    pub ts: DateTime<Utc>,
}

impl Measurement {
    /// Create an empty reading for `addr` captured at `ts`.
    pub fn new(addr: impl AsRef<str>, ts: DateTime<Utc>) -> Self {
        Self {
            addr: normalize_address(addr.as_ref()),
            ts,
            ..Default::default()
        }
    }

    /// Attach a friendly label.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set temperature, humidity and pressure.
    #[must_use]
    pub fn with_climate(mut self, temperature: f64, humidity: f64, pressure: f64) -> Self {
        self.temperature = temperature;
        self.humidity = humidity;
        self.pressure = pressure;
        self
    }

    /// Set the three-axis acceleration.
    #[must_use]
    pub fn with_acceleration(mut self, x: i32, y: i32, z: i32) -> Self {
        self.acceleration_x = x;
        self.acceleration_y = y;
        self.acceleration_z = z;
        self
    }

    /// Set battery voltage and movement counter.
    #[must_use]
    pub fn with_status(mut self, battery_voltage: u16, movement_counter: u32) -> Self {
        self.battery_voltage = battery_voltage;
        self.movement_counter = movement_counter;
        self
    }

    /// Numeric fields exported by metric sinks, in name order.
    ///
    /// This is the only place that decides which readings leave the process
    /// as metrics; Graphite and InfluxDB encoders both iterate it.
    pub fn fields(&self) -> [(&'static str, f64); FIELD_COUNT] {
        [
            ("acceleration_x", f64::from(self.acceleration_x)),
            ("acceleration_y", f64::from(self.acceleration_y)),
            ("acceleration_z", f64::from(self.acceleration_z)),
            ("battery", f64::from(self.battery_voltage)),
            ("humidity", self.humidity),
            ("movement_counter", f64::from(self.movement_counter)),
            ("pressure", self.pressure),
            ("temperature", self.temperature),
        ]
    }

    /// Label or empty string, for sinks that always emit a name tag.
    pub fn label(&self) -> &str {
        self.name.as_deref().unwrap_or_default()
    }
}

/// Normalize a peripheral address.
///
/// Trims whitespace, accepts `-` as separator and upper-cases hex digits so
/// `cc-ca-7e-52-cc-34` and `CC:CA:7E:52:CC:34` compare equal.
pub fn normalize_address(addr: &str) -> String {
    addr.trim().replace('-', ":").to_ascii_uppercase()
}

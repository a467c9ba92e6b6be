//! InfluxDB sink using the v1 `/write` line protocol endpoint.

use std::time::Duration;

use influxdb_line_protocol::LineProtocolBuilder;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{Sink, SinkError};
use crate::config::expand_env_vars;
use crate::measurement::Measurement;

fn default_enabled() -> bool {
    true
}

fn default_measurement() -> String {
    super::graphite::DEFAULT_MEASUREMENT.to_string()
}

fn default_timeout() -> Duration {
    super::http::DEFAULT_TIMEOUT
}

/// Configuration for the InfluxDB sink.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InfluxSinkConfig {
    /// Enable this sink (default: true).
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Server address with protocol, host and port.
    pub url: String,
    /// Target database.
    pub database: String,
    /// Measurement name (default: "ruuvitag").
    #[serde(default = "default_measurement")]
    pub measurement: String,
    #[serde(default)]
    pub username: Option<String>,
    /// Password, supports `${VAR}` expansion.
    #[serde(default)]
    pub password: Option<String>,
    /// Request timeout (default: 10s).
    #[serde(default = "default_timeout", with = "humantime_serde")]
    pub timeout: Duration,
}

impl InfluxSinkConfig {
    pub fn new(url: impl Into<String>, database: impl Into<String>) -> Self {
        Self {
            enabled: true,
            url: url.into(),
            database: database.into(),
            measurement: default_measurement(),
            username: None,
            password: None,
            timeout: default_timeout(),
        }
    }
}

/// Encode a batch as line protocol, one line per measurement.
///
/// Tags are `mac` and (when labelled) `name`; fields come from
/// [`Measurement::fields`]; timestamps are nanoseconds.
pub fn encode_lines(batch: &[Measurement], measurement: &str) -> String {
    let mut builder = LineProtocolBuilder::new();

    for m in batch {
        let mut line = builder.measurement(measurement).tag("mac", &m.addr);
        if let Some(name) = m.name.as_deref().filter(|n| !n.is_empty()) {
            line = line.tag("name", name);
        }

        let [(first_key, first_value), rest @ ..] = m.fields();
        let mut line = line.field(first_key, first_value);
        for (key, value) in rest {
            line = line.field(key, value);
        }

        let ts = m.ts.timestamp_nanos_opt().unwrap_or_default();
        builder = line.timestamp(ts).close_line();
    }

    String::from_utf8_lossy(&builder.build()).into_owned()
}

/// Writes batches to InfluxDB.
pub struct InfluxSink {
    client: Client,
    write_url: String,
    database: String,
    measurement: String,
    credentials: Option<(String, Option<String>)>,
    name: String,
}

impl InfluxSink {
    pub fn new(config: &InfluxSinkConfig) -> Result<Self, SinkError> {
        let client = Client::builder().timeout(config.timeout).build()?;
        let password = config.password.as_deref().map(expand_env_vars);
        let credentials = config.username.clone().map(|user| (user, password));
        Ok(Self {
            client,
            write_url: format!("{}/write", config.url.trim_end_matches('/')),
            database: config.database.clone(),
            measurement: config.measurement.clone(),
            credentials,
            name: format!("InfluxDB ({})", config.url),
        })
    }
}

impl std::fmt::Debug for InfluxSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InfluxSink")
            .field("write_url", &self.write_url)
            .field("database", &self.database)
            .field("measurement", &self.measurement)
            .finish_non_exhaustive()
    }
}

#[async_trait::async_trait]
impl Sink for InfluxSink {
    fn name(&self) -> &str {
        &self.name
    }

    async fn export(&self, batch: &[Measurement]) -> Result<(), SinkError> {
        if batch.is_empty() {
            return Err(SinkError::NoMeasurements);
        }
        let body = encode_lines(batch, &self.measurement);
        let mut request = self
            .client
            .post(&self.write_url)
            .query(&[("db", self.database.as_str()), ("precision", "ns")])
            .body(body);
        if let Some((user, password)) = &self.credentials {
            request = request.basic_auth(user, password.as_ref());
        }
        let response = request.send().await?;
        SinkError::check_status(&response)
    }

    async fn close(&self) -> Result<(), SinkError> {
        Ok(())
    }
}

//! Graphite sink (Grafana Cloud style JSON metrics API).
//!
//! Every measurement becomes one metric per exported field, named
//! `<measurement>.<field>` and tagged with the peripheral label and address.
//! Timestamps are truncated to the scan interval so metrics from one window
//! share a timestamp.

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{Sink, SinkError};
use crate::clock;
use crate::config::expand_env_vars;
use crate::measurement::Measurement;

/// Default metric prefix.
pub const DEFAULT_MEASUREMENT: &str = "ruuvitag";

/// Smallest interval reported to Graphite.
pub const MIN_INTERVAL: Duration = Duration::from_secs(1);

fn default_enabled() -> bool {
    true
}

fn default_measurement() -> String {
    DEFAULT_MEASUREMENT.to_string()
}

fn default_timeout() -> Duration {
    super::http::DEFAULT_TIMEOUT
}

/// Configuration for the Graphite sink.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphiteSinkConfig {
    /// Enable this sink (default: true).
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Metrics API URL.
    pub url: String,
    /// Organization (instance) ID.
    #[serde(default)]
    pub org: String,
    /// API token, supports `${VAR}` expansion.
    #[serde(default)]
    pub token: Option<String>,
    /// Metric prefix (default: "ruuvitag").
    #[serde(default = "default_measurement")]
    pub measurement: String,
    /// Request timeout (default: 10s).
    #[serde(default = "default_timeout", with = "humantime_serde")]
    pub timeout: Duration,
}

impl GraphiteSinkConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            enabled: true,
            url: url.into(),
            org: String::new(),
            token: None,
            measurement: default_measurement(),
            timeout: default_timeout(),
        }
    }
}

/// One Graphite data point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphiteMetric {
    /// Unix seconds, truncated to the interval.
    #[serde(rename = "time")]
    pub timestamp: i64,
    pub name: String,
    /// Interval in seconds.
    pub interval: u64,
    pub value: f64,
    pub tags: Vec<String>,
}

/// Convert one measurement into Graphite metrics, ordered by field name.
pub fn convert(measurement: &Measurement, prefix: &str, interval: Duration) -> Vec<GraphiteMetric> {
    let timestamp = clock::truncate(measurement.ts, interval).timestamp();
    let tags = vec![
        format!("name={}", measurement.label()),
        format!("mac={}", measurement.addr),
    ];
    measurement
        .fields()
        .into_iter()
        .map(|(field, value)| GraphiteMetric {
            timestamp,
            name: format!("{prefix}.{field}"),
            interval: interval.as_secs(),
            value,
            tags: tags.clone(),
        })
        .collect()
}

/// Sends batches to a Graphite metrics endpoint.
pub struct GraphiteSink {
    client: Client,
    url: String,
    api_key: Option<String>,
    measurement: String,
    interval: Duration,
    name: String,
}

impl GraphiteSink {
    /// Create a sink; `interval` is the scan interval, floored at one second.
    pub fn new(config: &GraphiteSinkConfig, interval: Duration) -> Result<Self, SinkError> {
        let client = Client::builder().timeout(config.timeout).build()?;
        let api_key = config
            .token
            .as_deref()
            .map(expand_env_vars)
            .filter(|t| !t.is_empty())
            .map(|token| format!("{}:{}", config.org, token));
        Ok(Self {
            client,
            url: config.url.clone(),
            api_key,
            measurement: config.measurement.clone(),
            interval: interval.max(MIN_INTERVAL),
            name: format!("Graphite ({})", config.url),
        })
    }
}

impl std::fmt::Debug for GraphiteSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphiteSink")
            .field("url", &self.url)
            .field("measurement", &self.measurement)
            .field("interval", &self.interval)
            .finish_non_exhaustive()
    }
}

#[async_trait::async_trait]
impl Sink for GraphiteSink {
    fn name(&self) -> &str {
        &self.name
    }

    async fn export(&self, batch: &[Measurement]) -> Result<(), SinkError> {
        if batch.is_empty() {
            return Err(SinkError::NoMeasurements);
        }
        let metrics: Vec<GraphiteMetric> = batch
            .iter()
            .flat_map(|m| convert(m, &self.measurement, self.interval))
            .collect();

        let mut request = self.client.post(&self.url).json(&metrics);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        let response = request.send().await?;
        SinkError::check_status(&response)
    }

    async fn close(&self) -> Result<(), SinkError> {
        Ok(())
    }
}

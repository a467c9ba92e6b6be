//! Sink sections of the configuration file.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::validation::{ConfigError, require_http_url, require_non_empty, require_positive};
use crate::sink::console::{ConsoleSink, ConsoleSinkConfig};
use crate::sink::graphite::{GraphiteSink, GraphiteSinkConfig};
use crate::sink::http::{HttpSink, HttpSinkConfig};
use crate::sink::influxdb::{InfluxSink, InfluxSinkConfig};
use crate::sink::postgres::{PostgresSink, PostgresSinkConfig};
use crate::sink::sqlite::{SqliteSink, SqliteSinkConfig};
use crate::sink::{Sink, SinkError, is_valid_table_name};

/// Sink configurations. A missing or disabled section adds no sink.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SinksConfig {
    pub console: Option<ConsoleSinkConfig>,
    pub influxdb: Option<InfluxSinkConfig>,
    pub graphite: Option<GraphiteSinkConfig>,
    pub sqlite: Option<SqliteSinkConfig>,
    pub postgres: Option<PostgresSinkConfig>,
    pub http: Option<HttpSinkConfig>,
}

impl SinksConfig {
    /// Number of enabled sinks.
    pub fn enabled_count(&self) -> usize {
        [
            self.console.as_ref().is_some_and(|c| c.enabled),
            self.influxdb.as_ref().is_some_and(|c| c.enabled),
            self.graphite.as_ref().is_some_and(|c| c.enabled),
            self.sqlite.as_ref().is_some_and(|c| c.enabled),
            self.postgres.as_ref().is_some_and(|c| c.enabled),
            self.http.as_ref().is_some_and(|c| c.enabled),
        ]
        .into_iter()
        .filter(|enabled| *enabled)
        .count()
    }

    /// Validate every enabled sink section.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(influx) = self.influxdb.as_ref().filter(|c| c.enabled) {
            require_http_url("sinks.influxdb.url", &influx.url)?;
            require_non_empty("sinks.influxdb.database", &influx.database)?;
            require_non_empty("sinks.influxdb.measurement", &influx.measurement)?;
            require_positive("sinks.influxdb.timeout", influx.timeout)?;
        }

        if let Some(graphite) = self.graphite.as_ref().filter(|c| c.enabled) {
            require_http_url("sinks.graphite.url", &graphite.url)?;
            require_non_empty("sinks.graphite.measurement", &graphite.measurement)?;
            require_positive("sinks.graphite.timeout", graphite.timeout)?;
        }

        if let Some(sqlite) = self.sqlite.as_ref().filter(|c| c.enabled) {
            require_non_empty("sinks.sqlite.url", &sqlite.url)?;
            require_table_name("sinks.sqlite.table", &sqlite.table)?;
        }

        if let Some(postgres) = self.postgres.as_ref().filter(|c| c.enabled) {
            require_non_empty("sinks.postgres.url", &postgres.url)?;
            require_table_name("sinks.postgres.table", &postgres.table)?;
            require_positive("sinks.postgres.connect_timeout", postgres.connect_timeout)?;
        }

        if let Some(http) = self.http.as_ref().filter(|c| c.enabled) {
            require_http_url("sinks.http.url", &http.url)?;
            require_positive("sinks.http.timeout", http.timeout)?;
        }

        Ok(())
    }

    /// Construct the enabled sinks in export order.
    ///
    /// `interval` is the scan interval, used by sinks that stamp metrics with it.
    pub async fn build(&self, interval: Duration) -> Result<Vec<Arc<dyn Sink>>, SinkError> {
        let mut sinks: Vec<Arc<dyn Sink>> = Vec::with_capacity(self.enabled_count());

        if self.console.as_ref().is_some_and(|c| c.enabled) {
            sinks.push(Arc::new(ConsoleSink::stdout()));
        }
        if let Some(influx) = self.influxdb.as_ref().filter(|c| c.enabled) {
            sinks.push(Arc::new(InfluxSink::new(influx)?));
        }
        if let Some(graphite) = self.graphite.as_ref().filter(|c| c.enabled) {
            sinks.push(Arc::new(GraphiteSink::new(graphite, interval)?));
        }
        if let Some(sqlite) = self.sqlite.as_ref().filter(|c| c.enabled) {
            sinks.push(Arc::new(SqliteSink::connect(sqlite).await?));
        }
        if let Some(postgres) = self.postgres.as_ref().filter(|c| c.enabled) {
            sinks.push(Arc::new(PostgresSink::connect(postgres).await?));
        }
        if let Some(http) = self.http.as_ref().filter(|c| c.enabled) {
            sinks.push(Arc::new(HttpSink::new(http)?));
        }

        for sink in &sinks {
            tracing::info!(sink = sink.name(), "Sink enabled");
        }
        Ok(sinks)
    }
}

fn require_table_name(field: &str, table: &str) -> Result<(), ConfigError> {
    if is_valid_table_name(table) {
        Ok(())
    } else {
        Err(ConfigError::invalid(format!(
            "{field}: invalid table name '{table}'"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_sinks_section() {
        let config: SinksConfig = serde_yaml::from_str("{}").unwrap();
        assert_eq!(config.enabled_count(), 0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_disabled_sections_are_not_validated() {
        let yaml = r#"
console: {}
http:
  enabled: false
  url: "not a url"
"#;
        let config: SinksConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.enabled_count(), 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_sections() {
        let yaml = "influxdb:\n  url: http://localhost:8086\n  database: \"\"\n";
        let config: SinksConfig = serde_yaml::from_str(yaml).unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("sinks.influxdb.database"));

        let yaml = "sqlite:\n  table: \"x; DROP\"\n";
        let config: SinksConfig = serde_yaml::from_str(yaml).unwrap();
        assert!(config.validate().is_err());

        let yaml = "postgres:\n  url: postgres://localhost/ruuvi\n  table: public.readings\n";
        let config: SinksConfig = serde_yaml::from_str(yaml).unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("sinks.postgres.table"));

        let yaml = "graphite:\n  url: localhost\n";
        let config: SinksConfig = serde_yaml::from_str(yaml).unwrap();
        assert!(config.validate().is_err());
    }

    #[tokio::test]
    async fn test_build_preserves_order() {
        let yaml = r#"
http:
  url: http://127.0.0.1:9/ingest
graphite:
  url: http://127.0.0.1:9/metrics
console: {}
"#;
        let config: SinksConfig = serde_yaml::from_str(yaml).unwrap();
        config.validate().unwrap();

        let sinks = config.build(Duration::from_secs(60)).await.unwrap();
        let names: Vec<_> = sinks.iter().map(|s| s.name().to_string()).collect();
        assert_eq!(
            names,
            vec![
                "Console",
                "Graphite (http://127.0.0.1:9/metrics)",
                "HTTP (http://127.0.0.1:9/ingest)",
            ]
        );
    }
}

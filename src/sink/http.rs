//! HTTP sink: POSTs each batch as a JSON array.

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{Sink, SinkError};
use crate::config::expand_env_vars;
use crate::measurement::Measurement;

/// Default request timeout (10 seconds).
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

fn default_enabled() -> bool {
    true
}

fn default_timeout() -> Duration {
    DEFAULT_TIMEOUT
}

/// Configuration for the HTTP receiver sink.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpSinkConfig {
    /// Enable this sink (default: true).
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Receiver URL.
    pub url: String,
    /// Bearer token, supports `${VAR}` expansion.
    #[serde(default)]
    pub token: Option<String>,
    /// Request timeout (default: 10s).
    #[serde(default = "default_timeout", with = "humantime_serde")]
    pub timeout: Duration,
}

impl HttpSinkConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            enabled: true,
            url: url.into(),
            token: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Set the bearer token.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

}

/// Sends batches to a JSON HTTP receiver.
pub struct HttpSink {
    client: Client,
    url: String,
    token: Option<String>,
    name: String,
}

impl HttpSink {
    pub fn new(config: &HttpSinkConfig) -> Result<Self, SinkError> {
        let client = Client::builder().timeout(config.timeout).build()?;
        let token = config
            .token
            .as_deref()
            .map(expand_env_vars)
            .filter(|t| !t.is_empty());
        Ok(Self {
            client,
            url: config.url.clone(),
            token,
            name: format!("HTTP ({})", config.url),
        })
    }
}

impl std::fmt::Debug for HttpSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpSink")
            .field("url", &self.url)
            .field("has_token", &self.token.is_some())
            .finish_non_exhaustive()
    }
}

#[async_trait::async_trait]
impl Sink for HttpSink {
    fn name(&self) -> &str {
        &self.name
    }

    async fn export(&self, batch: &[Measurement]) -> Result<(), SinkError> {
        if batch.is_empty() {
            return Err(SinkError::NoMeasurements);
        }
        let mut request = self.client.post(&self.url).json(batch);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        let response = request.send().await?;
        SinkError::check_status(&response)
    }

    async fn close(&self) -> Result<(), SinkError> {
        Ok(())
    }
}

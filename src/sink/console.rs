//! Console sink: pretty-printed JSON per measurement.

use std::io::Write;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

use super::{Sink, SinkError};
use crate::measurement::Measurement;

fn default_enabled() -> bool {
    true
}

/// Configuration for the console sink.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsoleSinkConfig {
    /// Enable this sink (default: true).
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl Default for ConsoleSinkConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

type SharedWriter = Arc<Mutex<Box<dyn Write + Send>>>;

/// Writes each measurement of a batch as indented JSON.
///
/// Writes run on the blocking pool; the writer may be a terminal or pipe.
pub struct ConsoleSink {
    out: SharedWriter,
}

impl ConsoleSink {
    /// Sink writing to standard output.
    pub fn stdout() -> Self {
        Self::with_writer(std::io::stdout())
    }

    /// Sink writing to an arbitrary writer.
    pub fn with_writer(writer: impl Write + Send + 'static) -> Self {
        Self {
            out: Arc::new(Mutex::new(Box::new(writer))),
        }
    }
}

impl std::fmt::Debug for ConsoleSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsoleSink").finish_non_exhaustive()
    }
}

#[async_trait::async_trait]
impl Sink for ConsoleSink {
    fn name(&self) -> &str {
        "Console"
    }

    async fn export(&self, batch: &[Measurement]) -> Result<(), SinkError> {
        if batch.is_empty() {
            return Err(SinkError::NoMeasurements);
        }
        let mut text = Vec::new();
        for measurement in batch {
            serde_json::to_writer_pretty(&mut text, measurement)?;
            text.push(b'\n');
        }
        write_blocking(&self.out, text).await
    }

    async fn close(&self) -> Result<(), SinkError> {
        write_blocking(&self.out, Vec::new()).await
    }
}

/// Write `bytes` and flush on the blocking pool.
async fn write_blocking(out: &SharedWriter, bytes: Vec<u8>) -> Result<(), SinkError> {
    let out = Arc::clone(out);
    tokio::task::spawn_blocking(move || {
        let mut out = out
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        out.write_all(&bytes)?;
        out.flush()
    })
    .await
    .map_err(std::io::Error::other)??;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_console_prints_every_measurement() {
        let buf = SharedBuf::default();
        let sink = ConsoleSink::with_writer(buf.clone());
        let batch = vec![
            Measurement::new("AA:BB", Utc::now()).with_name("Kitchen"),
            Measurement::new("CC:DD", Utc::now()),
        ];

        sink.export(&batch).await.unwrap();
        sink.close().await.unwrap();

        let text = String::from_utf8(buf.0.lock().unwrap().clone()).unwrap();
        assert!(text.contains(r#""mac": "AA:BB""#));
        assert!(text.contains(r#""name": "Kitchen""#));
        assert!(text.contains(r#""mac": "CC:DD""#));
    }

    #[tokio::test]
    async fn test_console_rejects_empty_batch() {
        let sink = ConsoleSink::with_writer(SharedBuf::default());
        assert!(matches!(
            sink.export(&[]).await,
            Err(SinkError::NoMeasurements)
        ));
    }

    #[derive(Clone, Default)]
    struct FlushCounter(Arc<Mutex<usize>>);

    impl Write for FlushCounter {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            *self.0.lock().unwrap() += 1;
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_console_flushes_on_export_and_close() {
        let flushes = FlushCounter::default();
        let sink = ConsoleSink::with_writer(flushes.clone());

        sink.export(&[Measurement::new("AA:BB", Utc::now())])
            .await
            .unwrap();
        sink.close().await.unwrap();

        assert_eq!(*flushes.0.lock().unwrap(), 2);
    }

    #[test]
    fn test_console_config_defaults() {
        let config: ConsoleSinkConfig = serde_yaml::from_str("{}").unwrap();
        assert!(config.enabled);
    }
}

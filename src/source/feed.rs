//! Newline-delimited JSON feed.
//!
//! Decoding manufacturer advertisement payloads is left to an external
//! decoder; this feed reads its already-decoded output (one JSON
//! [`Measurement`] per line) and publishes it into a [`BroadcastSource`].

use std::path::Path;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;

use super::BroadcastSource;
use crate::measurement::Measurement;

/// Input path meaning "read standard input".
pub const STDIN_INPUT: &str = "-";

/// Counters reported when a feed finishes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FeedStats {
    /// Lines decoded and published.
    pub published: usize,
    /// Lines that failed to parse.
    pub malformed: usize,
}

/// Reads JSON measurement lines and publishes them to a hub.
pub struct JsonLinesFeed<R> {
    reader: R,
    hub: BroadcastSource,
}

impl<R> JsonLinesFeed<R>
where
    R: AsyncBufRead + Unpin + Send,
{
    pub fn new(reader: R, hub: BroadcastSource) -> Self {
        Self { reader, hub }
    }

    /// Pump lines until end of input or cancellation.
    pub async fn run(self, cancel: CancellationToken) -> std::io::Result<FeedStats> {
        let mut stats = FeedStats::default();
        let mut lines = self.reader.lines();

        loop {
            let line = tokio::select! {
                _ = cancel.cancelled() => break,
                line = lines.next_line() => line?,
            };
            let Some(line) = line else {
                tracing::info!(
                    published = stats.published,
                    "Measurement feed reached end of input"
                );
                break;
            };
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            match serde_json::from_str::<Measurement>(line) {
                Ok(measurement) => {
                    let receivers = self.hub.publish(measurement);
                    tracing::trace!(receivers, "Published measurement");
                    stats.published += 1;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Skipping malformed measurement line");
                    stats.malformed += 1;
                }
            }
        }

        Ok(stats)
    }
}

impl JsonLinesFeed<BufReader<Box<dyn tokio::io::AsyncRead + Unpin + Send>>> {
    /// Open `input` (a file path, or `-` for stdin).
    pub async fn open(input: &str, hub: BroadcastSource) -> std::io::Result<Self> {
        let reader: Box<dyn tokio::io::AsyncRead + Unpin + Send> = if input == STDIN_INPUT {
            Box::new(tokio::io::stdin())
        } else {
            Box::new(tokio::fs::File::open(Path::new(input)).await?)
        };
        Ok(Self::new(BufReader::new(reader), hub))
    }
}

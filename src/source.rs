//! Measurement sources.
//!
//! A source turns radio advertisements into [`Measurement`] records for one
//! bounded scan window. The scanner opens the source once per window and
//! drops the stream when the window ends; cancelling the token handed to
//! [`MeasurementSource::open`] must end the stream promptly.
//!
//! - [`BroadcastSource`]: in-process hub other tasks publish decoded records into
//! - [`JsonLinesFeed`]: pumps newline-delimited JSON records into a hub

mod broadcast;
mod feed;

use futures::stream::BoxStream;
use tokio_util::sync::CancellationToken;

use crate::measurement::Measurement;

pub use broadcast::{BroadcastSource, DEFAULT_HUB_CAPACITY};
pub use feed::{FeedStats, JsonLinesFeed, STDIN_INPUT};

/// Producer of measurement records for a cancellable window.
///
/// Records must already be filtered by the peripheral registry when it is
/// non-empty.
pub trait MeasurementSource: Send + Sync + 'static {
    /// Open a stream that ends once `cancel` fires or the producer stops.
    fn open(&self, cancel: CancellationToken) -> BoxStream<'static, Measurement>;
}

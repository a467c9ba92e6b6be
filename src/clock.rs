//! Wall-clock alignment helpers.
//!
//! Boundaries are multiples of the interval counted from the Unix epoch, so
//! every instance scanning on a 10 minute interval wakes at :00, :10, :20...

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};

const NANOS_PER_SEC: i128 = 1_000_000_000;

fn epoch_nanos(ts: DateTime<Utc>) -> i128 {
    i128::from(ts.timestamp()) * NANOS_PER_SEC + i128::from(ts.timestamp_subsec_nanos())
}

fn interval_nanos(interval: Duration) -> i128 {
    i128::try_from(interval.as_nanos()).unwrap_or(i128::MAX)
}

/// Time from `now` until the next boundary aligned to `interval`.
///
/// When `now` sits exactly on a boundary the result is a full interval, so the
/// returned delay is always in `(0, interval]`. A zero interval yields zero.
pub fn until_next_boundary(now: DateTime<Utc>, interval: Duration) -> Duration {
    let step = interval_nanos(interval);
    if step == 0 {
        return Duration::ZERO;
    }
    let remainder = epoch_nanos(now).rem_euclid(step);
    let delay = step - remainder;
    Duration::from_nanos(u64::try_from(delay).unwrap_or(u64::MAX))
}

/// The next boundary aligned to `interval`, strictly after `now`.
pub fn next_boundary(now: DateTime<Utc>, interval: Duration) -> DateTime<Utc> {
    let delay = until_next_boundary(now, interval);
    TimeDelta::from_std(delay)
        .ok()
        .and_then(|delta| now.checked_add_signed(delta))
        .unwrap_or(now)
}

/// Round `ts` down to the boundary aligned to `interval`.
pub fn truncate(ts: DateTime<Utc>, interval: Duration) -> DateTime<Utc> {
    let step = interval_nanos(interval);
    if step == 0 {
        return ts;
    }
    let nanos = epoch_nanos(ts);
    let aligned = nanos - nanos.rem_euclid(step);
    let secs = aligned.div_euclid(NANOS_PER_SEC);
    let sub = aligned.rem_euclid(NANOS_PER_SEC);
    i64::try_from(secs)
        .ok()
        .and_then(|secs| DateTime::from_timestamp(secs, sub as u32))
        .unwrap_or(ts)
}

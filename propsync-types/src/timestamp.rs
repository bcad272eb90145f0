//! Wall-clock timestamps at storage precision.
//!
//! Timestamps are persisted as integer microseconds, so everything the core
//! stamps is truncated to microseconds up front. A record loaded back from
//! storage then compares equal to the in-memory value it was written from.

use chrono::{DateTime, Utc};

/// Returns the current time truncated to microsecond precision.
#[must_use]
pub fn now_utc() -> DateTime<Utc> {
    let now = Utc::now();
    DateTime::from_timestamp_micros(now.timestamp_micros()).unwrap_or(now)
}

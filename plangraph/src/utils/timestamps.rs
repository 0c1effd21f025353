//! Epoch-millisecond timestamp helpers.
//!
//! Documents store timestamps as milliseconds since the Unix epoch, the
//! way the orchestration engine emits them.

use chrono::{DateTime, TimeZone, Utc};
use std::time::Duration;

/// Milliseconds since the Unix epoch.
pub type EpochMillis = i64;

/// Returns the current UTC time in epoch milliseconds.
#[must_use]
pub fn now_millis() -> EpochMillis {
    Utc::now().timestamp_millis()
}

/// Returns the epoch-millisecond instant `ttl` after `from`.
#[must_use]
pub fn expiry_after(from: EpochMillis, ttl: Duration) -> EpochMillis {
    let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
    from.saturating_add(ttl_ms)
}

/// Converts epoch milliseconds into a UTC datetime.
#[must_use]
pub fn to_datetime(millis: EpochMillis) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(millis).single()
}

/// Formats epoch milliseconds as an RFC 3339 string for logs.
#[must_use]
pub fn format_millis(millis: EpochMillis) -> String {
    to_datetime(millis).map_or_else(|| millis.to_string(), |dt| dt.to_rfc3339())
}

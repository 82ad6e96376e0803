//! Timestamp and duration parsing shared by records, queries, and GC.

use crate::clock::to_delta;
use crate::error::{Error, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;
use std::time::Duration;

/// Render a timestamp the way records store it: RFC 3339, UTC, milliseconds.
///
/// ```
/// use chrono::{TimeZone, Utc};
///
/// let t = Utc.timestamp_millis_opt(1_700_000_000_123).unwrap();
/// assert_eq!(sdb::time::format_timestamp(t), "2023-11-14T22:13:20.123Z");
/// ```
pub fn format_timestamp(time: DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parse a stored timestamp value.
///
/// Accepts any RFC 3339 string, or an integer number of milliseconds since
/// the Unix epoch. Anything else is `None`.
pub fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => DateTime::parse_from_rfc3339(s.trim())
            .ok()
            .map(|t| t.with_timezone(&Utc)),
        Value::Number(n) => n
            .as_i64()
            .and_then(|ms| DateTime::<Utc>::from_timestamp_millis(ms)),
        _ => None,
    }
}

/// Parse a human duration such as `30m`, `24h`, `7d` or `0s`.
///
/// `what` names the input in the error (`"duration"`, `"window"`, ...).
pub fn parse_duration(what: &'static str, input: &str) -> Result<Duration> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(Error::invalid_input(what, "duration must not be empty"));
    }
    humantime::parse_duration(trimmed)
        .map_err(|e| Error::invalid_input(what, format!("{trimmed:?}: {e}")))
}

/// `now - duration`, clamped to the earliest representable time.
pub fn cutoff(now: DateTime<Utc>, duration: Duration) -> DateTime<Utc> {
    now.checked_sub_signed(to_delta(duration))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

//! Timestamp utilities

use chrono::{DateTime, Datelike, SecondsFormat, Utc};

use crate::{Error, Result};

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// True when both timestamps fall in the same (year, month)
pub fn same_calendar_month(a: DateTime<Utc>, b: DateTime<Utc>) -> bool {
    (a.year(), a.month()) == (b.year(), b.month())
}

/// Format a timestamp for storage
///
/// Fixed-width RFC 3339 in UTC, so stored values sort chronologically as text.
pub fn to_db(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse a stored RFC 3339 timestamp
pub fn from_db(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Internal(format!("Invalid stored timestamp '{}': {}", value, e)))
}

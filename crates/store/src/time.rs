//! Timestamp codec
//!
//! Timestamps are stored as canonical RFC 3339 text with microsecond
//! precision, the same form the signature digest consumes.

use chrono::{DateTime, Utc};
use esign_core::canonical_timestamp;

use crate::error::StoreError;

pub fn to_db(ts: &DateTime<Utc>) -> String {
    canonical_timestamp(ts)
}

pub fn opt_to_db(ts: &Option<DateTime<Utc>>) -> Option<String> {
    ts.as_ref().map(to_db)
}

pub fn from_db(table: &'static str, raw: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::corrupt(table, format!("invalid timestamp '{}': {}", raw, e)))
}

pub fn opt_from_db(
    table: &'static str,
    raw: Option<String>,
) -> Result<Option<DateTime<Utc>>, StoreError> {
    raw.map(|s| from_db(table, &s)).transpose()
}

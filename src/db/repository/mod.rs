//! Repository layer: table-scoped operations over a borrowed `Connection`.
//!
//! Functions take `&Connection` so callers can run several of them inside one
//! transaction (`rusqlite::Transaction` derefs to `Connection`).

mod document;
mod processing_log;
mod stats;
mod trigger;

use chrono::{DateTime, SecondsFormat, Utc};

use super::DatabaseError;

pub use document::*;
pub use processing_log::*;
pub use stats::*;
pub use trigger::*;

/// Timestamps are stored as fixed-width RFC 3339 UTC text with milliseconds,
/// so lexical order in SQL matches chronological order.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn now_timestamp() -> String {
    format_timestamp(&Utc::now())
}

pub(crate) fn parse_timestamp(column: &str, value: &str) -> Result<DateTime<Utc>, DatabaseError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| DatabaseError::InvalidTimestamp {
            column: column.into(),
            value: value.into(),
        })
}

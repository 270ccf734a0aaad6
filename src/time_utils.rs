// SPDX-License-Identifier: MIT

//! Shared helpers for date/time handling.

use chrono::{DateTime, FixedOffset, NaiveDate, SecondsFormat, Timelike, Utc};

/// Format a UTC timestamp as RFC3339 with millisecond precision and `Z` suffix.
///
/// Commute documents store dates in this exact shape; the fixed width keeps
/// lexicographic and chronological order identical, which the listing
/// queries and pagination cursors rely on.
pub fn format_utc_rfc3339(date: DateTime<Utc>) -> String {
    date.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Build a `FixedOffset` from a client-supplied offset in minutes east of UTC.
///
/// Offsets beyond the valid range fall back to UTC.
pub fn offset_from_minutes(minutes: i32) -> FixedOffset {
    minutes
        .checked_mul(60)
        .and_then(FixedOffset::east_opt)
        .unwrap_or_else(|| FixedOffset::east_opt(0).expect("zero offset is valid"))
}

/// Calendar date of a timestamp in the given local offset.
pub fn local_day(ts: DateTime<Utc>, offset: FixedOffset) -> NaiveDate {
    ts.with_timezone(&offset).date_naive()
}

/// Hour-of-day (0-23) of a timestamp in the given local offset.
pub fn local_hour(ts: DateTime<Utc>, offset: FixedOffset) -> u32 {
    ts.with_timezone(&offset).hour()
}

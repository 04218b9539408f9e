//! One-GM-per-UTC-day gate.
//!
//! Eligibility compares UTC calendar dates only. Elapsed time is irrelevant:
//! a GM at 23:59 UTC followed by one at 00:01 UTC the next day is allowed.

use chrono::{DateTime, NaiveDate, Utc};

/// UTC calendar date of an instant.
pub fn utc_day(instant: DateTime<Utc>) -> NaiveDate {
    instant.date_naive()
}

/// Whether a new GM may be submitted at `now`.
pub fn can_submit(now: DateTime<Utc>, last_gm: Option<DateTime<Utc>>) -> bool {
    match last_gm {
        None => true,
        Some(last) => utc_day(now) > utc_day(last),
    }
}

/// Lazy day rollover of a cached timestamp.
///
/// Returns `None` when the cached GM belongs to an earlier UTC day than `now`,
/// otherwise the cached value unchanged. Must run before eligibility is shown.
pub fn rollover(now: DateTime<Utc>, cached: Option<DateTime<Utc>>) -> Option<DateTime<Utc>> {
    cached.filter(|last| utc_day(*last) >= utc_day(now))
}

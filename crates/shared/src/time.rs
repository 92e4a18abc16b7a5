//! UTC calendar helpers.
//!
//! All day arithmetic in the backend is done on UTC calendar dates so that
//! clients in different time zones agree on what "today" means.

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};

/// Returns the UTC calendar date of a timestamp.
pub fn utc_day(at: DateTime<Utc>) -> NaiveDate {
    at.date_naive()
}

/// Returns the first instant of the UTC day containing `at`.
pub fn start_of_utc_day(at: DateTime<Utc>) -> DateTime<Utc> {
    at.date_naive().and_time(NaiveTime::default()).and_utc()
}

/// Returns the `days` calendar dates ending at `last` (inclusive), oldest first.
pub fn trailing_days(last: NaiveDate, days: u32) -> Vec<NaiveDate> {
    (0..days as i64)
        .rev()
        .map(|offset| last - Duration::days(offset))
        .collect()
}

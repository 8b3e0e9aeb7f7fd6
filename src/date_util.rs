use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};

/// Get the Monday of the ISO week containing the given date.
pub fn monday_of_week(d: NaiveDate) -> NaiveDate {
    d - Duration::days(d.weekday().num_days_from_monday() as i64)
}

/// Get the UTC calendar day of an instant.
pub fn utc_day_of(instant: DateTime<Utc>) -> NaiveDate {
    instant.date_naive()
}

/// Parse an ISO calendar day string (YYYY-MM-DD). Returns None for
/// anything else, including datetime strings and out-of-range components.
pub fn parse_iso_day(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()
}

/// Whole days from `from` to `to`. Negative when `to` is in the past.
pub fn days_between(from: NaiveDate, to: NaiveDate) -> i64 {
    (to - from).num_days()
}

//! Helpers for the "days since 1950-01-01T00:00:00Z" time axis.
//!
//! The cache core is agnostic to its time epoch; the bundled adapters use
//! fractional days counted from 1950-01-01, UTC:
//!
//! - day `0.0` is `1950-01-01T00:00:00Z`;
//! - the Unix epoch is day [`UNIX_EPOCH_DAYS`];
//! - one hour is `1.0 / 24.0`.

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, Utc};

const SECONDS_PER_DAY: f64 = 24.0 * 60.0 * 60.0;

/// Day number of `1970-01-01T00:00:00Z`.
pub const UNIX_EPOCH_DAYS: f64 = 7305.0;

/// One hour on the day axis.
pub const HOUR: f64 = 1.0 / 24.0;

/// Convert a UTC timestamp into fractional days since 1950.
pub fn datetime_to_days(ts: DateTime<Utc>) -> f64 {
    let secs = ts.timestamp() as f64 + f64::from(ts.timestamp_subsec_nanos()) * 1e-9;
    UNIX_EPOCH_DAYS + secs / SECONDS_PER_DAY
}

/// Convert fractional days since 1950 into a UTC timestamp (rounded to
/// whole milliseconds). Returns `None` when out of chrono's range.
pub fn days_to_datetime(days: f64) -> Option<DateTime<Utc>> {
    let millis = ((days - UNIX_EPOCH_DAYS) * SECONDS_PER_DAY * 1000.0).round();
    if !millis.is_finite() || millis.abs() > i64::MAX as f64 {
        return None;
    }
    DateTime::from_timestamp_millis(millis as i64)
}

/// Day number of January 1st, 00:00 UTC of `year`.
pub fn year_start_days(year: i32) -> Option<f64> {
    let start = NaiveDate::from_ymd_opt(year, 1, 1)?.and_hms_opt(0, 0, 0)?;
    Some(datetime_to_days(start.and_utc()))
}

/// Calendar year containing the given day.
pub fn year_of_days(days: f64) -> Option<i32> {
    days_to_datetime(days).map(|ts| ts.year())
}

/// Parse a time given either as a plain day number or as a calendar time.
///
/// Accepted calendar forms: RFC 3339 (`2003-10-29T06:00:00Z`), a naive
/// `YYYY-MM-DDTHH:MM:SS` read as UTC, and a bare `YYYY-MM-DD`.
pub fn parse_days(text: &str) -> Option<f64> {
    let text = text.trim();
    if let Ok(days) = text.parse::<f64>() {
        return days.is_finite().then_some(days);
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(text) {
        return Some(datetime_to_days(ts.with_timezone(&Utc)));
    }
    if let Ok(ts) = NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S") {
        return Some(datetime_to_days(ts.and_utc()));
    }
    let date = NaiveDate::parse_from_str(text, "%Y-%m-%d").ok()?;
    Some(datetime_to_days(date.and_hms_opt(0, 0, 0)?.and_utc()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn epoch_and_unix_epoch_line_up() {
        assert_eq!(year_start_days(1950), Some(0.0));
        assert_eq!(year_start_days(1970), Some(UNIX_EPOCH_DAYS));
        assert_eq!(year_start_days(1951), Some(365.0));
        // 1952 is a leap year.
        assert_eq!(year_start_days(1953), Some(365.0 * 3.0 + 1.0));
    }

    #[test]
    fn days_round_trip_through_datetime() {
        let days = 19_000.0 + 6.0 * HOUR;
        let ts = days_to_datetime(days).expect("in range");
        assert_eq!(ts.to_rfc3339(), "2002-01-08T06:00:00+00:00");
        assert!((datetime_to_days(ts) - days).abs() < 1e-9);
        assert_eq!(year_of_days(days), Some(2002));
    }

    #[test]
    fn parse_days_accepts_numbers_and_calendar_times() {
        assert_eq!(parse_days("12.5"), Some(12.5));
        assert_eq!(parse_days("1950-01-02"), Some(1.0));
        assert_eq!(parse_days("1950-01-01T12:00:00"), Some(0.5));
        assert_eq!(parse_days("1950-01-01T06:00:00Z"), Some(0.25));
        assert_eq!(parse_days("yesterday"), None);
        assert_eq!(parse_days("NaN"), None);
    }
}

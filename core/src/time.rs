//! Time related utils.

use chrono::Utc;

/// DateTime in UTC, the only zone signing works with.
pub type DateTime = chrono::DateTime<Utc>;

/// Take the current time in UTC.
pub fn now() -> DateTime {
    Utc::now()
}

/// Format a datetime into the date stamp used in credential scopes: `20220313`.
pub fn format_date(t: DateTime) -> String {
    t.format("%Y%m%d").to_string()
}

/// Format a datetime into ISO8601 basic format: `20220313T072004Z`.
///
/// This is the value carried in the `x-amz-date` header and it MUST be the
/// same instant the string to sign is built from, otherwise the signature
/// is invalid.
pub fn format_iso8601(t: DateTime) -> String {
    t.format("%Y%m%dT%H%M%SZ").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn test_time() -> DateTime {
        Utc.with_ymd_and_hms(2022, 3, 13, 7, 20, 4).unwrap()
    }

    #[test]
    fn test_format_date() {
        assert_eq!(format_date(test_time()), "20220313");
    }

    #[test]
    fn test_format_iso8601() {
        assert_eq!(format_iso8601(test_time()), "20220313T072004Z");
    }
}

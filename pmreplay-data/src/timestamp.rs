//! Storage encoding of tick timestamps.
//!
//! Timestamps are written as fixed-width RFC 3339 UTC text (nanosecond
//! precision, `Z` suffix) so that lexical ordering in SQL equals chronological
//! ordering. Older rows recorded as naive ISO strings are read back as UTC.

use crate::error::DataError;
use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};

const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// Length of an encoded timestamp, e.g. `2024-01-01T10:00:05.000000000Z`.
pub const TIMESTAMP_WIDTH: usize = 30;

/// Encode a timestamp for storage.
pub fn format_timestamp(timestamp: &DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

/// Decode a stored timestamp, normalising any offset to UTC.
pub fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, DataError> {
    let value = value.trim();

    if let Ok(timestamp) = DateTime::parse_from_rfc3339(value) {
        return Ok(timestamp.with_timezone(&Utc));
    }

    NAIVE_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        .map(|naive| naive.and_utc())
        .ok_or_else(|| DataError::Timestamp(value.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_format_is_fixed_width_utc() {
        let ts = Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 5).unwrap();
        assert_eq!(format_timestamp(&ts), "2024-01-01T10:00:05.000000000Z");

        let precise = ts + chrono::Duration::nanoseconds(7);
        let encoded = format_timestamp(&precise);
        assert_eq!(encoded.len(), TIMESTAMP_WIDTH);
        assert_eq!(parse_timestamp(&encoded).unwrap(), precise);
    }

    #[test]
    fn test_parse_normalises_offsets() {
        let parsed = parse_timestamp("2024-01-01T12:00:00+02:00").unwrap();
        assert_eq!(parsed, Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap());
    }

    #[test]
    fn test_parse_naive_as_utc() {
        let parsed = parse_timestamp("2024-01-01T10:00:00.250").unwrap();
        assert_eq!(
            parsed,
            Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap() + chrono::Duration::milliseconds(250)
        );

        let spaced = parse_timestamp("2024-01-01 10:00:00").unwrap();
        assert_eq!(spaced, Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap());
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(matches!(
            parse_timestamp("yesterday"),
            Err(DataError::Timestamp(_))
        ));
    }
}

use crate::error::DataError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Inclusive time range with optional bounds on either side.
///
/// Constructed through [`TimeRange::new`], which rejects an end before the
/// start, so a held `TimeRange` is always valid.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(try_from = "RawTimeRange")]
pub struct TimeRange {
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
}

#[derive(Deserialize)]
struct RawTimeRange {
    #[serde(default)]
    start: Option<DateTime<Utc>>,
    #[serde(default)]
    end: Option<DateTime<Utc>>,
}

impl TryFrom<RawTimeRange> for TimeRange {
    type Error = DataError;

    fn try_from(raw: RawTimeRange) -> Result<Self, Self::Error> {
        Self::new(raw.start, raw.end)
    }
}

impl TimeRange {
    pub fn new(start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> Result<Self, DataError> {
        if let (Some(start), Some(end)) = (start, end) {
            if end < start {
                return Err(DataError::InvalidTimeRange { start, end });
            }
        }
        Ok(Self { start, end })
    }

    /// Range with no bounds.
    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn since(start: DateTime<Utc>) -> Self {
        Self {
            start: Some(start),
            end: None,
        }
    }

    pub fn until(end: DateTime<Utc>) -> Self {
        Self {
            start: None,
            end: Some(end),
        }
    }

    pub fn start(&self) -> Option<DateTime<Utc>> {
        self.start
    }

    pub fn end(&self) -> Option<DateTime<Utc>> {
        self.end
    }

    /// Check whether `timestamp` falls inside the range (bounds inclusive).
    pub fn contains(&self, timestamp: &DateTime<Utc>) -> bool {
        self.start.is_none_or(|start| *timestamp >= start)
            && self.end.is_none_or(|end| *timestamp <= end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, hour, 0, 0).unwrap()
    }

    #[test]
    fn test_rejects_end_before_start() {
        let result = TimeRange::new(Some(at(12)), Some(at(10)));
        assert!(matches!(result, Err(DataError::InvalidTimeRange { .. })));
    }

    #[test]
    fn test_bounds_are_inclusive() {
        let range = TimeRange::new(Some(at(10)), Some(at(12))).unwrap();
        assert!(range.contains(&at(10)));
        assert!(range.contains(&at(12)));
        assert!(!range.contains(&at(13)));
        assert!(!range.contains(&at(9)));
    }

    #[test]
    fn test_open_ended_ranges() {
        assert!(TimeRange::unbounded().contains(&at(3)));
        assert!(TimeRange::since(at(10)).contains(&at(23)));
        assert!(!TimeRange::until(at(10)).contains(&at(11)));
    }

    #[test]
    fn test_deserialize_validates() {
        let invalid = r#"{"start":"2024-01-01T12:00:00Z","end":"2024-01-01T10:00:00Z"}"#;
        assert!(serde_json::from_str::<TimeRange>(invalid).is_err());

        let valid: TimeRange = serde_json::from_str(r#"{"start":"2024-01-01T10:00:00Z"}"#).unwrap();
        assert_eq!(valid.start(), Some(at(10)));
        assert_eq!(valid.end(), None);
    }
}

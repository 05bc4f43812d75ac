//! Core data types: sensor identifiers, sampling intervals and readings.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::error::ParseError;

/// Identifier of a logical sensor in the registry.
///
/// Ids are opaque but always positive; a zero or negative id in fetched data
/// indicates upstream corruption and is skipped by the batch writer.
pub type SensorId = i64;

/// Native sampling cadence of a sensor.
///
/// Each variant carries its samples-per-hour divider as data so downsampling
/// never dispatches on interval strings. The registry stores intervals as
/// ISO-8601 duration tags; [`SamplingInterval::from_tag`] is the only place
/// an unsupported tag can surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SamplingInterval {
    /// One reading per minute (`PT1M`).
    OneMinute,
    /// One reading every ten minutes (`PT10M`).
    TenMinutes,
    /// One reading every thirty minutes (`PT30M`).
    ThirtyMinutes,
    /// One reading per hour (`PT1H`).
    Hourly,
}

impl SamplingInterval {
    /// Parse a registry interval tag.
    pub fn from_tag(tag: &str) -> Result<Self, ParseError> {
        match tag {
            "PT1M" => Ok(Self::OneMinute),
            "PT10M" => Ok(Self::TenMinutes),
            "PT30M" => Ok(Self::ThirtyMinutes),
            "PT1H" => Ok(Self::Hourly),
            other => Err(ParseError::UnsupportedInterval(other.to_string())),
        }
    }

    /// The ISO-8601 duration tag stored in the registry.
    pub fn as_tag(&self) -> &'static str {
        match self {
            Self::OneMinute => "PT1M",
            Self::TenMinutes => "PT10M",
            Self::ThirtyMinutes => "PT30M",
            Self::Hourly => "PT1H",
        }
    }

    /// Number of native samples in one hour.
    pub fn samples_per_hour(&self) -> usize {
        match self {
            Self::OneMinute => 60,
            Self::TenMinutes => 6,
            Self::ThirtyMinutes => 2,
            Self::Hourly => 1,
        }
    }

    /// Whether the native cadence is already hourly.
    pub fn is_hourly(&self) -> bool {
        matches!(self, Self::Hourly)
    }
}

impl std::fmt::Display for SamplingInterval {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_tag())
    }
}

/// A single timestamped measurement from a sensor.
///
/// Readings are immutable once written; `(sensor_id, timestamp)` is the
/// natural key and duplicate writes are silently ignored by the store.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    /// The logical sensor that produced the value.
    pub sensor_id: SensorId,
    /// When the value was measured.
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    /// The measured value.
    pub value: f64,
}

impl Reading {
    /// Create a reading.
    pub fn new(sensor_id: SensorId, timestamp: OffsetDateTime, value: f64) -> Self {
        Self {
            sensor_id,
            timestamp,
            value,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::OffsetDateTime;

    #[test]
    fn test_interval_from_tag() {
        assert_eq!(
            SamplingInterval::from_tag("PT1M").unwrap(),
            SamplingInterval::OneMinute
        );
        assert_eq!(
            SamplingInterval::from_tag("PT10M").unwrap(),
            SamplingInterval::TenMinutes
        );
        assert_eq!(
            SamplingInterval::from_tag("PT30M").unwrap(),
            SamplingInterval::ThirtyMinutes
        );
        assert_eq!(
            SamplingInterval::from_tag("PT1H").unwrap(),
            SamplingInterval::Hourly
        );
    }

    #[test]
    fn test_interval_from_unknown_tag() {
        let err = SamplingInterval::from_tag("PT5M").unwrap_err();
        assert_eq!(err, ParseError::UnsupportedInterval("PT5M".to_string()));
        assert!(err.to_string().contains("PT5M"));
    }

    #[test]
    fn test_interval_tag_round_trip() {
        for interval in [
            SamplingInterval::OneMinute,
            SamplingInterval::TenMinutes,
            SamplingInterval::ThirtyMinutes,
            SamplingInterval::Hourly,
        ] {
            assert_eq!(
                SamplingInterval::from_tag(interval.as_tag()).unwrap(),
                interval
            );
        }
    }

    #[test]
    fn test_samples_per_hour() {
        assert_eq!(SamplingInterval::OneMinute.samples_per_hour(), 60);
        assert_eq!(SamplingInterval::TenMinutes.samples_per_hour(), 6);
        assert_eq!(SamplingInterval::ThirtyMinutes.samples_per_hour(), 2);
        assert_eq!(SamplingInterval::Hourly.samples_per_hour(), 1);
    }

    #[test]
    fn test_reading_serde() {
        let reading = Reading::new(7, OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap(), 12.5);
        let json = serde_json::to_string(&reading).unwrap();
        assert!(json.contains("\"sensor_id\":7"));

        let back: Reading = serde_json::from_str(&json).unwrap();
        assert_eq!(back, reading);
    }
}

//! Data models for stored data.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use hydromet_types::{ParseError, SamplingInterval, SensorId};

/// A sensor row in the registry.
///
/// `interval_tag`, `active` and the id itself are owned by the registry
/// bootstrap; the scheduler mutates `pending` and the sync worker mutates
/// `last_synced` on successful completion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisteredSensor {
    /// Sensor identifier.
    pub sensor_id: SensorId,
    /// ISO-8601 sampling interval tag as stored by the bootstrap.
    pub interval_tag: String,
    /// Baseline for the next fetch window; None until first established.
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_synced: Option<OffsetDateTime>,
    /// Claim marker; at most one worker process holds it at a time.
    pub pending: bool,
    /// Whether the sensor participates in synchronization.
    pub active: bool,
}

impl RegisteredSensor {
    /// Parse the stored interval tag.
    pub fn interval(&self) -> Result<SamplingInterval, ParseError> {
        SamplingInterval::from_tag(&self.interval_tag)
    }
}

/// Which stored series a read or write targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Series {
    /// Native-cadence readings as fetched.
    Raw,
    /// Hourly-aligned readings produced by the downsampler.
    Hourly,
}

impl Series {
    pub(crate) fn table(self) -> &'static str {
        match self {
            Self::Raw => "readings",
            Self::Hourly => "readings_hourly",
        }
    }
}

/// Outcome of one bulk insert.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchWrite {
    /// Rows actually inserted.
    pub written: usize,
    /// Rows ignored because their key already existed.
    pub duplicates: usize,
    /// Rows skipped for carrying a missing or non-positive sensor id.
    pub skipped: usize,
}

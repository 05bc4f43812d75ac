//! Hourly downsampling of sub-hourly reading series.

use crate::types::{Reading, SamplingInterval};

/// Derive the hourly series from an ascending-timestamp reading run.
///
/// Strides through the input at the interval's samples-per-hour divider,
/// with a phase offset derived from the first reading's minute-of-hour so
/// selected samples land on the top of the hour. A run that already starts
/// on the hour gets offset 0; hourly input is returned unchanged.
///
/// This is a pure function: it never fails, and an empty input yields an
/// empty output.
pub fn hourly_series(readings: &[Reading], interval: SamplingInterval) -> Vec<Reading> {
    if interval.is_hourly() {
        return readings.to_vec();
    }

    let Some(first) = readings.first() else {
        return Vec::new();
    };

    let divider = interval.samples_per_hour();
    let minutes_per_sample = 60 / divider;
    let phase = usize::from(first.timestamp.minute()) / minutes_per_sample;
    // phase == 0 would otherwise produce offset == divider, past the hour
    let offset = (divider - phase) % divider;

    readings.iter().skip(offset).step_by(divider).copied().collect()
}

//! Per-sensor synchronization worker.
//!
//! A sync pass fetches every outstanding reading for one sensor from the
//! remote measurement service, derives the hourly series, writes both series
//! to the store, and advances the sensor's baseline to the end of the fetch
//! window. Failures never abort the process; they surface as a structured
//! [`WorkerError`] that leaves the baseline untouched so the next cycle
//! re-covers the same window against idempotent writes.

use std::time::Instant;

use time::OffsetDateTime;
use tracing::{info, warn};

use hydromet_source::{RetryConfig, with_retry};
use hydromet_store::{BatchWrite, Series};
use hydromet_types::{FetchWindow, PageCursor, ParseError, Reading, SensorId, hourly_series};

use crate::state::AppState;

/// Outcome summary of one synchronization pass.
#[derive(Debug, Clone, serde::Serialize)]
pub struct SyncReport {
    /// The synchronized sensor.
    pub sensor_id: SensorId,
    /// Start of the covered window.
    #[serde(with = "time::serde::rfc3339")]
    pub window_start: OffsetDateTime,
    /// End of the covered window; the sensor's new baseline.
    #[serde(with = "time::serde::rfc3339")]
    pub window_end: OffsetDateTime,
    /// Raw rows written.
    pub raw_written: usize,
    /// Hourly rows written.
    pub hourly_written: usize,
    /// Rows skipped for missing sensor ids.
    pub skipped: usize,
    /// Whether the remote source had nothing for the window.
    pub no_data: bool,
    /// Wall-clock milliseconds the pass took.
    pub elapsed_ms: u64,
}

/// Errors from a single sync pass.
///
/// All variants are per-sensor and non-fatal to the scheduler.
#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    /// Sensor id is not in the registry.
    #[error("sensor {0} is not in the registry")]
    SensorNotFound(SensorId),

    /// Sensor has no last-synced timestamp and no lookback is configured.
    ///
    /// The sensor cannot be synchronized until a baseline exists; retrying
    /// before then is pointless, so the baseline is not advanced.
    #[error("sensor {0} has no baseline to sync from")]
    NoBaseline(SensorId),

    /// The registry carries an interval tag outside the supported set.
    #[error("sensor {sensor_id} is excluded from sync: {source}")]
    UnsupportedInterval {
        sensor_id: SensorId,
        #[source]
        source: ParseError,
    },

    /// The remote source failed; the window will be retried next cycle.
    #[error("fetch failed for sensor {sensor_id}: {source}")]
    Fetch {
        sensor_id: SensorId,
        #[source]
        source: hydromet_source::Error,
    },

    /// The store failed; the window will be retried next cycle.
    #[error("store failed for sensor {sensor_id}: {source}")]
    Store {
        sensor_id: SensorId,
        #[source]
        source: hydromet_store::Error,
    },
}

/// Perform one full synchronization pass for `sensor_id`.
pub async fn sync_sensor(state: &AppState, sensor_id: SensorId) -> Result<SyncReport, WorkerError> {
    let started = Instant::now();

    let sensor = {
        let store = state.store.lock().await;
        store
            .get_sensor(sensor_id)
            .map_err(|source| WorkerError::Store { sensor_id, source })?
            .ok_or(WorkerError::SensorNotFound(sensor_id))?
    };

    let interval = sensor
        .interval()
        .map_err(|source| WorkerError::UnsupportedInterval { sensor_id, source })?;

    let now = OffsetDateTime::now_utc();
    let baseline = match sensor.last_synced {
        Some(ts) => ts,
        None => match state.config.sync.default_lookback() {
            Some(lookback) => now - lookback,
            None => return Err(WorkerError::NoBaseline(sensor_id)),
        },
    };
    let window = FetchWindow::from_baseline(baseline, now);

    let mut raw = BatchWrite::default();
    let mut hourly = BatchWrite::default();
    let mut no_data = true;

    if !window.is_empty() {
        let readings = fetch_window(state, sensor_id, window).await?;

        if !readings.is_empty() {
            no_data = false;
            let hourly_readings = hourly_series(&readings, interval);

            let store = state.store.lock().await;
            raw = store
                .insert_readings(Series::Raw, &readings)
                .map_err(|source| WorkerError::Store { sensor_id, source })?;
            hourly = store
                .insert_readings(Series::Hourly, &hourly_readings)
                .map_err(|source| WorkerError::Store { sensor_id, source })?;
        }
    }

    // Advance even when the window was empty so the next cycle does not
    // re-request the same empty range forever.
    {
        let store = state.store.lock().await;
        store
            .set_last_synced(sensor_id, window.end)
            .map_err(|source| WorkerError::Store { sensor_id, source })?;
    }

    let report = SyncReport {
        sensor_id,
        window_start: window.start,
        window_end: window.end,
        raw_written: raw.written,
        hourly_written: hourly.written,
        skipped: raw.skipped + hourly.skipped,
        no_data,
        elapsed_ms: started.elapsed().as_millis() as u64,
    };

    if report.no_data {
        info!(sensor_id, "No data received on sensor; baseline advanced");
    } else {
        info!(
            sensor_id,
            raw = report.raw_written,
            hourly = report.hourly_written,
            elapsed_ms = report.elapsed_ms,
            "Sensor synchronized"
        );
    }

    Ok(report)
}

/// Fetch every page of the window, in order.
async fn fetch_window(
    state: &AppState,
    sensor_id: SensorId,
    window: FetchWindow,
) -> Result<Vec<Reading>, WorkerError> {
    let retry = RetryConfig::default();
    let sensor_ids = [sensor_id];

    let total = with_retry(&retry, "num_results", || {
        state.source.count(&sensor_ids, window)
    })
    .await
    .map_err(|source| WorkerError::Fetch { sensor_id, source })?;

    if total == 0 {
        return Ok(Vec::new());
    }

    let mut cursor = PageCursor::new(total, state.config.source.page_size);
    let mut readings = Vec::with_capacity(total as usize);

    while !cursor.is_exhausted() {
        let offset = cursor.offset();
        let limit = cursor.page_size();

        let page = with_retry(&retry, "search", || {
            state.source.fetch(&sensor_ids, window, offset, limit)
        })
        .await
        .map_err(|source| WorkerError::Fetch { sensor_id, source })?;

        if page.is_empty() {
            // The remote count overshot what search can deliver; stop rather
            // than spinning on an empty tail.
            warn!(
                sensor_id,
                offset, total, "Remote source returned a short result set"
            );
            break;
        }

        readings.extend(page);
        cursor.advance();
    }

    Ok(readings)
}

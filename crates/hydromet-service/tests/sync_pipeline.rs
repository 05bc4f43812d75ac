//! End-to-end tests of the sync worker against a mock measurement service
//! and an in-memory store.

use std::sync::Arc;

use time::{Duration as TimeDuration, OffsetDateTime};

use hydromet_service::{AppState, Config, WorkerError, sync_sensor};
use hydromet_source::MockSource;
use hydromet_store::{Series, Store};
use hydromet_types::{Reading, SensorId};

/// A baseline `hours_back` in the past, snapped to the top of the hour so
/// downsampling phase offsets are deterministic.
fn top_of_hour_baseline(hours_back: i64) -> OffsetDateTime {
    let ts = (OffsetDateTime::now_utc() - TimeDuration::hours(hours_back)).unix_timestamp();
    OffsetDateTime::from_unix_timestamp(ts - ts % 3600).unwrap()
}

fn reading_run(
    sensor_id: SensorId,
    start: OffsetDateTime,
    step_minutes: i64,
    len: usize,
) -> Vec<Reading> {
    (0..len)
        .map(|i| {
            Reading::new(
                sensor_id,
                start + TimeDuration::minutes(step_minutes * i as i64),
                i as f64,
            )
        })
        .collect()
}

fn state_for(
    sensor_id: SensorId,
    interval_tag: &str,
    baseline: Option<OffsetDateTime>,
    source: Arc<MockSource>,
    config: Config,
) -> Arc<AppState> {
    let store = Store::open_in_memory().unwrap();
    store.upsert_sensor(sensor_id, interval_tag, true).unwrap();
    if let Some(baseline) = baseline {
        store.set_last_synced(sensor_id, baseline).unwrap();
    }
    AppState::new(store, source, config)
}

#[tokio::test]
async fn test_full_sync_pages_downsamples_and_advances() {
    // 1500 ten-minute readings starting at the baseline: just over ten days
    // of backlog, two pages on the wire, 250 hourly slots.
    let baseline = top_of_hour_baseline(24 * 12);
    let source = Arc::new(MockSource::with_readings(reading_run(
        7, baseline, 10, 1500,
    )));
    let state = state_for(7, "PT10M", Some(baseline), Arc::clone(&source), Config::default());

    let report = sync_sensor(&state, 7).await.unwrap();

    assert_eq!(report.raw_written, 1500);
    assert_eq!(report.hourly_written, 250);
    assert_eq!(report.skipped, 0);
    assert!(!report.no_data);
    assert_eq!(source.count_calls(), 1);
    assert_eq!(source.fetch_calls(), 2);

    let store = state.store.lock().await;
    assert_eq!(store.count_readings(Series::Raw, Some(7)).unwrap(), 1500);
    assert_eq!(store.count_readings(Series::Hourly, Some(7)).unwrap(), 250);

    // The baseline advanced to the window end, not merely past the last row
    let sensor = store.get_sensor(7).unwrap().unwrap();
    assert_eq!(
        sensor.last_synced.unwrap().unix_timestamp(),
        report.window_end.unix_timestamp()
    );
}

#[tokio::test]
async fn test_second_pass_is_idempotent_over_the_same_window() {
    let baseline = top_of_hour_baseline(48);
    let source = Arc::new(MockSource::with_readings(reading_run(7, baseline, 30, 90)));
    let state = state_for(7, "PT30M", Some(baseline), Arc::clone(&source), Config::default());

    let first = sync_sensor(&state, 7).await.unwrap();
    assert_eq!(first.raw_written, 90);

    // Roll the baseline back, as if the previous advance were lost; every
    // row is re-fetched and every write lands on an existing key.
    {
        let store = state.store.lock().await;
        store.set_last_synced(7, baseline).unwrap();
    }
    let second = sync_sensor(&state, 7).await.unwrap();
    assert_eq!(second.raw_written, 0);
    assert!(!second.no_data);

    let store = state.store.lock().await;
    assert_eq!(store.count_readings(Series::Raw, Some(7)).unwrap(), 90);
}

#[tokio::test]
async fn test_zero_readings_advance_baseline_without_thrash() {
    let baseline = top_of_hour_baseline(24);
    let source = Arc::new(MockSource::new());
    let state = state_for(7, "PT10M", Some(baseline), Arc::clone(&source), Config::default());

    let report = sync_sensor(&state, 7).await.unwrap();

    assert!(report.no_data);
    assert_eq!(report.raw_written, 0);
    assert_eq!(source.fetch_calls(), 0, "no pages fetched for an empty window");

    let store = state.store.lock().await;
    let sensor = store.get_sensor(7).unwrap().unwrap();
    assert!(sensor.last_synced.unwrap() > baseline);
}

#[tokio::test]
async fn test_corrupt_row_is_skipped_and_rest_written() {
    let baseline = top_of_hour_baseline(24);
    let mut rows = reading_run(7, baseline, 60, 10);
    rows[3].sensor_id = 0;

    let source = Arc::new(MockSource::with_readings(rows));
    let state = state_for(7, "PT1H", Some(baseline), source, Config::default());

    let report = sync_sensor(&state, 7).await.unwrap();

    // Hourly interval: the hourly series equals the raw series, so the
    // corrupt row is skipped once per series.
    assert_eq!(report.raw_written, 9);
    assert_eq!(report.hourly_written, 9);
    assert_eq!(report.skipped, 2);

    let store = state.store.lock().await;
    assert_eq!(store.count_readings(Series::Raw, Some(7)).unwrap(), 9);
}

#[tokio::test(start_paused = true)]
async fn test_fetch_failure_leaves_baseline_untouched() {
    let baseline = top_of_hour_baseline(24);
    let source = Arc::new(MockSource::with_readings(reading_run(7, baseline, 60, 5)));
    // More failures than the retry budget will absorb
    source.fail_times(10);

    let state = state_for(7, "PT1H", Some(baseline), source, Config::default());

    let err = sync_sensor(&state, 7).await.unwrap_err();
    assert!(matches!(err, WorkerError::Fetch { sensor_id: 7, .. }));

    let store = state.store.lock().await;
    let sensor = store.get_sensor(7).unwrap().unwrap();
    assert_eq!(
        sensor.last_synced.unwrap().unix_timestamp(),
        baseline.unix_timestamp(),
        "a failed sync must not advance the baseline"
    );
    assert_eq!(store.count_readings(Series::Raw, Some(7)).unwrap(), 0);
}

#[tokio::test]
async fn test_no_baseline_is_a_per_sensor_error() {
    let state = state_for(7, "PT1H", None, Arc::new(MockSource::new()), Config::default());

    let err = sync_sensor(&state, 7).await.unwrap_err();
    assert!(matches!(err, WorkerError::NoBaseline(7)));

    // No baseline means no advance either
    let store = state.store.lock().await;
    assert!(store.get_sensor(7).unwrap().unwrap().last_synced.is_none());
}

#[tokio::test]
async fn test_configured_lookback_bootstraps_missing_baseline() {
    let now = OffsetDateTime::now_utc();
    let rows = reading_run(7, now - TimeDuration::hours(12), 60, 6);

    let mut config = Config::default();
    config.sync.default_lookback = Some(24 * 3600);

    let state = state_for(7, "PT1H", None, Arc::new(MockSource::with_readings(rows)), config);

    let report = sync_sensor(&state, 7).await.unwrap();
    assert_eq!(report.raw_written, 6);

    let store = state.store.lock().await;
    assert!(store.get_sensor(7).unwrap().unwrap().last_synced.is_some());
}

#[tokio::test]
async fn test_unsupported_interval_excludes_sensor() {
    let baseline = top_of_hour_baseline(24);
    let state = state_for(7, "PT5M", Some(baseline), Arc::new(MockSource::new()), Config::default());

    let err = sync_sensor(&state, 7).await.unwrap_err();
    assert!(matches!(err, WorkerError::UnsupportedInterval { sensor_id: 7, .. }));

    let store = state.store.lock().await;
    let sensor = store.get_sensor(7).unwrap().unwrap();
    assert_eq!(
        sensor.last_synced.unwrap().unix_timestamp(),
        baseline.unix_timestamp()
    );
}

#[tokio::test]
async fn test_unknown_sensor_is_reported() {
    let store = Store::open_in_memory().unwrap();
    let state = AppState::new(store, Arc::new(MockSource::new()), Config::default());

    let err = sync_sensor(&state, 42).await.unwrap_err();
    assert!(matches!(err, WorkerError::SensorNotFound(42)));
}

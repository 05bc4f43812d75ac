//! Mock reading source for testing.
//!
//! Provides a [`MockSource`] that serves a configured reading set through
//! the [`ReadingSource`] trait, with failure injection, latency simulation
//! and call counting so sync and scheduler code can be exercised without a
//! live measurement service.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;

use hydromet_types::{FetchWindow, Reading, SensorId};

use crate::client::ReadingSource;
use crate::error::{Error, Result};

/// A mock measurement service backed by an in-memory reading set.
///
/// Readings are filtered by sensor set and window exactly like the real
/// service, and pages are served in the stored (ascending) order.
///
/// # Example
///
/// ```
/// use hydromet_source::{MockSource, ReadingSource};
/// use hydromet_types::{FetchWindow, Reading};
/// use time::OffsetDateTime;
///
/// # #[tokio::main]
/// # async fn main() {
/// let t0 = OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap();
/// let source = MockSource::with_readings(vec![Reading::new(1, t0, 3.5)]);
///
/// let window = FetchWindow::from_baseline(t0, t0 + time::Duration::hours(1));
/// assert_eq!(source.count(&[1], window).await.unwrap(), 1);
/// # }
/// ```
#[derive(Default)]
pub struct MockSource {
    readings: RwLock<Vec<Reading>>,
    /// Operations to fail (with a retryable timeout) before succeeding.
    remaining_failures: AtomicU32,
    /// Simulated per-call latency in milliseconds (0 = none).
    latency_ms: AtomicU64,
    count_calls: AtomicU32,
    fetch_calls: AtomicU32,
}

impl std::fmt::Debug for MockSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockSource")
            .field("count_calls", &self.count_calls.load(Ordering::Relaxed))
            .field("fetch_calls", &self.fetch_calls.load(Ordering::Relaxed))
            .finish()
    }
}

impl MockSource {
    /// Create an empty mock source.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a mock source pre-loaded with `readings`.
    ///
    /// Readings should be pushed in ascending timestamp order; the mock
    /// serves them as stored, mirroring the real service's ordering
    /// guarantee.
    pub fn with_readings(readings: Vec<Reading>) -> Self {
        Self {
            readings: RwLock::new(readings),
            ..Self::default()
        }
    }

    /// Append readings to the served set.
    pub async fn push_readings(&self, readings: impl IntoIterator<Item = Reading>) {
        self.readings.write().await.extend(readings);
    }

    /// Fail the next `n` operations with a retryable timeout error.
    pub fn fail_times(&self, n: u32) {
        self.remaining_failures.store(n, Ordering::SeqCst);
    }

    /// Add artificial latency to every call.
    pub fn set_latency(&self, latency: Duration) {
        self.latency_ms
            .store(latency.as_millis() as u64, Ordering::SeqCst);
    }

    /// Number of count calls served (including injected failures).
    pub fn count_calls(&self) -> u32 {
        self.count_calls.load(Ordering::SeqCst)
    }

    /// Number of fetch calls served (including injected failures).
    pub fn fetch_calls(&self) -> u32 {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    async fn simulate(&self, operation: &'static str) -> Result<()> {
        let latency = self.latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }

        let mut remaining = self.remaining_failures.load(Ordering::SeqCst);
        while remaining > 0 {
            match self.remaining_failures.compare_exchange(
                remaining,
                remaining - 1,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => return Err(Error::timeout(operation, Duration::from_millis(latency))),
                Err(current) => remaining = current,
            }
        }

        Ok(())
    }

    async fn matching(&self, sensor_ids: &[SensorId], window: FetchWindow) -> Vec<Reading> {
        // Rows with a missing sensor id tag along with whatever sensor was
        // requested, mirroring the corruption mode of the real service.
        self.readings
            .read()
            .await
            .iter()
            .filter(|r| {
                (r.sensor_id <= 0 || sensor_ids.contains(&r.sensor_id))
                    && window.contains(r.timestamp)
            })
            .copied()
            .collect()
    }
}

#[async_trait]
impl ReadingSource for MockSource {
    async fn count(&self, sensor_ids: &[SensorId], window: FetchWindow) -> Result<u64> {
        self.count_calls.fetch_add(1, Ordering::SeqCst);
        self.simulate("num_results").await?;
        Ok(self.matching(sensor_ids, window).await.len() as u64)
    }

    async fn fetch(
        &self,
        sensor_ids: &[SensorId],
        window: FetchWindow,
        offset: u64,
        limit: u16,
    ) -> Result<Vec<Reading>> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        self.simulate("search").await?;
        Ok(self
            .matching(sensor_ids, window)
            .await
            .into_iter()
            .skip(offset as usize)
            .take(usize::from(limit))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::{Duration as TimeDuration, OffsetDateTime};

    fn readings(sensor_id: SensorId, start_unix: i64, step_minutes: i64, len: usize) -> Vec<Reading> {
        let start = OffsetDateTime::from_unix_timestamp(start_unix).unwrap();
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

    fn window(start_unix: i64, end_unix: i64) -> FetchWindow {
        FetchWindow::from_baseline(
            OffsetDateTime::from_unix_timestamp(start_unix).unwrap(),
            OffsetDateTime::from_unix_timestamp(end_unix).unwrap(),
        )
    }

    #[tokio::test]
    async fn test_count_filters_by_sensor_and_window() {
        let mut all = readings(1, 1_000_000, 10, 6);
        all.extend(readings(2, 1_000_000, 10, 6));
        let source = MockSource::with_readings(all);

        let w = window(1_000_000, 2_000_000);
        assert_eq!(source.count(&[1], w).await.unwrap(), 6);
        assert_eq!(source.count(&[1, 2], w).await.unwrap(), 12);
        assert_eq!(source.count(&[3], w).await.unwrap(), 0);

        // Window excludes everything before its start.
        let late = window(1_000_000 + 20 * 60, 2_000_000);
        assert_eq!(source.count(&[1], late).await.unwrap(), 4);
    }

    #[tokio::test]
    async fn test_fetch_pages_through_the_set() {
        let source = MockSource::with_readings(readings(1, 1_000_000, 10, 25));
        let w = window(1_000_000, 2_000_000);

        let first = source.fetch(&[1], w, 0, 10).await.unwrap();
        let second = source.fetch(&[1], w, 10, 10).await.unwrap();
        let third = source.fetch(&[1], w, 20, 10).await.unwrap();

        assert_eq!(first.len(), 10);
        assert_eq!(second.len(), 10);
        assert_eq!(third.len(), 5);
        assert_eq!(first[0].value, 0.0);
        assert_eq!(third[4].value, 24.0);
        assert_eq!(source.fetch_calls(), 3);
    }

    #[tokio::test]
    async fn test_failure_injection_is_consumed() {
        let source = MockSource::with_readings(readings(1, 1_000_000, 10, 3));
        source.fail_times(2);
        let w = window(1_000_000, 2_000_000);

        assert!(source.count(&[1], w).await.is_err());
        assert!(source.count(&[1], w).await.is_err());
        assert_eq!(source.count(&[1], w).await.unwrap(), 3);
    }
}

//! Trait abstraction over the remote measurement service.

use async_trait::async_trait;

use hydromet_types::{FetchWindow, Reading, SensorId};

use crate::error::Result;

/// Trait abstracting the remote reading source.
///
/// This enables writing sync code that works with both the production HTTP
/// service and mock sources for testing. The remote contract: results are
/// stable across the count and subsequent fetches for the same window, each
/// fetch returns at most 1000 readings, and readings within one call arrive
/// in ascending timestamp order.
#[async_trait]
pub trait ReadingSource: Send + Sync {
    /// Number of readings the service holds for `sensor_ids` in `window`.
    async fn count(&self, sensor_ids: &[SensorId], window: FetchWindow) -> Result<u64>;

    /// Fetch one page of readings for `sensor_ids` in `window`.
    ///
    /// `offset` skips past already-fetched results; `limit` is capped at
    /// 1000 by the service regardless of the value sent.
    async fn fetch(
        &self,
        sensor_ids: &[SensorId],
        window: FetchWindow,
        offset: u64,
        limit: u16,
    ) -> Result<Vec<Reading>>;
}

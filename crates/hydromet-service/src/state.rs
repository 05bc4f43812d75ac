//! Application state shared across the scheduler and API handlers.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use hydromet_source::ReadingSource;
use hydromet_store::Store;
use hydromet_types::SensorId;
use time::OffsetDateTime;
use tokio::sync::{Mutex, RwLock, watch};

use crate::config::Config;
use crate::worker::SyncReport;

/// Shared application state.
pub struct AppState {
    /// The data store (wrapped in Mutex for thread-safe access).
    pub store: Mutex<Store>,
    /// The remote reading source.
    pub source: Arc<dyn ReadingSource>,
    /// Configuration.
    pub config: Config,
    /// Scheduler control state.
    pub scheduler: SchedulerState,
}

impl AppState {
    /// Create new application state.
    pub fn new(store: Store, source: Arc<dyn ReadingSource>, config: Config) -> Arc<Self> {
        Arc::new(Self {
            store: Mutex::new(store),
            source,
            config,
            scheduler: SchedulerState::new(),
        })
    }
}

/// State for tracking and controlling the scheduler.
pub struct SchedulerState {
    /// Whether the scheduler loop is currently running.
    running: AtomicBool,
    /// When the scheduler was started (Unix timestamp).
    started_at: AtomicU64,
    /// Channel to signal the scheduler loop to stop.
    stop_tx: watch::Sender<bool>,
    /// Receiver for stop signal (cloned by the loop).
    stop_rx: watch::Receiver<bool>,
    /// Per-sensor sync stats.
    pub sensor_stats: RwLock<HashMap<SensorId, SensorSyncStats>>,
}

impl SchedulerState {
    /// Create a new scheduler state.
    pub fn new() -> Self {
        let (stop_tx, stop_rx) = watch::channel(false);
        Self {
            running: AtomicBool::new(false),
            started_at: AtomicU64::new(0),
            stop_tx,
            stop_rx,
            sensor_stats: RwLock::new(HashMap::new()),
        }
    }

    /// Check if the scheduler is running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Mark the scheduler as started or stopped.
    pub fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::SeqCst);
        if running {
            let now = OffsetDateTime::now_utc().unix_timestamp() as u64;
            self.started_at.store(now, Ordering::SeqCst);
        }
    }

    /// Get the scheduler start time.
    pub fn started_at(&self) -> Option<OffsetDateTime> {
        let ts = self.started_at.load(Ordering::SeqCst);
        if ts == 0 {
            None
        } else {
            OffsetDateTime::from_unix_timestamp(ts as i64).ok()
        }
    }

    /// Get a receiver for the stop signal.
    pub fn subscribe_stop(&self) -> watch::Receiver<bool> {
        self.stop_rx.clone()
    }

    /// Signal the scheduler loop to stop.
    pub fn signal_stop(&self) {
        let _ = self.stop_tx.send(true);
        self.running.store(false, Ordering::SeqCst);
    }

    /// Reset the stop signal (for restarting).
    pub fn reset_stop(&self) {
        let _ = self.stop_tx.send(false);
    }

    /// Mark a sensor as entering or leaving its sync.
    pub async fn set_syncing(&self, sensor_id: SensorId, syncing: bool) {
        let mut stats = self.sensor_stats.write().await;
        stats.entry(sensor_id).or_insert_with(|| SensorSyncStats::new(sensor_id)).syncing = syncing;
    }

    /// Record a completed sync.
    pub async fn record_success(&self, report: &SyncReport) {
        let mut stats = self.sensor_stats.write().await;
        let entry = stats
            .entry(report.sensor_id)
            .or_insert_with(|| SensorSyncStats::new(report.sensor_id));
        entry.syncing = false;
        entry.success_count += 1;
        entry.last_success_at = Some(OffsetDateTime::now_utc());
        entry.raw_written += report.raw_written as u64;
        entry.hourly_written += report.hourly_written as u64;
    }

    /// Record a failed sync.
    pub async fn record_failure(&self, sensor_id: SensorId, error: String) {
        let mut stats = self.sensor_stats.write().await;
        let entry = stats
            .entry(sensor_id)
            .or_insert_with(|| SensorSyncStats::new(sensor_id));
        entry.syncing = false;
        entry.failure_count += 1;
        entry.last_error_at = Some(OffsetDateTime::now_utc());
        entry.last_error = Some(error);
    }
}

impl Default for SchedulerState {
    fn default() -> Self {
        Self::new()
    }
}

/// Sync statistics for a single sensor.
#[derive(Debug, Clone, serde::Serialize)]
pub struct SensorSyncStats {
    /// Sensor id.
    pub sensor_id: SensorId,
    /// Time of last successful sync.
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_success_at: Option<OffsetDateTime>,
    /// Time of last failed sync.
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_error_at: Option<OffsetDateTime>,
    /// Last error message.
    pub last_error: Option<String>,
    /// Total successful syncs.
    pub success_count: u64,
    /// Total failed syncs.
    pub failure_count: u64,
    /// Total raw rows written.
    pub raw_written: u64,
    /// Total hourly rows written.
    pub hourly_written: u64,
    /// Whether the sensor is currently being synchronized.
    pub syncing: bool,
}

impl SensorSyncStats {
    fn new(sensor_id: SensorId) -> Self {
        Self {
            sensor_id,
            last_success_at: None,
            last_error_at: None,
            last_error: None,
            success_count: 0,
            failure_count: 0,
            raw_written: 0,
            hourly_written: 0,
            syncing: false,
        }
    }
}

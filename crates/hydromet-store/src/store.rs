//! Main store implementation.

use std::path::Path;
use std::time::Duration;

use rusqlite::{Connection, OptionalExtension};
use time::OffsetDateTime;
use tracing::{debug, info, warn};

use hydromet_types::{Reading, SensorId};

use crate::error::{Error, Result};
use crate::models::{BatchWrite, RegisteredSensor, Series};
use crate::schema;

/// SQLite-based store for the sensor registry and reading series.
pub struct Store {
    conn: Connection,
}

impl Store {
    /// Open or create a database at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        // Create parent directories if needed
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| Error::CreateDirectory {
                    path: parent.to_path_buf(),
                    source: e,
                })?;
            }
        }

        info!("Opening database at {}", path.display());
        let conn = Connection::open(path)?;

        // WAL mode keeps concurrent worker processes from blocking each other
        conn.execute_batch(
            "PRAGMA foreign_keys = ON;
             PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;",
        )?;

        // Initialize schema
        schema::initialize(&conn)?;

        Ok(Self { conn })
    }

    /// Open the default database location.
    pub fn open_default() -> Result<Self> {
        Self::open(crate::default_db_path())
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        schema::initialize(&conn)?;
        Ok(Self { conn })
    }
}

// Registry operations
impl Store {
    /// Insert or update a sensor's bootstrap-owned fields.
    ///
    /// The interval is stored as the tag the remote catalog reports; the
    /// sync worker parses it at use, so an unsupported tag surfaces there
    /// rather than here. `last_synced` and `pending` are left untouched on
    /// update; they belong to the sync pipeline.
    pub fn upsert_sensor(
        &self,
        sensor_id: SensorId,
        interval_tag: &str,
        active: bool,
    ) -> Result<RegisteredSensor> {
        self.conn.execute(
            "INSERT INTO sensors (sensor_id, interval, active) VALUES (?1, ?2, ?3)
             ON CONFLICT(sensor_id) DO UPDATE SET
                interval = ?2,
                active = ?3",
            rusqlite::params![sensor_id, interval_tag, active],
        )?;

        self.get_sensor(sensor_id)?
            .ok_or(Error::SensorNotFound(sensor_id))
    }

    /// Get a sensor by id.
    pub fn get_sensor(&self, sensor_id: SensorId) -> Result<Option<RegisteredSensor>> {
        let mut stmt = self.conn.prepare(
            "SELECT sensor_id, interval, last_synced, pending, active
             FROM sensors WHERE sensor_id = ?",
        )?;

        let sensor = stmt
            .query_row([sensor_id], |row| {
                Ok(RegisteredSensor {
                    sensor_id: row.get(0)?,
                    interval_tag: row.get(1)?,
                    last_synced: row
                        .get::<_, Option<i64>>(2)?
                        .map(|ts| OffsetDateTime::from_unix_timestamp(ts).unwrap()),
                    pending: row.get(3)?,
                    active: row.get(4)?,
                })
            })
            .optional()?;

        Ok(sensor)
    }

    /// List all sensors in the registry.
    pub fn list_sensors(&self) -> Result<Vec<RegisteredSensor>> {
        let mut stmt = self.conn.prepare(
            "SELECT sensor_id, interval, last_synced, pending, active
             FROM sensors ORDER BY sensor_id",
        )?;

        let sensors = stmt
            .query_map([], |row| {
                Ok(RegisteredSensor {
                    sensor_id: row.get(0)?,
                    interval_tag: row.get(1)?,
                    last_synced: row
                        .get::<_, Option<i64>>(2)?
                        .map(|ts| OffsetDateTime::from_unix_timestamp(ts).unwrap()),
                    pending: row.get(3)?,
                    active: row.get(4)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(sensors)
    }

    /// Record a successful sync by advancing the sensor's baseline.
    pub fn set_last_synced(&self, sensor_id: SensorId, ts: OffsetDateTime) -> Result<()> {
        let rows = self.conn.execute(
            "UPDATE sensors SET last_synced = ?2 WHERE sensor_id = ?1",
            rusqlite::params![sensor_id, ts.unix_timestamp()],
        )?;

        if rows == 0 {
            return Err(Error::SensorNotFound(sensor_id));
        }

        debug!("Advanced baseline for sensor {} to {}", sensor_id, ts);
        Ok(())
    }
}

// Claim operations
impl Store {
    /// Select one sensor eligible for synchronization.
    ///
    /// Eligible means active, unclaimed, and either never synced or stale by
    /// at least `stale_after`. Sensors in `exclude` (this process's in-flight
    /// set) are skipped; never-synced sensors sort first.
    pub fn select_eligible(
        &self,
        stale_after: Duration,
        exclude: &[SensorId],
    ) -> Result<Option<SensorId>> {
        let cutoff = (OffsetDateTime::now_utc() - stale_after).unix_timestamp();

        let mut sql = String::from(
            "SELECT sensor_id FROM sensors
             WHERE active = 1 AND pending = 0
             AND (last_synced IS NULL OR last_synced <= ?1)",
        );
        for id in exclude {
            sql.push_str(&format!(" AND sensor_id <> {id}"));
        }
        sql.push_str(" ORDER BY last_synced ASC LIMIT 1");

        let sensor_id = self
            .conn
            .query_row(&sql, [cutoff], |row| row.get(0))
            .optional()?;

        Ok(sensor_id)
    }

    /// Atomically claim a sensor for synchronization.
    ///
    /// Returns false when another process won the race; the single
    /// conditional UPDATE is the pipeline's only mutual-exclusion step.
    pub fn try_claim(&self, sensor_id: SensorId) -> Result<bool> {
        let rows = self.conn.execute(
            "UPDATE sensors SET pending = 1 WHERE sensor_id = ?1 AND pending = 0",
            [sensor_id],
        )?;

        Ok(rows == 1)
    }

    /// Release a sensor's claim unconditionally.
    pub fn release_claim(&self, sensor_id: SensorId) -> Result<()> {
        self.conn.execute(
            "UPDATE sensors SET pending = 0 WHERE sensor_id = ?1",
            [sensor_id],
        )?;

        Ok(())
    }

    /// Clear every claim in the registry.
    ///
    /// Used on startup and as the periodic safety net; the registry carries
    /// no process identity, so recovery from a crashed worker is coarse.
    pub fn reset_claims(&self) -> Result<usize> {
        let rows = self
            .conn
            .execute("UPDATE sensors SET pending = 0 WHERE pending = 1", [])?;

        if rows > 0 {
            info!("Cleared {} stale claim(s)", rows);
        }
        Ok(rows)
    }
}

// Reading operations
impl Store {
    /// Idempotent bulk insert into one of the reading series.
    ///
    /// Rows whose key already exists are silently ignored; rows with a
    /// missing or non-positive sensor id are skipped with a warning. An
    /// empty input is a no-op.
    pub fn insert_readings(&self, series: Series, readings: &[Reading]) -> Result<BatchWrite> {
        let mut outcome = BatchWrite::default();
        if readings.is_empty() {
            return Ok(outcome);
        }

        let sql = format!(
            "INSERT OR IGNORE INTO {} (sensor_id, timestamp, value) VALUES (?1, ?2, ?3)",
            series.table()
        );
        let mut stmt = self.conn.prepare_cached(&sql)?;

        for (index, reading) in readings.iter().enumerate() {
            if reading.sensor_id <= 0 {
                // The count query already proved the row exists upstream, so
                // a missing id is corruption there, not a fault here.
                warn!("Skipping reading with missing sensor id at index {}", index);
                outcome.skipped += 1;
                continue;
            }

            let inserted = stmt.execute(rusqlite::params![
                reading.sensor_id,
                reading.timestamp.unix_timestamp(),
                reading.value,
            ])?;
            outcome.written += inserted;
            outcome.duplicates += 1 - inserted;
        }

        debug!(
            "Batch write to {}: {} written, {} duplicates, {} skipped",
            series.table(),
            outcome.written,
            outcome.duplicates,
            outcome.skipped
        );

        Ok(outcome)
    }

    /// Count stored readings, optionally for a single sensor.
    pub fn count_readings(&self, series: Series, sensor_id: Option<SensorId>) -> Result<u64> {
        let count: i64 = match sensor_id {
            Some(id) => self.conn.query_row(
                &format!(
                    "SELECT COUNT(*) FROM {} WHERE sensor_id = ?",
                    series.table()
                ),
                [id],
                |row| row.get(0),
            )?,
            None => self.conn.query_row(
                &format!("SELECT COUNT(*) FROM {}", series.table()),
                [],
                |row| row.get(0),
            )?,
        };

        Ok(count as u64)
    }

    /// Query a sensor's readings in ascending timestamp order.
    pub fn query_readings(
        &self,
        series: Series,
        sensor_id: SensorId,
        since: Option<OffsetDateTime>,
        until: Option<OffsetDateTime>,
    ) -> Result<Vec<Reading>> {
        let mut conditions = vec!["sensor_id = ?".to_string()];
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = vec![Box::new(sensor_id)];

        if let Some(since) = since {
            conditions.push("timestamp >= ?".to_string());
            params.push(Box::new(since.unix_timestamp()));
        }

        if let Some(until) = until {
            conditions.push("timestamp < ?".to_string());
            params.push(Box::new(until.unix_timestamp()));
        }

        let sql = format!(
            "SELECT sensor_id, timestamp, value FROM {} WHERE {} ORDER BY timestamp",
            series.table(),
            conditions.join(" AND ")
        );

        let params_ref: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();

        let mut stmt = self.conn.prepare(&sql)?;
        let readings = stmt
            .query_map(params_ref.as_slice(), |row| {
                Ok(Reading {
                    sensor_id: row.get(0)?,
                    timestamp: OffsetDateTime::from_unix_timestamp(row.get(1)?).unwrap(),
                    value: row.get(2)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(readings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::Duration as TimeDuration;

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

    #[test]
    fn test_open_in_memory() {
        let store = Store::open_in_memory().unwrap();
        assert!(store.list_sensors().unwrap().is_empty());
    }

    #[test]
    fn test_open_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path().join("nested").join("data.db")).unwrap();
        store
            .upsert_sensor(1, "PT1H", true)
            .unwrap();
        assert_eq!(store.list_sensors().unwrap().len(), 1);
    }

    #[test]
    fn test_upsert_preserves_pipeline_fields() {
        let store = Store::open_in_memory().unwrap();
        store
            .upsert_sensor(7, "PT10M", true)
            .unwrap();

        let ts = OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap();
        store.set_last_synced(7, ts).unwrap();
        assert!(store.try_claim(7).unwrap());

        // Bootstrap refresh must not clobber the claim or the baseline
        let sensor = store
            .upsert_sensor(7, "PT1M", true)
            .unwrap();
        assert_eq!(sensor.interval_tag, "PT1M");
        assert!(sensor.pending);
        assert_eq!(sensor.last_synced.unwrap().unix_timestamp(), 1_700_000_000);
    }

    #[test]
    fn test_set_last_synced_unknown_sensor() {
        let store = Store::open_in_memory().unwrap();
        let result = store.set_last_synced(99, OffsetDateTime::now_utc());
        assert!(matches!(result, Err(Error::SensorNotFound(99))));
    }

    #[test]
    fn test_claim_is_mutually_exclusive() {
        let store = Store::open_in_memory().unwrap();
        store
            .upsert_sensor(1, "PT1H", true)
            .unwrap();

        assert!(store.try_claim(1).unwrap());
        assert!(!store.try_claim(1).unwrap());

        store.release_claim(1).unwrap();
        assert!(store.try_claim(1).unwrap());
    }

    #[test]
    fn test_reset_claims() {
        let store = Store::open_in_memory().unwrap();
        for id in 1..=3 {
            store
                .upsert_sensor(id, "PT1H", true)
                .unwrap();
            assert!(store.try_claim(id).unwrap());
        }

        assert_eq!(store.reset_claims().unwrap(), 3);
        for id in 1..=3 {
            assert!(!store.get_sensor(id).unwrap().unwrap().pending);
        }
    }

    #[test]
    fn test_select_eligible() {
        let store = Store::open_in_memory().unwrap();
        let stale_after = Duration::from_secs(4 * 3600);
        let now = OffsetDateTime::now_utc();

        // Never synced: eligible, and sorts before stale sensors
        store
            .upsert_sensor(1, "PT1H", true)
            .unwrap();
        // Stale: eligible
        store
            .upsert_sensor(2, "PT1H", true)
            .unwrap();
        store
            .set_last_synced(2, now - TimeDuration::hours(5))
            .unwrap();
        // Fresh: not eligible
        store
            .upsert_sensor(3, "PT1H", true)
            .unwrap();
        store
            .set_last_synced(3, now - TimeDuration::hours(1))
            .unwrap();
        // Inactive: never eligible
        store
            .upsert_sensor(4, "PT1H", false)
            .unwrap();

        assert_eq!(store.select_eligible(stale_after, &[]).unwrap(), Some(1));
        assert_eq!(store.select_eligible(stale_after, &[1]).unwrap(), Some(2));
        assert_eq!(store.select_eligible(stale_after, &[1, 2]).unwrap(), None);

        // A claim removes the sensor from the eligible pool
        assert!(store.try_claim(2).unwrap());
        assert_eq!(store.select_eligible(stale_after, &[1]).unwrap(), None);
    }

    #[test]
    fn test_insert_readings_is_idempotent() {
        let store = Store::open_in_memory().unwrap();
        let rows = readings(1, 1_700_000_000, 10, 100);

        let first = store.insert_readings(Series::Raw, &rows).unwrap();
        assert_eq!(first.written, 100);
        assert_eq!(first.duplicates, 0);

        let second = store.insert_readings(Series::Raw, &rows).unwrap();
        assert_eq!(second.written, 0);
        assert_eq!(second.duplicates, 100);

        assert_eq!(store.count_readings(Series::Raw, Some(1)).unwrap(), 100);
    }

    #[test]
    fn test_insert_readings_skips_missing_sensor_id() {
        let store = Store::open_in_memory().unwrap();
        let mut rows = readings(1, 1_700_000_000, 10, 5);
        rows[2].sensor_id = 0;

        let outcome = store.insert_readings(Series::Raw, &rows).unwrap();
        assert_eq!(outcome.written, 4);
        assert_eq!(outcome.skipped, 1);
        assert_eq!(store.count_readings(Series::Raw, Some(1)).unwrap(), 4);
    }

    #[test]
    fn test_insert_readings_empty_is_noop() {
        let store = Store::open_in_memory().unwrap();
        let outcome = store.insert_readings(Series::Hourly, &[]).unwrap();
        assert_eq!(outcome, BatchWrite::default());
    }

    #[test]
    fn test_series_are_separate() {
        let store = Store::open_in_memory().unwrap();
        let rows = readings(1, 1_700_000_000, 60, 10);

        store.insert_readings(Series::Raw, &rows).unwrap();
        store.insert_readings(Series::Hourly, &rows[..3]).unwrap();

        assert_eq!(store.count_readings(Series::Raw, None).unwrap(), 10);
        assert_eq!(store.count_readings(Series::Hourly, None).unwrap(), 3);
    }

    #[test]
    fn test_query_readings_range() {
        let store = Store::open_in_memory().unwrap();
        let rows = readings(1, 1_700_000_000, 60, 10);
        store.insert_readings(Series::Raw, &rows).unwrap();

        let since = rows[2].timestamp;
        let until = rows[7].timestamp;
        let range = store
            .query_readings(Series::Raw, 1, Some(since), Some(until))
            .unwrap();

        assert_eq!(range.len(), 5);
        assert_eq!(range[0].timestamp, rows[2].timestamp);
        assert_eq!(range[4].timestamp, rows[6].timestamp);
    }
}

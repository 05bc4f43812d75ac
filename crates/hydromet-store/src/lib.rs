//! Sensor registry and time-series staging store for hydromet.
//!
//! This crate provides SQLite-based persistence for the sync pipeline: the
//! sensor registry (interval tag, last-synced baseline, pending and active
//! flags) and the raw and hourly reading series.
//!
//! The registry's pending flag is the pipeline's only cross-process
//! mutual-exclusion primitive; [`Store::try_claim`] models it as an atomic
//! conditional update. The reading tables enforce `(sensor_id, timestamp)`
//! uniqueness, which makes every batch write idempotent.
//!
//! # Example
//!
//! ```no_run
//! use hydromet_store::Store;
//!
//! let store = Store::open_default()?;
//! if store.try_claim(7)? {
//!     // ... synchronize sensor 7 ...
//!     store.release_claim(7)?;
//! }
//! # Ok::<(), hydromet_store::Error>(())
//! ```

mod error;
mod models;
mod schema;
mod store;

pub use error::{Error, Result};
pub use models::{BatchWrite, RegisteredSensor, Series};
pub use store::Store;

/// Default database path following platform conventions.
///
/// - Linux: `~/.local/share/hydromet/data.db`
/// - macOS: `~/Library/Application Support/hydromet/data.db`
/// - Windows: `C:\Users\<user>\AppData\Local\hydromet\data.db`
pub fn default_db_path() -> std::path::PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join("hydromet")
        .join("data.db")
}

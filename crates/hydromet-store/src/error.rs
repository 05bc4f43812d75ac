//! Error types for hydromet-store.

use std::path::PathBuf;

use hydromet_types::SensorId;

/// Result type for hydromet-store operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in hydromet-store.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Database error from SQLite.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Failed to create database directory.
    #[error("failed to create database directory {path}: {source}")]
    CreateDirectory {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Sensor not found in the registry.
    #[error("sensor not found: {0}")]
    SensorNotFound(SensorId),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

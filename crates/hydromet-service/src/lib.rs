//! Claim scheduler, sync worker and trigger API for hydromet.
//!
//! This crate is the running half of the ingest pipeline:
//! - The claim scheduler selects stale sensors from the registry, claims
//!   them via the pending flag, and runs sync workers up to a bounded
//!   concurrency ceiling. Several service processes can share one registry.
//! - The sync worker pages outstanding readings out of the remote
//!   measurement service, downsamples them to the hourly series and writes
//!   both series idempotently.
//! - A small HTTP API exposes the on-demand sync trigger plus health and
//!   status endpoints.
//!
//! # Configuration
//!
//! The service reads configuration from `~/.config/hydromet/service.toml`:
//!
//! ```toml
//! [server]
//! bind = "127.0.0.1:8080"
//!
//! [storage]
//! path = "~/.local/share/hydromet/data.db"
//!
//! [source]
//! base_url = "http://measurements.example.net/data"
//!
//! [sync]
//! update_interval = 14400
//! max_concurrent = 5
//! claim_timeout = 300
//! ```

pub mod api;
pub mod config;
pub mod scheduler;
pub mod state;
pub mod worker;

pub use config::{Config, ConfigError, ServerConfig, SourceConfig, StorageConfig, SyncConfig};
pub use scheduler::Scheduler;
pub use state::{AppState, SchedulerState, SensorSyncStats};
pub use worker::{SyncReport, WorkerError, sync_sensor};

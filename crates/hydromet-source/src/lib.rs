//! Client for the remote measurement service consumed by hydromet.
//!
//! The service exposes two operations: a count query for a sensor set and
//! time window, and a paginated fetch returning up to 1000 readings per call
//! in ascending timestamp order. This crate abstracts them behind the
//! [`ReadingSource`] trait, with an HTTP implementation for production and a
//! [`MockSource`] for tests.
//!
//! Transient transport faults are retryable (see [`with_retry`]); malformed
//! payloads and application-level errors are not.
//!
//! # Example
//!
//! ```no_run
//! use hydromet_source::{HttpSource, ReadingSource};
//! use hydromet_types::FetchWindow;
//! use time::OffsetDateTime;
//!
//! # async fn example() -> Result<(), hydromet_source::Error> {
//! let source = HttpSource::new("http://measurements.example.net", None)?;
//! let window = FetchWindow::from_baseline(
//!     OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap(),
//!     OffsetDateTime::now_utc(),
//! );
//! let total = source.count(&[7], window).await?;
//! # Ok(())
//! # }
//! ```

mod client;
mod error;
mod http;
mod mock;
mod retry;

pub use client::ReadingSource;
pub use error::{Error, Result};
pub use http::HttpSource;
pub use mock::MockSource;
pub use retry::{RetryConfig, with_retry};

//! HTTP implementation of [`ReadingSource`].

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::debug;

use hydromet_types::{FetchWindow, PageCursor, Reading, SensorId};

use crate::client::ReadingSource;
use crate::error::{Error, Result};

/// Default request timeout for the measurement service.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Client for the measurement service's HTTP interface.
///
/// The service accepts form-encoded POSTs and answers with JSON; failures at
/// the application level arrive as an `{"error": …}` body with a 200 status,
/// so both shapes are handled on every call.
pub struct HttpSource {
    client: reqwest::Client,
    base_url: String,
}

impl HttpSource {
    /// Create a client for the service at `base_url`.
    pub fn new(base_url: impl Into<String>, timeout: Option<Duration>) -> Result<Self> {
        let base_url = base_url.into();
        if base_url.is_empty() {
            return Err(Error::InvalidConfig("base URL cannot be empty".to_string()));
        }

        let client = reqwest::Client::builder()
            .timeout(timeout.unwrap_or(DEFAULT_TIMEOUT))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn window_params(
        sensor_ids: &[SensorId],
        window: FetchWindow,
    ) -> Result<Vec<(&'static str, String)>> {
        let ids = sensor_ids
            .iter()
            .map(|id| id.to_string())
            .collect::<Vec<_>>()
            .join(",");

        Ok(vec![
            ("sensor_ids", ids),
            ("start", format_timestamp(window.start)?),
            ("end", format_timestamp(window.end)?),
        ])
    }
}

fn format_timestamp(ts: OffsetDateTime) -> Result<String> {
    ts.format(&Rfc3339)
        .map_err(|e| Error::malformed(format!("unrepresentable timestamp: {e}")))
}

/// Body of a count response.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum CountBody {
    Ok { num_results: u64 },
    Err { error: String },
}

/// Body of a search response.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SearchBody {
    Ok { result: Vec<WireReading> },
    Err { error: String },
}

/// One reading as serialized on the wire.
#[derive(Debug, Deserialize)]
struct WireReading {
    sensor_id: SensorId,
    #[serde(with = "time::serde::rfc3339")]
    timestamp: OffsetDateTime,
    value: f64,
}

impl From<WireReading> for Reading {
    fn from(wire: WireReading) -> Self {
        Reading::new(wire.sensor_id, wire.timestamp, wire.value)
    }
}

#[async_trait]
impl ReadingSource for HttpSource {
    async fn count(&self, sensor_ids: &[SensorId], window: FetchWindow) -> Result<u64> {
        let params = Self::window_params(sensor_ids, window)?;

        let response = self
            .client
            .post(format!("{}/num_results", self.base_url))
            .form(&params)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Error::Status {
                operation: "num_results",
                status: response.status().as_u16(),
            });
        }

        match response.json::<CountBody>().await {
            Ok(CountBody::Ok { num_results }) => {
                debug!(num_results, "count query complete");
                Ok(num_results)
            }
            Ok(CountBody::Err { error }) => Err(Error::Remote(error)),
            Err(e) => Err(Error::malformed(e.to_string())),
        }
    }

    async fn fetch(
        &self,
        sensor_ids: &[SensorId],
        window: FetchWindow,
        offset: u64,
        limit: u16,
    ) -> Result<Vec<Reading>> {
        let mut params = Self::window_params(sensor_ids, window)?;
        params.push(("skip", offset.to_string()));
        params.push((
            "limit",
            limit.min(PageCursor::MAX_PAGE_SIZE).to_string(),
        ));

        let response = self
            .client
            .post(format!("{}/search", self.base_url))
            .form(&params)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Error::Status {
                operation: "search",
                status: response.status().as_u16(),
            });
        }

        match response.json::<SearchBody>().await {
            Ok(SearchBody::Ok { result }) => {
                debug!(rows = result.len(), offset, "page fetch complete");
                Ok(result.into_iter().map(Reading::from).collect())
            }
            Ok(SearchBody::Err { error }) => Err(Error::Remote(error)),
            Err(e) => Err(Error::malformed(e.to_string())),
        }
    }
}

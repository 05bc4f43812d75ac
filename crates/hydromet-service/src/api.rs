//! HTTP surface of the service.
//!
//! The only operation exposed outward is the per-sensor sync trigger, used
//! by the registry-refresh collaborator for newly added sensors and by
//! operators; health and status endpoints round it out. Data queries are
//! served elsewhere.
//!
//! The trigger participates in the same claim protocol as the scheduler: it
//! claims the sensor before syncing and releases the claim afterwards, so a
//! manual trigger can never run concurrently with a scheduled sync of the
//! same sensor.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use serde::Serialize;
use time::OffsetDateTime;
use tracing::error;

use hydromet_types::SensorId;

use crate::state::{AppState, SensorSyncStats};
use crate::worker::{self, SyncReport, WorkerError};

/// Create the API router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/status", get(get_status))
        .route("/api/sensors/{id}/sync", post(trigger_sync))
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

/// Health check endpoint.
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        timestamp: OffsetDateTime::now_utc(),
    })
}

/// Scheduler status response.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    /// Whether the scheduler loop is running.
    pub scheduler_running: bool,
    /// When the scheduler started.
    #[serde(with = "time::serde::rfc3339::option")]
    pub started_at: Option<OffsetDateTime>,
    /// Per-sensor sync statistics.
    pub sensors: Vec<SensorSyncStats>,
}

/// Scheduler status endpoint.
async fn get_status(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    let mut sensors: Vec<SensorSyncStats> = state
        .scheduler
        .sensor_stats
        .read()
        .await
        .values()
        .cloned()
        .collect();
    sensors.sort_by_key(|s| s.sensor_id);

    Json(StatusResponse {
        scheduler_running: state.scheduler.is_running(),
        started_at: state.scheduler.started_at(),
        sensors,
    })
}

/// Trigger a synchronization pass for one sensor.
async fn trigger_sync(
    State(state): State<Arc<AppState>>,
    Path(sensor_id): Path<SensorId>,
) -> Result<Json<SyncReport>, AppError> {
    {
        let store = state.store.lock().await;
        if store.get_sensor(sensor_id)?.is_none() {
            return Err(AppError::not_found(format!("sensor {} not found", sensor_id)));
        }
        if !store.try_claim(sensor_id)? {
            return Err(AppError::conflict(format!(
                "sensor {} sync already in progress",
                sensor_id
            )));
        }
    }

    state.scheduler.set_syncing(sensor_id, true).await;
    let outcome = worker::sync_sensor(&state, sensor_id).await;

    {
        let store = state.store.lock().await;
        if let Err(e) = store.release_claim(sensor_id) {
            error!(sensor_id, "Failed to release trigger claim: {}", e);
        }
    }

    match outcome {
        Ok(report) => {
            state.scheduler.record_success(&report).await;
            Ok(Json(report))
        }
        Err(e) => {
            state
                .scheduler
                .record_failure(sensor_id, e.to_string())
                .await;
            Err(AppError::from_worker(e))
        }
    }
}

/// API error with status code and message.
#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    message: String,
}

impl AppError {
    fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }

    fn conflict(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::CONFLICT,
            message: message.into(),
        }
    }

    fn from_worker(error: WorkerError) -> Self {
        let status = match &error {
            WorkerError::SensorNotFound(_) => StatusCode::NOT_FOUND,
            WorkerError::NoBaseline(_) | WorkerError::UnsupportedInterval { .. } => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            WorkerError::Fetch { .. } => StatusCode::BAD_GATEWAY,
            WorkerError::Store { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            message: error.to_string(),
        }
    }
}

impl From<hydromet_store::Error> for AppError {
    fn from(error: hydromet_store::Error) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: error.to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let body = Json(serde_json::json!({ "error": self.message }));
        (self.status, body).into_response()
    }
}

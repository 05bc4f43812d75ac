//! Distributed work-claiming scheduler.
//!
//! One scheduler loop runs per worker process. Each cycle it selects an
//! eligible sensor from the registry, claims it by atomically flipping the
//! row's pending flag, and spawns a sync worker for it — up to a bounded
//! number of concurrency slots. Completed workers release their claim and
//! free their slot immediately, so a busy registry keeps every slot full.
//!
//! The pending flag is the only coordination state shared with other worker
//! processes; there is no lock service. Crash recovery is accordingly
//! coarse: claims are cleared wholesale on startup and on a periodic safety
//! net, and an individual claim stuck past the configured timeout is
//! reclaimed with its worker abandoned (its eventual writes stay idempotent).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::{AbortHandle, JoinError, JoinSet};
use tokio::time::{Instant, sleep};
use tracing::{debug, error, info, warn};

use hydromet_types::SensorId;

use crate::state::AppState;
use crate::worker::{self, SyncReport, WorkerError};

/// Handle for starting the scheduler loop.
pub struct Scheduler {
    state: Arc<AppState>,
}

impl Scheduler {
    /// Create a new scheduler.
    pub fn new(state: Arc<AppState>) -> Self {
        Self { state }
    }

    /// Start the scheduler loop in the background.
    ///
    /// Returns immediately; stop it via
    /// [`SchedulerState::signal_stop`](crate::state::SchedulerState::signal_stop).
    pub fn start(&self) {
        let state = Arc::clone(&self.state);
        tokio::spawn(async move {
            run_loop(state).await;
        });
    }
}

/// A claim this process currently holds.
struct InFlight {
    claimed_at: Instant,
    abort: AbortHandle,
}

/// The scheduler loop. Runs until the stop signal fires.
pub async fn run_loop(state: Arc<AppState>) {
    let sync_cfg = state.config.sync.clone();
    let mut stop_rx = state.scheduler.subscribe_stop();
    state.scheduler.set_running(true);
    info!(
        max_concurrent = sync_cfg.max_concurrent,
        "Scheduler started"
    );

    // Startup reset: claims left by a previous crash are indistinguishable
    // from live ones, so clear them all before selecting anything.
    if let Err(e) = reset_claims(&state).await {
        error!("Startup claim reset failed: {}", e);
    }
    let mut last_reset = Instant::now();

    let mut tasks: JoinSet<(SensorId, Result<SyncReport, WorkerError>)> = JoinSet::new();
    let mut in_flight: HashMap<SensorId, InFlight> = HashMap::new();

    loop {
        if *stop_rx.borrow() {
            break;
        }

        // Periodic safety net: wholesale claim reset
        if last_reset.elapsed() >= sync_cfg.reset_interval() {
            if !in_flight.is_empty() {
                warn!(
                    abandoned = in_flight.len(),
                    "Periodic claim reset; abandoning in-flight syncs"
                );
            }
            for claim in in_flight.values() {
                claim.abort.abort();
            }
            in_flight.clear();
            if let Err(e) = reset_claims(&state).await {
                error!("Periodic claim reset failed: {}", e);
            }
            last_reset = Instant::now();
        }

        reclaim_stuck(&state, &mut in_flight, sync_cfg.claim_timeout()).await;

        let idle = if in_flight.len() < sync_cfg.max_concurrent {
            let exclude: Vec<SensorId> = in_flight.keys().copied().collect();
            match claim_next(&state, &exclude, sync_cfg.update_interval()).await {
                Ok(Some(sensor_id)) => {
                    debug!(sensor_id, "Claimed sensor");
                    let task_state = Arc::clone(&state);
                    let abort = tasks.spawn(async move {
                        task_state.scheduler.set_syncing(sensor_id, true).await;
                        let outcome = worker::sync_sensor(&task_state, sensor_id).await;
                        (sensor_id, outcome)
                    });
                    in_flight.insert(
                        sensor_id,
                        InFlight {
                            claimed_at: Instant::now(),
                            abort,
                        },
                    );
                    // Work-conserving: try to fill the next slot immediately
                    continue;
                }
                Ok(None) => sync_cfg.update_interval(),
                Err(e) => {
                    error!("Sensor selection failed: {}", e);
                    sync_cfg.idle_backoff()
                }
            }
        } else {
            sync_cfg.idle_backoff()
        };

        // With syncs in flight, wake at least once per claim timeout so a
        // stuck worker is reclaimed even during a long idle wait.
        let idle = if in_flight.is_empty() {
            idle
        } else {
            idle.min(sync_cfg.claim_timeout())
        };

        tokio::select! {
            _ = stop_rx.changed() => break,
            Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                handle_completion(&state, &mut in_flight, joined).await;
            }
            _ = sleep(idle) => {}
        }
    }

    // Shutdown: abandon running workers and hand their sensors back.
    tasks.abort_all();
    while tasks.join_next().await.is_some() {}
    for sensor_id in in_flight.keys().copied().collect::<Vec<_>>() {
        release(&state, sensor_id).await;
    }
    state.scheduler.set_running(false);
    info!("Scheduler stopped");
}

/// Select and claim one eligible sensor, skipping `exclude`.
///
/// A selection that loses the claim race to another process moves on to the
/// next candidate instead of assuming success.
async fn claim_next(
    state: &AppState,
    exclude: &[SensorId],
    stale_after: Duration,
) -> Result<Option<SensorId>, hydromet_store::Error> {
    let store = state.store.lock().await;

    loop {
        let Some(sensor_id) = store.select_eligible(stale_after, exclude)? else {
            return Ok(None);
        };

        if store.try_claim(sensor_id)? {
            return Ok(Some(sensor_id));
        }
        // Lost the race; the loser's candidate now has pending = 1 and will
        // not be selected again this pass.
    }
}

/// Reclaim claims whose worker has been running past the timeout.
async fn reclaim_stuck(
    state: &AppState,
    in_flight: &mut HashMap<SensorId, InFlight>,
    timeout: Duration,
) {
    let stuck: Vec<SensorId> = in_flight
        .iter()
        .filter(|(_, claim)| claim.claimed_at.elapsed() >= timeout)
        .map(|(id, _)| *id)
        .collect();

    for sensor_id in stuck {
        if let Some(claim) = in_flight.remove(&sensor_id) {
            warn!(sensor_id, "Sync exceeded claim timeout; reclaiming");
            claim.abort.abort();
            release(state, sensor_id).await;
            state
                .scheduler
                .record_failure(sensor_id, "claim timeout exceeded".to_string())
                .await;
        }
    }
}

/// Process one finished sync task.
async fn handle_completion(
    state: &AppState,
    in_flight: &mut HashMap<SensorId, InFlight>,
    joined: Result<(SensorId, Result<SyncReport, WorkerError>), JoinError>,
) {
    match joined {
        Ok((sensor_id, outcome)) => {
            in_flight.remove(&sensor_id);
            release(state, sensor_id).await;
            match outcome {
                Ok(report) => {
                    state.scheduler.record_success(&report).await;
                }
                Err(e) => {
                    warn!(sensor_id, "Sync failed: {}", e);
                    state
                        .scheduler
                        .record_failure(sensor_id, e.to_string())
                        .await;
                }
            }
        }
        Err(join_err) if join_err.is_cancelled() => {
            // Reclaim or shutdown already released this claim
            debug!("Abandoned sync task drained");
        }
        Err(join_err) => {
            // A panicked worker still holds its claim; find it by task id
            let task_id = join_err.id();
            let sensor_id = in_flight
                .iter()
                .find(|(_, claim)| claim.abort.id() == task_id)
                .map(|(id, _)| *id);

            match sensor_id {
                Some(sensor_id) => {
                    error!(sensor_id, "Sync task panicked: {}", join_err);
                    in_flight.remove(&sensor_id);
                    release(state, sensor_id).await;
                    state
                        .scheduler
                        .record_failure(sensor_id, format!("sync task panicked: {}", join_err))
                        .await;
                }
                None => error!("Sync task panicked: {}", join_err),
            }
        }
    }
}

/// Release one claim, unconditionally.
async fn release(state: &AppState, sensor_id: SensorId) {
    let store = state.store.lock().await;
    if let Err(e) = store.release_claim(sensor_id) {
        error!(sensor_id, "Failed to release claim: {}", e);
    }
}

/// Clear every claim in the registry.
async fn reset_claims(state: &AppState) -> Result<usize, hydromet_store::Error> {
    let store = state.store.lock().await;
    store.reset_claims()
}

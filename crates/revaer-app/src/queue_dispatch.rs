//! Dispatches newly queued jobs to the background-execution engine's download phase.
//!
//! Mirrors the health monitor's own sweep loop: newly inserted jobs have no background-execution
//! handle yet, so they need the same kind of periodic sweep the health monitor uses for stuck
//! jobs, just targeting `QUEUED` rather than stale `DOWNLOADING`/`UPLOADING` ones.

use std::time::Duration;

use revaer_data::DataStore;
use revaer_jobs_core::BackgroundExecutionEngine;
use revaer_telemetry::Metrics;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Default period between sweeps for newly queued jobs.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Poll `store` for queued jobs and enqueue each one's download phase on `engine`, until
/// `cancel` fires.
pub async fn run(
    store: &DataStore,
    engine: &dyn BackgroundExecutionEngine,
    poll_interval: Duration,
    cancel: &CancellationToken,
    metrics: Option<&Metrics>,
) {
    loop {
        match dispatch_once(store, engine, metrics).await {
            Ok(dispatched) if dispatched > 0 => info!(dispatched, "dispatched queued jobs for download"),
            Ok(_) => {}
            Err(err) => warn!(error = %err, "queue dispatch sweep failed"),
        }
        tokio::select! {
            () = cancel.cancelled() => return,
            () = tokio::time::sleep(poll_interval) => {}
        }
    }
}

async fn dispatch_once(store: &DataStore, engine: &dyn BackgroundExecutionEngine, metrics: Option<&Metrics>) -> anyhow::Result<usize> {
    let queued = store.jobs().list_queued().await?;
    if let Some(metrics) = metrics {
        #[expect(clippy::cast_possible_wrap, reason = "queue depth stays well under i64::MAX")]
        metrics.set_queue_depth(queued.len() as i64);
    }
    let mut dispatched = 0;
    for job in queued {
        let target = format!("download:{}", job.id);
        match engine.enqueue(&target, &job.id.to_string()).await {
            Ok(handle) => {
                if let Err(err) = store.jobs().set_hangfire_job_id(job.id, Some(handle.as_str())).await {
                    warn!(job_id = job.id, error = %err, "queued job dispatched but handle could not be persisted");
                    continue;
                }
                dispatched += 1;
            }
            Err(err) => warn!(job_id = job.id, error = %err, "failed to dispatch queued job"),
        }
    }
    Ok(dispatched)
}

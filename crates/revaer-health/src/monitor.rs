//! Staleness sweep and background-execution-engine-aware recovery for stuck jobs.

use std::sync::Arc;
use std::time::Duration;

use chrono::{Duration as ChronoDuration, Utc};
use revaer_data::{DataError, DataStore, record_transition};
use revaer_events::{Event, EventBus};
use revaer_jobs_core::{BackgroundExecutionEngine, ExecutionState, JobSource, JobStatus, UserJob};
use revaer_telemetry::Metrics;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, info, warn};

use crate::error::HealthResult;

/// Default poll period for the staleness sweep, used when no override is supplied.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2 * 60);
/// Default staleness window, used when no override is supplied.
pub const DEFAULT_STALE_AFTER: Duration = Duration::from_secs(5 * 60);
/// Phases actively monitored for staleness; retry/queued states are not running workers and so
/// have no heartbeat to go stale.
const MONITORED_STATUSES: &[JobStatus] = &[JobStatus::Downloading, JobStatus::Uploading];

/// Which phase a stale job's handle belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Download,
    Upload,
}

impl Phase {
    const fn of(status: JobStatus) -> Option<Self> {
        match status {
            JobStatus::Downloading => Some(Self::Download),
            JobStatus::Uploading => Some(Self::Upload),
            _ => None,
        }
    }

    const fn target_prefix(self) -> &'static str {
        match self {
            Self::Download => "download",
            Self::Upload => "upload",
        }
    }
}

/// Collaborators the health monitor needs to sweep and recover stale jobs.
pub struct HealthMonitor {
    store: DataStore,
    engine: Arc<dyn BackgroundExecutionEngine>,
    poll_interval: Duration,
    stale_after: Duration,
    events: Option<EventBus>,
    metrics: Option<Metrics>,
}

impl HealthMonitor {
    /// Construct a health monitor wired to the job pipeline's collaborators, using the default
    /// poll interval and staleness window.
    #[must_use]
    pub const fn new(store: DataStore, engine: Arc<dyn BackgroundExecutionEngine>) -> Self {
        Self {
            store,
            engine,
            poll_interval: DEFAULT_POLL_INTERVAL,
            stale_after: DEFAULT_STALE_AFTER,
            events: None,
            metrics: None,
        }
    }

    /// Override the poll interval and staleness window, typically sourced from process
    /// configuration.
    #[must_use]
    pub const fn with_cadence(mut self, poll_interval: Duration, stale_after: Duration) -> Self {
        self.poll_interval = poll_interval;
        self.stale_after = stale_after;
        self
    }

    /// Publish a [`Event::JobRecovered`] event for every stale job the sweep recovers.
    #[must_use]
    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    /// Attach a metrics registry so recovered jobs are counted.
    #[must_use]
    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = Some(metrics);
        self
    }
}

/// Run the staleness sweep on a fixed period, ticking once immediately at startup per the
/// monitored-loop contract, until `cancel` fires.
pub async fn run(monitor: &HealthMonitor, cancel: &CancellationToken) {
    loop {
        match run_once(monitor).await {
            Ok(recovered) if recovered > 0 => info!(recovered, "health monitor recovered stale jobs"),
            Ok(_) => {}
            Err(err) => warn!(error = %err, "health monitor sweep failed"),
        }
        tokio::select! {
            () = cancel.cancelled() => return,
            () = tokio::time::sleep(monitor.poll_interval) => {}
        }
    }
}

/// Run a single staleness sweep, returning the number of jobs recovered.
///
/// # Errors
///
/// Returns an error if the stale-job query itself fails. A single job's recovery failing does
/// not abort the sweep; it is logged and the sweep continues with the remaining jobs.
pub async fn run_once(monitor: &HealthMonitor) -> HealthResult<usize> {
    let stale_before = Utc::now()
        - ChronoDuration::from_std(monitor.stale_after).unwrap_or(ChronoDuration::seconds(0));
    let stale_jobs = monitor.store.jobs().list_stale(MONITORED_STATUSES, stale_before).await?;

    let mut recovered = 0;
    for job in stale_jobs {
        let job_id = job.id;
        match recover_job(monitor, &job).instrument(revaer_telemetry::run_span("health_recover", job_id)).await {
            Ok(true) => {
                recovered += 1;
                if let Some(metrics) = &monitor.metrics {
                    metrics.inc_stale_recovery();
                }
            }
            Ok(false) => {}
            Err(err) => warn!(job_id, error = %err, "failed to recover stale job"),
        }
    }
    Ok(recovered)
}

/// Decide whether a stale job needs recovery and, if so, re-enqueue its active phase.
async fn recover_job(monitor: &HealthMonitor, job: &UserJob) -> HealthResult<bool> {
    let Some(phase) = Phase::of(job.status) else {
        return Ok(false);
    };
    let handle = match phase {
        Phase::Download => job.hangfire_job_id.as_deref(),
        Phase::Upload => job.hangfire_upload_job_id.as_deref(),
    };

    if !needs_recovery(monitor.engine.as_ref(), handle).await? {
        return Ok(false);
    }

    let recovery_target = format!("{}:{}", phase.target_prefix(), job.id);
    let new_handle = monitor.engine.enqueue(&recovery_target, &job.id.to_string()).await?;

    match phase {
        Phase::Download => monitor.store.jobs().set_hangfire_job_id(job.id, Some(new_handle.as_str())).await?,
        Phase::Upload => monitor.store.jobs().set_hangfire_upload_job_id(job.id, Some(new_handle.as_str())).await?,
    }

    let mut tx = monitor.store.transaction().await?;
    record_transition(&mut tx, job.id, job.status, job.status, JobSource::HealthMonitor, None).await?;
    tx.commit().await.map_err(DataError::from)?;
    monitor.store.jobs().touch_heartbeat(job.id).await?;

    warn!(job_id = job.id, recovery_target, new_handle, "health monitor recovered stale job");

    if let Some(events) = monitor.events.as_ref() {
        let reason = format!("stale {:?} phase recovered after exceeding heartbeat window", job.status);
        if let Err(err) = events.publish(Event::JobRecovered { job_id: job.id, reason }) {
            warn!(job_id = job.id, error = %err, "failed to publish job recovery event");
        }
    }

    Ok(true)
}

/// Consult the background-execution engine (when a handle exists) to decide whether a stale job
/// genuinely needs recovery, or is merely waiting its turn in the queue.
async fn needs_recovery(engine: &dyn BackgroundExecutionEngine, handle: Option<&str>) -> HealthResult<bool> {
    let Some(handle) = handle else {
        return Ok(true);
    };
    let description = engine.describe(handle).await?;
    Ok(should_recover(description.map(|d| d.state)))
}

/// Pure recovery decision given the engine's last known state for a handle.
///
/// `None` covers both "no handle recorded" and "handle unknown to the engine" (equivalent to
/// the spec's missing/deleted case): both mean recovery should proceed.
const fn should_recover(state: Option<ExecutionState>) -> bool {
    match state {
        None => true,
        Some(ExecutionState::Enqueued | ExecutionState::Scheduled) => false,
        Some(ExecutionState::Processing | ExecutionState::Succeeded | ExecutionState::Failed | ExecutionState::Deleted) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use revaer_jobs_core::InMemoryBackgroundEngine;

    #[test]
    fn missing_state_is_recovered() {
        assert!(should_recover(None));
    }

    #[test]
    fn enqueued_and_scheduled_are_left_alone() {
        assert!(!should_recover(Some(ExecutionState::Enqueued)));
        assert!(!should_recover(Some(ExecutionState::Scheduled)));
    }

    #[test]
    fn processing_succeeded_failed_and_deleted_are_recovered() {
        assert!(should_recover(Some(ExecutionState::Processing)));
        assert!(should_recover(Some(ExecutionState::Succeeded)));
        assert!(should_recover(Some(ExecutionState::Failed)));
        assert!(should_recover(Some(ExecutionState::Deleted)));
    }

    #[test]
    fn phase_targets_are_stable_prefixes() {
        assert_eq!(Phase::Download.target_prefix(), "download");
        assert_eq!(Phase::Upload.target_prefix(), "upload");
        assert_eq!(Phase::of(JobStatus::Queued), None);
        assert_eq!(Phase::of(JobStatus::Downloading), Some(Phase::Download));
        assert_eq!(Phase::of(JobStatus::Uploading), Some(Phase::Upload));
    }

    #[tokio::test]
    async fn needs_recovery_consults_the_engine_for_a_known_handle() {
        let engine = InMemoryBackgroundEngine::new();
        let handle = engine.enqueue("download:1", "{}").await.unwrap();
        assert!(!needs_recovery(&engine, Some(&handle)).await.unwrap());

        engine.set_state(&handle, ExecutionState::Processing);
        assert!(needs_recovery(&engine, Some(&handle)).await.unwrap());
    }

    #[tokio::test]
    async fn needs_recovery_is_true_for_an_unknown_handle() {
        let engine = InMemoryBackgroundEngine::new();
        assert!(needs_recovery(&engine, Some("does-not-exist")).await.unwrap());
        assert!(needs_recovery(&engine, None).await.unwrap());
    }
}

//! Generic dispatch stream and base worker loop shared by the download and upload executors.

use std::marker::PhantomData;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::error::CoordinationResult;
use crate::stream::{self, StreamEntry};

/// Idle duration after which a pending stream entry is considered abandoned and reclaimed from
/// whichever consumer last held it.
pub const RECLAIM_IDLE_MS: u64 = 30_000;

/// Default number of stream entries read or claimed per poll.
const DEFAULT_BATCH_SIZE: usize = 10;

/// Default delay between poll cycles when a worker finds nothing to do.
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Delay before retrying after a transport error, instead of tearing the worker down.
const ERROR_BACKOFF: Duration = Duration::from_secs(5);

/// Marker trait for job payloads carried over a dispatch stream.
pub trait DispatchJob: Serialize + DeserializeOwned + Send + Sync + 'static {}

impl<T> DispatchJob for T where T: Serialize + DeserializeOwned + Send + Sync + 'static {}

/// Executes a single job pulled off a dispatch stream.
#[async_trait]
pub trait JobProcessor<J>: Send + Sync
where
    J: DispatchJob,
{
    /// Process `job`, returning `true` if it reached a terminal outcome (success or a failure
    /// recorded against the job record) and the stream entry should be acknowledged, or `false`
    /// to leave it pending so a later reclaim retries it.
    async fn process(&self, job: &J) -> bool;
}

/// Publishes jobs onto a dispatch stream, creating the consumer group on first use.
#[derive(Clone)]
pub struct StreamDispatcher<J> {
    redis: ConnectionManager,
    stream_key: String,
    group: String,
    _marker: PhantomData<fn() -> J>,
}

impl<J> StreamDispatcher<J>
where
    J: DispatchJob,
{
    /// Wrap a connection manager for publishing onto `stream_key` under `group`.
    pub fn new(redis: ConnectionManager, stream_key: impl Into<String>, group: impl Into<String>) -> Self {
        Self {
            redis,
            stream_key: stream_key.into(),
            group: group.into(),
            _marker: PhantomData,
        }
    }

    /// Serialize `job` and publish it, returning the assigned stream entry id.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload cannot be serialized or the Redis command fails.
    pub async fn dispatch(&self, job: &J) -> CoordinationResult<String> {
        stream::ensure_group(&self.redis, &self.stream_key, &self.group).await?;
        let payload = serde_json::to_string(job)?;
        stream::publish(&self.redis, &self.stream_key, &payload).await
    }
}

/// A polling worker that reclaims abandoned entries, reads new ones, and hands each to a
/// [`JobProcessor`], acknowledging only those the processor reports as done.
pub struct StreamWorker<J, P> {
    redis: ConnectionManager,
    stream_key: String,
    group: String,
    consumer: String,
    processor: P,
    batch_size: usize,
    poll_interval: Duration,
    _marker: PhantomData<fn() -> J>,
}

impl<J, P> StreamWorker<J, P>
where
    J: DispatchJob,
    P: JobProcessor<J>,
{
    /// Build a worker reading `stream_key` as `consumer` within `group`, using the teacher's
    /// default batch size and poll interval.
    pub fn new(
        redis: ConnectionManager,
        stream_key: impl Into<String>,
        group: impl Into<String>,
        consumer: impl Into<String>,
        processor: P,
    ) -> Self {
        Self {
            redis,
            stream_key: stream_key.into(),
            group: group.into(),
            consumer: consumer.into(),
            processor,
            batch_size: DEFAULT_BATCH_SIZE,
            poll_interval: DEFAULT_POLL_INTERVAL,
            _marker: PhantomData,
        }
    }

    /// Override the default batch size.
    #[must_use]
    pub const fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Override the default poll interval.
    #[must_use]
    pub const fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Run the poll loop until `shutdown` reports `true`. Never returns on a transport error:
    /// it logs and backs off `ERROR_BACKOFF` before retrying, so one bad Redis round-trip
    /// doesn't permanently kill this worker for the rest of the process.
    ///
    /// # Errors
    ///
    /// Returns an error only if `ensure_group` fails at startup; once the loop is running,
    /// per-cycle transport errors are swallowed (logged and backed off) rather than propagated.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> CoordinationResult<()> {
        stream::ensure_group(&self.redis, &self.stream_key, &self.group).await?;
        loop {
            if *shutdown.borrow() {
                return Ok(());
            }
            let wait = match self.poll_once().await {
                Ok(true) => None,
                Ok(false) => Some(self.poll_interval),
                Err(err) => {
                    warn!(error = %err, "stream poll failed; backing off before retrying");
                    Some(ERROR_BACKOFF)
                }
            };
            let Some(wait) = wait else { continue };
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        return Ok(());
                    }
                }
                () = tokio::time::sleep(wait) => {}
            }
        }
    }

    /// Run a single reclaim-then-read cycle, returning `true` if any entry was processed.
    /// Exposed so tests and the CLI can drive the worker without a shutdown channel.
    ///
    /// # Errors
    ///
    /// Returns an error if a Redis command fails.
    pub async fn poll_once(&self) -> CoordinationResult<bool> {
        let reclaimed = stream::autoclaim(
            &self.redis,
            &self.stream_key,
            &self.group,
            &self.consumer,
            RECLAIM_IDLE_MS,
            self.batch_size,
        )
        .await?;
        let found_reclaimed = !reclaimed.is_empty();
        self.process_entries(reclaimed).await?;

        let fresh = stream::read_new(
            &self.redis,
            &self.stream_key,
            &self.group,
            &self.consumer,
            self.batch_size,
        )
        .await?;
        let found_fresh = !fresh.is_empty();
        self.process_entries(fresh).await?;

        Ok(found_reclaimed || found_fresh)
    }

    async fn process_entries(&self, entries: Vec<StreamEntry>) -> CoordinationResult<()> {
        for entry in entries {
            let job: J = match serde_json::from_str(&entry.payload) {
                Ok(job) => job,
                Err(err) => {
                    warn!(entry_id = %entry.id, error = %err, "dropping poison stream message");
                    stream::ack(&self.redis, &self.stream_key, &self.group, &entry.id).await?;
                    continue;
                }
            };
            if self.processor.process(&job).await {
                stream::ack(&self.redis, &self.stream_key, &self.group, &entry.id).await?;
            } else {
                debug!(entry_id = %entry.id, "job left pending for a later retry");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Serialize, Deserialize)]
    struct PingJob {
        id: u32,
    }

    struct AlwaysAck;

    #[async_trait]
    impl JobProcessor<PingJob> for AlwaysAck {
        async fn process(&self, _job: &PingJob) -> bool {
            true
        }
    }

    struct NeverAck;

    #[async_trait]
    impl JobProcessor<PingJob> for NeverAck {
        async fn process(&self, _job: &PingJob) -> bool {
            false
        }
    }

    #[tokio::test]
    async fn processor_reports_ack_decision() {
        let job = PingJob { id: 1 };
        assert!(AlwaysAck.process(&job).await);
        assert!(!NeverAck.process(&job).await);
    }
}
